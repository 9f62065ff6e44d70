//! Lenient parsing of LLM text output
//!
//! Models wrap JSON in prose, markdown fences, or both. The extractor pulls
//! the first balanced JSON object out of the text and hands it to serde;
//! anything beyond that is the caller's problem.

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Parse the first JSON object embedded in free-form model output.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let start = text
        .find('{')
        .ok_or_else(|| Error::Backend(format!("no JSON object in model output: {text:.60}")))?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..start + offset + c.len_utf8()];
                    return Ok(serde_json::from_str(candidate)?);
                }
            }
            _ => {}
        }
    }

    Err(Error::Backend(
        "unterminated JSON object in model output".to_string(),
    ))
}
