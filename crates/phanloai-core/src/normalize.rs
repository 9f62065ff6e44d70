//! Text normalization for Vietnamese transaction descriptions
//!
//! Bank and e-wallet descriptions arrive lowercased, SHOUTED, accent-stripped,
//! misspelled, or written in teencode ("ko" for "không", "cf" for "cà phê").
//! Everything that matches against the category catalog goes through this
//! module first so the matching layers only ever see one canonical form:
//! lowercase, accent-free, teencode expanded, single-spaced.
//!
//! Two pipelines are exposed:
//! - [`basic`]: lowercase + accent strip + whitespace collapse. Cheap, used by
//!   the literal keyword layer.
//! - [`normalize`]: `basic` plus whole-word teencode expansion. Used by the
//!   fuzzy layer and everything that compares names for similarity.

use tracing::trace;

/// Teencode and abbreviation expansions, applied on whole tokens only.
///
/// Canonical forms must not themselves appear as keys, otherwise
/// normalization would not be idempotent.
const TEENCODE: &[(&str, &str)] = &[
    ("ko", "khong"),
    ("k", "khong"),
    ("hok", "khong"),
    ("hong", "khong"),
    ("dc", "duoc"),
    ("vs", "voi"),
    ("cf", "ca phe"),
    ("caphe", "ca phe"),
    ("trasua", "tra sua"),
    ("mn", "moi nguoi"),
    ("dt", "dien thoai"),
    ("sn", "sinh nhat"),
    ("gd", "gia dinh"),
    ("ks", "khach san"),
    ("nh", "ngan hang"),
    ("tk", "tai khoan"),
    ("bh", "bao hiem"),
    ("bhyt", "bao hiem y te"),
    ("trc", "truoc"),
    ("sthi", "sieu thi"),
];

/// Map a single accented Vietnamese character to its base form.
///
/// Input is expected to be lowercased already; uppercase accented characters
/// are handled by lowercasing before the strip.
fn strip_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'ả' | 'ã' | 'ạ' | 'ă' | 'ằ' | 'ắ' | 'ẳ' | 'ẵ' | 'ặ' | 'â' | 'ầ' | 'ấ'
        | 'ẩ' | 'ẫ' | 'ậ' => 'a',
        'è' | 'é' | 'ẻ' | 'ẽ' | 'ẹ' | 'ê' | 'ề' | 'ế' | 'ể' | 'ễ' | 'ệ' => 'e',
        'ì' | 'í' | 'ỉ' | 'ĩ' | 'ị' => 'i',
        'ò' | 'ó' | 'ỏ' | 'õ' | 'ọ' | 'ô' | 'ồ' | 'ố' | 'ổ' | 'ỗ' | 'ộ' | 'ơ' | 'ờ' | 'ớ'
        | 'ở' | 'ỡ' | 'ợ' => 'o',
        'ù' | 'ú' | 'ủ' | 'ũ' | 'ụ' | 'ư' | 'ừ' | 'ứ' | 'ử' | 'ữ' | 'ự' => 'u',
        'ỳ' | 'ý' | 'ỷ' | 'ỹ' | 'ỵ' => 'y',
        'đ' => 'd',
        _ => c,
    }
}

fn expand_teencode(token: &str) -> &str {
    for (short, full) in TEENCODE {
        if *short == token {
            return full;
        }
    }
    token
}

/// Lowercase, strip accents, drop punctuation, collapse whitespace.
///
/// Does not expand teencode; the literal keyword layer matches against this
/// form so that "cf" stays "cf" and only the fuzzy layer pays for the full
/// pipeline.
pub fn basic(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(strip_diacritic)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Full normalization pipeline: [`basic`] plus whole-word teencode expansion.
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let base = basic(text);
    let expanded: Vec<&str> = base.split_whitespace().map(expand_teencode).collect();
    let out = expanded.join(" ");
    trace!(input = text, output = %out, "normalized");
    out
}

/// Levenshtein edit distance over characters.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Similarity in [0, 1]: `1 - levenshtein(a, b) / max(len(a), len(b))`.
///
/// Equal strings (including two empty strings) return 1.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Similarity where either side may be absent; an absent side scores 0.0.
pub fn similarity_opt(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => similarity(a, b),
        _ => 0.0,
    }
}

/// How a candidate matched the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Candidate appeared as a whole word (or whole-word phrase) in the input.
    Exact,
    /// Candidate cleared the similarity threshold against some token window.
    Fuzzy,
}

/// A candidate that matched the input.
#[derive(Debug, Clone)]
pub struct KeywordMatch {
    pub keyword: String,
    pub score: f64,
    pub kind: MatchKind,
}

/// Find the best-matching candidate in `input`.
///
/// Exact whole-word matches win outright (score 1.0); the first candidate
/// with an exact hit is returned without consulting the rest. Otherwise the
/// highest-similarity candidate at or above `threshold` wins, the first
/// candidate keeping ties. Similarity for a multi-token candidate is taken
/// over contiguous token windows of the input, so "ca phe" can still match
/// the single token "caphe".
pub fn best_match(input: &str, candidates: &[String], threshold: f64) -> Option<KeywordMatch> {
    let norm_input = normalize(input);
    let tokens: Vec<&str> = norm_input.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }

    for candidate in candidates {
        let cand = normalize(candidate);
        if exact_token_match(&tokens, &cand) {
            return Some(KeywordMatch {
                keyword: candidate.clone(),
                score: 1.0,
                kind: MatchKind::Exact,
            });
        }
    }

    let mut best: Option<KeywordMatch> = None;
    for candidate in candidates {
        let cand = normalize(candidate);
        if cand.is_empty() {
            continue;
        }
        let score = window_similarity(&tokens, &cand);
        if score >= threshold && best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(KeywordMatch {
                keyword: candidate.clone(),
                score,
                kind: MatchKind::Fuzzy,
            });
        }
    }
    best
}

/// Whether `candidate` (possibly multi-token) appears as a contiguous run of
/// whole tokens in `tokens`.
pub(crate) fn exact_token_match(tokens: &[&str], candidate: &str) -> bool {
    let cand_tokens: Vec<&str> = candidate.split_whitespace().collect();
    if cand_tokens.is_empty() || cand_tokens.len() > tokens.len() {
        return false;
    }
    tokens
        .windows(cand_tokens.len())
        .any(|w| w == cand_tokens.as_slice())
}

/// Best similarity of `candidate` against contiguous token windows of the
/// input, for window sizes around the candidate's own token count.
pub(crate) fn window_similarity(tokens: &[&str], candidate: &str) -> f64 {
    let cand_len = candidate.split_whitespace().count().max(1);
    let mut best = 0.0f64;
    for size in 1..=(cand_len + 1).min(tokens.len()) {
        for window in tokens.windows(size) {
            let joined = window.join(" ");
            let s = similarity(&joined, candidate);
            if s > best {
                best = s;
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_accents_and_case() {
        assert_eq!(normalize("CÀ PHÊ  sáng"), "ca phe sang");
        assert_eq!(normalize("CÀ PHÊ  sáng"), normalize("ca phe sang"));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = ["CÀ PHÊ sáng", "ko mua đồ", "cf vs mn", "ăn sáng 45k"];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_normalize_expands_teencode_whole_word_only() {
        assert_eq!(normalize("ko mua"), "khong mua");
        assert_eq!(normalize("caphe szang"), "ca phe szang");
        // "ko" inside a longer token must not be rewritten
        assert_eq!(normalize("kodak"), "kodak");
    }

    #[test]
    fn test_basic_skips_teencode() {
        assert_eq!(basic("cf sáng"), "cf sang");
        assert_eq!(normalize("cf sáng"), "ca phe sang");
    }

    #[test]
    fn test_normalize_drops_punctuation() {
        assert_eq!(normalize("GRAB*TRIP-7841"), "grab trip 7841");
    }

    #[test]
    fn test_similarity_reflexive_and_empty() {
        assert_eq!(similarity("ca phe", "ca phe"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity_opt(None, Some("ca phe")), 0.0);
        assert_eq!(similarity_opt(Some("ca phe"), None), 0.0);
        assert_eq!(similarity_opt(Some("x"), Some("x")), 1.0);
    }

    #[test]
    fn test_similarity_typo() {
        // one edit over six characters
        let s = similarity("ca phe", "caphe");
        assert!((s - (1.0 - 1.0 / 6.0)).abs() < 1e-9);
        assert!(similarity("ca phe", "tien dien") < 0.3);
    }

    #[test]
    fn test_best_match_exact_wins_over_fuzzy() {
        let candidates = vec!["tra sua".to_string(), "cafe".to_string()];
        let m = best_match("uong cafe chieu", &candidates, 0.65).unwrap();
        assert_eq!(m.keyword, "cafe");
        assert_eq!(m.score, 1.0);
        assert_eq!(m.kind, MatchKind::Exact);
    }

    #[test]
    fn test_best_match_fuzzy_on_typo() {
        let candidates = vec!["ca phe".to_string()];
        let m = best_match("cahpe sang", &candidates, 0.6).unwrap();
        assert_eq!(m.kind, MatchKind::Fuzzy);
        assert!(m.score >= 0.6);
    }

    #[test]
    fn test_best_match_below_threshold() {
        let candidates = vec!["tien dien".to_string()];
        assert!(best_match("mua rau cu", &candidates, 0.7).is_none());
    }

    #[test]
    fn test_best_match_first_candidate_wins_ties() {
        // both candidates are equally distant from the input token
        let candidates = vec!["xem".to_string(), "xom".to_string()];
        let m = best_match("xam", &candidates, 0.5).unwrap();
        assert_eq!(m.keyword, "xem");
    }

    #[test]
    fn test_multi_token_candidate_matches_fused_token() {
        let candidates = vec!["ca phe".to_string()];
        // normalize() expands the "caphe" teencode token, so this is exact
        let m = best_match("caphe da", &candidates, 0.65).unwrap();
        assert_eq!(m.kind, MatchKind::Exact);
    }
}
