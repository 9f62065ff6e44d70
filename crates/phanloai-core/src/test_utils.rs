//! Test utilities for phanloai-core
//!
//! This module provides testing infrastructure including a mock external
//! classifier server speaking both wire surfaces the cascade can call: the
//! fast service contract (POST /classify) and an Ollama-style generate
//! endpoint (POST /api/generate) for the LLM backend.

use axum::{
    extract::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::sync::oneshot;

use crate::catalog::CategoryCatalog;
use crate::models::{ScoreRequest, ScoreResponse};

/// Mock external classifier server for tests and development
pub struct MockClassifierServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockClassifierServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/health", get(handle_health))
            .route("/api/tags", get(handle_health))
            .route("/classify", post(handle_classify))
            .route("/api/generate", post(handle_generate));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockClassifierServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_health() -> &'static str {
    "ok"
}

/// Fast-service contract: canned confident scores for a few obvious inputs,
/// a flat unconfident vector for everything else.
async fn handle_classify(Json(request): Json<ScoreRequest>) -> Json<ScoreResponse> {
    let catalog = CategoryCatalog::vietnamese_defaults();
    let text = &request.normalized_text;

    let confident: Option<usize> = if text.contains("ca phe")
        || text.contains("cafe")
        || text.contains("tra sua")
        || text.contains("com")
    {
        Some(0) // Ăn uống
    } else if text.contains("grab") || text.contains("xe") || text.contains("xang") {
        Some(1) // Di chuyển
    } else if text.contains("tien dien") || text.contains("hoa don") {
        Some(3) // Hóa đơn & Tiện ích
    } else if text.contains("thuoc") || text.contains("kham") {
        Some(6) // Sức khỏe
    } else {
        None
    };

    let mut scores = vec![0.0; catalog.len()];
    match confident {
        Some(index) => scores[index] = 8.0,
        None => scores.fill(0.5),
    }

    let best = confident.unwrap_or(catalog.other_index());
    Json(ScoreResponse {
        category_id: catalog.by_index(best).id,
        raw_score_vector: scores,
        elapsed_ms: 3,
    })
}

/// Ollama-style generate request (the subset the LLM backend sends)
#[derive(Debug, Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[allow(dead_code)]
    #[serde(default)]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}

/// LLM contract: answer with the category JSON the prompt asks for.
async fn handle_generate(Json(request): Json<GenerateRequest>) -> Json<GenerateResponse> {
    let prompt = request.prompt.to_lowercase();

    let (category, confidence) = if prompt.contains("ca phe") || prompt.contains("tra sua") {
        ("Ăn uống", 0.9)
    } else if prompt.contains("grab") || prompt.contains("taxi") {
        ("Di chuyển", 0.85)
    } else if prompt.contains("tien thue nha") {
        ("Nhà ở", 0.8)
    } else {
        ("Khác", 0.3)
    };

    Json(GenerateResponse {
        model: request.model,
        response: format!(
            "{{\"category\": \"{}\", \"confidence\": {}}}",
            category, confidence
        ),
        done: true,
    })
}
