//! Web front end.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Question form |
//! | `POST` | `/` | Form submit (`question`); answer rendered on the same page |
//! | `POST` | `/api/ask` | `{"question": …}` → `{"answer": …, "agents": [...]}` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `llm_disabled` (400), `internal` (500).
//! The HTML form shows the same message inline.

use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::agents::{Router as AgentRouter, RouterAnswer};
use crate::config::Config;

pub const PAGE_TITLE: &str = "KNAACK: Know about NAAC Accredited Institutes and Universities";

const EXAMPLE_QUESTIONS: [&str; 3] = [
    "What are some of the green campus initiatives at FLAME UNIVERSITY?",
    "What does the FLAME Centre for Entrepreneurship do?",
    "Which institutes have got the highest grade for Criteria 2?",
];

/// `None` when `[llm]` is disabled; questions then fail with `llm_disabled`.
#[derive(Clone)]
pub struct AppState {
    router: Option<Arc<AgentRouter>>,
}

impl AppState {
    pub fn new(router: Option<Arc<AgentRouter>>) -> Self {
        Self { router }
    }
}

/// `knaack serve`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());

    let router = if config.llm.is_enabled() {
        Some(Arc::new(AgentRouter::from_config(config.clone()).await?))
    } else {
        eprintln!("Warning: [llm] provider is disabled; questions will be rejected");
        None
    };

    let app = build_app(AppState::new(router));

    println!("KNAACK listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_page).post(handle_form))
        .route("/api/ask", axum::routing::post(handle_ask))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn llm_disabled() -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "llm_disabled".to_string(),
        message: "LLM provider is disabled. Set [llm] provider in config.".to_string(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

async fn answer_question(state: &AppState, question: &str) -> Result<RouterAnswer, AppError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    let Some(router) = &state.router else {
        return Err(llm_disabled());
    };
    router
        .ask(question)
        .await
        .map_err(|e| internal(format!("{:#}", e)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/ask ============

#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    question: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<RouterAnswer>, AppError> {
    answer_question(&state, &req.question).await.map(Json)
}

// ============ GET / and POST / ============

async fn handle_page() -> Html<String> {
    Html(render_page("", None, None))
}

async fn handle_form(
    State(state): State<AppState>,
    Form(req): Form<AskRequest>,
) -> (StatusCode, Html<String>) {
    match answer_question(&state, &req.question).await {
        Ok(answer) => (
            StatusCode::OK,
            Html(render_page(&req.question, Some(&answer.answer), None)),
        ),
        Err(e) => (
            e.status,
            Html(render_page(&req.question, None, Some(&e.message))),
        ),
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// The single page. Every dynamic string is escaped.
pub fn render_page(question: &str, answer: Option<&str>, error: Option<&str>) -> String {
    let examples: String = EXAMPLE_QUESTIONS
        .iter()
        .enumerate()
        .map(|(i, q)| format!("      <p class=\"example\">Example {}: {}</p>\n", i + 1, escape_html(q)))
        .collect();

    let result = match (answer, error) {
        (_, Some(err)) => format!(
            "    <section class=\"error\"><h2>Error</h2><p>{}</p></section>\n",
            escape_html(err)
        ),
        (Some(ans), None) => format!(
            "    <section class=\"answer\"><h2>Answer:</h2><div>{}</div></section>\n",
            escape_html(ans).replace('\n', "<br>\n")
        ),
        (None, None) => String::new(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>{title}</title>
  <style>
    body {{ font-family: sans-serif; margin: 2rem 4rem; }}
    input[type=text] {{ width: 100%; padding: .5rem; }}
    .example {{ color: #888; margin: .25rem 0; }}
    .error {{ color: #b00; }}
  </style>
</head>
<body>
  <h1>{title}</h1>
  <form method="post" action="/">
    <label for="question">Enter your question related to NAAC accreditation or NAAC accredited universities:</label>
    <input type="text" id="question" name="question" value="{question}">
    <button type="submit">Submit</button>
{examples}  </form>
{result}</body>
</html>
"#,
        title = escape_html(PAGE_TITLE),
        question = escape_html(question),
        examples = examples,
        result = result,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html("<b>\"A&B\"</b>"),
            "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt;"
        );
    }

    #[test]
    fn page_has_title_and_examples() {
        let html = render_page("", None, None);
        assert!(html.contains(PAGE_TITLE));
        assert_eq!(html.matches("class=\"example\"").count(), 3);
        assert!(!html.contains("Answer:"));
    }

    #[test]
    fn answer_and_question_are_escaped() {
        let html = render_page("<script>", Some("A++ <i>grade</i>\nsecond line"), None);
        assert!(html.contains("value=\"&lt;script&gt;\""));
        assert!(html.contains("A++ &lt;i&gt;grade&lt;/i&gt;<br>\nsecond line"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn errors_render_inline() {
        let html = render_page("q", None, Some("LLM provider is disabled"));
        assert!(html.contains("class=\"error\""));
        assert!(html.contains("LLM provider is disabled"));
    }
}
