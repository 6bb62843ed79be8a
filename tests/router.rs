//! Supervisor and worker agents over a scripted OpenAI-compatible endpoint,
//! and the web front end on top of them.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use knaack::agents::Router;
use knaack::config::{parse_config, Config};
use knaack::llm::OpenAiChatModel;
use knaack::loader::load_records;
use knaack::server::{build_app, AppState, PAGE_TITLE};
use knaack::tools::ToolContext;
use knaack::{db, migrate};
use knaack_core::models::ListingRecord;

#[derive(Default)]
struct ChatScript {
    replies: Mutex<VecDeque<Value>>,
    requests: Mutex<Vec<(Option<String>, Value)>>,
}

impl ChatScript {
    fn request(&self, i: usize) -> Value {
        self.requests.lock().unwrap()[i].1.clone()
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn completions(
    State(script): State<Arc<ChatScript>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    script.requests.lock().unwrap().push((auth, body));
    match script.replies.lock().unwrap().pop_front() {
        Some(reply) => Json(reply).into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "script exhausted").into_response(),
    }
}

fn calls(calls: &[(&str, &str, Value)]) -> Value {
    let tool_calls: Vec<Value> = calls
        .iter()
        .map(|(id, name, args)| {
            json!({
                "id": id,
                "type": "function",
                "function": { "name": name, "arguments": args.to_string() }
            })
        })
        .collect();
    json!({ "choices": [{ "message": { "role": "assistant", "content": null, "tool_calls": tool_calls } }] })
}

fn text(content: Option<&str>) -> Value {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
}

async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_chat(replies: Vec<Value>) -> (Arc<ChatScript>, String) {
    let script = Arc::new(ChatScript {
        replies: Mutex::new(replies.into()),
        ..Default::default()
    });
    let app = axum::Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(script.clone());
    let base = serve(app).await;
    (script, format!("{}/v1", base))
}

async fn setup_router(base_url: &str) -> (TempDir, Arc<Config>, Router) {
    let tmp = TempDir::new().unwrap();
    let toml = format!(
        "[db]\npath = \"{}/knaack.sqlite\"\n\n[llm]\nprovider = \"openai\"\nbase_url = \"{}\"\nmodel = \"test-model\"\nmax_retries = 0\nmax_steps = 6\n",
        tmp.path().display(),
        base_url
    );
    let config = Arc::new(parse_config(&toml).unwrap());

    let pool = db::connect(&config).await.unwrap();
    migrate::migrate_pool(&pool).await.unwrap();
    let records: Vec<ListingRecord> = serde_json::from_value(json!([
        { "hei_assessment_id": 1, "hei_name": "Alpha College", "aishe_id": "C-1", "grade": "A++" },
        { "hei_assessment_id": 2, "hei_name": "Beta College", "aishe_id": "C-2", "grade": "B" }
    ]))
    .unwrap();
    load_records(&pool, &records).await.unwrap();
    let read_only = db::connect_read_only(&config).await.unwrap();

    let model = OpenAiChatModel::with_key(&config.llm, "test-key".to_string()).unwrap();
    let router = Router::new(
        Arc::new(model),
        ToolContext::new(config.clone(), pool, read_only),
    );
    (tmp, config, router)
}

fn sql_script() -> Vec<Value> {
    vec![
        calls(&[("s1", "transfer_to_sql_agent", json!({}))]),
        calls(&[("q1", "sql_db_list_tables", json!({}))]),
        calls(&[(
            "q2",
            "sql_db_query",
            json!({ "query": "SELECT hei_name FROM institution_details WHERE grade = 'A++'" }),
        )]),
        text(Some("Alpha College has grade A++.")),
        text(None),
    ]
}

fn tool_names(request: &Value) -> Vec<String> {
    request["tools"]
        .as_array()
        .map(|tools| {
            tools
                .iter()
                .map(|t| t["function"]["name"].as_str().unwrap().to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn supervisor_hands_question_to_sql_agent() {
    let (script, base) = spawn_chat(sql_script()).await;
    let (_tmp, _config, router) = setup_router(&base).await;

    let answer = router.ask("Which colleges have grade A++?").await.unwrap();
    assert_eq!(answer.answer, "Alpha College has grade A++.");
    assert_eq!(answer.agents, vec!["sql_agent".to_string()]);
    assert_eq!(script.request_count(), 5);

    let first = script.requests.lock().unwrap()[0].clone();
    assert_eq!(first.0.as_deref(), Some("Bearer test-key"));
    assert_eq!(first.1["model"], "test-model");
    assert_eq!(
        tool_names(&first.1),
        vec!["transfer_to_sql_agent", "transfer_to_rag_agent"]
    );

    let worker = script.request(1);
    assert_eq!(
        tool_names(&worker),
        vec!["sql_db_list_tables", "sql_db_schema", "sql_db_query_checker", "sql_db_query"]
    );
    assert!(worker["messages"][0]["content"]
        .as_str()
        .unwrap()
        .contains("syntactically correct sqlite query"));

    // the query result reaches the model as a tool message
    let after_query = script.request(3);
    let messages = after_query["messages"].as_array().unwrap();
    let last = messages.last().unwrap();
    assert_eq!(last["role"], "tool");
    assert_eq!(last["tool_call_id"], "q2");
    assert!(last["content"].as_str().unwrap().contains("Alpha College"));
    assert!(!last["content"].as_str().unwrap().contains("Beta College"));

    // the supervisor sees the worker's answer
    let back = script.request(4);
    let supervisor_messages = back["messages"].as_array().unwrap();
    assert_eq!(
        supervisor_messages.last().unwrap()["content"],
        "Alpha College has grade A++."
    );
}

#[tokio::test]
async fn only_first_handoff_runs() {
    let (script, base) = spawn_chat(vec![
        calls(&[
            ("s1", "transfer_to_rag_agent", json!({})),
            ("s2", "transfer_to_sql_agent", json!({})),
        ]),
        text(Some("The campus harvests rainwater.")),
        text(None),
    ])
    .await;
    let (_tmp, _config, router) = setup_router(&base).await;

    let answer = router.ask("Green initiatives at Alpha College?").await.unwrap();
    assert_eq!(answer.agents, vec!["rag_agent".to_string()]);
    assert_eq!(answer.answer, "The campus harvests rainwater.");

    let back = script.request(2);
    let refusal = back["messages"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["tool_call_id"] == "s2")
        .cloned()
        .unwrap();
    assert!(refusal["content"]
        .as_str()
        .unwrap()
        .starts_with("Refused: assign work to one agent at a time."));
}

#[tokio::test]
async fn endpoint_errors_surface() {
    let (_script, base) = spawn_chat(Vec::new()).await;
    let (_tmp, _config, router) = setup_router(&base).await;

    let err = router.ask("anything").await.unwrap_err();
    assert!(err.to_string().contains("500"), "{}", err);
}

#[tokio::test]
async fn api_ask_returns_answer_and_agents() {
    let (_script, base) = spawn_chat(sql_script()).await;
    let (_tmp, _config, router) = setup_router(&base).await;
    let web = serve(build_app(AppState::new(Some(Arc::new(router))))).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/ask", web))
        .json(&json!({ "question": "Which colleges have grade A++?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["answer"], "Alpha College has grade A++.");
    assert_eq!(body["agents"], json!(["sql_agent"]));
}

#[tokio::test]
async fn form_submit_renders_answer() {
    let (_script, base) = spawn_chat(sql_script()).await;
    let (_tmp, _config, router) = setup_router(&base).await;
    let web = serve(build_app(AppState::new(Some(Arc::new(router))))).await;

    let html = reqwest::Client::new()
        .post(format!("{}/", web))
        .form(&[("question", "Which colleges have grade A++?")])
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(html.contains("Answer:"));
    assert!(html.contains("Alpha College has grade A++."));
    assert!(html.contains("value=\"Which colleges have grade A++?\""));
}

#[tokio::test]
async fn empty_question_is_bad_request() {
    let (script, base) = spawn_chat(sql_script()).await;
    let (_tmp, _config, router) = setup_router(&base).await;
    let web = serve(build_app(AppState::new(Some(Arc::new(router))))).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/ask", web))
        .json(&json!({ "question": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(script.request_count(), 0);
}

#[tokio::test]
async fn disabled_llm_rejects_questions() {
    let web = serve(build_app(AppState::new(None))).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/ask", web))
        .json(&json!({ "question": "Which colleges have grade A++?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "llm_disabled");

    let page = client.get(format!("{}/", web)).send().await.unwrap().text().await.unwrap();
    assert!(page.contains(PAGE_TITLE));

    let health: Value = client
        .get(format!("{}/health", web))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
}

#[tokio::test]
async fn failing_model_is_internal_error() {
    let (_script, base) = spawn_chat(Vec::new()).await;
    let (_tmp, _config, router) = setup_router(&base).await;
    let web = serve(build_app(AppState::new(Some(Arc::new(router))))).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/ask", web))
        .json(&json!({ "question": "anything" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "internal");
}
