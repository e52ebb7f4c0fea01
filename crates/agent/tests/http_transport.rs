use std::collections::VecDeque;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use creditwatch_agent::{
    AgentClient, AgentQuery, AgentReply, HttpAgentTransport, QueryKind, RetryPolicy,
    TransportError,
};
use creditwatch_core::config::AppConfig;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

#[derive(Clone)]
enum Canned {
    Status(StatusCode),
    Body(&'static str),
    Json(Value),
}

#[derive(Clone, Default)]
struct Upstream {
    script: Arc<Mutex<VecDeque<Canned>>>,
    requests: Arc<Mutex<Vec<Value>>>,
}

async fn handle(State(upstream): State<Upstream>, Json(request): Json<Value>) -> Response {
    upstream.requests.lock().await.push(request);
    let next = upstream.script.lock().await.pop_front();
    match next {
        Some(Canned::Status(status)) => (status, "upstream unavailable").into_response(),
        Some(Canned::Body(body)) => (StatusCode::OK, body).into_response(),
        Some(Canned::Json(value)) => Json(value).into_response(),
        None => StatusCode::GONE.into_response(),
    }
}

async fn spawn_upstream(script: Vec<Canned>) -> (String, Upstream) {
    let upstream = Upstream {
        script: Arc::new(Mutex::new(script.into())),
        requests: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new().route("/", post(handle)).with_state(upstream.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock upstream");
    let address = listener.local_addr().expect("mock upstream address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock upstream");
    });

    (format!("http://{address}/"), upstream)
}

fn client_for(base_url: String) -> AgentClient {
    let mut config = AppConfig::default().agent;
    config.base_url = base_url;
    config.timeout_secs = 5;
    config.connect_timeout_secs = 2;

    let transport = HttpAgentTransport::new(&config).expect("build http transport");
    AgentClient::new(Arc::new(transport), RetryPolicy::immediate(3))
}

fn text_result(text: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": "balance-1",
        "result": {"status": {"message": {"parts": [{"kind": "text", "text": text}]}}}
    })
}

fn rpc_busy() -> Value {
    json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "busy"}})
}

#[tokio::test]
async fn retries_server_errors_then_returns_text() {
    let (base_url, upstream) = spawn_upstream(vec![
        Canned::Status(StatusCode::SERVICE_UNAVAILABLE),
        Canned::Body(""),
        Canned::Json(text_result("Balance: -$46,891.29")),
    ])
    .await;

    let query = AgentQuery::new(QueryKind::Balance, "What is the balance for org-1?");
    let reply = client_for(base_url).send(&query).await;

    assert_eq!(reply, AgentReply::Text("Balance: -$46,891.29".to_owned()));

    let requests = upstream.requests.lock().await;
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0]["method"], "message/send");
    assert_eq!(requests[0]["id"], query.id.as_str());
    assert_eq!(requests[0]["params"]["message"]["parts"][0]["text"], query.prompt.as_str());
}

#[tokio::test]
async fn non_json_and_rpc_errors_exhaust_retries() {
    let (base_url, upstream) = spawn_upstream(vec![
        Canned::Body("<html>gateway</html>"),
        Canned::Json(rpc_busy()),
        Canned::Json(rpc_busy()),
    ])
    .await;

    let reply = client_for(base_url).send(&AgentQuery::new(QueryKind::Flags, "VIP?")).await;

    assert_eq!(
        reply,
        AgentReply::Failed {
            attempts: 3,
            last_error: TransportError::Rpc { code: -32000, message: "busy".to_owned() },
        }
    );
    assert_eq!(upstream.requests.lock().await.len(), 3);
}

#[tokio::test]
async fn unreachable_endpoint_fails_with_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("reserve a port");
    let address = listener.local_addr().expect("reserved address");
    drop(listener);

    let reply = client_for(format!("http://{address}/"))
        .send(&AgentQuery::new(QueryKind::Usage, "usage?"))
        .await;

    assert!(
        matches!(reply, AgentReply::Failed { attempts: 3, last_error: TransportError::Connect(_) }),
        "unexpected reply: {reply:?}"
    );
}
