use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use nexus_api::{
    ApiError, BackendConfig, ChatBackend, GenerateRequest, HttpBackend, Provider, UserRecord,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Clone)]
struct ScriptedResponse {
    status: u16,
    body: String,
}

#[derive(Debug, Clone)]
struct RecordedRequest {
    request_line: String,
    body: String,
}

/// Minimal HTTP/1.1 server answering each connection with the next scripted response.
struct ScriptedServer {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl ScriptedServer {
    async fn new(scripts: Vec<ScriptedResponse>) -> Self {
        let scripts = Arc::new(scripts);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let served = Arc::new(AtomicUsize::new(0));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("local TCP listener should bind");
        let addr = listener.local_addr().expect("resolved listener address");

        let handle = tokio::spawn({
            let requests = Arc::clone(&requests);
            async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let scripts = Arc::clone(&scripts);
                    let requests = Arc::clone(&requests);
                    let served = Arc::clone(&served);
                    tokio::spawn(async move {
                        serve_one(socket, scripts, requests, served).await;
                    });
                }
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
            handle,
        }
    }

    fn backend(&self) -> HttpBackend {
        HttpBackend::new(BackendConfig::new(&self.base_url)).expect("http backend")
    }

    fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("request log").clone()
    }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn respond(status: u16, body: &str) -> ScriptedResponse {
    ScriptedResponse {
        status,
        body: body.to_string(),
    }
}

async fn serve_one(
    mut socket: TcpStream,
    scripts: Arc<Vec<ScriptedResponse>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    served: Arc<AtomicUsize>,
) {
    let Ok(request) = read_request(&mut socket).await else {
        return;
    };
    requests.lock().expect("request log").push(request);

    let index = served.fetch_add(1, Ordering::AcqRel);
    let response = scripts
        .get(index)
        .cloned()
        .unwrap_or_else(|| respond(500, "unexpected request"));

    let head = format!(
        "HTTP/1.1 {} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.body.len(),
    );
    if socket.write_all(head.as_bytes()).await.is_err() {
        return;
    }
    let _ = socket.write_all(response.body.as_bytes()).await;
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<RecordedRequest> {
    let mut raw = Vec::new();
    let mut buffer = [0_u8; 2048];

    let header_end = loop {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        raw.extend_from_slice(&buffer[..n]);
        if let Some(position) = raw.windows(4).position(|window| window == b"\r\n\r\n") {
            break position + 4;
        }
    };

    let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while raw.len() < header_end + content_length {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buffer[..n]);
    }

    Ok(RecordedRequest {
        request_line: head.lines().next().unwrap_or_default().to_string(),
        body: String::from_utf8_lossy(&raw[header_end..]).to_string(),
    })
}

fn sample_request() -> GenerateRequest {
    GenerateRequest {
        user_id: "u1".to_string(),
        prompt: "Tell me a joke".to_string(),
        provider: Provider::Gemini,
        temperature: 0.7,
        max_tokens: 100,
    }
}

#[tokio::test]
async fn health_probe_accepts_2xx_and_rejects_everything_else() {
    let server = ScriptedServer::new(vec![
        respond(200, r#"{"status":"healthy","service":"go-llm-nexus"}"#),
        respond(503, "down for maintenance"),
    ])
    .await;
    let backend = server.backend();

    assert!(backend.check_health().await.is_ok());

    let error = backend.check_health().await.expect_err("503 is unhealthy");
    assert_eq!(error.status(), Some(503));

    let requests = server.requests();
    assert_eq!(requests[0].request_line, "GET /api/health HTTP/1.1");
}

#[tokio::test]
async fn register_user_posts_name_and_decodes_identity() {
    let server = ScriptedServer::new(vec![respond(201, r#"{"id":"u1","name":"Ada"}"#)]).await;

    let record = server
        .backend()
        .register_user("Ada".to_string())
        .await
        .expect("registration succeeds");

    assert_eq!(
        record,
        UserRecord {
            id: "u1".to_string(),
            name: "Ada".to_string(),
        }
    );

    let requests = server.requests();
    assert_eq!(requests[0].request_line, "POST /api/users HTTP/1.1");
    let body: serde_json::Value = serde_json::from_str(&requests[0].body).expect("json body");
    assert_eq!(body, serde_json::json!({"name": "Ada"}));
}

#[tokio::test]
async fn generate_sends_wire_payload_and_reads_usage() {
    let server = ScriptedServer::new(vec![respond(
        200,
        r#"{"content":"Why did the crab cross the road?","provider_used":"gemini","processing_time_ms":420,
            "usage":{"prompt_tokens":4,"completion_tokens":9,"total_tokens":13,"cost_usd":0.0002}}"#,
    )])
    .await;

    let response = server
        .backend()
        .generate(sample_request())
        .await
        .expect("generation succeeds");

    assert_eq!(response.provider_used, "gemini");
    assert_eq!(response.processing_time_ms, 420);
    let usage = response.usage.expect("usage block");
    assert_eq!(usage.total_tokens, 13);
    assert_eq!(usage.cost_usd, Some(0.0002));

    let requests = server.requests();
    assert_eq!(requests[0].request_line, "POST /api/generate HTTP/1.1");
    let body: serde_json::Value = serde_json::from_str(&requests[0].body).expect("json body");
    assert_eq!(body["user_id"], "u1");
    assert_eq!(body["provider"], "gemini");
    assert_eq!(body["max_tokens"], 100);
}

#[tokio::test]
async fn generate_failure_keeps_error_body() {
    let server = ScriptedServer::new(vec![respond(500, "rate limited\n")]).await;

    let error = server
        .backend()
        .generate(sample_request())
        .await
        .expect_err("500 must fail");

    assert!(matches!(error, ApiError::Status { status: 500, .. }));
    assert_eq!(error.body_text(), Some("rate limited"));
}

#[tokio::test]
async fn malformed_success_body_is_a_decode_error() {
    let server = ScriptedServer::new(vec![respond(200, "not json")]).await;

    let error = server
        .backend()
        .generate(sample_request())
        .await
        .expect_err("body is not json");

    assert!(matches!(error, ApiError::Decode { .. }));
}

#[tokio::test]
async fn unreachable_gateway_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let backend = HttpBackend::new(BackendConfig::new(format!("http://{addr}"))).expect("backend");
    let error = backend.check_health().await.expect_err("nothing listens");

    assert!(error.is_transport());
}
