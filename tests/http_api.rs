//! End-to-end HTTP tests: the real router, SQLite store, filesystem blob
//! store, GitHub client and Ollama provider, with GitHub and Ollama played
//! by local axum servers.

use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use repo_index::config::{parse_config, Config};
use repo_index::server::{router, AppState};
use repo_index::service::build_engine;
use repo_index_core::codec;

#[derive(Clone, Default)]
struct MockGithub {
    response: Arc<Mutex<(u16, Value)>>,
    requests: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

impl MockGithub {
    fn respond(&self, status: u16, body: Value) {
        *self.response.lock().unwrap() = (status, body);
    }
}

async fn github_graphql(
    State(mock): State<MockGithub>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    mock.requests
        .lock()
        .unwrap()
        .push((auth, body["variables"].clone()));
    let (status, body) = mock.response.lock().unwrap().clone();
    (StatusCode::from_u16(status).unwrap(), Json(body))
}

#[derive(Clone, Default)]
struct MockOllama {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

async fn ollama_embed(State(mock): State<MockOllama>, Json(body): Json<Value>) -> Json<Value> {
    let texts: Vec<String> = body["input"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t.as_str().unwrap().to_string())
        .collect();
    let embeddings: Vec<Value> = texts
        .iter()
        .map(|t| json!([t.len() as f64, 1.0, 0.0]))
        .collect();
    mock.calls.lock().unwrap().push(texts);
    Json(json!({ "embeddings": embeddings }))
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn github_payload(pr_files: &[&str]) -> Value {
    let files: Vec<Value> = pr_files.iter().map(|p| json!({ "path": p })).collect();
    json!({
        "data": {
            "repository": {
                "issues": { "nodes": [
                    { "id": "I_1", "number": 1, "title": "Widget crashes", "bodyText": "Trace attached", "state": "OPEN" }
                ]},
                "pullRequests": { "nodes": [
                    { "id": "PR_7", "number": 7, "title": "Fix crash", "bodyText": "Null guard", "state": "OPEN",
                      "files": { "nodes": files } }
                ]}
            }
        }
    })
}

struct Env {
    _tmp: TempDir,
    root: std::path::PathBuf,
    base: String,
    github: MockGithub,
    ollama: MockOllama,
    http: reqwest::Client,
}

async fn setup(token_env: &str) -> Env {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let github = MockGithub::default();
    github.respond(200, github_payload(&["a.ts", "b.ts"]));
    let github_addr = spawn(
        Router::new()
            .route("/graphql", post(github_graphql))
            .with_state(github.clone()),
    )
    .await;

    let ollama = MockOllama::default();
    let ollama_addr = spawn(
        Router::new()
            .route("/api/embed", post(ollama_embed))
            .with_state(ollama.clone()),
    )
    .await;

    let config: Config = parse_config(&format!(
        r#"
[db]
path = "{root}/data/rix.sqlite"

[storage]
backend = "filesystem"
root = "{root}/vectors"

[github]
token_env = "{token_env}"
api_url = "http://{github_addr}/graphql"
max_retries = 0

[embedding]
provider = "ollama"
model = "nomic-embed-text"
dims = 3
url = "http://{ollama_addr}"
max_retries = 0

[server]
bind = "127.0.0.1:0"
"#,
        root = root.display(),
    ))
    .unwrap();

    let engine = Arc::new(build_engine(&config).await.unwrap());
    let app = router(AppState::new(engine), None).unwrap();
    let addr = spawn(app).await;

    Env {
        _tmp: tmp,
        root,
        base: format!("http://{}", addr),
        github,
        ollama,
        http: reqwest::Client::new(),
    }
}

impl Env {
    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .http
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self
            .http
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }
}

#[tokio::test]
async fn test_register_and_sync_end_to_end() {
    std::env::set_var("RIX_TEST_TOKEN_E2E", "ghp_test");
    let env = setup("RIX_TEST_TOKEN_E2E").await;

    let (status, body) = env.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");

    // Register
    let (status, body) = env
        .post(
            "/api/repositories",
            json!({ "repoUrl": "https://github.com/acme/widget" }),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["owner"], "acme");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["lastSyncAt"], 0);

    let (status, _) = env
        .post("/api/repositories", json!({ "repoUrl": "acme/widget" }))
        .await;
    assert_eq!(status, 200, "existing record is returned, not recreated");

    let (status, body) = env.get("/api/repositories").await;
    assert_eq!(status, 200);
    assert_eq!(body["repositories"].as_array().unwrap().len(), 1);

    // First sync
    let (status, body) = env.post("/api/repositories/acme/widget/sync", json!({})).await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["repo"], "acme/widget");
    assert_eq!(body["status"], "active");
    assert_eq!(body["issuesCount"], 1);
    assert_eq!(body["pullRequestsCount"], 1);
    let first_sync_at = body["lastSyncAt"].as_i64().unwrap();
    assert!(first_sync_at > 0);

    {
        let requests = env.github.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0.as_deref(), Some("Bearer ghp_test"));
        assert_eq!(requests[0].1["owner"], "acme");
        assert_eq!(requests[0].1["issuesSince"], Value::Null);
        assert_eq!(requests[0].1["pullRequestsFilesFirst"], 100);
    }
    {
        let calls = env.ollama.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0], "Widget crashes\n\nTrace attached");
        assert_eq!(
            calls[0][1],
            "Fix crash\n\nNull guard\n\nFiles changed:\na.ts\nb.ts"
        );
    }

    let bytes = std::fs::read(env.root.join("vectors/acme/widget.json.gz")).unwrap();
    let object = codec::decode(&bytes).unwrap();
    assert_eq!(object.synced_at, first_sync_at);
    assert_eq!(object.issues["I_1"].vector.len(), 3);

    let (_, record) = env.get("/api/repositories/acme/widget").await;
    assert_eq!(record["status"], "active");
    assert_eq!(record["lastSyncAt"], first_sync_at);

    // Second sync: the PR is unchanged, only the issue is embedded again
    let (status, body) = env.post("/api/repositories/acme/widget/sync", json!({})).await;
    assert_eq!(status, 200, "{}", body);
    assert!(body["lastSyncAt"].as_i64().unwrap() > first_sync_at);
    {
        let calls = env.ollama.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], vec!["Widget crashes\n\nTrace attached".to_string()]);
    }
    assert!(env.github.requests.lock().unwrap()[1].1["issuesSince"].is_string());

    // Changed file list re-embeds the PR
    env.github.respond(200, github_payload(&["a.ts", "c.ts"]));
    let (status, _) = env.post("/api/repositories/acme/widget/sync", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(env.ollama.calls.lock().unwrap()[2].len(), 2);
}

#[tokio::test]
async fn test_error_responses() {
    std::env::set_var("RIX_TEST_TOKEN_ERRORS", "ghp_test");
    let env = setup("RIX_TEST_TOKEN_ERRORS").await;

    let (status, body) = env
        .post("/api/repositories", json!({ "repoUrl": "https://gitlab.com/a/b" }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = env.post("/api/repositories", json!({ "url": "a/b" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = env.get("/api/repositories/nobody/nothing").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, body) = env
        .post("/api/repositories/nobody/nothing/sync", json!({}))
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    // Upstream failure marks the record as errored
    env.post("/api/repositories", json!({ "repoUrl": "acme/widget" }))
        .await;
    env.github
        .respond(502, json!({ "message": "Bad Gateway" }));
    let (status, body) = env.post("/api/repositories/acme/widget/sync", json!({})).await;
    assert_eq!(status, 500);
    assert_eq!(body["error"]["code"], "upstream_fetch");

    let (_, record) = env.get("/api/repositories/acme/widget").await;
    assert_eq!(record["status"], "error");
    assert!(record["errorMessage"].as_str().unwrap().contains("502"));
    assert_eq!(record["lastSyncAt"], 0);
    assert!(!env.root.join("vectors/acme/widget.json.gz").exists());

    // GraphQL-level errors are failures too
    env.github.respond(
        200,
        json!({ "data": { "repository": null }, "errors": [{ "message": "Could not resolve to a Repository" }] }),
    );
    let (status, body) = env.post("/api/repositories/acme/widget/sync", json!({})).await;
    assert_eq!(status, 500);
    assert_eq!(body["error"]["code"], "upstream_fetch");
}

#[tokio::test]
async fn test_sync_without_token_is_unauthorized() {
    std::env::remove_var("RIX_TEST_TOKEN_NEVER_SET");
    let env = setup("RIX_TEST_TOKEN_NEVER_SET").await;

    env.post("/api/repositories", json!({ "repoUrl": "acme/widget" }))
        .await;
    let (status, body) = env.post("/api/repositories/acme/widget/sync", json!({})).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], "unauthorized");

    let (_, record) = env.get("/api/repositories/acme/widget").await;
    assert_eq!(record["status"], "pending", "rejection leaves the record untouched");
    assert!(env.github.requests.lock().unwrap().is_empty());
}
