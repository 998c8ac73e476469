use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tasksync_core::db::Database;
use tasksync_core::{SyncEngine, SyncResponse, WireTask};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::extract_tenant_token;
use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    engine: SyncEngine,
}

impl AppState {
    pub const fn new(engine: SyncEngine) -> Self {
        Self { engine }
    }

    /// Open the database (running migrations) and build the engine
    pub fn open(config: &AppConfig) -> tasksync_core::Result<Self> {
        let db = Database::open(&config.db_path, config.store_options())?;
        Ok(Self::new(SyncEngine::new(db, config.sync_options())))
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sync", post(sync))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SyncResponse>, AppError> {
    // Checked before the body is even parsed, let alone the store touched
    let token = extract_tenant_token(&headers)?.to_string();

    let mut request: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|error| AppError::bad_request(format!("Body is not valid JSON: {error}")))?
    };
    // Anything but a `tasks` array is an empty submission
    let tasks: Vec<WireTask> = match request.get_mut("tasks").map(Value::take) {
        Some(Value::Array(entries)) => entries.into_iter().filter_map(WireTask::from_value).collect(),
        _ => Vec::new(),
    };

    let engine = state.engine.clone();
    let response = tokio::task::spawn_blocking(move || engine.sync(&token, &tasks))
        .await
        .map_err(|error| AppError::internal(format!("Sync worker failed: {error}")))??;

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tasksync_core::db::{SqliteTaskStore, StoreOptions, TaskStore};
    use tasksync_core::SyncOptions;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    use super::*;

    fn setup() -> (TempDir, SyncEngine) {
        let tmp = tempdir().unwrap();
        let db = Database::open(tmp.path().join("test.db"), StoreOptions::default()).unwrap();
        (tmp, SyncEngine::new(db, SyncOptions::default()))
    }

    fn make_task(task_id: &str, name: &str) -> Value {
        json!({
            "id": task_id,
            "name": name,
            "estimatedTime": 25,
            "longCycle": false,
            "cycleList": [],
            "progress": 0,
            "deadline": null,
            "completed": false,
            "time_up": false,
            "urgent": false,
            "important": false,
            "description": "",
            "timestamp": 1_730_000_000_000_i64,
        })
    }

    async fn post_sync(engine: &SyncEngine, token: Option<&str>, body: String) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri("/sync")
            .header("content-type", "application/json");
        if let Some(token) = token {
            request = request.header("x-token", token);
        }

        let response = app_router(AppState::new(engine.clone()))
            .oneshot(request.body(Body::from(body)).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn sync_tasks(engine: &SyncEngine, token: &str, tasks: Vec<Value>) -> Vec<Value> {
        let (status, body) =
            post_sync(engine, Some(token), json!({ "tasks": tasks }).to_string()).await;
        assert_eq!(status, StatusCode::OK);
        body["tasks"].as_array().cloned().unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let (_tmp, engine) = setup();
        let response = app_router(AppState::new(engine))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn sync_without_token_is_unauthorized() {
        let (_tmp, engine) = setup();

        let (status, body) = post_sync(
            &engine,
            None,
            json!({ "tasks": [make_task("t1", "A-Task")] }).to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.get("tasks").is_none());

        let conn = engine.database().connect().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn token_isolation() {
        let (_tmp, engine) = setup();

        // 1) Put one task for token A
        let tasks = sync_tasks(&engine, "token-A", vec![make_task("t1", "A-Task")]).await;
        assert_eq!(tasks.len(), 1);

        // 2) Query token B (no tasks yet)
        let tasks = sync_tasks(&engine, "token-B", vec![]).await;
        assert_eq!(tasks.len(), 0, "Token B should not see Token A's task");

        // 3) Query token A again (should see its task)
        let tasks = sync_tasks(&engine, "token-A", vec![]).await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0]["name"], "A-Task");

        // 4) Insert a task for token B and ensure token A doesn't receive it
        let tasks = sync_tasks(&engine, "token-B", vec![make_task("t2", "B-Task")]).await;
        assert_eq!(tasks.len(), 1);

        let tasks = sync_tasks(&engine, "token-A", vec![]).await;
        assert_eq!(tasks.len(), 1, "Token A should not see Token B's task");
    }

    #[tokio::test]
    async fn sync_response_uses_client_encoding() {
        let (_tmp, engine) = setup();
        let mut task = make_task("t1", "A-Task");
        task["timestamp"] = json!(1_730_000_000);
        task["urgent"] = json!(1);
        task["cycleList"] = json!([3, 5]);

        let tasks = sync_tasks(&engine, "token-A", vec![task]).await;

        assert_eq!(
            tasks[0],
            json!({
                "id": "t1",
                "name": "A-Task",
                "estimatedTime": 25,
                "longCycle": false,
                "cycleList": [3, 5],
                "progress": 0,
                "deadline": null,
                "completed": false,
                "time_up": false,
                "urgent": true,
                "important": false,
                "description": "",
                "timestamp": 1_730_000_000_000_i64,
            })
        );
    }

    #[tokio::test]
    async fn missing_tasks_field_is_an_empty_submission() {
        let (_tmp, engine) = setup();
        sync_tasks(&engine, "token-A", vec![make_task("t1", "A-Task")]).await;

        let (status, body) = post_sync(&engine, Some("token-A"), "{}".to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tasks"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn non_array_tasks_is_an_empty_submission() {
        let (_tmp, engine) = setup();
        sync_tasks(&engine, "token-A", vec![make_task("t1", "A-Task")]).await;

        for body in [json!({ "tasks": "t2" }), json!({ "tasks": { "id": "t2" } }), json!([1, 2])] {
            let (status, response) = post_sync(&engine, Some("token-A"), body.to_string()).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(response["tasks"].as_array().map(Vec::len), Some(1));
            assert_eq!(response["tasks"][0]["name"], "A-Task");
        }
    }

    #[tokio::test]
    async fn non_object_entries_are_ignored() {
        let (_tmp, engine) = setup();

        let tasks = sync_tasks(
            &engine,
            "token-A",
            vec![json!("t1"), json!(42), make_task("t2", "Real")],
        )
        .await;

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0]["id"], "t2");
    }

    #[tokio::test]
    async fn invalid_json_is_bad_request() {
        let (_tmp, engine) = setup();
        let (status, body) = post_sync(&engine, Some("token-A"), "{tasks:".to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("tasks").is_none());
    }

    #[tokio::test]
    async fn store_failure_is_generic_server_error() {
        let (_tmp, engine) = setup();
        sync_tasks(&engine, "token-A", vec![make_task("t1", "A-Task")]).await;

        engine
            .database()
            .connect()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER fail_insert BEFORE INSERT ON tasks
                 WHEN NEW.name = 'explode'
                 BEGIN SELECT RAISE(ABORT, 'simulated failure'); END;",
            )
            .unwrap();

        let mut bad = make_task("t2", "explode");
        bad["timestamp"] = json!(1_740_000_000_000_i64);
        let (status, body) = post_sync(
            &engine,
            Some("token-A"),
            json!({ "tasks": [bad] }).to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Internal Server Error" }));

        let conn = engine.database().connect().unwrap();
        let stored = SqliteTaskStore::new(&conn).load_tasks("token-A").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "A-Task");
    }
}
