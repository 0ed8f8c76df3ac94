//! Query proxy server.
//!
//! Translates the editor UI's JSON commands into driver calls and serializes
//! results back into a uniform response envelope. Serves the iframe host
//! page on `/` and the command endpoint on `/query`.
//!
//! Per-request failures are isolated: any decode or execution error becomes
//! an error envelope on a `200` response, and the process keeps serving.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use askama::Template;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tower_http::{trace::TraceLayer, validate_request::ValidateRequestHeaderLayer};

use crate::config::AuthConfig;
use crate::driver::{Driver, QueryResult};

/// Options for running the server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub port: u16,
    /// Editor base URL; the driver suffix is appended per backend kind.
    pub studio: String,
    /// Basic-auth gate, enabled iff a username is set.
    pub username: Option<String>,
    pub password: Option<String>,
    /// Log every statement before execution.
    pub log: bool,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub driver: Arc<dyn Driver>,
    /// Fully suffixed editor URL embedded in the iframe.
    pub studio_url: String,
    pub log_statements: bool,
    pub auth: Option<AuthConfig>,
}

/// A command submitted by the editor UI.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Command {
    /// Run exactly one statement.
    Query { id: Value, statement: String },
    /// Run an ordered list of statements as one batch.
    Transaction { id: Value, statements: Vec<String> },
}

/// Result payload: one result for a query, one per statement for a batch.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    Single(QueryResult),
    Batch(Vec<QueryResult>),
}

/// Uniform response envelope. Exactly one of `data`/`error` is present;
/// `type` and `id` echo the command verbatim.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    #[serde(rename = "type")]
    pub kind: Value,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Iframe host page.
#[derive(Template)]
#[template(path = "studio.html")]
struct StudioTemplate {
    title: String,
    studio_url: String,
}

/// Wrapper to render Askama templates as Axum responses.
struct HtmlTemplate<T>(T);

impl<T> IntoResponse for HtmlTemplate<T>
where
    T: Template,
{
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(rendered) => Html(rendered).into_response(),
            Err(err) => {
                tracing::error!(error = %err, "Template render failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let auth = state.auth.clone();
    let app_state = Arc::new(state);

    let router = Router::new()
        .route("/", get(index_handler))
        .route("/query", post(query_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    match auth {
        Some(auth) => router.layer(ValidateRequestHeaderLayer::basic(
            &auth.username,
            &auth.password,
        )),
        None => router,
    }
}

/// Host page embedding the editor iframe.
async fn index_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    HtmlTemplate(StudioTemplate {
        title: state.driver.connection_name(),
        studio_url: state.studio_url.clone(),
    })
}

/// Command endpoint. Always responds `200`; failures are reported in-body.
async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Json<CommandResponse> {
    let kind = body.get("type").cloned().unwrap_or(Value::Null);
    let id = body.get("id").cloned().unwrap_or(Value::Null);

    match dispatch(&state, body).await {
        Ok(data) => Json(CommandResponse {
            kind,
            id,
            data: Some(data),
            error: None,
        }),
        Err(message) => Json(CommandResponse {
            kind,
            id,
            data: None,
            error: Some(message),
        }),
    }
}

async fn dispatch(state: &AppState, body: Value) -> Result<ResponseData, String> {
    let command: Command = serde_json::from_value(body).map_err(|err| err.to_string())?;

    match command {
        Command::Query { id, statement } => {
            if state.log_statements {
                tracing::info!("{id} Query | {statement}");
            }
            let result = state
                .driver
                .query(&statement)
                .await
                .map_err(|err| err.to_string())?;
            Ok(ResponseData::Single(result))
        }
        Command::Transaction { id, statements } => {
            if state.log_statements {
                for statement in &statements {
                    tracing::info!("{id} Query | {statement}");
                }
            }
            let results = state
                .driver
                .batch(&statements)
                .await
                .map_err(|err| err.to_string())?;
            Ok(ResponseData::Batch(results))
        }
    }
}

/// Run the server until an interrupt signal or shutdown keystroke arrives.
///
/// Driver initialization runs in the background so the listener binds
/// immediately; init failures are logged and surface through request errors.
/// Shutdown is abrupt: connections are force-closed and the process exits
/// without draining in-flight requests.
pub async fn serve(driver: Arc<dyn Driver>, options: ServeOptions) -> std::io::Result<()> {
    let studio_url = format!(
        "{}/{}",
        options.studio.trim_end_matches('/'),
        driver.kind().studio_suffix()
    );
    let auth = options.username.map(|username| AuthConfig {
        username,
        password: options.password.unwrap_or_default(),
    });

    let state = AppState {
        driver: driver.clone(),
        studio_url,
        log_statements: options.log,
        auth,
    };
    let router = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], options.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Serving!");
    tracing::info!("- Local: http://localhost:{}", options.port);
    tracing::info!("Press q to shut down the server");

    let init_driver = driver.clone();
    tokio::spawn(async move {
        if let Err(err) = init_driver.init().await {
            tracing::warn!(error = %err, "Driver initialization failed");
        }
    });

    let server = axum::serve(listener, router);
    tokio::select! {
        result = server.into_future() => result,
        _ = shutdown_signal() => {
            tracing::info!("Shutting down the server");
            driver.close().await;
            std::process::exit(0);
        }
    }
}

/// Resolves on the first of: interrupt signal, terminate signal, or an
/// interactive shutdown keystroke.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Caught interrupt signal");
        }
        _ = terminate => {
            tracing::info!("Caught terminate signal");
        }
        _ = shutdown_keystroke() => {}
    }
}

/// Resolves when an interactive stdin delivers `q`, `Q` or Ctrl-C.
/// Pends forever when stdin is not a terminal.
async fn shutdown_keystroke() {
    use std::io::IsTerminal;

    if !std::io::stdin().is_terminal() {
        std::future::pending::<()>().await;
    }

    let mut stdin = tokio::io::stdin();
    let mut buf = [0u8; 1];
    loop {
        match stdin.read(&mut buf).await {
            Ok(1..) => {
                if matches!(buf[0], b'q' | b'Q' | 0x03) {
                    return;
                }
            }
            // EOF or read failure: stop watching the keyboard.
            _ => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{ColumnType, DriverError, DriverKind, QueryStat, ResultHeader, Row};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    /// Test double standing in for a real backend.
    #[derive(Debug)]
    struct FakeDriver;

    fn fake_result() -> QueryResult {
        let mut row = Row::new();
        row.insert("x".to_string(), json!(1));
        QueryResult {
            rows: vec![row],
            headers: vec![ResultHeader::new(
                "x",
                Some("INTEGER".to_string()),
                ColumnType::Integer,
            )],
            stat: QueryStat::affected(0),
            last_insert_rowid: None,
        }
    }

    #[async_trait::async_trait]
    impl Driver for FakeDriver {
        fn kind(&self) -> DriverKind {
            DriverKind::Sqlite
        }

        fn connection_name(&self) -> String {
            "fake.db".to_string()
        }

        async fn init(&self) -> Result<(), DriverError> {
            Ok(())
        }

        async fn query(&self, statement: &str) -> Result<QueryResult, DriverError> {
            if statement.contains("boom") {
                return Err(DriverError::Execution("no such table: boom".to_string()));
            }
            Ok(fake_result())
        }

        async fn batch(&self, statements: &[String]) -> Result<Vec<QueryResult>, DriverError> {
            for statement in statements {
                if statement.contains("boom") {
                    return Err(DriverError::Execution("no such table: boom".to_string()));
                }
            }
            Ok(statements.iter().map(|_| fake_result()).collect())
        }

        async fn close(&self) {}
    }

    fn test_state(auth: Option<AuthConfig>) -> AppState {
        AppState {
            driver: Arc::new(FakeDriver),
            studio_url: "https://studio.example.com/embed/sqlite".to_string(),
            log_statements: false,
            auth,
        }
    }

    async fn post_query(router: &Router, body: Value) -> (StatusCode, Value) {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/query")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_query_success_envelope() {
        let router = create_router(test_state(None));
        let (status, body) = post_query(
            &router,
            json!({"type": "query", "id": "1", "statement": "select 1 as x"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], json!("query"));
        assert_eq!(body["id"], json!("1"));
        assert_eq!(body["data"]["rows"][0]["x"], json!(1));
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_transaction_success_envelope() {
        let router = create_router(test_state(None));
        let (status, body) = post_query(
            &router,
            json!({"type": "transaction", "id": 7, "statements": ["select 1", "select 2"]}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], json!(7));
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_command_type_reports_error_in_envelope() {
        let router = create_router(test_state(None));
        let (status, body) = post_query(&router, json!({"type": "explain", "id": 3})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], json!("explain"));
        assert_eq!(body["id"], json!(3));
        assert!(body["error"].is_string());
        assert!(body.get("data").is_none());

        // The server keeps serving after a malformed command.
        let (status, body) = post_query(
            &router,
            json!({"type": "query", "id": "4", "statement": "select 1"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_execution_error_envelope_carries_native_message() {
        let router = create_router(test_state(None));
        let (status, body) = post_query(
            &router,
            json!({"type": "query", "id": "9", "statement": "select * from boom"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], json!("no such table: boom"));
        assert!(body.get("data").is_none());
    }

    #[tokio::test]
    async fn test_index_page_embeds_studio() {
        let router = create_router(test_state(None));
        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let page = String::from_utf8_lossy(&bytes);
        assert!(page.contains("<title>fake.db</title>"));
        assert!(page.contains("https://studio.example.com/embed/sqlite"));
    }

    #[tokio::test]
    async fn test_basic_auth_gate() {
        let router = create_router(test_state(Some(AuthConfig {
            username: "admin".to_string(),
            password: "secret".to_string(),
        })));

        let response = router
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // base64("admin:secret")
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("authorization", "Basic YWRtaW46c2VjcmV0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
