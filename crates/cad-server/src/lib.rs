use std::sync::{Arc, Mutex, PoisonError};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cad_ai::LanguageModel;
use cad_session::{ErrorKind, OperationError, RefinementController, Session, Turn, TurnId};
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

pub type DynModel = Box<dyn LanguageModel + Send>;

/// The one session served by this process.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Mutex<Workspace>>,
}

struct Workspace {
    controller: RefinementController<DynModel>,
    session: Session,
}

impl AppState {
    pub fn new(controller: RefinementController<DynModel>, session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Workspace {
                controller,
                session,
            })),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/history", get(history).delete(clear_history))
        .route("/generate", post(generate))
        .route("/refine", post(refine))
        .route("/load", post(load))
        .route("/turns/{id}/download", get(download))
        .route("/validate", post(validate))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct RefineRequest {
    change: String,
    base_turn_id: String,
}

#[derive(Debug, Deserialize)]
struct LoadRequest {
    turn_id: String,
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    code: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryResponse {
    head: Option<TurnId>,
    turns: Vec<Turn>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LoadResponse {
    head: TurnId,
    turn: Turn,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClearResponse {
    cleared: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct ValidateResponse {
    valid: bool,
    line: Option<usize>,
    column: Option<usize>,
    message: Option<String>,
    params: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    kind: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "bad_request",
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "internal",
            message: message.into(),
        }
    }
}

impl From<OperationError> for ApiError {
    fn from(err: OperationError) -> Self {
        let kind = err.kind();
        let status = match kind {
            ErrorKind::UnknownTurn => StatusCode::NOT_FOUND,
            ErrorKind::Validation | ErrorKind::Execution | ErrorKind::Export => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorKind::Generation => StatusCode::BAD_GATEWAY,
            ErrorKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: kind.as_str(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                kind: self.kind.to_string(),
            }),
        )
            .into_response()
    }
}

/// Runs `op` on the blocking pool while holding the session.
async fn with_workspace<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut Workspace) -> Result<T, OperationError> + Send + 'static,
{
    let inner = Arc::clone(&state.inner);
    tokio::task::spawn_blocking(move || {
        // Operations leave the session unchanged on failure, so a poisoned lock is still consistent.
        let mut workspace = inner.lock().unwrap_or_else(PoisonError::into_inner);
        op(&mut workspace)
    })
    .await
    .map_err(|err| {
        error!(error = %err, "session worker panicked");
        ApiError::internal(format!("session worker failed: {err}"))
    })?
    .map_err(ApiError::from)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn history(State(state): State<AppState>) -> Result<Json<HistoryResponse>, ApiError> {
    let response = with_workspace(&state, |ws| {
        Ok(HistoryResponse {
            head: ws.session.head(),
            turns: ws.session.history().to_vec(),
        })
    })
    .await?;
    Ok(Json(response))
}

async fn generate(State(state): State<AppState>, body: Bytes) -> Result<Json<Turn>, ApiError> {
    let request: GenerateRequest = parse_json(&body)?;
    let turn = with_workspace(&state, move |ws| {
        ws.controller.generate(&mut ws.session, &request.prompt)
    })
    .await?;
    Ok(Json(turn))
}

async fn refine(State(state): State<AppState>, body: Bytes) -> Result<Json<Turn>, ApiError> {
    let request: RefineRequest = parse_json(&body)?;
    let turn = with_workspace(&state, move |ws| {
        ws.session.refresh()?;
        let base = ws.session.resolve(&request.base_turn_id)?;
        ws.controller.refine(&mut ws.session, &request.change, base)
    })
    .await?;
    Ok(Json(turn))
}

async fn load(State(state): State<AppState>, body: Bytes) -> Result<Json<LoadResponse>, ApiError> {
    let request: LoadRequest = parse_json(&body)?;
    let response = with_workspace(&state, move |ws| {
        ws.session.refresh()?;
        let id = ws.session.resolve(&request.turn_id)?;
        let turn = ws.controller.load(&mut ws.session, id)?.clone();
        Ok(LoadResponse { head: id, turn })
    })
    .await?;
    Ok(Json(response))
}

async fn clear_history(State(state): State<AppState>) -> Result<Json<ClearResponse>, ApiError> {
    let cleared =
        with_workspace(&state, |ws| ws.controller.clear_history(&mut ws.session)).await?;
    Ok(Json(ClearResponse { cleared }))
}

async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let download = with_workspace(&state, move |ws| {
        let id = ws.session.resolve(&id)?;
        ws.controller.download(&ws.session, id)
    })
    .await?;

    let disposition = format!("attachment; filename=\"{}\"", download.file_name);
    Ok((
        [
            (CONTENT_TYPE, "model/stl".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        download.bytes,
    )
        .into_response())
}

async fn validate(body: Bytes) -> Result<Json<ValidateResponse>, ApiError> {
    let request: ValidateRequest = parse_json(&body)?;
    let response = match cad_script::validate(&request.code) {
        Ok(program) => ValidateResponse {
            valid: true,
            line: None,
            column: None,
            message: None,
            params: program
                .param_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        },
        Err(err) => ValidateResponse {
            valid: false,
            line: Some(err.position.line),
            column: Some(err.position.column),
            message: Some(err.message),
            params: Vec::new(),
        },
    };
    Ok(Json(response))
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("request body is required"));
    }

    serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("invalid JSON body: {err}")))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::body::Body;
    use axum::response::Response;
    use cad_ai::{GenerationError, GenerationRequest, LanguageModel};
    use cad_mesh::{MeshFormat, MeshingConfig};
    use cad_script::Sandbox;
    use cad_session::{ArtifactStore, HistoryLedger, RefinementController, Session, Turn};
    use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, ORIGIN};
    use http::{Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::{
        AppState, ClearResponse, ErrorResponse, HistoryResponse, LoadResponse, ValidateResponse,
        app,
    };

    const PLATE: &str = "params {\n  width = 10mm\n  depth = 20mm\n}\nresult = box(width, depth, 2mm) |> hole(5mm)";

    /// Pops replies in order; an empty queue means the service is down.
    struct QueueModel {
        replies: Arc<Mutex<VecDeque<String>>>,
    }

    impl LanguageModel for QueueModel {
        fn generate(&mut self, _request: &GenerationRequest<'_>) -> Result<String, GenerationError> {
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .ok_or_else(|| GenerationError::Unavailable("service down".to_string()))
        }
    }

    fn test_app(replies: &[&str]) -> (Router, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let ledger = HistoryLedger::open(dir.path().join("history.json")).expect("ledger");
        let store = ArtifactStore::open(
            dir.path().join("models"),
            MeshFormat::BinaryStl,
            MeshingConfig::with_resolution(20),
        )
        .expect("store");
        let model = QueueModel {
            replies: Arc::new(Mutex::new(
                replies.iter().map(|reply| reply.to_string()).collect(),
            )),
        };
        let controller = RefinementController::new(
            Box::new(model) as super::DynModel,
            store,
            Sandbox::default(),
        );
        (app(AppState::new(controller, Session::new(ledger))), dir)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (router, _dir) = test_app(&[]);
        let response = send(router, Method::GET, "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let payload: serde_json::Value = parse_json_response(response).await;
        assert_eq!(payload, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn generate_commits_and_history_shows_head() {
        let (router, _dir) = test_app(&[PLATE]);

        let response = send(
            router.clone(),
            Method::POST,
            "/generate",
            Some(json!({"prompt": "a 10 by 20 by 2 plate with a 5 millimeter hole"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let turn: Turn = parse_json_response(response).await;
        assert_eq!(
            turn.artifact.file_name,
            "a_10_by_20_by_2_plate_with_a_5_millimete.stl"
        );

        let response = send(router, Method::GET, "/history", None).await;
        let history: HistoryResponse = parse_json_response(response).await;
        assert_eq!(history.head, Some(turn.id));
        assert_eq!(history.turns, vec![turn]);
    }

    #[tokio::test]
    async fn download_streams_the_stl_file() {
        let (router, _dir) = test_app(&["result = sphere(4mm)"]);
        let turn: Turn = parse_json_response(
            send(
                router.clone(),
                Method::POST,
                "/generate",
                Some(json!({"prompt": "a ball"})),
            )
            .await,
        )
        .await;

        let uri = format!("/turns/{}/download", turn.id);
        let response = send(router, Method::GET, &uri, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_DISPOSITION).and_then(|v| v.to_str().ok()),
            Some("attachment; filename=\"a_ball.stl\"")
        );
        assert_eq!(
            response.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("model/stl")
        );

        let bytes = read_body_bytes(response).await;
        let triangles = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
        assert_eq!(triangles, turn.artifact.summary.triangle_count);
        assert_eq!(bytes.len(), 84 + triangles * 50);
    }

    #[tokio::test]
    async fn refine_links_parent_and_load_moves_head() {
        let (router, _dir) = test_app(&["result = sphere(4mm)", "result = sphere(6mm)"]);
        let base: Turn = parse_json_response(
            send(router.clone(), Method::POST, "/generate", Some(json!({"prompt": "ball"}))).await,
        )
        .await;

        let response = send(
            router.clone(),
            Method::POST,
            "/refine",
            Some(json!({"change": "bigger", "base_turn_id": base.id.to_string()})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let refined: Turn = parse_json_response(response).await;
        assert_eq!(refined.parent_id, Some(base.id));

        let response = send(
            router.clone(),
            Method::POST,
            "/load",
            Some(json!({"turn_id": base.id.to_string()})),
        )
        .await;
        let loaded: LoadResponse = parse_json_response(response).await;
        assert_eq!(loaded.head, base.id);

        let history: HistoryResponse =
            parse_json_response(send(router, Method::GET, "/history", None).await).await;
        assert_eq!(history.head, Some(base.id));
        assert_eq!(history.turns.len(), 2);
    }

    #[tokio::test]
    async fn errors_map_to_status_and_kind() {
        let (router, _dir) = test_app(&["result = sphere(", "half = 5 / 2"]);

        let response = send(
            router.clone(),
            Method::POST,
            "/generate",
            Some(json!({"prompt": "broken"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let payload: ErrorResponse = parse_json_response(response).await;
        assert_eq!(payload.kind, "validation");

        let response = send(
            router.clone(),
            Method::POST,
            "/generate",
            Some(json!({"prompt": "nothing"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let payload: ErrorResponse = parse_json_response(response).await;
        assert_eq!(payload.kind, "execution");

        let response = send(
            router.clone(),
            Method::POST,
            "/generate",
            Some(json!({"prompt": "no replies left"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let payload: ErrorResponse = parse_json_response(response).await;
        assert_eq!(payload.kind, "generation");

        let response = send(
            router.clone(),
            Method::POST,
            "/refine",
            Some(json!({"change": "x", "base_turn_id": "0190c2a4-0000-7000-8000-000000000000"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(router.clone(), Method::POST, "/generate", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let history: HistoryResponse =
            parse_json_response(send(router, Method::GET, "/history", None).await).await;
        assert!(history.turns.is_empty());
        assert_eq!(history.head, None);
    }

    #[tokio::test]
    async fn delete_history_clears_turns() {
        let (router, dir) = test_app(&["result = sphere(2)", "result = sphere(3)"]);
        for prompt in ["one", "two"] {
            send(router.clone(), Method::POST, "/generate", Some(json!({"prompt": prompt}))).await;
        }

        let response = send(router.clone(), Method::DELETE, "/history", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let payload: ClearResponse = parse_json_response(response).await;
        assert_eq!(payload.cleared, 2);

        let history: HistoryResponse =
            parse_json_response(send(router, Method::GET, "/history", None).await).await;
        assert!(history.turns.is_empty());
        assert_eq!(
            std::fs::read_dir(dir.path().join("models")).expect("list").count(),
            0
        );
    }

    #[tokio::test]
    async fn validate_reports_position_of_first_problem() {
        let (router, _dir) = test_app(&[]);

        let response = send(
            router.clone(),
            Method::POST,
            "/validate",
            Some(json!({"code": "params { r = 2mm }\nresult = sphere(r)"})),
        )
        .await;
        let payload: ValidateResponse = parse_json_response(response).await;
        assert!(payload.valid);
        assert_eq!(payload.params, vec!["r"]);

        let response = send(
            router,
            Method::POST,
            "/validate",
            Some(json!({"code": "result = sphre(2)"})),
        )
        .await;
        let payload: ValidateResponse = parse_json_response(response).await;
        assert!(!payload.valid);
        assert_eq!((payload.line, payload.column), (Some(1), Some(10)));
        assert!(payload.message.unwrap_or_default().contains("did you mean 'sphere'"));
    }

    #[tokio::test]
    async fn validate_rejects_deep_nesting_without_crashing() {
        let (router, _dir) = test_app(&[]);
        let code = format!("result = sphere({}1{})", "(".repeat(5000), ")".repeat(5000));

        let response = send(router, Method::POST, "/validate", Some(json!({ "code": code }))).await;

        assert_eq!(response.status(), StatusCode::OK);
        let payload: ValidateResponse = parse_json_response(response).await;
        assert!(!payload.valid);
        assert_eq!(payload.message.as_deref(), Some("expression is nested too deeply"));
    }

    #[tokio::test]
    async fn cors_headers_are_present() {
        let (router, _dir) = test_app(&[]);
        let request = Request::builder()
            .method(Method::GET)
            .uri("/health")
            .header(ORIGIN, "https://example.com")
            .body(Body::empty())
            .expect("request should build");

        let response = router.oneshot(request).await.expect("request should complete");
        let allow_origin = response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert_eq!(allow_origin, "*");
    }

    async fn send(
        router: Router,
        method: Method,
        uri: &str,
        value: Option<serde_json::Value>,
    ) -> Response {
        let body = match value {
            Some(value) => Body::from(serde_json::to_vec(&value).expect("json encoding should succeed")),
            None => Body::empty(),
        };
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .expect("request should build");

        router
            .oneshot(request)
            .await
            .expect("request should complete")
    }

    async fn parse_json_response<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = read_body_bytes(response).await;
        serde_json::from_slice(&bytes).expect("response should decode as JSON")
    }

    async fn read_body_bytes(response: Response) -> axum::body::Bytes {
        response
            .into_body()
            .collect()
            .await
            .expect("response body should collect")
            .to_bytes()
    }
}
