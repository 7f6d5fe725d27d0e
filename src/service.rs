use std::sync::Arc;

use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info};
use uuid::Uuid;

use crate::chat::{ChatPipeline, ChatTurnInput};
use crate::config::AppConfig;
use crate::inference::{GeminiClient, VisionModel};
use crate::models::{
    AnalyzeRequest, AnalyzeResponse, ChatRequest, ChatResponse, ProcessImageRequest,
    ProcessPayload,
};
use crate::pipeline::AnalysisPipeline;
use crate::preprocessing::{ImageOps, PythonImageService};

/// Base64 payloads shorter than this cannot be a real photo.
const MIN_IMAGE_LENGTH: usize = 100;
/// Hard admission budget, roughly 1 MB of JPEG after base64 expansion.
const MAX_IMAGE_LENGTH: usize = 1_400_000;
const MAX_MESSAGE_LENGTH: usize = 1000;

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn validation_error(details: Vec<Value>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "Invalid request format",
            "details": details,
        })),
    )
}

fn payload_too_large_error() -> ApiError {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        Json(json!({
            "error": "Image too large. Please use a smaller image (max ~1MB)."
        })),
    )
}

/// Body-shape failures (missing fields, wrong types, unknown enum values)
/// surface from the `Json` extractor as rejections; the contract is 400 with
/// a `details` array, same as the explicit field checks.
fn unwrap_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => Err(validation_error(vec![json!({
            "field": "body",
            "message": rejection.body_text(),
        })])),
    }
}

fn service_unavailable_error(message: &str) -> ApiError {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": message })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub analysis: Arc<AnalysisPipeline>,
    pub chat: Arc<ChatPipeline>,
    pub image_ops: Arc<dyn ImageOps>,
}

impl AppState {
    /// Wire the real collaborator clients from process configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let image_ops: Arc<dyn ImageOps> = Arc::new(PythonImageService::new(config));
        let model: Arc<dyn VisionModel> = Arc::new(GeminiClient::new(config));
        Self::with_collaborators(image_ops, model)
    }

    /// Wire arbitrary collaborators; tests inject stubs here.
    pub fn with_collaborators(image_ops: Arc<dyn ImageOps>, model: Arc<dyn VisionModel>) -> Self {
        Self {
            analysis: Arc::new(AnalysisPipeline::new(image_ops.clone(), model.clone())),
            chat: Arc::new(ChatPipeline::new(image_ops.clone(), model)),
            image_ops,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/analyze", post(analyze))
        .route("/api/chat", post(chat))
        .route("/api/process-image", post(process_image))
        .route("/api/python-status", get(python_status))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Tag every request with a correlation ID so collaborator failures can be
/// traced back to the originating request.
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn root() -> Json<Value> {
    Json(json!({
        "name": "SkinSight Live API",
        "status": "running",
        "version": "1.0.0",
    }))
}

async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> ApiResult<AnalyzeResponse> {
    let request = unwrap_body(payload)?;
    validate_analyze_request(&request)?;

    info!(
        image_length = request.image_base64.len(),
        has_roi = request.roi.is_some(),
        "analyzing image"
    );

    let outcome = state
        .analysis
        .run(&request.image_base64, request.roi.as_ref())
        .await;

    info!(risk_level = ?outcome.report.risk_level, "analysis request complete");

    Ok(Json(AnalyzeResponse {
        report: outcome.report,
        image_quality: outcome.image_quality,
    }))
}

fn validate_analyze_request(request: &AnalyzeRequest) -> Result<(), ApiError> {
    if request.image_base64.len() > MAX_IMAGE_LENGTH {
        return Err(payload_too_large_error());
    }
    if request.image_base64.len() < MIN_IMAGE_LENGTH {
        return Err(validation_error(vec![json!({
            "field": "imageBase64",
            "message": "Image data too short",
        })]));
    }
    Ok(())
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<ChatResponse> {
    let request = unwrap_body(payload)?;
    validate_chat_request(&request)?;

    info!(
        message_length = request.message.len(),
        attachments = request.additional_images.as_ref().map_or(0, Vec::len),
        has_context = request.analysis_context.is_some(),
        "handling chat turn"
    );

    let input = ChatTurnInput {
        history: request.conversation_history.unwrap_or_default(),
        primary_image: request.image_base64,
        analysis_context: request.analysis_context,
        attachments: request.additional_images.unwrap_or_default(),
    };

    let message = state.chat.respond(&request.message, input).await;

    Ok(Json(ChatResponse { message }))
}

fn validate_chat_request(request: &ChatRequest) -> Result<(), ApiError> {
    let mut details = Vec::new();
    if request.message.trim().is_empty() {
        details.push(json!({
            "field": "message",
            "message": "Message is required",
        }));
    } else if request.message.chars().count() > MAX_MESSAGE_LENGTH {
        details.push(json!({
            "field": "message",
            "message": format!("Message must be at most {MAX_MESSAGE_LENGTH} characters"),
        }));
    }
    if details.is_empty() {
        Ok(())
    } else {
        Err(validation_error(details))
    }
}

/// Maintenance surface: forward one operation to the image-processing
/// service and return its payload verbatim.
async fn process_image(
    State(state): State<AppState>,
    payload: Result<Json<ProcessImageRequest>, JsonRejection>,
) -> ApiResult<ProcessPayload> {
    let request = unwrap_body(payload)?;
    if request.image_base64.len() < MIN_IMAGE_LENGTH {
        return Err(validation_error(vec![json!({
            "field": "imageBase64",
            "message": "Image data too short",
        })]));
    }

    match state
        .image_ops
        .run_operation(request.operation, &request.image_base64, request.roi.as_ref())
        .await
    {
        Ok(payload) => Ok(Json(payload)),
        Err(e) => {
            error!(error = %e, operation = ?request.operation, "image processing failed");
            Err(service_unavailable_error(
                "Image processing service is unavailable",
            ))
        }
    }
}

async fn python_status(State(state): State<AppState>) -> ApiResult<Value> {
    if state.image_ops.is_reachable().await {
        Ok(Json(json!({ "status": "running" })))
    } else {
        Err(service_unavailable_error(
            "Python processing service is not reachable",
        ))
    }
}
