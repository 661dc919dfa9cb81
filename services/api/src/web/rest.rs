//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Authentication happens upstream; handlers trust the session id in the path.

use crate::web::state::AppState;
use adaptive_tutor_core::domain::{ChatMessage, LearnerProfile, Plan, RegenerationMode, Slide};
use adaptive_tutor_core::error::PipelineError;
use adaptive_tutor_core::pipeline::ProgressReport;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        create_session_handler,
        get_plan_handler,
        get_slide_handler,
        regenerate_slide_handler,
        ask_chat_handler,
        chat_history_handler,
        get_progress_handler,
        record_time_handler,
    ),
    components(
        schemas(
            CreateSessionRequest,
            ProfilePayload,
            SessionResponse,
            PlanResponse,
            ModuleResponse,
            SubmoduleResponse,
            SlideSummary,
            SlideResponse,
            RegenerateRequest,
            RegenerationModePayload,
            ChatRequest,
            ChatResponse,
            ChatMessageResponse,
            ProgressResponse,
            TimeSpentRequest,
        )
    ),
    tags(
        (name = "Adaptive Tutor API", description = "Personalized slide courses generated from training material.")
    )
)]
pub struct ApiDoc;

/// Builds the API router over the shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sessions", post(create_session_handler))
        .route("/sessions/{id}/plan", get(get_plan_handler))
        .route("/sessions/{id}/slides/{index}", get(get_slide_handler))
        .route("/sessions/{id}/slides/{index}/regenerate", post(regenerate_slide_handler))
        .route("/sessions/{id}/chat", post(ask_chat_handler).get(chat_history_handler))
        .route("/sessions/{id}/progress", get(get_progress_handler))
        .route("/sessions/{id}/progress/time", post(record_time_handler))
        .with_state(state)
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The intake questionnaire answers.
#[derive(Deserialize, ToSchema)]
pub struct ProfilePayload {
    level: String,
    learning_style: String,
    job: String,
    sector: String,
    country: String,
    language: String,
}

impl From<ProfilePayload> for LearnerProfile {
    fn from(p: ProfilePayload) -> Self {
        LearnerProfile {
            level: p.level,
            learning_style: p.learning_style,
            job: p.job,
            sector: p.sector,
            country: p.country,
            language: p.language,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    training_id: Uuid,
    profile: ProfilePayload,
}

#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    session_id: Uuid,
    training_id: Uuid,
}

#[derive(Serialize, ToSchema)]
pub struct SlideSummary {
    index: usize,
    title: String,
    status: String,
}

#[derive(Serialize, ToSchema)]
pub struct SubmoduleResponse {
    title: String,
    slides: Vec<SlideSummary>,
}

#[derive(Serialize, ToSchema)]
pub struct ModuleResponse {
    title: String,
    submodules: Vec<SubmoduleResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct PlanResponse {
    session_id: Uuid,
    total_slides: usize,
    modules: Vec<ModuleResponse>,
}

impl From<Plan> for PlanResponse {
    fn from(plan: Plan) -> Self {
        let modules = plan
            .modules
            .iter()
            .enumerate()
            .map(|(m, module)| ModuleResponse {
                title: module.title.clone(),
                submodules: module
                    .submodules
                    .iter()
                    .enumerate()
                    .map(|(s, submodule)| SubmoduleResponse {
                        title: submodule.title.clone(),
                        slides: plan
                            .slides
                            .iter()
                            .filter(|slide| slide.module_index == m && slide.submodule_index == s)
                            .map(|slide| SlideSummary {
                                index: slide.index,
                                title: slide.title.clone(),
                                status: slide.status.to_string(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        PlanResponse {
            session_id: plan.session_id,
            total_slides: plan.slides.len(),
            modules,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SlideResponse {
    index: usize,
    module_index: usize,
    submodule_index: usize,
    title: String,
    status: String,
    content: Option<String>,
    generated_at: Option<DateTime<Utc>>,
}

impl From<Slide> for SlideResponse {
    fn from(slide: Slide) -> Self {
        SlideResponse {
            index: slide.index,
            module_index: slide.module_index,
            submodule_index: slide.submodule_index,
            title: slide.title,
            status: slide.status.to_string(),
            content: slide.content,
            generated_at: slide.generated_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RegenerationModePayload {
    Simplify,
    Deepen,
}

impl From<RegenerationModePayload> for RegenerationMode {
    fn from(mode: RegenerationModePayload) -> Self {
        match mode {
            RegenerationModePayload::Simplify => RegenerationMode::Simplify,
            RegenerationModePayload::Deepen => RegenerationMode::Deepen,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct RegenerateRequest {
    mode: RegenerationModePayload,
}

#[derive(Deserialize, ToSchema)]
pub struct ChatRequest {
    /// The slide displayed when the question was asked.
    slide_index: usize,
    question: String,
}

#[derive(Serialize, ToSchema)]
pub struct ChatResponse {
    answer: String,
}

#[derive(Serialize, ToSchema)]
pub struct ChatMessageResponse {
    id: Uuid,
    slide_index: usize,
    role: String,
    text: String,
    created_at: DateTime<Utc>,
}

impl From<ChatMessage> for ChatMessageResponse {
    fn from(m: ChatMessage) -> Self {
        ChatMessageResponse {
            id: m.id,
            slide_index: m.slide_index,
            role: m.role.as_str().to_string(),
            text: m.text,
            created_at: m.created_at,
        }
    }
}

#[derive(Deserialize, IntoParams)]
pub struct ChatHistoryQuery {
    /// Number of most recent messages to return.
    limit: Option<usize>,
}

#[derive(Serialize, ToSchema)]
pub struct ProgressResponse {
    slides_viewed: usize,
    time_spent_secs: u64,
    last_slide_index: Option<usize>,
    total_slides: usize,
    ready_slides: usize,
}

impl From<ProgressReport> for ProgressResponse {
    fn from(report: ProgressReport) -> Self {
        ProgressResponse {
            slides_viewed: report.progress.slides_viewed,
            time_spent_secs: report.progress.time_spent_secs,
            last_slide_index: report.progress.last_slide_index,
            total_slides: report.total_slides,
            ready_slides: report.ready_slides,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct TimeSpentRequest {
    seconds: u64,
}

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Maps a pipeline error to a status and a learner-safe message. Details are only logged.
fn error_response(action: &str, e: PipelineError) -> (StatusCode, String) {
    let status = match &e {
        PipelineError::NotFound(_) | PipelineError::SlideOutOfRange { .. } => StatusCode::NOT_FOUND,
        PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PipelineError::PlanNotReady(_) => StatusCode::CONFLICT,
        PipelineError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        PipelineError::GenerationFailed(_) | PipelineError::ChatFailed(_) | PipelineError::CacheUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        PipelineError::EnrichmentFailed(_) | PipelineError::Port(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Failed to {}: {}", action, e);
    } else {
        warn!("Failed to {}: {}", action, e);
    }
    (status, e.user_message().to_string())
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Start a learner session once the intake questionnaire is complete.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created successfully", body = SessionResponse),
        (status = 404, description = "Training not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_session_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = app_state
        .pipeline
        .start_session(payload.training_id, payload.profile.into())
        .await
        .map_err(|e| error_response("create session", e))?;

    let response = SessionResponse {
        session_id: session.id,
        training_id: session.training_id,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Get the session's plan, generating it on first access.
#[utoipa::path(
    get,
    path = "/sessions/{id}/plan",
    params(("id" = Uuid, Path, description = "The learner session id.")),
    responses(
        (status = 200, description = "The module/submodule/slide skeleton", body = PlanResponse),
        (status = 404, description = "Session not found"),
        (status = 429, description = "AI backend busy"),
        (status = 503, description = "Plan could not be generated")
    )
)]
pub async fn get_plan_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let plan = app_state
        .pipeline
        .get_or_create_plan(id)
        .await
        .map_err(|e| error_response("load plan", e))?;
    Ok(Json(PlanResponse::from(plan)))
}

/// Show a slide. Waits until its content is ready and prepares the next one.
#[utoipa::path(
    get,
    path = "/sessions/{id}/slides/{index}",
    params(
        ("id" = Uuid, Path, description = "The learner session id."),
        ("index" = usize, Path, description = "Position of the slide in the plan.")
    ),
    responses(
        (status = 200, description = "The ready slide", body = SlideResponse),
        (status = 404, description = "Session or slide not found"),
        (status = 429, description = "AI backend busy"),
        (status = 503, description = "Slide could not be generated")
    )
)]
pub async fn get_slide_handler(
    State(app_state): State<Arc<AppState>>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let slide = app_state
        .pipeline
        .get_slide(id, index)
        .await
        .map_err(|e| error_response("show slide", e))?;
    Ok(Json(SlideResponse::from(slide)))
}

/// Rewrite a slide's content more simply or in more depth.
#[utoipa::path(
    post,
    path = "/sessions/{id}/slides/{index}/regenerate",
    request_body = RegenerateRequest,
    params(
        ("id" = Uuid, Path, description = "The learner session id."),
        ("index" = usize, Path, description = "Position of the slide in the plan.")
    ),
    responses(
        (status = 200, description = "The rewritten slide", body = SlideResponse),
        (status = 404, description = "Session or slide not found"),
        (status = 409, description = "No plan yet"),
        (status = 503, description = "Slide could not be regenerated")
    )
)]
pub async fn regenerate_slide_handler(
    State(app_state): State<Arc<AppState>>,
    Path((id, index)): Path<(Uuid, usize)>,
    Json(payload): Json<RegenerateRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let slide = app_state
        .pipeline
        .regenerate_slide(id, index, payload.mode.into())
        .await
        .map_err(|e| error_response("regenerate slide", e))?;
    Ok(Json(SlideResponse::from(slide)))
}

/// Ask the tutor a question about the displayed slide.
#[utoipa::path(
    post,
    path = "/sessions/{id}/chat",
    request_body = ChatRequest,
    params(("id" = Uuid, Path, description = "The learner session id.")),
    responses(
        (status = 200, description = "The tutor's answer", body = ChatResponse),
        (status = 400, description = "Empty question"),
        (status = 404, description = "Session not found"),
        (status = 429, description = "AI backend busy"),
        (status = 503, description = "No answer could be produced")
    )
)]
pub async fn ask_chat_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let answer = app_state
        .pipeline
        .ask_chat(id, payload.slide_index, &payload.question)
        .await
        .map_err(|e| error_response("answer question", e))?;
    Ok(Json(ChatResponse { answer }))
}

/// List the most recent chat messages, oldest first.
#[utoipa::path(
    get,
    path = "/sessions/{id}/chat",
    params(("id" = Uuid, Path, description = "The learner session id."), ChatHistoryQuery),
    responses(
        (status = 200, description = "Chat log tail", body = [ChatMessageResponse]),
        (status = 404, description = "Session not found")
    )
)]
pub async fn chat_history_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ChatHistoryQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let limit = query
        .limit
        .unwrap_or(app_state.config.pipeline.chat_history_window);
    let messages = app_state
        .pipeline
        .chat_history(id, limit)
        .await
        .map_err(|e| error_response("load chat history", e))?;
    let response: Vec<ChatMessageResponse> = messages.into_iter().map(ChatMessageResponse::from).collect();
    Ok(Json(response))
}

/// Get the learner's progress through the course.
#[utoipa::path(
    get,
    path = "/sessions/{id}/progress",
    params(("id" = Uuid, Path, description = "The learner session id.")),
    responses(
        (status = 200, description = "Progress summary", body = ProgressResponse),
        (status = 404, description = "Session not found")
    )
)]
pub async fn get_progress_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let report = app_state
        .pipeline
        .get_progress(id)
        .await
        .map_err(|e| error_response("load progress", e))?;
    Ok(Json(ProgressResponse::from(report)))
}

/// Add time spent on the course.
#[utoipa::path(
    post,
    path = "/sessions/{id}/progress/time",
    request_body = TimeSpentRequest,
    params(("id" = Uuid, Path, description = "The learner session id.")),
    responses(
        (status = 204, description = "Time recorded"),
        (status = 404, description = "Session not found")
    )
)]
pub async fn record_time_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TimeSpentRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .pipeline
        .record_time_spent(id, payload.seconds)
        .await
        .map_err(|e| error_response("record time", e))?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use adaptive_tutor_core::domain::TrainingMaterial;
    use adaptive_tutor_core::memory::InMemoryStore;
    use adaptive_tutor_core::pipeline::LearningPipeline;
    use adaptive_tutor_core::ports::{GenerativeAiService, MaterialContext, PortError, PortResult};
    use adaptive_tutor_core::schema::ResponseSchema;
    use adaptive_tutor_core::PipelineConfig;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    #[derive(Default)]
    struct ScriptedAi {
        fail_chat: AtomicBool,
    }

    #[async_trait]
    impl GenerativeAiService for ScriptedAi {
        async fn create_cached_context(&self, _material: &TrainingMaterial, _ttl: Duration) -> PortResult<String> {
            Ok("ctx-1".into())
        }

        async fn generate_structured(
            &self,
            _context: &MaterialContext,
            _prompt: &str,
            schema: &ResponseSchema,
        ) -> PortResult<Value> {
            Ok(match schema.name {
                "lesson_plan" => json!({
                    "modules": [{
                        "title": "Forklift basics",
                        "submodules": [{
                            "title": "Before driving",
                            "slides": [{ "title": "Daily checks" }, { "title": "Load limits" }]
                        }]
                    }]
                }),
                "slide_content" => json!({ "content": "Check the forks every morning." }),
                _ => json!({ "interests": [], "blockers": [] }),
            })
        }

        async fn chat(
            &self,
            _context: &MaterialContext,
            _grounding: &str,
            _history: &[ChatMessage],
            _message: &str,
        ) -> PortResult<String> {
            if self.fail_chat.load(Ordering::SeqCst) {
                return Err(PortError::Unexpected("upstream 500 from provider xyz".into()));
            }
            Ok("Look for cracks and bends.".into())
        }
    }

    struct TestApp {
        app: Router,
        ai: Arc<ScriptedAi>,
        training_id: Uuid,
    }

    async fn test_app() -> TestApp {
        let store = Arc::new(InMemoryStore::new());
        let material = TrainingMaterial::new(Uuid::new_v4(), Uuid::new_v4(), "Forklifts", "Inspect before use.");
        let training_id = material.id;
        store.insert_material(material).await;

        let ai = Arc::new(ScriptedAi::default());
        let config = Config::from_lookup(|_| None).unwrap();
        let pipeline = LearningPipeline::new(store.clone(), store, ai.clone(), PipelineConfig::default());
        let state = Arc::new(AppState {
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
        });
        TestApp {
            app: router(state),
            ai,
            training_id,
        }
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, value)
    }

    async fn start_session(t: &TestApp) -> String {
        let (status, body) = send(
            &t.app,
            "POST",
            "/sessions",
            Some(json!({
                "training_id": t.training_id,
                "profile": {
                    "level": "beginner",
                    "learning_style": "visual",
                    "job": "warehouse operator",
                    "sector": "logistics",
                    "country": "DE",
                    "language": "en"
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn session_plan_and_first_slide() {
        let t = test_app().await;
        let session = start_session(&t).await;

        let (status, plan) = send(&t.app, "GET", &format!("/sessions/{}/plan", session), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(plan["total_slides"], 2);
        assert_eq!(plan["modules"][0]["submodules"][0]["slides"][1]["title"], "Load limits");

        let (status, slide) = send(&t.app, "GET", &format!("/sessions/{}/slides/0", session), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(slide["status"], "ready");
        assert_eq!(slide["content"], "Check the forks every morning.");

        let (status, progress) = send(&t.app, "GET", &format!("/sessions/{}/progress", session), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(progress["slides_viewed"], 1);
        assert_eq!(progress["last_slide_index"], 0);
    }

    #[tokio::test]
    async fn unknown_training_and_session_are_not_found() {
        let t = test_app().await;
        let (status, _) = send(
            &t.app,
            "POST",
            "/sessions",
            Some(json!({
                "training_id": Uuid::new_v4(),
                "profile": {
                    "level": "expert", "learning_style": "text", "job": "x",
                    "sector": "y", "country": "FR", "language": "fr"
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&t.app, "GET", &format!("/sessions/{}/plan", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn slide_past_the_end_is_not_found() {
        let t = test_app().await;
        let session = start_session(&t).await;
        let (status, _) = send(&t.app, "GET", &format!("/sessions/{}/slides/7", session), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_round_trip_and_history() {
        let t = test_app().await;
        let session = start_session(&t).await;

        let (status, body) = send(
            &t.app,
            "POST",
            &format!("/sessions/{}/chat", session),
            Some(json!({ "slide_index": 0, "question": "What do I check?" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], "Look for cracks and bends.");

        let (status, history) = send(&t.app, "GET", &format!("/sessions/{}/chat?limit=10", session), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().map(Vec::len), Some(2));
        assert_eq!(history[0]["role"], "learner");
        assert_eq!(history[1]["role"], "assistant");
    }

    #[tokio::test]
    async fn chat_failures_hide_provider_details() {
        let t = test_app().await;
        let session = start_session(&t).await;
        t.ai.fail_chat.store(true, Ordering::SeqCst);

        let (status, body) = send(
            &t.app,
            "POST",
            &format!("/sessions/{}/chat", session),
            Some(json!({ "slide_index": 0, "question": "Why?" })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let message = body.as_str().unwrap_or_default();
        assert!(!message.contains("xyz"));
        assert!(!message.is_empty());
    }

    #[tokio::test]
    async fn empty_question_is_a_bad_request() {
        let t = test_app().await;
        let session = start_session(&t).await;
        let (status, _) = send(
            &t.app,
            "POST",
            &format!("/sessions/{}/chat", session),
            Some(json!({ "slide_index": 0, "question": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn regenerate_needs_a_plan_and_time_accumulates() {
        let t = test_app().await;
        let session = start_session(&t).await;

        let (status, _) = send(
            &t.app,
            "POST",
            &format!("/sessions/{}/slides/0/regenerate", session),
            Some(json!({ "mode": "simplify" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        send(&t.app, "GET", &format!("/sessions/{}/slides/0", session), None).await;
        let (status, slide) = send(
            &t.app,
            "POST",
            &format!("/sessions/{}/slides/0/regenerate", session),
            Some(json!({ "mode": "deepen" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(slide["status"], "ready");

        for seconds in [20, 25] {
            let (status, _) = send(
                &t.app,
                "POST",
                &format!("/sessions/{}/progress/time", session),
                Some(json!({ "seconds": seconds })),
            )
            .await;
            assert_eq!(status, StatusCode::NO_CONTENT);
        }
        let (_, progress) = send(&t.app, "GET", &format!("/sessions/{}/progress", session), None).await;
        assert_eq!(progress["time_spent_secs"], 45);
    }

    #[test]
    fn openapi_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert_eq!(paths.len(), 7);
        assert!(doc.paths.paths.contains_key("/sessions/{id}/slides/{index}/regenerate"));
    }
}
