//! HTTP surface of the hunt.
//!
//! The session cookie carries an opaque id only; the team name lives in the
//! server-side session under [`TEAM_KEY`].

use std::time::Duration;
use axum::{
    Form, Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};
use crate::answer::{Submission, SubmissionOutcome};
use crate::error::{ErrorKind, HuntError};
use crate::hunt_manager::HuntManager;
use crate::progression::{FinishedSummary, HuntStatus, Notice, QuestStatusSnapshot};
use crate::quest::QuestId;
use crate::upload::{Upload, UploadError};

pub const TEAM_KEY: &str = "team";

/// Headroom for multipart framing and the text fields around the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub manager: HuntManager,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub session_idle: Duration,
    pub max_upload_bytes: usize,
}

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Hunt(#[from] HuntError),

    #[error("Error: Session store failure: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// No team in the session.
    #[error("Error: Not logged in.")]
    NoSession,

    #[error("Error: Bad request: {0}")]
    BadRequest(String),
}

fn json_error(status: StatusCode, code: &str, message: String) -> Response {
    (status, Json(json!({ "error": message, "code": code }))).into_response()
}

fn internal(error: &dyn std::fmt::Display) -> Response {
    tracing::error!(error = %error, "Internal error");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "An internal error occurred".to_string())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Hunt(e) => match e.kind() {
                ErrorKind::Auth => json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", e.to_string()),
                ErrorKind::Authz => Redirect::to("/").into_response(),
                ErrorKind::NotFound => json_error(StatusCode::NOT_FOUND, "NOT_FOUND", e.to_string()),
                ErrorKind::Validation | ErrorKind::TimerGate => {
                    json_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
                }
                ErrorKind::Finished => json_error(StatusCode::CONFLICT, "GAME_FINISHED", e.to_string()),
                ErrorKind::Internal => internal(e),
            },
            ApiError::NoSession => Redirect::to("/").into_response(),
            ApiError::BadRequest(msg) => json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Session(e) => internal(e),
        }
    }
}

/// Query string of `/treasurehunt`, also used to build redirects to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HuntQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HuntQuery {
    fn for_team(team: &str) -> Self {
        HuntQuery { team: Some(team.to_string()), ..Default::default() }
    }

    fn notice(&self) -> Option<Notice> {
        if let Some(error) = self.error.as_ref().filter(|e| !e.is_empty()) {
            return Some(Notice::Error(error.clone()));
        }
        if self.skipped == Some(true) {
            return Some(Notice::Skipped);
        }
        self.success.as_ref().filter(|s| !s.is_empty()).map(|s| Notice::Success(s.clone()))
    }

    fn location(&self) -> String {
        format!("/treasurehunt?{}", serde_urlencoded::to_string(self).unwrap_or_default())
    }
}

/// Query string of `/gamefinished`. The counters are informational only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedQuery {
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub hint_count: Option<u32>,
    #[serde(default)]
    pub skip_count: Option<u32>,
    #[serde(default)]
    pub quests_completed: Option<u32>,
}

impl From<&FinishedSummary> for FinishedQuery {
    fn from(summary: &FinishedSummary) -> Self {
        FinishedQuery {
            team: Some(summary.team.clone()),
            hint_count: Some(summary.hint_count),
            skip_count: Some(summary.skip_count),
            quests_completed: Some(summary.quests_completed),
        }
    }
}

impl FinishedQuery {
    fn location(&self) -> String {
        format!("/gamefinished?{}", serde_urlencoded::to_string(self).unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

pub fn router(manager: HuntManager, options: RouterOptions) -> Router {
    let idle = time::Duration::seconds(options.session_idle.as_secs().min(i64::MAX as u64) as i64);
    let sessions = SessionManagerLayer::new(MemoryStore::default())
        .with_name("hunt.sid")
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(idle));

    Router::new()
        .route("/", get(root))
        .route("/login", post(login))
        .route("/treasurehunt", get(treasure_hunt))
        .route("/submit", post(submit))
        .route("/hint/{quest_id}", get(hint).post(hint))
        .route("/gamefinished", get(game_finished))
        .route("/check-quest-status", get(check_quest_status))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(sessions)
                .layer(DefaultBodyLimit::max(options.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD))),
        )
        .with_state(AppState { manager, max_upload_bytes: options.max_upload_bytes })
}

async fn session_team(session: &Session) -> Result<Option<String>, ApiError> {
    Ok(session.get::<String>(TEAM_KEY).await?)
}

async fn require_team(session: &Session) -> Result<String, ApiError> {
    session_team(session).await?.ok_or(ApiError::NoSession)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Please enter your credentials" }))
}

async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Redirect, ApiError> {
    let team = state.manager.login(&form.username, &form.password)?;
    session.cycle_id().await?;
    session.insert(TEAM_KEY, &team.name).await?;
    Ok(Redirect::to(&HuntQuery::for_team(&team.name).location()))
}

async fn treasure_hunt(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<HuntQuery>,
) -> Result<Response, ApiError> {
    let requested = query.team.clone().unwrap_or_default();
    let current = session_team(&session).await?;
    state.manager.authorize(current.as_deref(), &requested)?;

    Ok(match state.manager.status(&requested, query.notice())? {
        HuntStatus::NoSession => Redirect::to("/").into_response(),
        HuntStatus::Finished(summary) => Redirect::to(&FinishedQuery::from(&summary).location()).into_response(),
        HuntStatus::InProgress(view) => Json(view).into_response(),
    })
}

/// A body cut off by the size limit is an oversized upload; anything else is malformed.
fn multipart_error(error: MultipartError, limit: usize) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        tracing::warn!(limit, "Submission body exceeded the upload limit");
        HuntError::Upload(UploadError::BodyTooLarge { limit }).into()
    } else {
        ApiError::BadRequest(error.body_text())
    }
}

/// Reads the `answer`, `quest_id` and optional `file` parts.
async fn read_submission(mut multipart: Multipart, limit: usize) -> Result<Submission, ApiError> {
    let bad = |e: MultipartError| multipart_error(e, limit);
    let mut answer = String::new();
    let mut quest_id = None;
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        match field.name() {
            Some("answer") => answer = field.text().await.map_err(bad)?,
            Some("quest_id") => {
                let raw = field.text().await.map_err(bad)?;
                let id = raw
                    .trim()
                    .parse::<QuestId>()
                    .map_err(|_| ApiError::BadRequest(format!("invalid quest_id {:?}", raw)))?;
                quest_id = Some(id);
            }
            Some("file") => {
                let file_name = field.file_name().filter(|n| !n.is_empty()).map(str::to_string);
                let bytes = field.bytes().await.map_err(bad)?;
                // A file input left empty still sends a nameless, empty part.
                if file_name.is_some() || !bytes.is_empty() {
                    upload = Some(Upload { file_name, bytes: bytes.to_vec() });
                }
            }
            _ => {}
        }
    }

    let quest_id = quest_id.ok_or_else(|| ApiError::BadRequest("missing quest_id".to_string()))?;
    Ok(Submission { quest_id, answer, upload })
}

async fn submit(
    State(state): State<AppState>,
    session: Session,
    multipart: Multipart,
) -> Result<Redirect, ApiError> {
    let team = require_team(&session).await?;
    let result = match read_submission(multipart, state.max_upload_bytes).await {
        Ok(submission) => state.manager.submit(&team, submission),
        Err(ApiError::Hunt(e)) => Err(e),
        Err(e) => return Err(e),
    };

    let mut back = HuntQuery::for_team(&team);
    match result {
        Ok(SubmissionOutcome::Completed { quest_number }) => {
            back.success = Some(format!("Quest {} completed!", quest_number));
        }
        Ok(SubmissionOutcome::Skipped { .. }) => back.skipped = Some(true),
        Ok(SubmissionOutcome::Incorrect { .. }) => back.error = Some("Incorrect answer, try again!".to_string()),
        Ok(SubmissionOutcome::AlreadyCompleted { .. }) => {}
        Err(e) => match e.kind() {
            ErrorKind::Validation | ErrorKind::TimerGate => back.error = Some(e.to_string()),
            ErrorKind::Finished => {}
            _ => return Err(e.into()),
        },
    }
    Ok(Redirect::to(&back.location()))
}

async fn hint(
    State(state): State<AppState>,
    session: Session,
    Path(quest_id): Path<QuestId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let team = require_team(&session).await?;
    let hints_used = state.manager.request_hint(&team, quest_id)?;
    Ok(Json(json!({ "success": true, "hintsUsed": hints_used })))
}

async fn game_finished(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<FinishedQuery>,
) -> Result<Response, ApiError> {
    let current = session_team(&session).await?;
    let requested = query.team.clone().or_else(|| current.clone()).unwrap_or_default();
    let team = state.manager.authorize(current.as_deref(), &requested)?;
    if !team.finished {
        return Ok(Redirect::to(&HuntQuery::for_team(&team.name).location()).into_response());
    }

    let summary = state.manager.record_result(&team.name)?;
    if query.quests_completed.is_some_and(|n| n != summary.quests_completed) {
        tracing::debug!(team = %team.name, claimed = ?query.quests_completed, "Ignoring client-supplied counters");
    }
    Ok(Json(summary).into_response())
}

async fn check_quest_status(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<QuestStatusSnapshot>, ApiError> {
    let team = require_team(&session).await?;
    Ok(Json(state.manager.quest_status(&team)?))
}
