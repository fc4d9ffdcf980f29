//! API service routes

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tutoring::models::{AttendanceCorrection, NewSession, SessionUpdate};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiPath},
    middleware::{AuthUser, auth_middleware},
    models::{
        ApiResponse, CancelRequest, CheckInRequest, CheckOutRequest, MarkAbsentResponse,
        PinResponse, QrResponse, RescheduleRequest, RevenueSharesRequest, StatusRequest,
        WalletResponse,
    },
    state::AppState,
    validation::{validate_check_in_code, validate_meeting_link, validate_text},
};

const MAX_LOCATION_LENGTH: usize = 255;
const MAX_DESCRIPTION_LENGTH: usize = 4000;

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let session_routes = Router::new()
        .route("/", post(create_session))
        .route("/:id", get(get_session).put(update_session))
        .route("/:id/status", put(update_status))
        .route("/:id/confirm", post(confirm_session))
        .route("/:id/reschedule", post(reschedule_session))
        .route("/:id/cancel", post(cancel_session))
        .route("/:id/payments", post(place_payment))
        .route("/:id/settle", post(settle_session));

    let attendance_routes = Router::new()
        .route("/checkin", post(check_in))
        .route("/checkout", post(check_out))
        .route("/sessions/:session_id", get(list_attendance))
        .route("/sessions/:session_id/pin", get(issue_pin))
        .route("/sessions/:session_id/qr", get(issue_qr))
        .route("/sessions/:session_id/mark-absent", post(mark_absent))
        .route(
            "/sessions/:session_id/students/:student_id",
            put(correct_attendance),
        );

    let api_routes = Router::new()
        .nest("/sessions", session_routes)
        .nest("/attendance", attendance_routes)
        .route("/consortia/:id/revenue-shares", put(update_revenue_shares))
        .route("/wallet", get(get_wallet))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.db_pool {
        Some(pool) => match common::database::health_check(pool).await {
            Ok(true) => "ok",
            Ok(false) => "unavailable",
            Err(e) => {
                error!("Database health check failed: {}", e);
                "unavailable"
            }
        },
        None => "in-memory",
    };

    Json(json!({
        "status": "ok",
        "service": "genova-api",
        "database": database,
    }))
}

fn validate_session_fields(
    description: Option<&str>,
    location: Option<&str>,
    online_meeting_link: Option<&str>,
) -> ApiResult<()> {
    if let Some(description) = description {
        validate_text("Description", description, MAX_DESCRIPTION_LENGTH)
            .map_err(ApiError::BadRequest)?;
    }
    if let Some(location) = location {
        validate_text("Location", location, MAX_LOCATION_LENGTH).map_err(ApiError::BadRequest)?;
    }
    if let Some(link) = online_meeting_link {
        validate_meeting_link(link).map_err(ApiError::BadRequest)?;
    }
    Ok(())
}

/// Book a new session
pub async fn create_session(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<NewSession>,
) -> ApiResult<impl IntoResponse> {
    validate_session_fields(
        payload.description.as_deref(),
        payload.location.as_deref(),
        payload.online_meeting_link.as_deref(),
    )?;

    let session = state.service.sessions().create(user.id, payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(session, "Session created")),
    ))
}

pub async fn get_session(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let session = state.service.sessions().get_as(id, user.id).await?;
    Ok(Json(ApiResponse::ok(session)))
}

/// Partial update of a session
pub async fn update_session(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<SessionUpdate>,
) -> ApiResult<impl IntoResponse> {
    validate_session_fields(
        payload.description.as_deref(),
        payload.location.as_deref(),
        payload.online_meeting_link.as_deref(),
    )?;

    let session = state.service.sessions().update(id, user.id, payload).await?;
    Ok(Json(ApiResponse::with_message(session, "Session updated")))
}

pub async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<StatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = state
        .service
        .sessions()
        .update_status(id, user.id, payload.status, payload.reason)
        .await?;
    Ok(Json(ApiResponse::ok(session)))
}

pub async fn confirm_session(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let session = state.service.sessions().confirm(id, user.id).await?;
    Ok(Json(ApiResponse::with_message(session, "Session confirmed")))
}

pub async fn reschedule_session(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<RescheduleRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = state
        .service
        .sessions()
        .reschedule(id, user.id, payload.scheduled_start, payload.scheduled_end)
        .await?;
    Ok(Json(ApiResponse::with_message(session, "Session rescheduled")))
}

/// Cancel a session; the body is optional
pub async fn cancel_session(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    payload: Option<ApiJson<CancelRequest>>,
) -> ApiResult<impl IntoResponse> {
    let reason = payload.and_then(|ApiJson(request)| request.reason);
    let outcome = state.service.sessions().cancel(id, user.id, reason).await?;
    Ok(Json(ApiResponse::with_message(outcome, "Session cancelled")))
}

/// Place the caller's payment hold for a session
pub async fn place_payment(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let hold = state.service.settlement().place_hold(id, user.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(hold, "Payment hold placed")),
    ))
}

/// Retry settlement of a completed session
pub async fn settle_session(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let report = state
        .service
        .sessions()
        .retry_settlement(id, user.id)
        .await?;
    Ok(Json(ApiResponse::ok(report)))
}

pub async fn check_in(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<CheckInRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_check_in_code(payload.method, &payload.code).map_err(ApiError::BadRequest)?;

    let attendance = state
        .service
        .attendance()
        .check_in(payload.session_id, user.id, payload.method, &payload.code)
        .await?;
    Ok(Json(ApiResponse::with_message(attendance, "Checked in")))
}

pub async fn check_out(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<CheckOutRequest>,
) -> ApiResult<impl IntoResponse> {
    let summary = state
        .service
        .attendance()
        .check_out(payload.session_id, user.id)
        .await?;

    if summary.flagged_for_review {
        info!(
            session_id = %payload.session_id,
            discrepancy = summary.discrepancy,
            "Checkout flagged for review"
        );
    }
    Ok(Json(ApiResponse::ok(summary)))
}

pub async fn issue_pin(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(session_id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let credential = state
        .service
        .attendance()
        .issue_pin(session_id, user.id)
        .await?;
    Ok(Json(ApiResponse::ok(PinResponse::new(
        &credential,
        state.clock.now(),
    ))))
}

pub async fn issue_qr(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(session_id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let credential = state
        .service
        .attendance()
        .issue_qr(session_id, user.id)
        .await?;
    Ok(Json(ApiResponse::ok(QrResponse::new(
        &credential,
        state.clock.now(),
    ))))
}

pub async fn mark_absent(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(session_id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let marked_absent = state
        .service
        .attendance()
        .mark_absent_as(session_id, user.id)
        .await?;
    Ok(Json(ApiResponse::ok(MarkAbsentResponse { marked_absent })))
}

pub async fn list_attendance(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(session_id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let rows = state
        .service
        .attendance()
        .list_attendance_as(session_id, user.id)
        .await?;
    Ok(Json(ApiResponse::ok(rows)))
}

pub async fn correct_attendance(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath((session_id, student_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(payload): ApiJson<AttendanceCorrection>,
) -> ApiResult<impl IntoResponse> {
    let attendance = state
        .service
        .attendance()
        .correct_attendance(session_id, student_id, user.id, payload)
        .await?;
    Ok(Json(ApiResponse::with_message(
        attendance,
        "Attendance updated",
    )))
}

pub async fn update_revenue_shares(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<RevenueSharesRequest>,
) -> ApiResult<impl IntoResponse> {
    let shares = payload
        .shares
        .into_iter()
        .map(|share| (share.tutor_id, share.revenue_share))
        .collect();

    let members = state
        .service
        .settlement()
        .set_revenue_shares(id, user.id, shares)
        .await?;
    Ok(Json(ApiResponse::with_message(
        members,
        "Revenue shares updated",
    )))
}

/// Balance of the caller's wallet
pub async fn get_wallet(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let balance = state.service.wallet_balance(user.id).await?;
    Ok(Json(ApiResponse::ok(WalletResponse {
        user_id: user.id,
        balance,
    })))
}
