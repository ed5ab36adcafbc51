// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tracing::{debug, error};
use uuid::Uuid;

use doctor_cell::services::DoctorService;
use shared_config::AppConfig;
use shared_models::auth::{User, UserRole};
use shared_models::error::AppError;
use shared_utils::extractor::AuthSession;

use crate::models::{
    AppointmentDraft, AppointmentError, AppointmentPatch, AppointmentQueryParams, AppointmentStatus,
    BookAppointmentRequest, BookingDetails, BookingError, SlotQuery,
};
use crate::services::appointments::AppointmentService;
use crate::services::booking::{BookingSettings, BookingWorkflow};
use crate::services::slots::{AvailabilityPolicy, AvailabilityService, WorkingWindow};
use crate::store::SupabaseAppointmentStore;

// ==============================================================================
// ERROR MAPPING
// ==============================================================================

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            AppointmentError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
            AppointmentError::SlotNotAvailable => {
                AppError::Conflict("Appointment slot no longer available".to_string())
            }
            AppointmentError::InvalidStatusTransition { .. } => AppError::BadRequest(err.to_string()),
            AppointmentError::Unauthorized => {
                AppError::Forbidden("Not authorized to access this appointment".to_string())
            }
            AppointmentError::InvalidWindow(msg) => {
                error!("Clinic working window is misconfigured: {}", msg);
                AppError::Internal("Clinic schedule is misconfigured".to_string())
            }
            AppointmentError::Validation(fields) => AppError::InvalidFields(fields),
            AppointmentError::Timeout => {
                AppError::Timeout("Appointment store timed out, please retry".to_string())
            }
            AppointmentError::StoreUnavailable(msg) => {
                error!("Appointment store unavailable: {}", msg);
                AppError::ExternalService("Appointment store unavailable, please retry".to_string())
            }
            AppointmentError::StoreRejected(msg) => AppError::BadRequest(msg),
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::InvalidState { .. } => AppError::BadRequest(err.to_string()),
            BookingError::Validation(fields) => AppError::InvalidFields(fields),
            BookingError::SlotUnavailable => {
                AppError::Conflict("Selected time slot is not available".to_string())
            }
            BookingError::Timeout => AppError::Timeout("Booking request timed out, please retry".to_string()),
            BookingError::Appointment(e) => e.into(),
        }
    }
}

// ==============================================================================
// HELPERS
// ==============================================================================

fn store_timeout(config: &AppConfig) -> Duration {
    Duration::from_secs(config.store_timeout_seconds)
}

fn appointment_service(config: &AppConfig, token: &str) -> AppointmentService<SupabaseAppointmentStore> {
    AppointmentService::new(
        Arc::new(SupabaseAppointmentStore::new(config, token)),
        store_timeout(config),
    )
}

async fn ensure_doctor_exists(config: &AppConfig, doctor_id: Uuid, token: &str) -> Result<(), AppError> {
    DoctorService::new(config).get_doctor(doctor_id, Some(token)).await?;
    Ok(())
}

// ==============================================================================
// APPOINTMENT RECORD HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(params): Query<AppointmentQueryParams>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state, auth.token());
    let appointments = service.list(&user, params.into()).await?;

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state, auth.token());
    let appointment = service.get(&user, appointment_id).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(draft): Json<AppointmentDraft>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let token = auth.token();
    ensure_doctor_exists(&state, draft.doctor_id, token).await?;

    let service = appointment_service(&state, token);
    let appointment = service.create(&user, draft).await?;

    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(patch): Json<AppointmentPatch>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state, auth.token());
    let appointment = service.update(&user, appointment_id, patch).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state, auth.token());
    service.delete(&user, appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment deleted successfully"
    })))
}

// ==============================================================================
// LIFECYCLE HANDLERS
// ==============================================================================

async fn transition(
    state: &AppConfig,
    token: &str,
    user: &User,
    appointment_id: Uuid,
    status: AppointmentStatus,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(state, token);
    let appointment = service.transition(user, appointment_id, status).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": format!("Appointment marked as {}", status)
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    transition(&state, auth.token(), &user, appointment_id, AppointmentStatus::Cancelled).await
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    transition(&state, auth.token(), &user, appointment_id, AppointmentStatus::Completed).await
}

#[axum::debug_handler]
pub async fn mark_no_show(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    transition(&state, auth.token(), &user, appointment_id, AppointmentStatus::NoShow).await
}

// ==============================================================================
// SLOTS, BOOKING AND DASHBOARD HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    ensure_doctor_exists(&state, query.doctor_id, token).await?;

    let availability = AvailabilityService::new(
        Arc::new(SupabaseAppointmentStore::new(&state, token)),
        WorkingWindow::from_settings(&state.clinic)?,
        AvailabilityPolicy::parse(&state.clinic.availability_policy),
        store_timeout(&state),
    );
    let slots = availability.slots_for(query.doctor_id, query.date).await?;

    Ok(Json(json!(slots)))
}

/// Runs the whole booking workflow for one request: load the day's slots,
/// select the requested one, confirm and submit.
#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    AuthSession(session): AuthSession,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    ensure_doctor_exists(&state, request.doctor_id, &session.access_token).await?;

    let store = Arc::new(SupabaseAppointmentStore::new(&state, &session.access_token));
    let settings = BookingSettings::from_config(&state)?;
    let mut workflow = BookingWorkflow::new(store, session, request.doctor_id, settings);

    workflow.select_type(request.appointment_type)?;
    workflow.load_slots(request.date).await?;
    if let Some(start_time) = request.start_time {
        workflow.select_slot(start_time)?;
    }
    workflow.proceed()?;

    let confirmation = workflow.submit(BookingDetails::from(&request)).await?;
    debug!("Booking workflow finished in state {}", workflow.state());

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": confirmation.appointment,
            "payment": confirmation.payment,
            "message": "Appointment booked successfully"
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_dashboard(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state, auth.token());
    let today = Utc::now().date_naive();

    let dashboard = match user.user_role() {
        Some(UserRole::Doctor) => json!({
            "role": UserRole::Doctor,
            "dashboard": service.doctor_dashboard(&user, today).await?
        }),
        _ => json!({
            "role": UserRole::Patient,
            "dashboard": service.patient_dashboard(&user, today).await?
        }),
    };

    Ok(Json(dashboard))
}
