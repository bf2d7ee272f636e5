// libs/scheduling-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::{
    BookAppointmentRequest, ConflictKind, RescheduleAppointmentRequest, SchedulingContext,
    SchedulingError,
};
use crate::services::{AvailabilityService, BookingService, ConflictService};
use crate::timeline::Interval;

// ==============================================================================
// STATE AND QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Clone)]
pub struct SchedulingState {
    pub availability: Arc<AvailabilityService>,
    pub booking: Arc<BookingService>,
    pub conflicts: Arc<ConflictService>,
    pub config: Arc<AppConfig>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQueryParams {
    pub provider_id: i64,
    pub service_id: i64,
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ConflictCheckQuery {
    pub provider_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub exclude_appointment_id: Option<Uuid>,
}

// ==============================================================================
// AVAILABILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<SchedulingState>,
    Query(params): Query<AvailabilityQueryParams>,
) -> Result<Json<Value>, AppError> {
    let ctx = SchedulingContext::from_config(&state.config);

    let slots = state
        .availability
        .available_slots(params.provider_id, params.service_id, params.date, &ctx)
        .await
        .map_err(|e| match e {
            SchedulingError::InvalidInput(msg) => AppError::BadRequest(msg),
            SchedulingError::ServiceNotFound => {
                AppError::NotFound("Service not found".to_string())
            }
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "provider_id": params.provider_id,
        "service_id": params.service_id,
        "date": params.date,
        "slots": slots,
        "total": slots.len()
    })))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<SchedulingState>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let ctx = SchedulingContext::from_config(&state.config);

    let appointment = state
        .booking
        .try_book(request, &ctx)
        .await
        .map_err(booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<SchedulingState>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let ctx = SchedulingContext::from_config(&state.config);

    let appointment = state
        .booking
        .reschedule(appointment_id, request, &ctx)
        .await
        .map_err(booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment rescheduled successfully"
    })))
}

// ==============================================================================
// CONFLICT DETECTION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn check_appointment_conflicts(
    State(state): State<SchedulingState>,
    Query(params): Query<ConflictCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let span = Interval::new(params.start_time, params.end_time);

    let conflict_response = state
        .conflicts
        .check(params.provider_id, span, params.exclude_appointment_id)
        .await
        .map_err(|e| match e {
            SchedulingError::InvalidInput(msg) => AppError::BadRequest(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!(conflict_response)))
}

fn booking_error(e: SchedulingError) -> AppError {
    match e {
        SchedulingError::InvalidInput(msg) => AppError::BadRequest(msg),
        SchedulingError::ServiceNotFound => AppError::NotFound("Service not found".to_string()),
        SchedulingError::AppointmentNotFound => {
            AppError::NotFound("Appointment not found".to_string())
        }
        SchedulingError::Conflict(ConflictKind::SlotTaken { .. }) => {
            AppError::Conflict("Appointment slot no longer available".to_string())
        }
        SchedulingError::Conflict(ConflictKind::OutsideAvailability) => {
            AppError::Conflict("Requested time is outside provider availability".to_string())
        }
        SchedulingError::Store(msg) => AppError::Internal(msg),
    }
}
