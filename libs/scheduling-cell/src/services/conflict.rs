// libs/scheduling-cell/src/services/conflict.rs
use chrono::Duration;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Appointment, ConflictCheckResponse, SchedulingError, MAX_BUFFER_MINUTES};
use crate::store::BookingStore;
use crate::timeline::Interval;

/// Detects overlaps between a candidate span and existing appointments.
/// Existing appointments are expanded by their recorded buffers before the
/// overlap test; the candidate span is expected to arrive already buffered.
pub struct ConflictService {
    bookings: Arc<dyn BookingStore>,
}

impl ConflictService {
    pub fn new(bookings: Arc<dyn BookingStore>) -> Self {
        Self { bookings }
    }

    /// First appointment whose buffered span overlaps `span`, earliest start
    /// first. `exclude` drops the appointment being rescheduled.
    pub async fn find_conflict(
        &self,
        provider_id: i64,
        span: Interval,
        exclude: Option<Uuid>,
    ) -> Result<Option<Appointment>, SchedulingError> {
        // Widen the lookup by the largest buffer any appointment can carry,
        // so buffered neighbors are fetched even when their own times do not
        // intersect the span
        let slack = Duration::minutes(MAX_BUFFER_MINUTES);
        let appointments = self
            .bookings
            .appointments_in_range(provider_id, span.start - slack, span.end + slack, exclude)
            .await?;

        let conflict = appointments
            .into_iter()
            .find(|apt| apt.blocks_bookings() && apt.buffered_span().overlaps(&span));

        if let Some(ref apt) = conflict {
            debug!(
                "Span {} - {} conflicts with appointment {}",
                span.start, span.end, apt.id
            );
        }
        Ok(conflict)
    }

    /// Read-only conflict probe backing the check endpoint.
    pub async fn check(
        &self,
        provider_id: i64,
        span: Interval,
        exclude: Option<Uuid>,
    ) -> Result<ConflictCheckResponse, SchedulingError> {
        if provider_id <= 0 {
            return Err(SchedulingError::InvalidInput(
                "Provider id must be positive".to_string(),
            ));
        }
        if span.is_empty() {
            return Err(SchedulingError::InvalidInput(
                "End time must be after start time".to_string(),
            ));
        }

        let conflicting = self.find_conflict(provider_id, span, exclude).await?;
        Ok(ConflictCheckResponse {
            has_conflict: conflicting.is_some(),
            conflicting_appointment: conflicting,
        })
    }
}
