// libs/scheduling-cell/src/services/booking.rs
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::models::{
    Appointment, AppointmentEvent, AppointmentEventType, BookAppointmentRequest, ConflictKind,
    NewAppointment, RescheduleAppointmentRequest, SchedulingContext, SchedulingError,
};
use crate::services::{AvailabilityService, ConflictService};
use crate::store::{BookingStore, ScheduleStore, ServiceCatalog};
use crate::timeline::Interval;

const MAX_LOCK_ATTEMPTS: u32 = 3;
const LOCK_RETRY_BASE_MS: u64 = 100;

/// The write to perform once the provider lock is held and the span has
/// passed conflict and availability checks.
enum CommitOp {
    Insert(NewAppointment),
    Move {
        id: Uuid,
        new_start: chrono::DateTime<chrono::Utc>,
        new_end: chrono::DateTime<chrono::Utc>,
    },
}

/// Conflict guard. All appointment writes go through here: each one runs a
/// check-then-insert under a per-provider lock so two concurrent bookings
/// for the same provider cannot both pass the conflict check.
pub struct BookingService {
    bookings: Arc<dyn BookingStore>,
    availability: AvailabilityService,
    conflicts: ConflictService,
    catalog: Arc<dyn ServiceCatalog>,
    lock_ttl: Duration,
    events: Option<UnboundedSender<AppointmentEvent>>,
}

impl BookingService {
    pub fn new(
        schedule: Arc<dyn ScheduleStore>,
        catalog: Arc<dyn ServiceCatalog>,
        bookings: Arc<dyn BookingStore>,
        config: &AppConfig,
    ) -> Self {
        Self {
            availability: AvailabilityService::new(
                schedule,
                catalog.clone(),
                bookings.clone(),
            ),
            conflicts: ConflictService::new(bookings.clone()),
            bookings,
            catalog,
            lock_ttl: Duration::seconds(config.booking_lock_ttl_seconds.max(1)),
            events: None,
        }
    }

    /// Attach a sink for post-commit events. Without one, bookings still
    /// succeed and nothing is emitted.
    pub fn with_event_sink(mut self, events: UnboundedSender<AppointmentEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Book an appointment if and only if its buffered span is free and
    /// inside the provider's availability at commit time.
    #[instrument(skip(self, ctx))]
    pub async fn try_book(
        &self,
        request: BookAppointmentRequest,
        ctx: &SchedulingContext,
    ) -> Result<Appointment, SchedulingError> {
        if request.provider_id <= 0 || request.service_id <= 0 {
            return Err(SchedulingError::InvalidInput(
                "Provider and service ids must be positive".to_string(),
            ));
        }
        if request.start_time <= ctx.now {
            return Err(SchedulingError::InvalidInput(
                "Appointment start must be in the future".to_string(),
            ));
        }

        let service = self
            .catalog
            .service(request.service_id)
            .await?
            .ok_or(SchedulingError::ServiceNotFound)?;
        service.validate()?;

        let end_time = request.start_time + service.duration();
        let span = Interval::new(
            request.start_time - service.buffer_before(),
            end_time + service.buffer_after(),
        );
        let new = NewAppointment {
            provider_id: request.provider_id,
            service_id: request.service_id,
            customer_id: request.customer_id,
            start_time: request.start_time,
            end_time,
            buffer_before_minutes: service.buffer_before_minutes,
            buffer_after_minutes: service.buffer_after_minutes,
        };

        let appointment = self
            .commit_under_lock(request.provider_id, span, None, CommitOp::Insert(new))
            .await?;

        debug!(
            "Booked appointment {} for provider {}",
            appointment.id, appointment.provider_id
        );
        self.emit(&appointment, AppointmentEventType::Created);
        Ok(appointment)
    }

    /// Move an existing appointment to a new start, keeping its duration and
    /// buffers. The appointment's own slot does not count against it.
    #[instrument(skip(self, ctx))]
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
        ctx: &SchedulingContext,
    ) -> Result<Appointment, SchedulingError> {
        let current = self
            .bookings
            .appointment(appointment_id)
            .await?
            .ok_or(SchedulingError::AppointmentNotFound)?;

        if !current.blocks_bookings() {
            return Err(SchedulingError::InvalidInput(
                "Cancelled appointments cannot be rescheduled".to_string(),
            ));
        }
        if request.new_start_time <= ctx.now {
            return Err(SchedulingError::InvalidInput(
                "Appointment start must be in the future".to_string(),
            ));
        }

        let new_end = request.new_start_time + current.duration();
        let span = Interval::new(
            request.new_start_time - Duration::minutes(current.buffer_before_minutes),
            new_end + Duration::minutes(current.buffer_after_minutes),
        );

        let appointment = self
            .commit_under_lock(
                current.provider_id,
                span,
                Some(appointment_id),
                CommitOp::Move {
                    id: appointment_id,
                    new_start: request.new_start_time,
                    new_end,
                },
            )
            .await?;

        debug!(
            "Rescheduled appointment {} to {}",
            appointment.id, appointment.start_time
        );
        self.emit(&appointment, AppointmentEventType::Rescheduled);
        Ok(appointment)
    }

    /// Acquire the provider lock (bounded retries with linear backoff), run
    /// the conflict and availability checks, perform the write, release.
    async fn commit_under_lock(
        &self,
        provider_id: i64,
        span: Interval,
        exclude: Option<Uuid>,
        op: CommitOp,
    ) -> Result<Appointment, SchedulingError> {
        for attempt in 1..=MAX_LOCK_ATTEMPTS {
            if !self
                .bookings
                .try_acquire_provider_lock(provider_id, self.lock_ttl)
                .await?
            {
                if attempt < MAX_LOCK_ATTEMPTS {
                    debug!(
                        "Provider {} lock busy, attempt {}/{}",
                        provider_id, attempt, MAX_LOCK_ATTEMPTS
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(
                        LOCK_RETRY_BASE_MS * attempt as u64,
                    ))
                    .await;
                    continue;
                }
                return Err(SchedulingError::Store(format!(
                    "Could not acquire scheduling lock for provider {}",
                    provider_id
                )));
            }

            let result = self.validate_and_write(provider_id, span, exclude, op).await;

            if let Err(e) = self.bookings.release_provider_lock(provider_id).await {
                // The TTL will reap the row; the write outcome stands.
                warn!("Failed to release lock for provider {}: {}", provider_id, e);
            }

            return result;
        }

        unreachable!("lock loop always returns on the final attempt")
    }

    async fn validate_and_write(
        &self,
        provider_id: i64,
        span: Interval,
        exclude: Option<Uuid>,
        op: CommitOp,
    ) -> Result<Appointment, SchedulingError> {
        if let Some(conflicting) = self.conflicts.find_conflict(provider_id, span, exclude).await? {
            return Err(SchedulingError::Conflict(ConflictKind::SlotTaken {
                conflicting_appointment_id: conflicting.id,
            }));
        }

        if !self
            .availability
            .span_within_availability(provider_id, span)
            .await?
        {
            return Err(SchedulingError::Conflict(ConflictKind::OutsideAvailability));
        }

        match op {
            CommitOp::Insert(new) => self.bookings.insert_appointment(new).await,
            CommitOp::Move {
                id,
                new_start,
                new_end,
            } => {
                self.bookings
                    .reschedule_appointment(id, new_start, new_end)
                    .await
            }
        }
    }

    fn emit(&self, appointment: &Appointment, event_type: AppointmentEventType) {
        if let Some(ref events) = self.events {
            let event = AppointmentEvent {
                appointment_id: appointment.id,
                provider_id: appointment.provider_id,
                service_id: appointment.service_id,
                customer_id: appointment.customer_id,
                event_type,
                channels: vec!["email".to_string()],
            };
            if events.send(event).is_err() {
                warn!("Appointment event receiver dropped; event discarded");
            }
        }
    }
}
