// libs/scheduling-cell/src/models.rs
use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_config::AppConfig;

use crate::timeline::Interval;

// ==============================================================================
// SCHEDULE MODELS
// ==============================================================================

/// A break window inside a provider's working day, in local clock time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

fn default_timezone() -> Tz {
    chrono_tz::UTC
}

/// Weekly working hours for one provider on one weekday (0 = Sunday .. 6 = Saturday).
/// Absence of a row for a weekday means the provider is off that day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHours {
    pub provider_id: i64,
    pub weekday: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub breaks: Vec<BreakWindow>,
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
}

impl WorkingHours {
    pub fn new(
        provider_id: i64,
        weekday: u8,
        start_time: NaiveTime,
        end_time: NaiveTime,
        breaks: Vec<BreakWindow>,
        timezone: Tz,
    ) -> Result<Self, SchedulingError> {
        let hours = Self {
            provider_id,
            weekday,
            start_time,
            end_time,
            breaks,
            timezone,
        };
        hours.validate()?;
        Ok(hours)
    }

    pub fn validate(&self) -> Result<(), SchedulingError> {
        if self.weekday > 6 {
            return Err(SchedulingError::InvalidInput(
                "Weekday must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }
        if self.start_time >= self.end_time {
            return Err(SchedulingError::InvalidInput(
                "Working hours start time must be before end time".to_string(),
            ));
        }
        let mut sorted = self.breaks.clone();
        sorted.sort_by_key(|b| b.start);
        let mut last_end: Option<NaiveTime> = None;
        for brk in &sorted {
            if brk.start >= brk.end {
                return Err(SchedulingError::InvalidInput(
                    "Break start time must be before break end time".to_string(),
                ));
            }
            if brk.start < self.start_time || brk.end > self.end_time {
                return Err(SchedulingError::InvalidInput(
                    "Breaks must fall within the working window".to_string(),
                ));
            }
            if let Some(prev_end) = last_end {
                if brk.start < prev_end {
                    return Err(SchedulingError::InvalidInput(
                        "Breaks must not overlap each other".to_string(),
                    ));
                }
            }
            last_end = Some(brk.end);
        }
        Ok(())
    }
}

/// An ad-hoc unavailable range in absolute time. `provider_id = None` applies
/// to every provider (public holidays and the like).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedRange {
    pub provider_id: Option<i64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl BlockedRange {
    pub fn new(
        provider_id: Option<i64>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<Self, SchedulingError> {
        if start_time >= end_time {
            return Err(SchedulingError::InvalidInput(
                "Blocked range start must be before its end".to_string(),
            ));
        }
        Ok(Self {
            provider_id,
            start_time,
            end_time,
            reason,
        })
    }

    pub fn interval(&self) -> Interval {
        Interval::new(self.start_time, self.end_time)
    }

    pub fn applies_to(&self, provider_id: i64) -> bool {
        self.provider_id.is_none() || self.provider_id == Some(provider_id)
    }
}

// ==============================================================================
// SERVICE AND APPOINTMENT MODELS
// ==============================================================================

/// Upper bound on a service buffer. The conflict and availability lookups
/// widen their query windows by exactly this much, so a buffer larger than
/// the cap could reach past the window and escape the overlap test.
pub const MAX_BUFFER_MINUTES: i64 = 240;

/// A bookable service. Buffers are hard exclusion zones around each
/// appointment of this service, invisible in the slots themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub duration_minutes: i64,
    #[serde(default)]
    pub buffer_before_minutes: i64,
    #[serde(default)]
    pub buffer_after_minutes: i64,
}

impl Service {
    pub fn validate(&self) -> Result<(), SchedulingError> {
        if self.duration_minutes <= 0 {
            return Err(SchedulingError::InvalidInput(
                "Service duration must be positive".to_string(),
            ));
        }
        if self.buffer_before_minutes < 0 || self.buffer_after_minutes < 0 {
            return Err(SchedulingError::InvalidInput(
                "Service buffers must not be negative".to_string(),
            ));
        }
        if self.buffer_before_minutes > MAX_BUFFER_MINUTES
            || self.buffer_after_minutes > MAX_BUFFER_MINUTES
        {
            return Err(SchedulingError::InvalidInput(format!(
                "Service buffers must not exceed {} minutes",
                MAX_BUFFER_MINUTES
            )));
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes)
    }

    pub fn buffer_before(&self) -> Duration {
        Duration::minutes(self.buffer_before_minutes)
    }

    pub fn buffer_after(&self) -> Duration {
        Duration::minutes(self.buffer_after_minutes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

/// A booked appointment. `end_time = start_time + service duration`; buffers
/// are denormalized from the service at booking time so a single read of the
/// appointment table is enough to expand every row by its own padding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub provider_id: i64,
    pub service_id: i64,
    pub customer_id: Option<i64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub buffer_before_minutes: i64,
    #[serde(default)]
    pub buffer_after_minutes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// The span this appointment occupies once its buffers are applied.
    pub fn buffered_span(&self) -> Interval {
        Interval::new(
            self.start_time - Duration::minutes(self.buffer_before_minutes),
            self.end_time + Duration::minutes(self.buffer_after_minutes),
        )
    }

    /// Cancelled appointments free their slot; every other status keeps it.
    pub fn blocks_bookings(&self) -> bool {
        self.status != AppointmentStatus::Cancelled
    }

    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }
}

/// Insert payload for the Booking Store. Status is always `pending` on
/// creation; confirmation policy lives outside this engine.
#[derive(Debug, Clone, Serialize)]
pub struct NewAppointment {
    pub provider_id: i64,
    pub service_id: i64,
    pub customer_id: Option<i64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub buffer_before_minutes: i64,
    pub buffer_after_minutes: i64,
}

/// A candidate bookable window. Derived, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BookAppointmentRequest {
    pub provider_id: i64,
    pub service_id: i64,
    pub customer_id: Option<i64>,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_start_time: DateTime<Utc>,
}

// ==============================================================================
// SCHEDULING CONTEXT
// ==============================================================================

/// Explicit clock and policy inputs for the resolver and guard. Passing these
/// in keeps the services deterministic under test instead of reading ambient
/// globals.
#[derive(Debug, Clone)]
pub struct SchedulingContext {
    pub now: DateTime<Utc>,
    pub slot_granularity: Duration,
}

impl SchedulingContext {
    pub fn new(now: DateTime<Utc>, slot_granularity: Duration) -> Self {
        Self {
            now,
            slot_granularity,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            now: Utc::now(),
            slot_granularity: Duration::minutes(config.slot_granularity_minutes.max(1)),
        }
    }
}

// ==============================================================================
// OUTBOUND EVENTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentEventType {
    Created,
    Rescheduled,
}

/// Emitted after a successful booking or reschedule; consumed by the
/// notification dispatcher downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentEvent {
    pub appointment_id: Uuid,
    pub provider_id: i64,
    pub service_id: i64,
    pub customer_id: Option<i64>,
    pub event_type: AppointmentEventType,
    pub channels: Vec<String>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ConflictKind {
    SlotTaken { conflicting_appointment_id: Uuid },
    OutsideAvailability,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::SlotTaken {
                conflicting_appointment_id,
            } => write!(f, "slot taken by appointment {}", conflicting_appointment_id),
            ConflictKind::OutsideAvailability => write!(f, "outside provider availability"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulingError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Service not found")]
    ServiceNotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Booking conflict: {0}")]
    Conflict(ConflictKind),

    #[error("Store error: {0}")]
    Store(String),
}

// ==============================================================================
// CONFLICT CHECK RESPONSE
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_appointment: Option<Appointment>,
}
