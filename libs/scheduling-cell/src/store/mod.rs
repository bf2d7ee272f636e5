// libs/scheduling-cell/src/store/mod.rs
//
// Storage seams for the engine. The resolver only ever reads; the conflict
// guard writes through `BookingStore` and serializes per provider via the
// lock pair.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{
    Appointment, BlockedRange, NewAppointment, SchedulingError, Service, WorkingHours,
};

pub mod memory;
pub mod supabase;

pub use memory::InMemorySchedulingStore;
pub use supabase::SupabaseSchedulingStore;

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Working hours for one weekday (0 = Sunday .. 6 = Saturday). `None`
    /// means the provider is off that day.
    async fn working_hours(
        &self,
        provider_id: i64,
        weekday: u8,
    ) -> Result<Option<WorkingHours>, SchedulingError>;

    /// All blocked ranges intersecting `[from, to)` for this provider,
    /// including global (provider-less) ranges.
    async fn blocked_ranges(
        &self,
        provider_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BlockedRange>, SchedulingError>;
}

#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    async fn service(&self, service_id: i64) -> Result<Option<Service>, SchedulingError>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Non-cancelled appointments intersecting `[from, to)`, ordered by
    /// start time ascending. `exclude` drops one appointment from the result
    /// (the reschedule path excludes the appointment being moved).
    async fn appointments_in_range(
        &self,
        provider_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Appointment>, SchedulingError>;

    async fn appointment(&self, id: Uuid) -> Result<Option<Appointment>, SchedulingError>;

    async fn insert_appointment(
        &self,
        new: NewAppointment,
    ) -> Result<Appointment, SchedulingError>;

    async fn reschedule_appointment(
        &self,
        id: Uuid,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
    ) -> Result<Appointment, SchedulingError>;

    /// Per-provider scheduling lock with a TTL so a crashed holder cannot
    /// wedge the provider forever. Returns false when another booking holds
    /// the lock.
    async fn try_acquire_provider_lock(
        &self,
        provider_id: i64,
        ttl: Duration,
    ) -> Result<bool, SchedulingError>;

    async fn release_provider_lock(&self, provider_id: i64) -> Result<(), SchedulingError>;
}
