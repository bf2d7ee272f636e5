pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;
pub mod timeline;

// Re-export the engine surface for external use
pub use models::{
    Appointment, AppointmentEvent, AppointmentEventType, AppointmentStatus, BlockedRange,
    BookAppointmentRequest, BreakWindow, ConflictKind, RescheduleAppointmentRequest,
    SchedulingContext, SchedulingError, Service, Slot, WorkingHours,
};
pub use services::{AvailabilityService, BookingService, ConflictService};
pub use store::{BookingStore, ScheduleStore, ServiceCatalog};
