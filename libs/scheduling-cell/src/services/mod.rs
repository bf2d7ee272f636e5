pub mod availability;
pub mod booking;
pub mod conflict;

pub use availability::AvailabilityService;
pub use booking::BookingService;
pub use conflict::ConflictService;
