// libs/scheduling-cell/src/router.rs
use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{self, SchedulingState};

pub fn scheduling_routes(state: SchedulingState) -> Router {
    Router::new()
        .route("/availability", get(handlers::get_availability))
        .route("/appointments", post(handlers::book_appointment))
        .route(
            "/appointments/{appointment_id}/reschedule",
            post(handlers::reschedule_appointment),
        )
        .route(
            "/appointments/conflicts/check",
            get(handlers::check_appointment_conflicts),
        )
        .with_state(state)
}
