pub mod availability;
pub mod bookings;
pub mod calendar;
pub mod health;
pub mod service_types;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};

use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        // Availability
        .route("/api/availability", get(availability::list))
        .route("/api/availability/check", get(availability::check))
        // Bookings
        .route("/api/bookings", post(bookings::create))
        // Calendar administration
        .route(
            "/api/calendar/time-slots",
            get(calendar::list_time_slots).post(calendar::create_time_slot),
        )
        .route("/api/calendar/time-slots/:id", patch(calendar::update_time_slot))
        .route(
            "/api/calendar/holidays",
            get(calendar::list_holidays).post(calendar::create_holiday),
        )
        .route("/api/calendar/holidays/:id", delete(calendar::delete_holiday))
        // Service catalog
        .route(
            "/api/service-types",
            get(service_types::list).post(service_types::create),
        )
        .with_state(state)
}
