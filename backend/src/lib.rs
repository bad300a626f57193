pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod scheduling;
pub mod store;

use std::{sync::Arc, time::Duration};

use models::booking::BookingStatus;
use notify::NotificationDispatcher;
use scheduling::{AdmissionController, AvailabilityResolver, Clock, SlotLocks};
use store::{BookingStore, CalendarStore};

/// Shared application state available to all handlers via axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    pub calendar: Arc<dyn CalendarStore>,
    pub resolver: AvailabilityResolver,
    pub admission: AdmissionController,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wires the resolver and the admission controller over one store pair.
    /// `lock_timeout` bounds how long an admission waits for its slot.
    pub fn new(
        calendar: Arc<dyn CalendarStore>,
        bookings: Arc<dyn BookingStore>,
        clock: Arc<dyn Clock>,
        lock_timeout: Duration,
        initial_status: BookingStatus,
        notifier: NotificationDispatcher,
    ) -> Self {
        let resolver = AvailabilityResolver::new(calendar.clone(), bookings.clone());
        let admission = AdmissionController::new(
            calendar.clone(),
            bookings,
            SlotLocks::new(lock_timeout),
            clock.clone(),
            initial_status,
            notifier,
        );
        Self {
            calendar,
            resolver,
            admission,
            clock,
        }
    }
}

impl axum::extract::FromRef<AppState> for Arc<dyn CalendarStore> {
    fn from_ref(state: &AppState) -> Self {
        state.calendar.clone()
    }
}

impl axum::extract::FromRef<AppState> for AvailabilityResolver {
    fn from_ref(state: &AppState) -> Self {
        state.resolver.clone()
    }
}

impl axum::extract::FromRef<AppState> for AdmissionController {
    fn from_ref(state: &AppState) -> Self {
        state.admission.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<dyn Clock> {
    fn from_ref(state: &AppState) -> Self {
        state.clock.clone()
    }
}
