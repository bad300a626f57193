//! Post-admission messages. Delivery runs on its own task after the
//! bookings are committed and never feeds back into admission.

mod webhook;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use time::Date;
use uuid::Uuid;

use crate::models::booking::{AdmissionResult, BookingRequest, BookingType, CustomerInfo};

pub use webhook::WebhookNotifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    CustomerConfirmation,
    AdminAlert,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingNotification {
    pub kind: NotificationKind,
    pub booking_type: BookingType,
    pub date: Date,
    pub time_slot_key: Uuid,
    pub booking_ids: Vec<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub customer: CustomerInfo,
    pub total_price_cents: i64,
}

impl BookingNotification {
    /// The customer confirmation and the admin alert for one admission.
    pub fn for_admission(request: &BookingRequest, result: &AdmissionResult) -> Vec<Self> {
        let Some(first) = result.bookings.first() else {
            return Vec::new();
        };
        [NotificationKind::CustomerConfirmation, NotificationKind::AdminAlert]
            .into_iter()
            .map(|kind| BookingNotification {
                kind,
                booking_type: request.booking_type,
                date: first.date,
                time_slot_key: first.time_slot_id,
                booking_ids: result.bookings.iter().map(|b| b.id).collect(),
                vehicle_id: first.vehicle_id,
                customer: request.customer_info.clone(),
                total_price_cents: result.total_price_cents,
            })
            .collect()
    }
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, message: &BookingNotification) -> anyhow::Result<()>;
}

/// Records notifications as structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &BookingNotification) -> anyhow::Result<()> {
        tracing::info!(
            kind = ?message.kind,
            booking_type = ?message.booking_type,
            date = %message.date,
            slot = %message.time_slot_key,
            bookings = message.booking_ids.len(),
            customer = %message.customer.email,
            "Booking notification"
        );
        Ok(())
    }
}

/// Hands notifications to a [`Notifier`] on a detached task, retrying each
/// message with a linear backoff.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    max_attempts: u32,
    backoff: Duration,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            notifier,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Fire-and-forget. The handle is only useful to tests that want to wait
    /// for delivery.
    pub fn dispatch(&self, messages: Vec<BookingNotification>) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            futures::future::join_all(messages.iter().map(|m| this.deliver(m))).await;
        })
    }

    async fn deliver(&self, message: &BookingNotification) {
        for attempt in 1..=self.max_attempts {
            match self.notifier.notify(message).await {
                Ok(()) => return,
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(
                        kind = ?message.kind,
                        attempt,
                        error = %e,
                        "Notification failed, retrying"
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => {
                    tracing::error!(
                        kind = ?message.kind,
                        bookings = ?message.booking_ids,
                        attempts = self.max_attempts,
                        error = %e,
                        "Notification dropped"
                    );
                }
            }
        }
    }
}
