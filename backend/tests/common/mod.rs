#![allow(dead_code)]
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{json, Value};
use time::{macros::date, Date};
use uuid::Uuid;

use dealer_booking_backend::{
    api,
    models::booking::BookingStatus,
    notify::{BookingNotification, NotificationDispatcher, Notifier},
    scheduling::FixedClock,
    store::MemoryStore,
    AppState,
};

/// "Today" for every test server.
pub const TODAY: Date = date!(2030 - 01 - 01);
/// First Monday after [`TODAY`].
pub const MONDAY: Date = date!(2030 - 01 - 07);

/// Collects every notification the dispatcher delivers.
#[derive(Default)]
pub struct RecordingNotifier {
    pub seen: Mutex<Vec<BookingNotification>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &BookingNotification) -> anyhow::Result<()> {
        self.seen.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Fails every delivery and counts the attempts.
#[derive(Default)]
pub struct FailingNotifier {
    pub attempts: Mutex<u32>,
}

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _message: &BookingNotification) -> anyhow::Result<()> {
        *self.attempts.lock().unwrap() += 1;
        anyhow::bail!("notification relay unavailable")
    }
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub store: MemoryStore,
    pub notifier: Arc<RecordingNotifier>,
    pub client: reqwest::Client,
}

/// Spin up a real Axum server on a random port over a fresh in-memory store.
pub async fn setup_test_app() -> TestApp {
    let notifier = Arc::new(RecordingNotifier::default());
    spawn_app(notifier.clone(), notifier, 1).await
}

/// Same as [`setup_test_app`] but delivering through `delivery`, retried
/// up to `max_attempts` times per message.
pub async fn setup_test_app_with_notifier(
    delivery: Arc<dyn Notifier>,
    max_attempts: u32,
) -> TestApp {
    spawn_app(delivery, Arc::new(RecordingNotifier::default()), max_attempts).await
}

async fn spawn_app(
    delivery: Arc<dyn Notifier>,
    notifier: Arc<RecordingNotifier>,
    max_attempts: u32,
) -> TestApp {
    let store = MemoryStore::new();
    let shared = Arc::new(store.clone());

    let state = AppState::new(
        shared.clone(),
        shared,
        Arc::new(FixedClock(TODAY)),
        Duration::from_secs(5),
        BookingStatus::Pending,
        NotificationDispatcher::new(delivery, max_attempts, Duration::from_millis(1)),
    );
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        addr,
        store,
        notifier,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    pub async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client.post(self.url(path)).json(body).send().await.unwrap()
    }

    /// Creates a Monday template through the admin API and returns its key.
    pub async fn create_slot(&self, start: &str, end: &str, max_bookings: i32) -> String {
        let resp = self
            .post(
                "/api/calendar/time-slots",
                &json!({
                    "dayOfWeek": 1,
                    "startTime": start,
                    "endTime": end,
                    "maxBookings": max_bookings,
                }),
            )
            .await;
        assert_eq!(resp.status(), 201, "time slot should be created");
        let body: Value = resp.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn create_service_type(&self, name: &str, price_cents: i64) -> String {
        let resp = self
            .post(
                "/api/service-types",
                &json!({ "name": name, "priceCents": price_cents }),
            )
            .await;
        assert_eq!(resp.status(), 201, "service type should be created");
        let body: Value = resp.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn create_holiday(&self, date: &str, recurring: bool) -> String {
        let resp = self
            .post(
                "/api/calendar/holidays",
                &json!({ "name": "Closed", "date": date, "isRecurring": recurring }),
            )
            .await;
        assert_eq!(resp.status(), 201, "holiday should be created");
        let body: Value = resp.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn remaining(&self, date: Date, slot_key: &str) -> i64 {
        let resp = self
            .get(&format!(
                "/api/availability/check?date={}&slot_key={}",
                date, slot_key
            ))
            .await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["remaining"].as_i64().unwrap()
    }
}

pub fn customer() -> Value {
    json!({ "name": "Alex Doe", "email": "alex@example.com", "phone": "555-0100" })
}

pub fn test_drive(slot_key: &str, vehicle_id: Uuid) -> Value {
    json!({
        "bookingType": "TEST_DRIVE",
        "vehicleId": vehicle_id,
        "date": MONDAY.to_string(),
        "timeSlotKey": slot_key,
        "customerInfo": customer(),
    })
}

pub fn service(slot_key: &str, service_type_ids: &[String]) -> Value {
    json!({
        "bookingType": "SERVICE",
        "serviceTypeIds": service_type_ids,
        "date": MONDAY.to_string(),
        "timeSlotKey": slot_key,
        "customerInfo": customer(),
        "notes": "Check the brakes too",
    })
}
