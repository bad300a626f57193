use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "booking_type", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingType {
    TestDrive,
    Service,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    /// Non-terminal bookings hold a capacity unit in their slot instance.
    pub fn holds_capacity(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            "no_show" => Ok(BookingStatus::NoShow),
            other => Err(format!("unknown booking status '{}'", other)),
        }
    }
}

/// A concrete occurrence of a weekly template: the unit that capacity is
/// counted and locked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotInstanceKey {
    pub date: Date,
    pub slot_id: Uuid,
}

impl std::fmt::Display for SlotInstanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.date, self.slot_id)
    }
}

/// Persisted booking row. Scheduling fields (`date`, `time_slot_id`,
/// `vehicle_id`) never change after admission.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub booking_type: BookingType,
    pub date: Date,
    #[serde(rename = "timeSlotKey")]
    pub time_slot_id: Uuid,
    pub vehicle_id: Option<Uuid>,
    pub service_type_id: Option<Uuid>,
    pub status: BookingStatus,
    pub customer_id: Uuid,
    pub price_cents: i64,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A row the admission controller asks the store to write.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub id: Uuid,
    pub booking_type: BookingType,
    pub vehicle_id: Option<Uuid>,
    pub service_type_id: Option<Uuid>,
    pub status: BookingStatus,
    pub price_cents: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    #[validate(length(min = 1, max = 200, message = "must not be empty"))]
    pub name: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 5, max = 32))]
    pub phone: Option<String>,
}

/// Inbound booking request. `time_slot_key` stays a string so that a
/// malformed key is reported as a validation rejection rather than a
/// deserialization failure.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub booking_type: BookingType,
    pub vehicle_id: Option<Uuid>,
    #[serde(default)]
    pub service_type_ids: Vec<Uuid>,
    pub date: Date,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub time_slot_key: String,
    #[validate(nested)]
    pub customer_info: CustomerInfo,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl BookingRequest {
    /// Capacity units this request consumes once admitted.
    pub fn required_units(&self) -> i64 {
        match self.booking_type {
            BookingType::TestDrive => 1,
            BookingType::Service => self.service_type_ids.len() as i64,
        }
    }
}

/// Successful admission: every row written for the request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResult {
    pub bookings: Vec<Booking>,
    pub total_price_cents: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCode {
    SlotFull,
    VehicleAlreadyBooked,
    InvalidDate,
    InvalidSlot,
    ValidationError,
}

impl RejectionCode {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectionCode::SlotFull => "SLOT_FULL",
            RejectionCode::VehicleAlreadyBooked => "VEHICLE_ALREADY_BOOKED",
            RejectionCode::InvalidDate => "INVALID_DATE",
            RejectionCode::InvalidSlot => "INVALID_SLOT",
            RejectionCode::ValidationError => "VALIDATION_ERROR",
        }
    }
}

/// An expected business outcome that turns a request down. The caller is
/// expected to re-query availability and retry with different input.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Rejection {
    pub code: RejectionCode,
    #[serde(rename = "error")]
    pub message: String,
}

impl Rejection {
    pub fn new(code: RejectionCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(RejectionCode::ValidationError, message)
    }
}

#[derive(Debug, Clone)]
pub enum AdmissionOutcome {
    Admitted(AdmissionResult),
    Rejected(Rejection),
}

impl AdmissionOutcome {
    pub fn rejection_code(&self) -> Option<RejectionCode> {
        match self {
            AdmissionOutcome::Admitted(_) => None,
            AdmissionOutcome::Rejected(r) => Some(r.code),
        }
    }
}

impl From<Rejection> for AdmissionOutcome {
    fn from(r: Rejection) -> Self {
        AdmissionOutcome::Rejected(r)
    }
}

/// Result of a store write inside a slot scope.
#[derive(Debug)]
pub enum InsertOutcome {
    Inserted(Vec<Booking>),
    /// The storage-level vehicle uniqueness guard fired.
    VehicleConflict,
}
