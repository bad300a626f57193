use serde::{Deserialize, Serialize};
use time::{Date, Time};
use uuid::Uuid;

use super::booking::BookingType;
use super::common::hhmm;

/// A bookable occurrence of a template on a specific date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotInstance {
    pub slot_key: Uuid,
    #[serde(with = "hhmm")]
    pub start_time: Time,
    #[serde(with = "hhmm")]
    pub end_time: Time,
    pub capacity: i64,
    pub remaining: i64,
    pub label: Option<String>,
}

/// Point answer for a single slot instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapacityCheck {
    pub ok: bool,
    pub remaining: i64,
}

impl CapacityCheck {
    pub const UNAVAILABLE: CapacityCheck = CapacityCheck {
        ok: false,
        remaining: 0,
    };

    /// Capacity left once `booked` units are held against `max_bookings`.
    pub fn from_counts(max_bookings: i32, booked: i64) -> Self {
        let remaining = (i64::from(max_bookings) - booked).max(0);
        Self {
            ok: remaining > 0,
            remaining,
        }
    }

    pub fn admits(&self, units: i64) -> bool {
        self.ok && self.remaining >= units
    }
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: Date,
    pub booking_type: Option<BookingType>,
}

#[derive(Debug, Deserialize)]
pub struct CapacityQuery {
    pub date: Date,
    pub slot_key: String,
}
