use serde::{Deserialize, Serialize};
use time::{Date, Month, OffsetDateTime, Time};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::booking::BookingType;
use super::common::hhmm;

/// Weekday number with Sunday = 0, matching `TimeSlotTemplate::day_of_week`.
pub fn day_of_week(date: Date) -> i32 {
    date.weekday().number_days_from_sunday() as i32
}

/// A recurring weekly slot definition. Its id is the slot key that bookings
/// reference.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlotTemplate {
    pub id: Uuid,
    pub day_of_week: i32,
    #[serde(with = "hhmm")]
    pub start_time: Time,
    #[serde(with = "hhmm")]
    pub end_time: Time,
    pub max_bookings: i32,
    pub booking_type: Option<BookingType>,
    pub label: Option<String>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl TimeSlotTemplate {
    /// Whether this template offers capacity to bookings of `kind`.
    pub fn serves(&self, kind: BookingType) -> bool {
        self.booking_type.map_or(true, |t| t == kind)
    }

    /// Whether the template produces a slot instance on `date`.
    pub fn occurs_on(&self, date: Date) -> bool {
        self.day_of_week == day_of_week(date)
    }
}

/// Holiday row as stored. Use [`Holiday::rule`] for matching.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Holiday {
    pub id: Uuid,
    pub name: String,
    pub date: Date,
    pub is_recurring: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Holiday {
    pub fn rule(&self) -> HolidayRule {
        if self.is_recurring {
            HolidayRule::Recurring {
                month: self.date.month(),
                day: self.date.day(),
            }
        } else {
            HolidayRule::Fixed(self.date)
        }
    }

    pub fn matches(&self, candidate: Date) -> bool {
        self.rule().matches(candidate)
    }
}

/// Blackout rule: a single calendar date, or a month/day that repeats every
/// year regardless of the stored year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolidayRule {
    Fixed(Date),
    Recurring { month: Month, day: u8 },
}

impl HolidayRule {
    pub fn matches(&self, candidate: Date) -> bool {
        match *self {
            HolidayRule::Fixed(date) => date == candidate,
            // Feb 29 only matches in leap years.
            HolidayRule::Recurring { month, day } => {
                candidate.month() == month && candidate.day() == day
            }
        }
    }
}

/// Catalog entry for a service a customer can book into a SERVICE slot.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ServiceType {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub duration_minutes: i32,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_slot_window"))]
pub struct CreateTimeSlotRequest {
    #[validate(range(min = 0, max = 6, message = "must be between 0 (Sunday) and 6 (Saturday)"))]
    pub day_of_week: i32,
    #[serde(with = "hhmm")]
    pub start_time: Time,
    #[serde(with = "hhmm")]
    pub end_time: Time,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub max_bookings: i32,
    pub booking_type: Option<BookingType>,
    #[validate(length(max = 100))]
    pub label: Option<String>,
}

fn validate_slot_window(req: &CreateTimeSlotRequest) -> Result<(), ValidationError> {
    if req.start_time >= req.end_time {
        let mut err = ValidationError::new("slot_window");
        err.message = Some("start_time must be before end_time".into());
        return Err(err);
    }
    Ok(())
}

/// Patch for an existing template. Weekday and times are fixed once created
/// so that bookings already made against the slot key keep their meaning.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTimeSlotRequest {
    #[validate(range(min = 0, message = "must not be negative"))]
    pub max_bookings: Option<i32>,
    pub is_active: Option<bool>,
    /// `Some(None)` clears the restriction so the slot serves both types.
    #[serde(default, deserialize_with = "double_option")]
    pub booking_type: Option<Option<BookingType>>,
    #[validate(length(max = 100))]
    pub label: Option<String>,
}

fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateHolidayRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub date: Date,
    #[serde(default)]
    pub is_recurring: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceTypeRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub price_cents: i64,
    #[validate(range(min = 1))]
    pub duration_minutes: Option<i32>,
}
