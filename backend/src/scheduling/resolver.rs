use std::sync::Arc;

use time::Date;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        availability::{CapacityCheck, SlotInstance},
        booking::{BookingType, SlotInstanceKey},
        calendar::{day_of_week, TimeSlotTemplate},
    },
    store::{BookingStore, CalendarStore},
};

/// Expands weekly templates into dated slot instances with remaining
/// capacity. Reads only; results are advisory and re-validated at admission.
#[derive(Clone)]
pub struct AvailabilityResolver {
    calendar: Arc<dyn CalendarStore>,
    bookings: Arc<dyn BookingStore>,
}

impl AvailabilityResolver {
    pub fn new(calendar: Arc<dyn CalendarStore>, bookings: Arc<dyn BookingStore>) -> Self {
        Self { calendar, bookings }
    }

    /// Slot instances on `date`, ordered by start time then template id.
    /// Holidays yield an empty list regardless of configured templates.
    pub async fn resolve_day(
        &self,
        date: Date,
        booking_type: Option<BookingType>,
    ) -> Result<Vec<SlotInstance>> {
        if self.calendar.is_holiday(date).await? {
            tracing::debug!(%date, "Date is a holiday, no availability");
            return Ok(Vec::new());
        }

        let mut templates: Vec<TimeSlotTemplate> = self
            .calendar
            .list_active_templates(day_of_week(date))
            .await?
            .into_iter()
            .filter(|t| t.max_bookings > 0)
            .filter(|t| booking_type.map_or(true, |kind| t.serves(kind)))
            .collect();
        templates.sort_by(|a, b| (a.start_time, a.id).cmp(&(b.start_time, b.id)));

        let mut slots = Vec::with_capacity(templates.len());
        for t in templates {
            let booked = self
                .bookings
                .count_non_terminal(SlotInstanceKey { date, slot_id: t.id })
                .await?;
            let check = CapacityCheck::from_counts(t.max_bookings, booked);
            slots.push(SlotInstance {
                slot_key: t.id,
                start_time: t.start_time,
                end_time: t.end_time,
                capacity: i64::from(t.max_bookings),
                remaining: check.remaining,
                label: t.label,
            });
        }
        Ok(slots)
    }

    /// Capacity of one slot instance. Unknown, inactive, zero-capacity,
    /// wrong-weekday and holiday slot instances report `ok: false`.
    pub async fn check_capacity(&self, date: Date, slot_key: Uuid) -> Result<CapacityCheck> {
        let Some(template) = self.calendar.get_template(slot_key).await? else {
            return Ok(CapacityCheck::UNAVAILABLE);
        };
        if !template.is_active || !template.occurs_on(date) || template.max_bookings <= 0 {
            return Ok(CapacityCheck::UNAVAILABLE);
        }
        if self.calendar.is_holiday(date).await? {
            return Ok(CapacityCheck::UNAVAILABLE);
        }

        let booked = self
            .bookings
            .count_non_terminal(SlotInstanceKey { date, slot_id: slot_key })
            .await?;
        Ok(CapacityCheck::from_counts(template.max_bookings, booked))
    }
}
