//! Persistence seams for the scheduling core.
//!
//! The calendar side is read-mostly configuration. The booking side is
//! written only through a [`SlotScope`], which covers every read and write
//! the admission controller makes for one slot instance and commits them
//! as a unit.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use time::Date;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        booking::{CustomerInfo, InsertOutcome, NewBooking, SlotInstanceKey},
        calendar::{
            CreateHolidayRequest, CreateServiceTypeRequest, CreateTimeSlotRequest, Holiday,
            ServiceType, TimeSlotTemplate, UpdateTimeSlotRequest,
        },
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait CalendarStore: Send + Sync + 'static {
    async fn list_templates(&self) -> Result<Vec<TimeSlotTemplate>>;

    /// Active templates for one weekday (0 = Sunday).
    async fn list_active_templates(&self, day_of_week: i32) -> Result<Vec<TimeSlotTemplate>>;

    async fn get_template(&self, id: Uuid) -> Result<Option<TimeSlotTemplate>>;

    async fn create_template(&self, req: &CreateTimeSlotRequest) -> Result<TimeSlotTemplate>;

    async fn update_template(
        &self,
        id: Uuid,
        req: &UpdateTimeSlotRequest,
    ) -> Result<Option<TimeSlotTemplate>>;

    async fn list_holidays(&self) -> Result<Vec<Holiday>>;

    async fn create_holiday(&self, req: &CreateHolidayRequest) -> Result<Holiday>;

    /// Returns `false` when no holiday had that id.
    async fn delete_holiday(&self, id: Uuid) -> Result<bool>;

    /// Exact-date or recurring month/day match against any stored holiday.
    async fn is_holiday(&self, date: Date) -> Result<bool> {
        Ok(self.list_holidays().await?.iter().any(|h| h.matches(date)))
    }

    async fn list_service_types(&self) -> Result<Vec<ServiceType>>;

    /// Active service types among `ids`. Unknown or inactive ids are omitted.
    async fn find_active_service_types(&self, ids: &[Uuid]) -> Result<Vec<ServiceType>>;

    async fn create_service_type(&self, req: &CreateServiceTypeRequest) -> Result<ServiceType>;
}

#[async_trait]
pub trait BookingStore: Send + Sync + 'static {
    /// Non-locking count of PENDING/CONFIRMED bookings for display reads.
    async fn count_non_terminal(&self, key: SlotInstanceKey) -> Result<i64>;

    /// Opens the storage side of a decision scope for one slot instance.
    async fn begin_slot_scope(&self, key: SlotInstanceKey) -> Result<Box<dyn SlotScope>>;
}

/// Storage primitives that run as one logical unit. Dropping the scope
/// without [`SlotScope::commit`] discards every write made through it.
#[async_trait]
pub trait SlotScope: Send {
    async fn count_non_terminal(&mut self) -> Result<i64>;

    /// Whether `vehicle_id` already holds a non-terminal test drive in this
    /// slot instance.
    async fn has_vehicle_conflict(&mut self, vehicle_id: Uuid) -> Result<bool>;

    /// Resolves the customer by email and writes every row, or none.
    async fn insert_bookings(
        &mut self,
        customer: &CustomerInfo,
        rows: &[NewBooking],
    ) -> Result<InsertOutcome>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
