//! In-process store for tests and `STORE_BACKEND=memory`.
//!
//! Slot scopes stage their writes and apply them on commit, so a dropped
//! scope leaves nothing behind. Capacity serialization comes from the
//! admission controller's lock table, as with any single-instance store.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        booking::{
            Booking, BookingStatus, BookingType, CustomerInfo, InsertOutcome, NewBooking,
            SlotInstanceKey,
        },
        calendar::{
            CreateHolidayRequest, CreateServiceTypeRequest, CreateTimeSlotRequest, Holiday,
            ServiceType, TimeSlotTemplate, UpdateTimeSlotRequest,
        },
    },
};

use super::{BookingStore, CalendarStore, SlotScope};

#[derive(Debug, Clone, PartialEq, Eq)]
struct CustomerRecord {
    id: Uuid,
    name: String,
    phone: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    templates: HashMap<Uuid, TimeSlotTemplate>,
    holidays: HashMap<Uuid, Holiday>,
    service_types: HashMap<Uuid, ServiceType>,
    /// Keyed by lowercased email.
    customers: HashMap<String, CustomerRecord>,
    bookings: Vec<Booking>,
}

impl State {
    fn count_non_terminal(&self, key: SlotInstanceKey) -> i64 {
        self.bookings
            .iter()
            .filter(|b| b.date == key.date && b.time_slot_id == key.slot_id)
            .filter(|b| b.status.holds_capacity())
            .count() as i64
    }

    fn has_vehicle_conflict(&self, key: SlotInstanceKey, vehicle_id: Uuid) -> bool {
        self.bookings.iter().any(|b| {
            b.booking_type == BookingType::TestDrive
                && b.vehicle_id == Some(vehicle_id)
                && b.date == key.date
                && b.time_slot_id == key.slot_id
                && b.status.holds_capacity()
        })
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("memory store lock poisoned")))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("memory store lock poisoned")))
    }

    /// Every stored booking, in insertion order.
    pub fn bookings(&self) -> Result<Vec<Booking>> {
        Ok(self.read()?.bookings.clone())
    }

    /// Sets the status of an existing booking, standing in for the staff
    /// workflows that own status transitions.
    pub fn set_status(&self, booking_id: Uuid, status: BookingStatus) -> Result<()> {
        let mut state = self.write()?;
        let booking = state
            .bookings
            .iter_mut()
            .find(|b| b.id == booking_id)
            .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", booking_id)))?;
        if !booking.status.holds_capacity() && status.holds_capacity() {
            return Err(AppError::Conflict("terminal bookings cannot be reopened".into()));
        }
        booking.status = status;
        Ok(())
    }
}

fn sorted_templates(mut rows: Vec<TimeSlotTemplate>) -> Vec<TimeSlotTemplate> {
    rows.sort_by(|a, b| {
        (a.day_of_week, a.start_time, a.id).cmp(&(b.day_of_week, b.start_time, b.id))
    });
    rows
}

#[async_trait]
impl CalendarStore for MemoryStore {
    async fn list_templates(&self) -> Result<Vec<TimeSlotTemplate>> {
        Ok(sorted_templates(self.read()?.templates.values().cloned().collect()))
    }

    async fn list_active_templates(&self, day_of_week: i32) -> Result<Vec<TimeSlotTemplate>> {
        let rows = self
            .read()?
            .templates
            .values()
            .filter(|t| t.is_active && t.day_of_week == day_of_week)
            .cloned()
            .collect();
        Ok(sorted_templates(rows))
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<TimeSlotTemplate>> {
        Ok(self.read()?.templates.get(&id).cloned())
    }

    async fn create_template(&self, req: &CreateTimeSlotRequest) -> Result<TimeSlotTemplate> {
        let template = TimeSlotTemplate {
            id: Uuid::new_v4(),
            day_of_week: req.day_of_week,
            start_time: req.start_time,
            end_time: req.end_time,
            max_bookings: req.max_bookings,
            booking_type: req.booking_type,
            label: req.label.clone(),
            is_active: true,
            created_at: OffsetDateTime::now_utc(),
        };
        self.write()?.templates.insert(template.id, template.clone());
        Ok(template)
    }

    async fn update_template(
        &self,
        id: Uuid,
        req: &UpdateTimeSlotRequest,
    ) -> Result<Option<TimeSlotTemplate>> {
        let mut state = self.write()?;
        let Some(template) = state.templates.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(max) = req.max_bookings {
            template.max_bookings = max;
        }
        if let Some(active) = req.is_active {
            template.is_active = active;
        }
        if let Some(kind) = req.booking_type {
            template.booking_type = kind;
        }
        if let Some(label) = &req.label {
            template.label = Some(label.clone());
        }
        Ok(Some(template.clone()))
    }

    async fn list_holidays(&self) -> Result<Vec<Holiday>> {
        let mut rows: Vec<Holiday> = self.read()?.holidays.values().cloned().collect();
        rows.sort_by(|a, b| (a.date, a.id).cmp(&(b.date, b.id)));
        Ok(rows)
    }

    async fn create_holiday(&self, req: &CreateHolidayRequest) -> Result<Holiday> {
        let holiday = Holiday {
            id: Uuid::new_v4(),
            name: req.name.clone(),
            date: req.date,
            is_recurring: req.is_recurring,
            created_at: OffsetDateTime::now_utc(),
        };
        self.write()?.holidays.insert(holiday.id, holiday.clone());
        Ok(holiday)
    }

    async fn delete_holiday(&self, id: Uuid) -> Result<bool> {
        Ok(self.write()?.holidays.remove(&id).is_some())
    }

    async fn list_service_types(&self) -> Result<Vec<ServiceType>> {
        let mut rows: Vec<ServiceType> = self.read()?.service_types.values().cloned().collect();
        rows.sort_by(|a, b| (&a.name, a.id).cmp(&(&b.name, b.id)));
        Ok(rows)
    }

    async fn find_active_service_types(&self, ids: &[Uuid]) -> Result<Vec<ServiceType>> {
        let state = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.service_types.get(id))
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn create_service_type(&self, req: &CreateServiceTypeRequest) -> Result<ServiceType> {
        let service = ServiceType {
            id: Uuid::new_v4(),
            name: req.name.clone(),
            price_cents: req.price_cents,
            duration_minutes: req.duration_minutes.unwrap_or(60),
            is_active: true,
            created_at: OffsetDateTime::now_utc(),
        };
        self.write()?.service_types.insert(service.id, service.clone());
        Ok(service)
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn count_non_terminal(&self, key: SlotInstanceKey) -> Result<i64> {
        Ok(self.read()?.count_non_terminal(key))
    }

    async fn begin_slot_scope(&self, key: SlotInstanceKey) -> Result<Box<dyn SlotScope>> {
        Ok(Box::new(MemorySlotScope {
            store: self.clone(),
            key,
            staged: Vec::new(),
            staged_customer: None,
        }))
    }
}

struct MemorySlotScope {
    store: MemoryStore,
    key: SlotInstanceKey,
    staged: Vec<Booking>,
    staged_customer: Option<(String, CustomerRecord)>,
}

#[async_trait]
impl SlotScope for MemorySlotScope {
    async fn count_non_terminal(&mut self) -> Result<i64> {
        let committed = self.store.read()?.count_non_terminal(self.key);
        Ok(committed + self.staged.len() as i64)
    }

    async fn has_vehicle_conflict(&mut self, vehicle_id: Uuid) -> Result<bool> {
        if self.store.read()?.has_vehicle_conflict(self.key, vehicle_id) {
            return Ok(true);
        }
        Ok(self
            .staged
            .iter()
            .any(|b| b.booking_type == BookingType::TestDrive && b.vehicle_id == Some(vehicle_id)))
    }

    async fn insert_bookings(
        &mut self,
        customer: &CustomerInfo,
        rows: &[NewBooking],
    ) -> Result<InsertOutcome> {
        let email = customer.email.to_lowercase();
        let customer_id = match self.store.read()?.customers.get(&email) {
            Some(existing) => existing.id,
            None => Uuid::new_v4(),
        };

        let now = OffsetDateTime::now_utc();
        let mut written = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(vehicle_id) = row.vehicle_id {
                if row.booking_type == BookingType::TestDrive
                    && self.has_vehicle_conflict(vehicle_id).await?
                {
                    return Ok(InsertOutcome::VehicleConflict);
                }
            }
            written.push(Booking {
                id: row.id,
                booking_type: row.booking_type,
                date: self.key.date,
                time_slot_id: self.key.slot_id,
                vehicle_id: row.vehicle_id,
                service_type_id: row.service_type_id,
                status: row.status,
                customer_id,
                price_cents: row.price_cents,
                notes: row.notes.clone(),
                created_at: now,
            });
        }

        self.staged_customer = Some((
            email,
            CustomerRecord {
                id: customer_id,
                name: customer.name.clone(),
                phone: customer.phone.clone(),
            },
        ));
        self.staged.extend(written.iter().cloned());
        Ok(InsertOutcome::Inserted(written))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let scope = *self;
        let mut state = scope.store.write()?;
        // Latest name wins; a missing phone keeps the stored one.
        if let Some((email, record)) = scope.staged_customer {
            match state.customers.get_mut(&email) {
                Some(existing) => {
                    existing.name = record.name;
                    if record.phone.is_some() {
                        existing.phone = record.phone;
                    }
                }
                None => {
                    state.customers.insert(email, record);
                }
            }
        }
        state.bookings.extend(scope.staged);
        Ok(())
    }
}
