use std::{collections::HashSet, sync::Arc};

use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{describe_validation_errors, AppError, Result},
    models::{
        availability::CapacityCheck,
        booking::{
            AdmissionOutcome, AdmissionResult, BookingRequest, BookingStatus, BookingType,
            InsertOutcome, NewBooking, Rejection, RejectionCode, SlotInstanceKey,
        },
        calendar::TimeSlotTemplate,
    },
    notify::{BookingNotification, NotificationDispatcher},
    store::{BookingStore, CalendarStore},
};

use super::{clock::Clock, locks::SlotLocks};

type Decision<T> = std::result::Result<T, Rejection>;

/// A validated request, ready to be decided inside the slot scope.
struct Plan {
    key: SlotInstanceKey,
    rows: Vec<NewBooking>,
    units: i64,
    vehicle_id: Option<Uuid>,
    total_price_cents: i64,
}

/// The single writer of new bookings. Turns a [`BookingRequest`] into
/// committed rows or a [`Rejection`], serializing per slot instance.
#[derive(Clone)]
pub struct AdmissionController {
    inner: Arc<Inner>,
}

struct Inner {
    calendar: Arc<dyn CalendarStore>,
    bookings: Arc<dyn BookingStore>,
    locks: SlotLocks,
    clock: Arc<dyn Clock>,
    initial_status: BookingStatus,
    notifier: NotificationDispatcher,
}

impl AdmissionController {
    pub fn new(
        calendar: Arc<dyn CalendarStore>,
        bookings: Arc<dyn BookingStore>,
        locks: SlotLocks,
        clock: Arc<dyn Clock>,
        initial_status: BookingStatus,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                calendar,
                bookings,
                locks,
                clock,
                initial_status,
                notifier,
            }),
        }
    }

    /// Admits or rejects `request`. Business rejections come back as
    /// `Ok(AdmissionOutcome::Rejected)`; `Err` is reserved for
    /// infrastructure failures, after which nothing has been written.
    ///
    /// The decision runs on its own task: if the caller goes away the
    /// admission still completes and only the result is lost.
    pub async fn admit(&self, request: BookingRequest) -> Result<AdmissionOutcome> {
        let this = self.clone();
        tokio::spawn(async move { this.run(request).await })
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("admission task failed: {}", e)))?
    }

    #[tracing::instrument(
        name = "admission",
        skip_all,
        fields(
            booking_type = ?request.booking_type,
            date = %request.date,
            slot = %request.time_slot_key,
        )
    )]
    async fn run(&self, request: BookingRequest) -> Result<AdmissionOutcome> {
        let (plan, template) = match self.plan(&request).await? {
            Ok(planned) => planned,
            Err(rejection) => {
                tracing::info!(code = rejection.code.as_str(), "Booking rejected: {}", rejection.message);
                return Ok(rejection.into());
            }
        };

        let outcome = match self.decide(plan, template, &request).await? {
            Ok(result) => result,
            Err(rejection) => {
                tracing::info!(code = rejection.code.as_str(), "Booking rejected: {}", rejection.message);
                return Ok(rejection.into());
            }
        };

        tracing::info!(
            bookings = outcome.bookings.len(),
            total_price_cents = outcome.total_price_cents,
            "Booking admitted"
        );

        self.inner
            .notifier
            .dispatch(BookingNotification::for_admission(&request, &outcome));

        Ok(AdmissionOutcome::Admitted(outcome))
    }

    /// Structural and calendar validation. Runs before any exclusivity is
    /// taken.
    async fn plan(&self, req: &BookingRequest) -> Result<Decision<(Plan, TimeSlotTemplate)>> {
        if let Err(e) = req.validate() {
            return Ok(Err(Rejection::validation(describe_validation_errors(&e))));
        }

        let Ok(slot_id) = Uuid::parse_str(req.time_slot_key.trim()) else {
            return Ok(Err(Rejection::validation(format!(
                "timeSlotKey: '{}' is not a valid slot key",
                req.time_slot_key
            ))));
        };

        match req.booking_type {
            BookingType::TestDrive => {
                if req.vehicle_id.is_none() {
                    return Ok(Err(Rejection::validation(
                        "vehicleId: required for test drive bookings",
                    )));
                }
                if !req.service_type_ids.is_empty() {
                    return Ok(Err(Rejection::validation(
                        "serviceTypeIds: must be empty for test drive bookings",
                    )));
                }
            }
            BookingType::Service => {
                if req.service_type_ids.is_empty() {
                    return Ok(Err(Rejection::validation(
                        "serviceTypeIds: at least one service type is required",
                    )));
                }
                let distinct: HashSet<&Uuid> = req.service_type_ids.iter().collect();
                if distinct.len() != req.service_type_ids.len() {
                    return Ok(Err(Rejection::validation(
                        "serviceTypeIds: must not contain duplicates",
                    )));
                }
            }
        }

        let today = self.inner.clock.today();
        if req.date < today {
            return Ok(Err(Rejection::new(
                RejectionCode::InvalidDate,
                format!("{} is in the past", req.date),
            )));
        }
        if self.inner.calendar.is_holiday(req.date).await? {
            return Ok(Err(Rejection::new(
                RejectionCode::InvalidDate,
                format!("{} is a holiday", req.date),
            )));
        }

        let template = match self.inner.calendar.get_template(slot_id).await? {
            Some(t) => t,
            None => {
                return Ok(Err(Rejection::new(
                    RejectionCode::InvalidSlot,
                    "Unknown time slot",
                )))
            }
        };
        if let Err(rejection) = check_template(&template, req) {
            return Ok(Err(rejection));
        }

        let (rows, total_price_cents) = match req.booking_type {
            BookingType::TestDrive => (vec![self.new_row(req, None, 0)], 0),
            BookingType::Service => {
                let found = self
                    .inner
                    .calendar
                    .find_active_service_types(&req.service_type_ids)
                    .await?;
                let missing: Vec<String> = req
                    .service_type_ids
                    .iter()
                    .filter(|id| !found.iter().any(|s| s.id == **id))
                    .map(|id| id.to_string())
                    .collect();
                if !missing.is_empty() {
                    return Ok(Err(Rejection::validation(format!(
                        "serviceTypeIds: unknown or inactive service types: {}",
                        missing.join(", ")
                    ))));
                }

                // One row per requested service, in request order.
                let mut rows = Vec::with_capacity(req.service_type_ids.len());
                let mut total = 0i64;
                for id in &req.service_type_ids {
                    if let Some(service) = found.iter().find(|s| s.id == *id) {
                        total += service.price_cents;
                        rows.push(self.new_row(req, Some(service.id), service.price_cents));
                    }
                }
                (rows, total)
            }
        };

        let plan = Plan {
            key: SlotInstanceKey {
                date: req.date,
                slot_id,
            },
            units: req.required_units(),
            vehicle_id: match req.booking_type {
                BookingType::TestDrive => req.vehicle_id,
                BookingType::Service => None,
            },
            rows,
            total_price_cents,
        };
        Ok(Ok((plan, template)))
    }

    fn new_row(
        &self,
        req: &BookingRequest,
        service_type_id: Option<Uuid>,
        price_cents: i64,
    ) -> NewBooking {
        NewBooking {
            id: Uuid::new_v4(),
            booking_type: req.booking_type,
            vehicle_id: req.vehicle_id,
            service_type_id,
            status: self.inner.initial_status,
            price_cents,
            notes: req.notes.clone(),
        }
    }

    /// The decision scope: capacity re-check, vehicle check and the write,
    /// all while holding the slot instance exclusively.
    async fn decide(
        &self,
        plan: Plan,
        template: TimeSlotTemplate,
        req: &BookingRequest,
    ) -> Result<Decision<AdmissionResult>> {
        let guard = self.inner.locks.acquire(plan.key).await?;
        let mut scope = self.inner.bookings.begin_slot_scope(plan.key).await?;
        tracing::debug!(slot = %guard.key(), units = plan.units, "Entered decision scope");

        // Configuration may have changed while waiting for the slot.
        if self.inner.calendar.is_holiday(plan.key.date).await? {
            return Ok(Err(Rejection::new(
                RejectionCode::InvalidDate,
                format!("{} is a holiday", plan.key.date),
            )));
        }
        let Some(template) = self.inner.calendar.get_template(template.id).await? else {
            return Ok(Err(Rejection::new(
                RejectionCode::InvalidSlot,
                "Time slot no longer exists",
            )));
        };
        if let Err(rejection) = check_template(&template, req) {
            return Ok(Err(rejection));
        }

        let booked = scope.count_non_terminal().await?;
        let capacity = CapacityCheck::from_counts(template.max_bookings, booked);
        if !capacity.admits(plan.units) {
            return Ok(Err(Rejection::new(
                RejectionCode::SlotFull,
                format!(
                    "Slot has {} place(s) left, {} required",
                    capacity.remaining, plan.units
                ),
            )));
        }

        if let Some(vehicle_id) = plan.vehicle_id {
            if scope.has_vehicle_conflict(vehicle_id).await? {
                return Ok(Err(vehicle_taken()));
            }
        }

        let bookings = match scope.insert_bookings(&req.customer_info, &plan.rows).await? {
            InsertOutcome::Inserted(rows) => rows,
            InsertOutcome::VehicleConflict => return Ok(Err(vehicle_taken())),
        };
        scope.commit().await?;
        drop(guard);

        Ok(Ok(AdmissionResult {
            bookings,
            total_price_cents: plan.total_price_cents,
        }))
    }
}

fn vehicle_taken() -> Rejection {
    Rejection::new(
        RejectionCode::VehicleAlreadyBooked,
        "Vehicle is already booked for a test drive in this slot",
    )
}

fn check_template(template: &TimeSlotTemplate, req: &BookingRequest) -> Decision<()> {
    if !template.is_active {
        return Err(Rejection::new(RejectionCode::InvalidSlot, "Time slot is not active"));
    }
    if !template.occurs_on(req.date) {
        return Err(Rejection::new(
            RejectionCode::InvalidSlot,
            format!("Time slot does not run on {}", req.date.weekday()),
        ));
    }
    if !template.serves(req.booking_type) {
        return Err(Rejection::new(
            RejectionCode::InvalidSlot,
            "Time slot does not accept this booking type",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            booking::CustomerInfo,
            calendar::{
                CreateHolidayRequest, CreateServiceTypeRequest, CreateTimeSlotRequest,
                UpdateTimeSlotRequest,
            },
        },
        notify::LogNotifier,
        scheduling::clock::FixedClock,
        store::MemoryStore,
    };
    use std::time::Duration;
    use time::{
        macros::{date, time},
        Date,
    };

    const TODAY: Date = date!(2030 - 01 - 01);
    const MONDAY: Date = date!(2030 - 01 - 07);

    fn controller(store: &MemoryStore) -> AdmissionController {
        let store = Arc::new(store.clone());
        AdmissionController::new(
            store.clone(),
            store,
            SlotLocks::new(Duration::from_secs(5)),
            Arc::new(FixedClock(TODAY)),
            BookingStatus::Pending,
            NotificationDispatcher::new(Arc::new(LogNotifier), 1, Duration::from_millis(1)),
        )
    }

    async fn slot(store: &MemoryStore, max: i32) -> TimeSlotTemplate {
        store
            .create_template(&CreateTimeSlotRequest {
                day_of_week: 1,
                start_time: time!(09:00),
                end_time: time!(10:00),
                max_bookings: max,
                booking_type: None,
                label: None,
            })
            .await
            .unwrap()
    }

    fn customer() -> CustomerInfo {
        CustomerInfo {
            name: "Alex Doe".into(),
            email: "alex@example.com".into(),
            phone: Some("555-0100".into()),
        }
    }

    fn test_drive(slot_id: Uuid, vehicle_id: Uuid) -> BookingRequest {
        BookingRequest {
            booking_type: BookingType::TestDrive,
            vehicle_id: Some(vehicle_id),
            service_type_ids: Vec::new(),
            date: MONDAY,
            time_slot_key: slot_id.to_string(),
            customer_info: customer(),
            notes: None,
        }
    }

    fn service(slot_id: Uuid, service_type_ids: Vec<Uuid>) -> BookingRequest {
        BookingRequest {
            booking_type: BookingType::Service,
            vehicle_id: None,
            service_type_ids,
            date: MONDAY,
            time_slot_key: slot_id.to_string(),
            customer_info: customer(),
            notes: Some("rattle in the dash".into()),
        }
    }

    async fn service_type(store: &MemoryStore, name: &str, price_cents: i64) -> Uuid {
        store
            .create_service_type(&CreateServiceTypeRequest {
                name: name.into(),
                price_cents,
                duration_minutes: None,
            })
            .await
            .unwrap()
            .id
    }

    fn code(outcome: &AdmissionOutcome) -> Option<RejectionCode> {
        outcome.rejection_code()
    }

    #[tokio::test]
    async fn admits_test_drive_as_pending() {
        let store = MemoryStore::new();
        let t = slot(&store, 3).await;
        let outcome = controller(&store)
            .admit(test_drive(t.id, Uuid::new_v4()))
            .await
            .unwrap();

        let AdmissionOutcome::Admitted(result) = outcome else {
            panic!("expected admission");
        };
        assert_eq!(result.bookings.len(), 1);
        assert_eq!(result.total_price_cents, 0);
        assert_eq!(result.bookings[0].status, BookingStatus::Pending);
        assert_eq!(result.bookings[0].time_slot_id, t.id);
    }

    #[tokio::test]
    async fn service_fans_out_and_prices() {
        let store = MemoryStore::new();
        let t = slot(&store, 3).await;
        let oil = service_type(&store, "Oil change", 4_999).await;
        let tyres = service_type(&store, "Tyre rotation", 2_500).await;

        let outcome = controller(&store)
            .admit(service(t.id, vec![oil, tyres]))
            .await
            .unwrap();
        let AdmissionOutcome::Admitted(result) = outcome else {
            panic!("expected admission");
        };
        assert_eq!(result.bookings.len(), 2);
        assert_eq!(result.total_price_cents, 7_499);
        assert_eq!(result.bookings[0].service_type_id, Some(oil));
        assert_eq!(result.bookings[1].service_type_id, Some(tyres));
        assert!(result.bookings.iter().all(|b| b.date == MONDAY && b.time_slot_id == t.id));
    }

    #[tokio::test]
    async fn service_needing_more_units_than_remain_writes_nothing() {
        let store = MemoryStore::new();
        let t = slot(&store, 2).await;
        let a = service_type(&store, "A", 100).await;
        let b = service_type(&store, "B", 100).await;
        let c = controller(&store);

        assert!(code(&c.admit(test_drive(t.id, Uuid::new_v4())).await.unwrap()).is_none());
        let outcome = c.admit(service(t.id, vec![a, b])).await.unwrap();
        assert_eq!(code(&outcome), Some(RejectionCode::SlotFull));
        assert_eq!(store.bookings().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fills_then_rejects() {
        let store = MemoryStore::new();
        let t = slot(&store, 2).await;
        let c = controller(&store);

        for _ in 0..2 {
            let outcome = c.admit(test_drive(t.id, Uuid::new_v4())).await.unwrap();
            assert!(code(&outcome).is_none());
        }
        let outcome = c.admit(test_drive(t.id, Uuid::new_v4())).await.unwrap();
        assert_eq!(code(&outcome), Some(RejectionCode::SlotFull));
    }

    #[tokio::test]
    async fn cancelled_booking_frees_its_unit() {
        let store = MemoryStore::new();
        let t = slot(&store, 1).await;
        let c = controller(&store);

        let AdmissionOutcome::Admitted(first) =
            c.admit(test_drive(t.id, Uuid::new_v4())).await.unwrap()
        else {
            panic!("expected admission");
        };
        store
            .set_status(first.bookings[0].id, BookingStatus::Cancelled)
            .unwrap();

        let outcome = c.admit(test_drive(t.id, Uuid::new_v4())).await.unwrap();
        assert!(code(&outcome).is_none());
    }

    #[tokio::test]
    async fn same_vehicle_twice_is_rejected() {
        let store = MemoryStore::new();
        let t = slot(&store, 5).await;
        let c = controller(&store);
        let vehicle = Uuid::new_v4();

        assert!(code(&c.admit(test_drive(t.id, vehicle)).await.unwrap()).is_none());
        let outcome = c.admit(test_drive(t.id, vehicle)).await.unwrap();
        assert_eq!(code(&outcome), Some(RejectionCode::VehicleAlreadyBooked));
    }

    #[tokio::test]
    async fn structural_problems_are_validation_errors() {
        let store = MemoryStore::new();
        let t = slot(&store, 3).await;
        let c = controller(&store);

        let mut no_vehicle = test_drive(t.id, Uuid::new_v4());
        no_vehicle.vehicle_id = None;
        let mut bad_key = test_drive(t.id, Uuid::new_v4());
        bad_key.time_slot_key = "slot-nine".into();
        let mut mixed = test_drive(t.id, Uuid::new_v4());
        mixed.service_type_ids = vec![Uuid::new_v4()];
        let empty_service = service(t.id, Vec::new());
        let dup = Uuid::new_v4();
        let duplicated = service(t.id, vec![dup, dup]);
        let unknown_service = service(t.id, vec![Uuid::new_v4()]);

        for req in [no_vehicle, bad_key, mixed, empty_service, duplicated, unknown_service] {
            let outcome = c.admit(req).await.unwrap();
            assert_eq!(code(&outcome), Some(RejectionCode::ValidationError));
        }
        assert!(store.bookings().unwrap().is_empty());
    }

    #[tokio::test]
    async fn past_dates_and_holidays_are_invalid_dates() {
        let store = MemoryStore::new();
        let t = slot(&store, 3).await;
        let c = controller(&store);

        let mut past = test_drive(t.id, Uuid::new_v4());
        past.date = date!(2029 - 12 - 31);
        assert_eq!(code(&c.admit(past).await.unwrap()), Some(RejectionCode::InvalidDate));

        store
            .create_holiday(&CreateHolidayRequest {
                name: "Staff day".into(),
                date: MONDAY,
                is_recurring: false,
            })
            .await
            .unwrap();
        let outcome = c.admit(test_drive(t.id, Uuid::new_v4())).await.unwrap();
        assert_eq!(code(&outcome), Some(RejectionCode::InvalidDate));
    }

    #[tokio::test]
    async fn unknown_inactive_or_misdated_slots_are_invalid_slots() {
        let store = MemoryStore::new();
        let t = slot(&store, 3).await;
        let c = controller(&store);

        let unknown = test_drive(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(code(&c.admit(unknown).await.unwrap()), Some(RejectionCode::InvalidSlot));

        let mut tuesday = test_drive(t.id, Uuid::new_v4());
        tuesday.date = date!(2030 - 01 - 08);
        assert_eq!(code(&c.admit(tuesday).await.unwrap()), Some(RejectionCode::InvalidSlot));

        let service_only = store
            .create_template(&CreateTimeSlotRequest {
                day_of_week: 1,
                start_time: time!(11:00),
                end_time: time!(12:00),
                max_bookings: 3,
                booking_type: Some(BookingType::Service),
                label: None,
            })
            .await
            .unwrap();
        let wrong_type = test_drive(service_only.id, Uuid::new_v4());
        assert_eq!(code(&c.admit(wrong_type).await.unwrap()), Some(RejectionCode::InvalidSlot));

        store
            .update_template(
                t.id,
                &UpdateTimeSlotRequest {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let inactive = test_drive(t.id, Uuid::new_v4());
        assert_eq!(code(&c.admit(inactive).await.unwrap()), Some(RejectionCode::InvalidSlot));
    }

    #[tokio::test]
    async fn zero_capacity_slot_is_full_not_an_error() {
        let store = MemoryStore::new();
        let t = slot(&store, 0).await;
        let outcome = controller(&store)
            .admit(test_drive(t.id, Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(code(&outcome), Some(RejectionCode::SlotFull));
    }

    fn controller_with(
        store: &MemoryStore,
        locks: SlotLocks,
        notifier: Arc<dyn crate::notify::Notifier>,
    ) -> AdmissionController {
        let shared = Arc::new(store.clone());
        AdmissionController::new(
            shared.clone(),
            shared,
            locks,
            Arc::new(FixedClock(TODAY)),
            BookingStatus::Pending,
            NotificationDispatcher::new(notifier, 3, Duration::from_millis(1)),
        )
    }

    /// Parks an admission behind a held slot lock, runs `change`, then
    /// releases the lock and returns the outcome.
    async fn admit_after_change<F, Fut>(
        store: &MemoryStore,
        req: BookingRequest,
        slot_id: Uuid,
        change: F,
    ) -> AdmissionOutcome
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let locks = SlotLocks::new(Duration::from_secs(5));
        let c = controller_with(store, locks.clone(), Arc::new(LogNotifier));
        let held = locks
            .acquire(SlotInstanceKey {
                date: MONDAY,
                slot_id,
            })
            .await
            .unwrap();

        let pending = tokio::spawn(async move { c.admit(req).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        change().await;
        drop(held);

        pending.await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn holiday_added_while_waiting_for_the_slot_is_honoured() {
        let store = MemoryStore::new();
        let t = slot(&store, 3).await;
        let outcome = admit_after_change(&store, test_drive(t.id, Uuid::new_v4()), t.id, || async {
            store
                .create_holiday(&CreateHolidayRequest {
                    name: "Snow day".into(),
                    date: MONDAY,
                    is_recurring: false,
                })
                .await
                .unwrap();
        })
        .await;

        assert_eq!(code(&outcome), Some(RejectionCode::InvalidDate));
        assert!(store.bookings().unwrap().is_empty());
    }

    #[tokio::test]
    async fn type_restriction_added_while_waiting_is_honoured() {
        let store = MemoryStore::new();
        let t = slot(&store, 3).await;
        let outcome = admit_after_change(&store, test_drive(t.id, Uuid::new_v4()), t.id, || async {
            store
                .update_template(
                    t.id,
                    &UpdateTimeSlotRequest {
                        booking_type: Some(Some(BookingType::Service)),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        })
        .await;

        assert_eq!(code(&outcome), Some(RejectionCode::InvalidSlot));
        assert!(store.bookings().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_caller_still_commits() {
        let store = MemoryStore::new();
        let t = slot(&store, 3).await;
        let locks = SlotLocks::new(Duration::from_secs(5));
        let c = controller_with(&store, locks.clone(), Arc::new(LogNotifier));
        let held = locks
            .acquire(SlotInstanceKey {
                date: MONDAY,
                slot_id: t.id,
            })
            .await
            .unwrap();

        let req = test_drive(t.id, Uuid::new_v4());
        let caller = tokio::spawn(async move { c.admit(req).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());
        drop(held);

        let mut rows = 0;
        for _ in 0..50 {
            rows = store.bookings().unwrap().len();
            if rows == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(rows, 1);
        assert_eq!(
            BookingStore::count_non_terminal(
                &store,
                SlotInstanceKey {
                    date: MONDAY,
                    slot_id: t.id
                }
            )
            .await
            .unwrap(),
            1
        );
    }

    struct AlwaysFails {
        attempts: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl crate::notify::Notifier for AlwaysFails {
        async fn notify(&self, _: &BookingNotification) -> anyhow::Result<()> {
            self.attempts
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            anyhow::bail!("relay down")
        }
    }

    #[tokio::test]
    async fn failed_notifications_keep_the_booking() {
        let store = MemoryStore::new();
        let t = slot(&store, 3).await;
        let notifier = Arc::new(AlwaysFails {
            attempts: Default::default(),
        });
        let c = controller_with(&store, SlotLocks::new(Duration::from_secs(5)), notifier.clone());

        let outcome = c.admit(test_drive(t.id, Uuid::new_v4())).await.unwrap();
        assert!(code(&outcome).is_none());

        // Two messages, three attempts each.
        for _ in 0..50 {
            if notifier.attempts.load(std::sync::atomic::Ordering::SeqCst) == 6 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(notifier.attempts.load(std::sync::atomic::Ordering::SeqCst), 6);
        assert_eq!(store.bookings().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn held_slot_times_out_as_retryable() {
        let store = MemoryStore::new();
        let t = slot(&store, 3).await;
        let locks = SlotLocks::new(Duration::from_millis(50));
        let shared = Arc::new(store.clone());
        let c = AdmissionController::new(
            shared.clone(),
            shared,
            locks.clone(),
            Arc::new(FixedClock(TODAY)),
            BookingStatus::Pending,
            NotificationDispatcher::new(Arc::new(LogNotifier), 1, Duration::from_millis(1)),
        );

        let _held = locks
            .acquire(SlotInstanceKey {
                date: MONDAY,
                slot_id: t.id,
            })
            .await
            .unwrap();
        let err = c.admit(test_drive(t.id, Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
        assert!(store.bookings().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_admissions_never_exceed_capacity() {
        let store = MemoryStore::new();
        let t = slot(&store, 3).await;
        let c = controller(&store);

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let c = c.clone();
                let req = test_drive(t.id, Uuid::new_v4());
                tokio::spawn(async move { c.admit(req).await })
            })
            .collect();

        let mut admitted = 0;
        let mut full = 0;
        for h in handles {
            match code(&h.await.unwrap().unwrap()) {
                None => admitted += 1,
                Some(RejectionCode::SlotFull) => full += 1,
                Some(other) => panic!("unexpected rejection {:?}", other),
            }
        }
        assert_eq!(admitted, 3);
        assert_eq!(full, 9);
        assert_eq!(store.bookings().unwrap().len(), 3);
    }
}
