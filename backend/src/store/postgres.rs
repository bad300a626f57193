use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        booking::{Booking, BookingType, CustomerInfo, InsertOutcome, NewBooking, SlotInstanceKey},
        calendar::{
            CreateHolidayRequest, CreateServiceTypeRequest, CreateTimeSlotRequest, Holiday,
            ServiceType, TimeSlotTemplate, UpdateTimeSlotRequest,
        },
    },
};

use super::{BookingStore, CalendarStore, SlotScope};

const VEHICLE_SLOT_CONSTRAINT: &str = "bookings_vehicle_slot_uniq";

const TEMPLATE_COLUMNS: &str = "id, day_of_week, start_time, end_time, max_bookings, \
     booking_type, label, is_active, created_at";

const BOOKING_COLUMNS: &str = "id, booking_type, date, time_slot_id, vehicle_id, \
     service_type_id, status, customer_id, price_cents, notes, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    /// `lock_timeout` bounds the wait for the cross-instance advisory lock
    /// taken by every slot scope.
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

#[async_trait]
impl CalendarStore for PgStore {
    async fn list_templates(&self) -> Result<Vec<TimeSlotTemplate>> {
        let rows = sqlx::query_as::<_, TimeSlotTemplate>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM time_slots ORDER BY day_of_week, start_time, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_active_templates(&self, day_of_week: i32) -> Result<Vec<TimeSlotTemplate>> {
        let rows = sqlx::query_as::<_, TimeSlotTemplate>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM time_slots \
             WHERE day_of_week = $1 AND is_active = true \
             ORDER BY start_time, id"
        ))
        .bind(day_of_week)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<TimeSlotTemplate>> {
        let row = sqlx::query_as::<_, TimeSlotTemplate>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM time_slots WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_template(&self, req: &CreateTimeSlotRequest) -> Result<TimeSlotTemplate> {
        let row = sqlx::query_as::<_, TimeSlotTemplate>(&format!(
            "INSERT INTO time_slots (id, day_of_week, start_time, end_time, max_bookings, booking_type, label) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {TEMPLATE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(req.day_of_week)
        .bind(req.start_time)
        .bind(req.end_time)
        .bind(req.max_bookings)
        .bind(req.booking_type)
        .bind(&req.label)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_template(
        &self,
        id: Uuid,
        req: &UpdateTimeSlotRequest,
    ) -> Result<Option<TimeSlotTemplate>> {
        let row = sqlx::query_as::<_, TimeSlotTemplate>(&format!(
            "UPDATE time_slots \
             SET max_bookings = COALESCE($2, max_bookings), \
                 is_active    = COALESCE($3, is_active), \
                 booking_type = CASE WHEN $4 THEN $5 ELSE booking_type END, \
                 label        = COALESCE($6, label) \
             WHERE id = $1 \
             RETURNING {TEMPLATE_COLUMNS}"
        ))
        .bind(id)
        .bind(req.max_bookings)
        .bind(req.is_active)
        .bind(req.booking_type.is_some())
        .bind(req.booking_type.flatten())
        .bind(&req.label)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_holidays(&self) -> Result<Vec<Holiday>> {
        let rows = sqlx::query_as::<_, Holiday>(
            "SELECT id, name, date, is_recurring, created_at FROM holidays ORDER BY date, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_holiday(&self, req: &CreateHolidayRequest) -> Result<Holiday> {
        let row = sqlx::query_as::<_, Holiday>(
            r#"
            INSERT INTO holidays (id, name, date, is_recurring)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, date, is_recurring, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&req.name)
        .bind(req.date)
        .bind(req.is_recurring)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_holiday(&self, id: Uuid) -> Result<bool> {
        let rows = sqlx::query("DELETE FROM holidays WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    async fn list_service_types(&self) -> Result<Vec<ServiceType>> {
        let rows = sqlx::query_as::<_, ServiceType>(
            r#"
            SELECT id, name, price_cents, duration_minutes, is_active, created_at
            FROM service_types
            ORDER BY name, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_active_service_types(&self, ids: &[Uuid]) -> Result<Vec<ServiceType>> {
        let rows = sqlx::query_as::<_, ServiceType>(
            r#"
            SELECT id, name, price_cents, duration_minutes, is_active, created_at
            FROM service_types
            WHERE id = ANY($1) AND is_active = true
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_service_type(&self, req: &CreateServiceTypeRequest) -> Result<ServiceType> {
        let row = sqlx::query_as::<_, ServiceType>(
            r#"
            INSERT INTO service_types (id, name, price_cents, duration_minutes)
            VALUES ($1, $2, $3, COALESCE($4, 60))
            RETURNING id, name, price_cents, duration_minutes, is_active, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&req.name)
        .bind(req.price_cents)
        .bind(req.duration_minutes)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn count_non_terminal(&self, key: SlotInstanceKey) -> Result<i64> {
        count_non_terminal(&self.pool, key).await
    }

    async fn begin_slot_scope(&self, key: SlotInstanceKey) -> Result<Box<dyn SlotScope>> {
        let mut tx = self.pool.begin().await?;

        // SET cannot take bind parameters; the value is an integer we format.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        // Serializes admission for this slot instance across every process
        // sharing the database. Released on commit or rollback.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key.to_string())
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PgSlotScope { tx, key }))
    }
}

async fn count_non_terminal<'e, E>(executor: E, key: SlotInstanceKey) -> Result<i64>
where
    E: sqlx::PgExecutor<'e>,
{
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM bookings
        WHERE date = $1
          AND time_slot_id = $2
          AND status IN ('pending', 'confirmed')
        "#,
    )
    .bind(key.date)
    .bind(key.slot_id)
    .fetch_one(executor)
    .await?;
    Ok(count)
}

pub struct PgSlotScope {
    tx: Transaction<'static, Postgres>,
    key: SlotInstanceKey,
}

#[async_trait]
impl SlotScope for PgSlotScope {
    async fn count_non_terminal(&mut self) -> Result<i64> {
        count_non_terminal(&mut *self.tx, self.key).await
    }

    async fn has_vehicle_conflict(&mut self, vehicle_id: Uuid) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM bookings
                WHERE vehicle_id = $1
                  AND date = $2
                  AND time_slot_id = $3
                  AND booking_type = 'test_drive'
                  AND status IN ('pending', 'confirmed')
            )
            "#,
        )
        .bind(vehicle_id)
        .bind(self.key.date)
        .bind(self.key.slot_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn insert_bookings(
        &mut self,
        customer: &CustomerInfo,
        rows: &[NewBooking],
    ) -> Result<InsertOutcome> {
        let customer_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO customers (id, email, name, phone)
            VALUES ($1, lower($2), $3, $4)
            ON CONFLICT (email) DO UPDATE
            SET name       = EXCLUDED.name,
                phone      = COALESCE(EXCLUDED.phone, customers.phone),
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&customer.email)
        .bind(&customer.name)
        .bind(&customer.phone)
        .fetch_one(&mut *self.tx)
        .await?;

        let insert = format!(
            "INSERT INTO bookings \
                 (id, booking_type, date, time_slot_id, vehicle_id, service_type_id, \
                  status, customer_id, price_cents, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {BOOKING_COLUMNS}"
        );

        let mut written = Vec::with_capacity(rows.len());
        for row in rows {
            let result = sqlx::query_as::<_, Booking>(&insert)
                .bind(row.id)
                .bind(row.booking_type)
                .bind(self.key.date)
                .bind(self.key.slot_id)
                .bind(row.vehicle_id)
                .bind(row.service_type_id)
                .bind(row.status)
                .bind(customer_id)
                .bind(row.price_cents)
                .bind(&row.notes)
                .fetch_one(&mut *self.tx)
                .await;

            match result {
                Ok(booking) => written.push(booking),
                // The transaction is now aborted; the caller drops the scope.
                Err(sqlx::Error::Database(db_err))
                    if row.booking_type == BookingType::TestDrive
                        && db_err.constraint() == Some(VEHICLE_SLOT_CONSTRAINT) =>
                {
                    return Ok(InsertOutcome::VehicleConflict);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(InsertOutcome::Inserted(written))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
