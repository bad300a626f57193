use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, Result},
    models::calendar::{
        CreateHolidayRequest, CreateTimeSlotRequest, Holiday, TimeSlotTemplate,
        UpdateTimeSlotRequest,
    },
    store::CalendarStore,
};

pub async fn list_time_slots(
    State(calendar): State<Arc<dyn CalendarStore>>,
) -> Result<Json<Vec<TimeSlotTemplate>>> {
    Ok(Json(calendar.list_templates().await?))
}

pub async fn create_time_slot(
    State(calendar): State<Arc<dyn CalendarStore>>,
    Json(req): Json<CreateTimeSlotRequest>,
) -> Result<(StatusCode, Json<TimeSlotTemplate>)> {
    req.validate()?;
    let row = calendar.create_template(&req).await?;
    tracing::info!(slot = %row.id, day_of_week = row.day_of_week, "Time slot created");
    Ok((StatusCode::CREATED, Json(row)))
}

/// Partial update. Existing bookings keep their units even when capacity
/// drops below the booked count.
pub async fn update_time_slot(
    State(calendar): State<Arc<dyn CalendarStore>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTimeSlotRequest>,
) -> Result<Json<TimeSlotTemplate>> {
    req.validate()?;
    let row = calendar
        .update_template(id, &req)
        .await?
        .ok_or_else(|| AppError::NotFound("Time slot not found".into()))?;
    Ok(Json(row))
}

pub async fn list_holidays(
    State(calendar): State<Arc<dyn CalendarStore>>,
) -> Result<Json<Vec<Holiday>>> {
    Ok(Json(calendar.list_holidays().await?))
}

pub async fn create_holiday(
    State(calendar): State<Arc<dyn CalendarStore>>,
    Json(req): Json<CreateHolidayRequest>,
) -> Result<(StatusCode, Json<Holiday>)> {
    req.validate()?;
    let row = calendar.create_holiday(&req).await?;
    tracing::info!(holiday = %row.id, date = %row.date, recurring = row.is_recurring, "Holiday created");
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn delete_holiday(
    State(calendar): State<Arc<dyn CalendarStore>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    if !calendar.delete_holiday(id).await? {
        return Err(AppError::NotFound("Holiday not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}
