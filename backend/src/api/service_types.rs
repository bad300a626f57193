use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::{
    error::Result,
    models::calendar::{CreateServiceTypeRequest, ServiceType},
    store::CalendarStore,
};

pub async fn list(State(calendar): State<Arc<dyn CalendarStore>>) -> Result<Json<Vec<ServiceType>>> {
    Ok(Json(calendar.list_service_types().await?))
}

pub async fn create(
    State(calendar): State<Arc<dyn CalendarStore>>,
    Json(req): Json<CreateServiceTypeRequest>,
) -> Result<(StatusCode, Json<ServiceType>)> {
    req.validate()?;
    let row = calendar.create_service_type(&req).await?;
    Ok((StatusCode::CREATED, Json(row)))
}
