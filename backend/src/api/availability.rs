use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use uuid::Uuid;

use crate::{
    error::Result,
    models::availability::{AvailabilityQuery, CapacityCheck, CapacityQuery, SlotInstance},
    scheduling::{AvailabilityResolver, Clock},
};

/// Bookable slot instances for one date. Past dates have nothing bookable.
pub async fn list(
    State(resolver): State<AvailabilityResolver>,
    State(clock): State<Arc<dyn Clock>>,
    Query(q): Query<AvailabilityQuery>,
) -> Result<Json<Vec<SlotInstance>>> {
    if q.date < clock.today() {
        return Ok(Json(Vec::new()));
    }
    let slots = resolver.resolve_day(q.date, q.booking_type).await?;
    Ok(Json(slots))
}

pub async fn check(
    State(resolver): State<AvailabilityResolver>,
    Query(q): Query<CapacityQuery>,
) -> Result<Json<CapacityCheck>> {
    // A key that cannot name a template has no capacity.
    let Ok(slot_key) = Uuid::parse_str(q.slot_key.trim()) else {
        return Ok(Json(CapacityCheck::UNAVAILABLE));
    };
    let check = resolver.check_capacity(q.date, slot_key).await?;
    Ok(Json(check))
}
