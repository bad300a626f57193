use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::{
    error::Result,
    models::booking::{AdmissionOutcome, BookingRequest, Rejection},
    scheduling::AdmissionController,
};

pub async fn create(
    State(admission): State<AdmissionController>,
    body: std::result::Result<Json<BookingRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(req) = match body {
        Ok(body) => body,
        Err(e) => return Ok(Rejection::validation(e.body_text()).into_response()),
    };

    let response = match admission.admit(req).await? {
        AdmissionOutcome::Admitted(result) => (StatusCode::CREATED, Json(result)).into_response(),
        AdmissionOutcome::Rejected(rejection) => rejection.into_response(),
    };
    Ok(response)
}
