//! `anyhow::Error` -> HTTP response mapping, a direct generalization of the
//! teacher's `dog_axum::error::DogAxumError`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use klipnote_core::KlipError;

#[derive(Debug)]
pub struct KlipAxumError(pub anyhow::Error);

impl From<anyhow::Error> for KlipAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for KlipAxumError {
    fn into_response(self) -> Response {
        let klip = KlipError::from_anyhow(&self.0)
            .map(|k| k.sanitize_for_client())
            .unwrap_or_else(|| KlipError::general_error("internal error").sanitize_for_client());

        if KlipError::from_anyhow(&self.0).is_none() {
            tracing::error!(error = %self.0, "unclassified error reached the HTTP boundary");
        }

        let status = StatusCode::from_u16(klip.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(klip.to_json())).into_response()
    }
}
