//! Response error mapping.
//!
//! # Responsibilities
//! - Map per-response filter failures to HTTP status codes
//!
//! # Design Decisions
//! - Failures are contained to the response they happened on
//! - An upstream body that fails before headers were released is a 502

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::filter::FilterError;

impl FilterError {
    pub fn status(&self) -> StatusCode {
        match self {
            FilterError::Body(_) => StatusCode::BAD_GATEWAY,
            FilterError::HeadersAlreadySent
            | FilterError::BodyBeforeHeaders
            | FilterError::HeadersWithheld
            | FilterError::HeaderCapacity(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for FilterError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, status.canonical_reason().unwrap_or("Error")).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            FilterError::HeadersWithheld.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            FilterError::Body(axum::Error::new("reset")).into_response().status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
