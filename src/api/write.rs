//! Sample write endpoint

use super::{error_response, ApiState};
use crate::Error;

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};
use url::form_urlencoded;

/// Buffer one sample for `thing`
///
/// POST /write/:thing?field=value&...
///
/// Every field must be a finite float; otherwise nothing is stored and the
/// response is `400 {"error": "only floats supported"}`. On success the
/// stored sample, including its assigned timestamp, is echoed back.
pub async fn write_sample(
    State(state): State<ApiState>,
    Path(thing): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut pairs: Vec<(String, String)> = query
        .as_deref()
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    if is_form_encoded(&headers) {
        pairs.extend(form_urlencoded::parse(&body).into_owned());
    }

    match state.ingester.write(&thing, pairs) {
        Ok(sample) => Json(sample).into_response(),
        Err(Error::InvalidSample(reason)) => {
            warn!(thing = %thing, %reason, "Rejected write");
            error_response(StatusCode::BAD_REQUEST, "only floats supported")
        }
        Err(Error::InvalidThing(reason)) => {
            warn!(%reason, "Rejected write");
            error_response(StatusCode::BAD_REQUEST, "invalid thing name")
        }
        Err(e) => {
            error!(thing = %thing, error = %e, "Write failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn is_form_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}
