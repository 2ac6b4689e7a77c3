//! Shard read endpoint

use super::{error_response, ApiState};
use crate::schema::Sample;
use crate::storage::ShardKey;
use crate::Error;

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

/// Return one day of samples for `thing`
///
/// GET /read/:thing/:year/:month/:day.json
///
/// Unions the on-disk shard with samples still waiting in the write buffer.
/// An empty result is a `404` whose body is still a valid (empty) JSON array.
pub async fn read_shard(
    State(state): State<ApiState>,
    Path((thing, year, month, day)): Path<(String, String, String, String)>,
) -> Response {
    let mut response = read_inner(&state, thing, &year, &month, &day).await;
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

async fn read_inner(
    state: &ApiState,
    thing: String,
    year: &str,
    month: &str,
    day: &str,
) -> Response {
    let Some(day) = day.strip_suffix(".json") else {
        return error_response(StatusCode::NOT_FOUND, "not found");
    };

    let Ok((y, m, d)) = parse_date(year, month, day) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid numbers in date");
    };
    // Numeric but not a calendar day: no shard can exist for it.
    let key = match ShardKey::from_parts(thing, y, m, d) {
        Ok(key) => key,
        Err(_) => return not_found(),
    };

    match state.ingester.read(&key).await {
        Ok(samples) if samples.is_empty() => not_found(),
        Ok(samples) => Json(samples).into_response(),
        Err(Error::InvalidThing(_)) => error_response(StatusCode::BAD_REQUEST, "invalid thing name"),
        Err(e) => {
            error!(thing = %key.thing, date = %key.date, error = %e, "Read failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// `404` with an empty JSON array body
fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(Vec::<Sample>::new())).into_response()
}

fn parse_date(year: &str, month: &str, day: &str) -> crate::Result<(i32, u32, u32)> {
    let invalid = || Error::InvalidDate(format!("{}/{}/{}", year, month, day));
    let y = year.parse::<i32>().map_err(|_| invalid())?;
    let m = month.parse::<u32>().map_err(|_| invalid())?;
    let d = day.parse::<u32>().map_err(|_| invalid())?;
    Ok((y, m, d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_accepts_padded_numbers() {
        assert_eq!(parse_date("2024", "03", "01").unwrap(), (2024, 3, 1));
        assert!(parse_date("2024", "march", "01").is_err());
        assert!(parse_date("2024", "03", "-1").is_err());
    }
}
