//! Travel-time task: duration of the fastest route between two points.
//!
//! Retries transient OSRM failures up to `max_retries` times with a short
//! pause between attempts, publishing a sub-100 progress percentage per
//! failed attempt. Only success reports 100.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use super::osrm::{OsrmClient, RouteError};
use crate::error::TaskFailure;
use crate::progress::ProgressReporter;
use crate::schema::{FieldKind, InputSchema, TaskInput};

/// Coordinate pair shape: `lon,lat`, both with a decimal point.
pub const LON_LAT_PATTERN: &str = r"^-?\d+\.\d+,-?\d+\.\d+$";

fn default_profile() -> String {
    "driving".to_string()
}

const fn default_max_retries() -> u32 {
    10
}

const fn default_timeout_seconds() -> f64 {
    5.0
}

const fn default_retry_pause_seconds() -> f64 {
    0.2
}

/// Input for the travel-time task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelTimeInput {
    /// Start point as `lon,lat`, e.g. `-122.4194,37.7749`.
    pub start_lon_lat: String,
    /// End point as `lon,lat`, e.g. `-118.2437,34.0522`.
    pub end_lon_lat: String,
    /// OSRM profile: `driving`, `walking`, or `cycling`.
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Attempts before giving up on transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-request timeout.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    /// Pause between attempts.
    #[serde(default = "default_retry_pause_seconds")]
    pub retry_pause_seconds: f64,
}

impl TravelTimeInput {
    /// Builds an input between two coordinate pairs with default knobs.
    pub fn between(start_lon_lat: impl Into<String>, end_lon_lat: impl Into<String>) -> Self {
        Self {
            start_lon_lat: start_lon_lat.into(),
            end_lon_lat: end_lon_lat.into(),
            profile: default_profile(),
            max_retries: default_max_retries(),
            timeout_seconds: default_timeout_seconds(),
            retry_pause_seconds: default_retry_pause_seconds(),
        }
    }
}

impl TaskInput for TravelTimeInput {
    fn schema() -> InputSchema {
        InputSchema::new()
            .required("start_lon_lat", FieldKind::string_matching(LON_LAT_PATTERN))
            .required("end_lon_lat", FieldKind::string_matching(LON_LAT_PATTERN))
            .optional("profile", FieldKind::string())
            .optional("max_retries", FieldKind::integer_in(Some(0), None))
            .optional("timeout_seconds", FieldKind::number_in(Some(0.0), None))
            .optional("retry_pause_seconds", FieldKind::number_in(Some(0.0), None))
    }
}

/// Result of the travel-time task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TravelTimeResult {
    /// Route duration in seconds.
    pub duration: f64,
    /// The profile the duration was computed for.
    pub profile: String,
}

/// Fetches the travel time, retrying transient failures.
///
/// `progress` is optional so composite tasks can call this inline without
/// their sub-lookups writing over the composite's own progress.
pub async fn fetch_travel_time(
    client: &OsrmClient,
    input: &TravelTimeInput,
    progress: Option<&ProgressReporter>,
) -> Result<TravelTimeResult, TaskFailure> {
    let attempts = input.max_retries.max(1);
    // The schema only bounds these below; out-of-range floats surface as a
    // task failure rather than aborting the handler or worker.
    let timeout = seconds(input.timeout_seconds, "timeout_seconds")?;
    let pause = seconds(input.retry_pause_seconds, "retry_pause_seconds")?;

    for attempt in 1..=attempts {
        match client
            .route_duration(
                &input.profile,
                &input.start_lon_lat,
                &input.end_lon_lat,
                timeout,
            )
            .await
        {
            Ok(duration) => {
                report(progress, 100).await?;
                return Ok(TravelTimeResult {
                    duration,
                    profile: input.profile.clone(),
                });
            },
            Err(RouteError::Transient(_)) => {
                let percent = (u64::from(attempt) * 100 / u64::from(attempts)) as u8;
                report(progress, percent.min(99)).await?;
                sleep(pause).await;
            },
            Err(RouteError::Fatal(message)) => return Err(TaskFailure::new(message)),
        }
    }

    Err(TaskFailure::new(
        "failed to fetch travel time from OSRM after retries",
    ))
}

fn seconds(value: f64, field: &str) -> Result<Duration, TaskFailure> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| TaskFailure::new(format!("{field} of {value} is not a usable duration")))
}

async fn report(progress: Option<&ProgressReporter>, percent: u8) -> Result<(), TaskFailure> {
    match progress {
        Some(reporter) => Ok(reporter.report(percent).await?),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::validate;
    use regex::Regex;
    use serde_json::json;

    #[test]
    fn lon_lat_pattern_accepts_signed_decimals() {
        let re = Regex::new(LON_LAT_PATTERN).unwrap();
        assert!(re.is_match("-122.4194,37.7749"));
        assert!(re.is_match("0.0,-0.1"));
        assert!(!re.is_match("122,37"));
        assert!(!re.is_match("not-coords"));
        assert!(!re.is_match("-122.4194;37.7749"));
    }

    #[test]
    fn schema_rejects_malformed_coordinates() {
        let issues = validate(
            &TravelTimeInput::schema(),
            &json!({"start_lon_lat": "abc", "end_lon_lat": "-118.2437,34.0522"}),
        )
        .unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].loc, vec!["start_lon_lat"]);
        assert_eq!(issues[0].kind, "pattern_mismatch");
    }

    #[tokio::test]
    async fn oversized_timeout_fails_instead_of_aborting() {
        // Only a lower bound is declared, so a huge float passes the schema.
        let body = json!({
            "start_lon_lat": "-122.4194,37.7749",
            "end_lon_lat": "-118.2437,34.0522",
            "timeout_seconds": 1e30
        });
        assert!(validate(&TravelTimeInput::schema(), &body).is_ok());

        let input: TravelTimeInput = serde_json::from_value(body).unwrap();
        let client = OsrmClient::new("http://127.0.0.1:1");
        let err = fetch_travel_time(&client, &input, None).await.unwrap_err();
        assert!(err.message().contains("timeout_seconds"));
    }

    #[tokio::test]
    async fn oversized_retry_pause_fails_instead_of_aborting() {
        let input: TravelTimeInput = serde_json::from_value(json!({
            "start_lon_lat": "-122.4194,37.7749",
            "end_lon_lat": "-118.2437,34.0522",
            "retry_pause_seconds": 1e30
        }))
        .unwrap();
        let client = OsrmClient::new("http://127.0.0.1:1");
        let err = fetch_travel_time(&client, &input, None).await.unwrap_err();
        assert!(err.message().contains("retry_pause_seconds"));
    }

    #[test]
    fn optional_knobs_deserialize_to_defaults() {
        let input: TravelTimeInput = serde_json::from_value(json!({
            "start_lon_lat": "-122.4194,37.7749",
            "end_lon_lat": "-118.2437,34.0522"
        }))
        .unwrap();
        assert_eq!(input.profile, "driving");
        assert_eq!(input.max_retries, 10);
        assert_eq!(input.timeout_seconds, 5.0);
        assert_eq!(input.retry_pause_seconds, 0.2);
    }
}
