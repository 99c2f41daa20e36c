//! Thin client for the OSRM routing service.
//!
//! One call, one route lookup: `GET {base}/route/v1/{profile}/{start};{end}`
//! with geometry output disabled. The client separates transient failures
//! (timeouts, HTTP error statuses) from fatal ones so callers can apply
//! their own retry policy.

use std::time::Duration;

use serde::Deserialize;

/// Failure modes of one route lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// Timeout or HTTP error status; worth retrying.
    Transient(String),
    /// Transport failure or unusable response body; retrying won't help.
    Fatal(String),
}

impl std::fmt::Display for RouteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(msg) | Self::Fatal(msg) => write!(f, "{msg}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    routes: Vec<RouteLeg>,
}

#[derive(Debug, Deserialize)]
struct RouteLeg {
    duration: f64,
}

/// HTTP client for OSRM route queries.
#[derive(Debug, Clone)]
pub struct OsrmClient {
    http: reqwest::Client,
    base_url: String,
}

impl OsrmClient {
    /// Creates a client against the given OSRM base URL (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Fetches the duration in seconds of the fastest route.
    ///
    /// `start` and `end` are `lon,lat` coordinate pairs. `timeout` bounds
    /// the whole request.
    ///
    /// # Errors
    ///
    /// [`RouteError::Transient`] on timeout or an HTTP error status,
    /// [`RouteError::Fatal`] on any other transport failure, an
    /// undecodable body, or an empty route list.
    pub async fn route_duration(
        &self,
        profile: &str,
        start: &str,
        end: &str,
        timeout: Duration,
    ) -> Result<f64, RouteError> {
        let url = format!("{}/route/v1/{profile}/{start};{end}", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("overview", "false"),
                ("alternatives", "false"),
                ("steps", "false"),
            ])
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    RouteError::Transient(format!("OSRM request timed out: {err}"))
                } else {
                    RouteError::Fatal(format!("OSRM request failed: {err}"))
                }
            })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(RouteError::Transient(format!(
                "OSRM returned status {status}"
            )));
        }

        let parsed: RouteResponse = response
            .json()
            .await
            .map_err(|err| RouteError::Fatal(format!("undecodable OSRM response: {err}")))?;
        parsed
            .routes
            .first()
            .map(|leg| leg.duration)
            .ok_or_else(|| RouteError::Fatal("OSRM response contained no routes".to_string()))
    }
}
