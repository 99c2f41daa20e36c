//! Optimal-route task: cheapest visiting order for a set of stops.
//!
//! Fetches the travel time for every ordered pair of locations that could
//! appear as a leg, then evaluates every stop ordering between the fixed
//! origin and destination. Exhaustive search -- fine for the handful of
//! stops this task is meant for.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::osrm::OsrmClient;
use super::travel_time::{fetch_travel_time, TravelTimeInput};
use crate::error::TaskFailure;
use crate::progress::ProgressReporter;
use crate::schema::{FieldKind, InputSchema, TaskInput};

/// A named point on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    /// Display address; also the key in the `travel_times` mapping.
    pub address: String,
}

impl Location {
    /// The `lon,lat` coordinate string OSRM expects.
    fn lon_lat(&self) -> String {
        format!("{},{}", self.lon, self.lat)
    }
}

fn location_schema() -> InputSchema {
    InputSchema::new()
        .required("lat", FieldKind::number())
        .required("lon", FieldKind::number())
        .required("address", FieldKind::string())
}

/// Input for the optimal-route task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimalRouteInput {
    pub origin: Location,
    pub destination: Location,
    pub stops: Vec<Location>,
}

impl TaskInput for OptimalRouteInput {
    fn schema() -> InputSchema {
        InputSchema::new()
            .required("origin", FieldKind::Object(location_schema()))
            .required("destination", FieldKind::Object(location_schema()))
            .required(
                "stops",
                FieldKind::Array(Box::new(FieldKind::Object(location_schema()))),
            )
    }
}

/// Travel times between every fetched ordered pair, keyed by address.
pub type TravelTimes = BTreeMap<String, BTreeMap<String, f64>>;

/// Result of the optimal-route task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimalRouteResult {
    /// Seconds for each ordered `(start address, end address)` pair tried.
    pub travel_times: TravelTimes,
    /// The cheapest route, origin first, destination last.
    pub best_route: Vec<Location>,
}

/// Runs the optimal-route search.
///
/// Pair lookups reuse the travel-time task inline with default retry
/// knobs; their progress callbacks are suppressed so only this task's own
/// percentage reaches the job record.
pub async fn optimal_route(
    client: Arc<OsrmClient>,
    input: OptimalRouteInput,
    progress: ProgressReporter,
) -> Result<OptimalRouteResult, TaskFailure> {
    let mut locations = vec![input.origin.clone(), input.destination.clone()];
    locations.extend(input.stops.iter().cloned());

    let mut pairs = Vec::new();
    for start in &locations {
        for end in &locations {
            if start == end {
                continue;
            }
            // Legs that can never appear in a valid route: nothing leaves
            // the destination and nothing arrives at the origin. The
            // direct origin-to-destination leg is only needed when there
            // are no stops.
            if start == &input.destination || end == &input.origin {
                continue;
            }
            if start == &input.origin && end == &input.destination && !input.stops.is_empty() {
                continue;
            }
            pairs.push((start.clone(), end.clone()));
        }
    }

    let mut travel_times = TravelTimes::new();
    for (fetched, (start, end)) in pairs.iter().enumerate() {
        let lookup = TravelTimeInput::between(start.lon_lat(), end.lon_lat());
        let duration = fetch_travel_time(&client, &lookup, None).await?.duration;
        travel_times
            .entry(start.address.clone())
            .or_default()
            .insert(end.address.clone(), duration);

        let percent = ((fetched + 1) * 100 / pairs.len()) as u8;
        progress.report(percent.min(99)).await?;
    }

    let best_route = plan_best_route(&travel_times, &input.origin, &input.destination, &input.stops)?;
    Ok(OptimalRouteResult {
        travel_times,
        best_route,
    })
}

/// Picks the cheapest stop ordering from already-fetched travel times.
///
/// Pure so route selection is testable without a routing service.
pub fn plan_best_route(
    travel_times: &TravelTimes,
    origin: &Location,
    destination: &Location,
    stops: &[Location],
) -> Result<Vec<Location>, TaskFailure> {
    let mut best: Option<(f64, Vec<Location>)> = None;

    for order in permutations(stops.len()) {
        let mut route = Vec::with_capacity(stops.len() + 2);
        route.push(origin.clone());
        route.extend(order.iter().map(|&i| stops[i].clone()));
        route.push(destination.clone());

        let total = route_total_duration(&route, travel_times)?;
        if best.as_ref().is_none_or(|(cost, _)| total < *cost) {
            best = Some((total, route));
        }
    }

    best.map(|(_, route)| route)
        .ok_or_else(|| TaskFailure::new("unable to find the best route"))
}

/// Sums leg durations along a route.
fn route_total_duration(route: &[Location], travel_times: &TravelTimes) -> Result<f64, TaskFailure> {
    let mut total = 0.0;
    for leg in route.windows(2) {
        let duration = travel_times
            .get(&leg[0].address)
            .and_then(|ends| ends.get(&leg[1].address))
            .ok_or_else(|| {
                TaskFailure::new(format!(
                    "missing travel time for leg '{}' -> '{}'",
                    leg[0].address, leg[1].address
                ))
            })?;
        total += duration;
    }
    Ok(total)
}

/// All orderings of `0..n`. For `n == 0` the single empty ordering.
fn permutations(n: usize) -> Vec<Vec<usize>> {
    fn recurse(remaining: &mut Vec<usize>, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if remaining.is_empty() {
            out.push(current.clone());
            return;
        }
        for i in 0..remaining.len() {
            let picked = remaining.remove(i);
            current.push(picked);
            recurse(remaining, current, out);
            current.pop();
            remaining.insert(i, picked);
        }
    }

    let mut out = Vec::new();
    recurse(&mut (0..n).collect::<Vec<_>>(), &mut Vec::new(), &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn loc(address: &str) -> Location {
        Location {
            lat: 0.0,
            lon: 0.0,
            address: address.to_string(),
        }
    }

    fn times(entries: &[(&str, &str, f64)]) -> TravelTimes {
        let mut map = TravelTimes::new();
        for (start, end, duration) in entries {
            map.entry((*start).to_string())
                .or_default()
                .insert((*end).to_string(), *duration);
        }
        map
    }

    #[test]
    fn permutations_cover_all_orderings() {
        assert_eq!(permutations(0), vec![Vec::<usize>::new()]);
        assert_eq!(permutations(1), vec![vec![0]]);
        let three = permutations(3);
        assert_eq!(three.len(), 6);
        assert!(three.contains(&vec![2, 0, 1]));
    }

    #[test]
    fn plan_picks_cheapest_stop_order() {
        let origin = loc("origin");
        let destination = loc("destination");
        let stops = vec![loc("a"), loc("b")];
        // origin -> b -> a -> destination is cheapest.
        let travel_times = times(&[
            ("origin", "a", 100.0),
            ("origin", "b", 10.0),
            ("a", "b", 100.0),
            ("b", "a", 10.0),
            ("a", "destination", 10.0),
            ("b", "destination", 100.0),
        ]);

        let best = plan_best_route(&travel_times, &origin, &destination, &stops).unwrap();
        let addresses: Vec<&str> = best.iter().map(|l| l.address.as_str()).collect();
        assert_eq!(addresses, vec!["origin", "b", "a", "destination"]);
    }

    #[test]
    fn plan_handles_zero_stops_via_direct_leg() {
        let origin = loc("origin");
        let destination = loc("destination");
        let travel_times = times(&[("origin", "destination", 42.0)]);

        let best = plan_best_route(&travel_times, &origin, &destination, &[]).unwrap();
        let addresses: Vec<&str> = best.iter().map(|l| l.address.as_str()).collect();
        assert_eq!(addresses, vec!["origin", "destination"]);
    }

    #[test]
    fn plan_surfaces_missing_legs() {
        let origin = loc("origin");
        let destination = loc("destination");
        let err =
            plan_best_route(&TravelTimes::new(), &origin, &destination, &[]).unwrap_err();
        assert!(err.message().contains("missing travel time"));
    }

    #[test]
    fn schema_requires_located_stops() {
        let issues = crate::validate::validate(
            &OptimalRouteInput::schema(),
            &serde_json::json!({
                "origin": {"lat": 1.0, "lon": 2.0, "address": "o"},
                "destination": {"lat": 3.0, "lon": 4.0, "address": "d"},
                "stops": [{"lat": 5.0, "lon": 6.0}]
            }),
        )
        .unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].loc, vec!["stops", "0", "address"]);
        assert_eq!(issues[0].kind, "missing");
    }
}
