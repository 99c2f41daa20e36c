//! Built-in task bodies and their registration.

pub mod optimal_route;
pub mod osrm;
pub mod travel_time;

use std::sync::Arc;

use osrm::OsrmClient;

use crate::registry::{RegistryError, TaskRegistry};

/// Registers the built-in routing tasks.
///
/// Called once from each binary's startup routine; keeping registration
/// explicit here means the set of live endpoints is visible in one place.
pub fn register_builtin(
    registry: &mut TaskRegistry,
    osrm: Arc<OsrmClient>,
) -> Result<(), RegistryError> {
    let client = osrm.clone();
    registry.register(
        "travel-time",
        move |input: travel_time::TravelTimeInput, progress| {
            let client = client.clone();
            Box::pin(async move {
                travel_time::fetch_travel_time(&client, &input, Some(&progress)).await
            })
        },
    )?;

    let client = osrm;
    registry.register(
        "optimal-route",
        move |input: optimal_route::OptimalRouteInput, progress| {
            let client = client.clone();
            Box::pin(async move { optimal_route::optimal_route(client, input, progress).await })
        },
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tasks_register_under_their_route_names() {
        let mut registry = TaskRegistry::new();
        register_builtin(&mut registry, Arc::new(OsrmClient::new("http://localhost:5000")))
            .unwrap();
        let sealed = registry.seal();
        assert!(sealed.get("travel-time").is_some());
        assert!(sealed.get("optimal-route").is_some());
        assert_eq!(sealed.len(), 2);
    }
}
