//! Startup consistency check between registered routes and declared paths.

use crate::errors::MissingEndpointsError;
use crate::framework::{canonical_pattern, Router};
use crate::registry::ApiRegistry;
use std::collections::{BTreeMap, HashSet};
use tracing::info;

/// Route pattern with a server prefix removed. `None` when no prefix
/// applies.
fn strip_prefix(pattern: &str, prefixes: &[String]) -> Option<String> {
    prefixes.iter().find_map(|prefix| {
        pattern
            .strip_prefix(prefix.as_str())
            .filter(|rest| rest.starts_with('/'))
            .map(str::to_string)
    })
}

/// Verify every declared path has a route and build the route to API map.
///
/// With `enabled == false` the missing-path check is skipped but the map is
/// still built. Routes matched through a server prefix take precedence over
/// routes matched by their raw pattern.
pub fn check_endpoints(
    registry: &ApiRegistry,
    router: &Router,
    enabled: bool,
) -> Result<BTreeMap<String, String>, MissingEndpointsError> {
    let mut route_apis = BTreeMap::new();
    if registry.is_empty() {
        info!("No API specification registered, skipping endpoint validation");
        return Ok(route_apis);
    }
    if !enabled {
        info!("Endpoint validation against specification is disabled");
    }

    let mut missing = Vec::new();
    let mut raw_matches: Vec<(String, String)> = Vec::new();
    for entry in registry.iter() {
        let declared: HashSet<&str> = entry.spec.paths().collect();
        let mut covered: HashSet<String> = HashSet::new();

        for route in router.routes() {
            let pattern = canonical_pattern(&route.pattern);
            if let Some(stripped) = strip_prefix(&pattern, entry.spec.server_prefixes()) {
                if declared.contains(stripped.as_str()) {
                    route_apis.insert(route.name.clone(), entry.name.clone());
                    covered.insert(stripped);
                    continue;
                }
            }
            if declared.contains(pattern.as_str()) {
                raw_matches.push((route.name.clone(), entry.name.clone()));
                covered.insert(pattern);
            }
        }

        missing.extend(
            entry
                .spec
                .paths()
                .filter(|path| !covered.contains(*path))
                .map(str::to_string),
        );
    }
    for (route, api) in raw_matches {
        route_apis.entry(route).or_insert(api);
    }

    if enabled && !missing.is_empty() {
        return Err(MissingEndpointsError { missing });
    }
    info!(routes = route_apis.len(), apis = registry.len(), "Routes mapped to APIs");
    Ok(route_apis)
}
