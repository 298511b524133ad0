use std::collections::HashSet;

use tracing::{error, info};

use crate::{
    error::{Error, Result},
    metrics::ROUTE_SERVERS_COUNTER,
    net::Request,
};

use super::{api_url, ixp_host, json_id, LookingGlass, RouteServer};

impl LookingGlass {
    /// List the route servers of one IXP. Without these there is nothing to
    /// walk, so any failure here ends the run for this IXP.
    pub async fn route_servers(&self, base: &str) -> Result<Vec<RouteServer>> {
        let url = api_url(base, "routeservers");
        let fatal = |reason: String| {
            error!(ixp = base, %url, "route server discovery failed: {reason}");
            Error::FatalDiscovery {
                ixp: base.to_string(),
                reason,
            }
        };

        let resp = self
            .transport
            .request(&Request::get(&url, self.settings.timeout))
            .await
            .map_err(|e| fatal(e.to_string()))?;
        if !resp.is_success() {
            return Err(fatal(format!("HTTP {}", resp.status)));
        }

        let data = resp.json(&url).map_err(|e| fatal(e.to_string()))?;
        let route_servers = parse_route_servers(ixp_host(base), &data).map_err(fatal)?;

        info!(ixp = base, count = route_servers.len(), "found route servers");
        ROUTE_SERVERS_COUNTER
            .with_label_values(&[ixp_host(base)])
            .inc_by(route_servers.len() as u64);

        Ok(route_servers)
    }
}

fn parse_route_servers(
    host: &str,
    data: &serde_json::Value,
) -> std::result::Result<Vec<RouteServer>, String> {
    let list = data
        .get("routeservers")
        .and_then(|s| s.as_array())
        .ok_or("missing routeservers list")?;

    let mut seen = HashSet::new();
    let mut route_servers = Vec::with_capacity(list.len());
    for rs in list {
        let id = rs
            .get("id")
            .and_then(json_id)
            .ok_or("route server without an id")?;
        if !seen.insert(id.clone()) {
            continue;
        }
        // some looking glasses don't group their route servers at all
        let group = rs
            .get("group")
            .and_then(|g| g.as_str())
            .unwrap_or_default();
        route_servers.push(RouteServer {
            id,
            group: format!("{host} => {group}"),
        });
    }

    Ok(route_servers)
}
