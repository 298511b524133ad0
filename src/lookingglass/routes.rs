use std::collections::BTreeSet;

use tracing::{error, info, warn};

use crate::{
    error::{Error, Result},
    metrics::DEGRADED_COUNTER,
    net::Request,
};

use super::{api_url, LookingGlass, Neighbours, OriginAsns};

impl LookingGlass {
    /// Collect the origin ASNs of every route the route server imported or
    /// filtered from the given neighbours.
    ///
    /// Neighbours are walked one at a time with a pause before each. A 500 or
    /// a network failure for any neighbour abandons the whole route server;
    /// other bad statuses and unreadable bodies only skip that neighbour.
    pub async fn origin_asns(
        &self,
        base: &str,
        route_server: &str,
        neighbours: &Neighbours,
    ) -> OriginAsns {
        let ids = match neighbours {
            Neighbours::Collected(ids) => ids,
            Neighbours::Degraded => {
                warn!(ixp = base, route_server, "no neighbours found, skipping route server");
                return OriginAsns::Degraded;
            }
        };

        let mut asns = BTreeSet::new();
        for neighbour in ids {
            tokio::time::sleep(self.settings.neighbour_pacing).await;
            info!(ixp = base, route_server, neighbour, "getting routes");

            match self.neighbour_origins(base, route_server, neighbour).await {
                Ok(origins) => asns.extend(origins),
                Err(err @ (Error::HttpStatus { .. } | Error::UpstreamSchema { .. })) => {
                    error!(ixp = base, route_server, neighbour, "skipping neighbour: {err}")
                }
                Err(err) => {
                    warn!(ixp = base, route_server, neighbour, "{err}, dropping route server");
                    DEGRADED_COUNTER.with_label_values(&["routes"]).inc();
                    return OriginAsns::Degraded;
                }
            }
        }

        if asns.is_empty() {
            OriginAsns::Empty
        } else {
            OriginAsns::Collected(asns)
        }
    }

    /// Origin ASNs one neighbour contributes. A 500 comes back as
    /// [`Error::UpstreamDegraded`].
    async fn neighbour_origins(
        &self,
        base: &str,
        route_server: &str,
        neighbour: &str,
    ) -> Result<Vec<u32>> {
        let url = api_url(
            base,
            &format!("routeservers/{route_server}/neighbors/{neighbour}/routes"),
        );
        let resp = self
            .transport
            .request(&Request::get(&url, self.settings.routes_timeout))
            .await?;
        match resp.status {
            500 => return Err(Error::UpstreamDegraded { url, status: 500 }),
            status if !resp.is_success() => return Err(Error::HttpStatus { url, status }),
            _ => {}
        }

        let data = resp.json(&url)?;
        extract_origins(&data).map_err(|reason| Error::schema(&url, reason))
    }
}

/// Last hop of the route's AS path.
pub fn origin_asn(route: &serde_json::Value) -> Option<u32> {
    route
        .get("bgp")
        .and_then(|b| b.get("as_path"))
        .and_then(|p| p.as_array())
        .and_then(|p| p.last())
        .and_then(|asn| asn.as_u64())
        .and_then(|asn| u32::try_from(asn).ok())
}

fn extract_origins(data: &serde_json::Value) -> std::result::Result<Vec<u32>, String> {
    let imported = data.get("imported");
    let filtered = data.get("filtered");
    if imported.is_none() && filtered.is_none() {
        return Err("neither imported nor filtered routes present".to_string());
    }

    let mut origins = Vec::new();
    for list in [imported, filtered].into_iter().flatten() {
        let routes = list.as_array().ok_or("route list is not an array")?;
        origins.extend(routes.iter().filter_map(origin_asn));
    }
    Ok(origins)
}
