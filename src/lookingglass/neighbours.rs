use tracing::{error, info, warn};

use crate::{
    error::{Error, Result},
    metrics::DEGRADED_COUNTER,
    net::Request,
};

use super::{api_url, json_id, LookingGlass, Neighbours};

impl LookingGlass {
    /// List the BGP neighbours of one route server, in the order the looking
    /// glass returns them. Any failure degrades only this route server.
    pub async fn neighbours(&self, base: &str, route_server: &str) -> Neighbours {
        info!(ixp = base, route_server, "getting neighbours");
        match self.fetch_neighbours(base, route_server).await {
            Ok(ids) => Neighbours::Collected(ids),
            Err(err) => {
                match err {
                    Error::UpstreamDegraded { .. } => {
                        warn!(ixp = base, route_server, "{err}, skipping route server")
                    }
                    _ => error!(ixp = base, route_server, "neighbour discovery failed: {err}"),
                }
                DEGRADED_COUNTER.with_label_values(&["neighbours"]).inc();
                Neighbours::Degraded
            }
        }
    }

    async fn fetch_neighbours(&self, base: &str, route_server: &str) -> Result<Vec<String>> {
        let url = api_url(base, &format!("routeservers/{route_server}/neighbors"));
        let resp = self
            .transport
            .request(&Request::get(&url, self.settings.timeout))
            .await?;
        match resp.status {
            500 => return Err(Error::UpstreamDegraded { url, status: 500 }),
            status if !resp.is_success() => return Err(Error::HttpStatus { url, status }),
            _ => {}
        }

        let data = resp.json(&url)?;
        parse_neighbours(&data).map_err(|reason| Error::schema(&url, reason))
    }
}

/// The listing key is spelled either way depending on the Alice version.
fn parse_neighbours(data: &serde_json::Value) -> std::result::Result<Vec<String>, String> {
    let list = ["neighbors", "neighbours"]
        .iter()
        .find_map(|key| data.get(*key))
        .and_then(|n| n.as_array())
        .ok_or("missing neighbours list")?;

    list.iter()
        .map(|n| {
            n.get("id")
                .and_then(json_id)
                .ok_or_else(|| "neighbour without an id".to_string())
        })
        .collect()
}
