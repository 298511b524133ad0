//! Client for the Alice-LG looking glass API that IXPs expose in front of
//! their route servers.
//!
//! Every call goes through the shared (retrying) transport. Only route server
//! discovery can fail hard; neighbour and route discovery degrade to
//! [`Neighbours::Degraded`] / [`OriginAsns::Degraded`] so sibling route
//! servers keep going.

mod neighbours;
mod routes;
mod routeservers;

use std::{
    collections::BTreeSet,
    sync::{Arc, LazyLock},
    time::Duration,
};

use regex::Regex;

use crate::net::Transport;

pub use routes::origin_asn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteServer {
    pub id: String,
    /// `"{host} => {group}"`, the bucket its ASNs get reported under.
    pub group: String,
}

/// Outcome of neighbour discovery for one route server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Neighbours {
    Collected(Vec<String>),
    /// The looking glass couldn't tell us; not the same as zero neighbours.
    Degraded,
}

/// Outcome of route discovery for one route server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginAsns {
    Collected(BTreeSet<u32>),
    /// Everything answered but no route carried an AS path.
    Empty,
    /// Discovery was abandoned; whatever was gathered was thrown away.
    Degraded,
}

#[derive(Debug, Clone)]
pub struct LookingGlassSettings {
    /// For route server and neighbour listings.
    pub timeout: Duration,
    pub routes_timeout: Duration,
    /// Pause before each neighbour's routes are requested.
    pub neighbour_pacing: Duration,
}

impl Default for LookingGlassSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            routes_timeout: Duration::from_secs(60),
            neighbour_pacing: Duration::from_secs(1),
        }
    }
}

pub struct LookingGlass {
    transport: Arc<dyn Transport>,
    settings: LookingGlassSettings,
}

impl LookingGlass {
    pub fn new(transport: Arc<dyn Transport>, settings: LookingGlassSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }
}

static SCHEME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").unwrap());

/// The IXP base URL without scheme or trailing slash, e.g. `lg.ams-ix.net`.
pub fn ixp_host(base: &str) -> &str {
    let base = base.trim_end_matches('/');
    match SCHEME_REGEX.find(base) {
        Some(m) => &base[m.end()..],
        None => base,
    }
}

fn api_url(base: &str, path: &str) -> String {
    format!("{}/api/v1/{path}", base.trim_end_matches('/'))
}

/// Alice ids are usually strings but some deployments hand out numbers.
fn json_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_and_trailing_slash() {
        assert_eq!(ixp_host("https://lg.ams-ix.net"), "lg.ams-ix.net");
        assert_eq!(ixp_host("http://lg.de-cix.net/"), "lg.de-cix.net");
        assert_eq!(ixp_host("lg.linx.net"), "lg.linx.net");
        assert_eq!(ixp_host("https://example.net/alice"), "example.net/alice");
    }

    #[test]
    fn builds_api_urls() {
        assert_eq!(
            api_url("https://lg.example.net/", "routeservers"),
            "https://lg.example.net/api/v1/routeservers"
        );
    }
}
