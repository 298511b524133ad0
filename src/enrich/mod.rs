//! Registry lookups that turn a bare origin ASN into a report row: rank,
//! source and country from CAIDA AS Rank, holder name from RIPEstat.

mod asrank;
mod ripe;

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    error::{Error, Result},
    metrics::ENRICHED_ASNS_COUNTER,
    net::Transport,
};

pub use asrank::RankInfo;

/// Stands in for anything a registry didn't give us.
pub const NA: &str = "NA";

/// Private ASN AMS-IX runs its own route server infrastructure under. No
/// registry knows it.
pub const AMSIX_PRIVATE_ASN: u32 = 64567;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AsnDetails {
    pub asn: u32,
    pub asn_name: String,
    pub rank: String,
    pub source: String,
    pub country_iso: String,
}

impl AsnDetails {
    fn amsix() -> Self {
        Self {
            asn: AMSIX_PRIVATE_ASN,
            asn_name: "AMS-IX".to_string(),
            rank: NA.to_string(),
            source: NA.to_string(),
            country_iso: "NL".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrichmentSettings {
    pub asrank_url: String,
    pub ripe_url: String,
    pub timeout: Duration,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            asrank_url: "https://api.asrank.caida.org/v2/restful/asns".to_string(),
            ripe_url: "https://stat.ripe.net/data/as-overview/data.json".to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

pub struct Enricher {
    transport: Arc<dyn Transport>,
    settings: EnrichmentSettings,
}

impl Enricher {
    pub fn new(transport: Arc<dyn Transport>, settings: EnrichmentSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// Look an ASN up in both registries. Any registry failure is returned
    /// as-is; there is no partial row.
    pub async fn details(&self, asn: u32) -> Result<AsnDetails> {
        if asn == AMSIX_PRIVATE_ASN {
            debug!(asn, "private AMS-IX ASN, skipping registries");
            return Ok(AsnDetails::amsix());
        }

        let (rank, asn_name) = tokio::try_join!(self.rank(asn), self.holder(asn))?;
        ENRICHED_ASNS_COUNTER.inc();

        Ok(AsnDetails {
            asn,
            asn_name,
            rank: rank.rank,
            source: rank.source,
            country_iso: rank.country_iso,
        })
    }
}

/// A key that must exist; its value may still be null.
fn field<'a>(url: &str, value: &'a Value, key: &str) -> Result<&'a Value> {
    value
        .get(key)
        .ok_or_else(|| Error::schema(url, format!("missing key {key:?}")))
}

/// Registry values as report text, with null and empty strings as [`NA`].
fn text(value: &Value) -> String {
    match value {
        Value::Null => NA.to_string(),
        Value::String(s) if s.trim().is_empty() => NA.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
