use serde_json::Value;
use tracing::error;

use crate::{
    error::{Error, Result},
    net::Request,
};

use super::{field, text, Enricher, NA};

/// What CAIDA AS Rank knows about an ASN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankInfo {
    pub rank: String,
    pub source: String,
    pub country_iso: String,
}

impl RankInfo {
    fn unknown() -> Self {
        Self {
            rank: NA.to_string(),
            source: NA.to_string(),
            country_iso: NA.to_string(),
        }
    }
}

impl Enricher {
    pub async fn rank(&self, asn: u32) -> Result<RankInfo> {
        let url = format!("{}/{asn}", self.settings.asrank_url.trim_end_matches('/'));
        let resp = self
            .transport
            .request(&Request::get(&url, self.settings.timeout))
            .await?;
        if !resp.is_success() {
            error!(asn, %url, status = resp.status, "AS Rank lookup failed");
            return Err(Error::HttpStatus {
                url,
                status: resp.status,
            });
        }

        parse_rank(&url, &resp.json(&url)?)
    }
}

fn parse_rank(url: &str, data: &Value) -> Result<RankInfo> {
    let asn = field(url, field(url, data, "data")?, "asn")?;
    if asn.is_null() {
        // CAIDA has never seen this ASN
        return Ok(RankInfo::unknown());
    }

    let country = field(url, asn, "country")?;
    let country_iso = if country.is_null() {
        NA.to_string()
    } else {
        text(field(url, country, "iso")?)
    };

    Ok(RankInfo {
        rank: text(field(url, asn, "rank")?),
        source: text(field(url, asn, "source")?),
        country_iso,
    })
}
