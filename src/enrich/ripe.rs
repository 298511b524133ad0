use tracing::error;

use crate::{
    error::{Error, Result},
    net::Request,
};

use super::{field, text, Enricher};

impl Enricher {
    /// Holder name of the ASN according to RIPEstat's AS overview.
    pub async fn holder(&self, asn: u32) -> Result<String> {
        let url = format!("{}?resource={asn}", self.settings.ripe_url);
        let resp = self
            .transport
            .request(&Request::get(&url, self.settings.timeout))
            .await?;
        if !resp.is_success() {
            error!(asn, %url, status = resp.status, "RIPEstat lookup failed");
            return Err(Error::HttpStatus {
                url,
                status: resp.status,
            });
        }

        let data = resp.json(&url)?;
        let holder = field(&url, field(&url, &data, "data")?, "holder")?;
        Ok(text(holder))
    }
}
