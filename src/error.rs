use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The request never produced an HTTP response (connect, timeout, body read).
    #[error("network failure calling {url}: {reason}")]
    TransientNetwork { url: String, reason: String },

    /// The request could not even be built, e.g. a base URL without a scheme.
    #[error("invalid request to {url}: {reason}")]
    InvalidRequest { url: String, reason: String },

    #[error("{url} still unavailable after {attempts} attempts: {last}")]
    DependencyUnavailable {
        url: String,
        attempts: u32,
        last: String,
    },

    /// A trusted upstream answered 200 with a body we could not make sense of.
    #[error("unexpected response from {url}: {reason}")]
    UpstreamSchema { url: String, reason: String },

    #[error("{url} is degraded (HTTP {status})")]
    UpstreamDegraded { url: String, status: u16 },

    #[error("route server discovery failed for {ixp}: {reason}")]
    FatalDiscovery { ixp: String, reason: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("could not persist report {name}: {reason}")]
    Persistence { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether retrying the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientNetwork { .. })
    }

    pub fn schema(url: &str, reason: impl Into<String>) -> Self {
        Error::UpstreamSchema {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}
