//! Fast path: structured database lookup
//!
//! Attempt order: (1) the local read-only snapshot, synchronous and
//! unbounded; (2) one remote lookup bounded by a fixed timeout. A timeout,
//! transport error, or absent record all degrade to a miss — the caller
//! always has the slow path as a fallback, so there are no retries here.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::local::LocalLookup;
use crate::validate::normalize;

/// Default bound on the remote lookup.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

/// Remote structured-database endpoint configuration.
#[derive(Debug, Clone)]
pub struct RemoteLookup {
    pub base_url: String,
    pub timeout: Duration,
}

/// Fast resolver over the local snapshot plus an optional remote database.
pub struct FastResolver {
    local: Arc<LocalLookup>,
    client: reqwest::Client,
    remote: Option<RemoteLookup>,
}

#[derive(Deserialize)]
struct PropertyResponse {
    #[serde(rename = "PropertyTable")]
    property_table: PropertyTable,
}

#[derive(Deserialize)]
struct PropertyTable {
    #[serde(rename = "Properties")]
    properties: Vec<Property>,
}

#[derive(Deserialize)]
struct Property {
    #[serde(rename = "IUPACName")]
    iupac_name: Option<String>,
}

impl FastResolver {
    pub fn new(
        local: Arc<LocalLookup>,
        client: reqwest::Client,
        remote: Option<RemoteLookup>,
    ) -> Self {
        Self {
            local,
            client,
            remote,
        }
    }

    /// Resolve an identifier to a name, or miss.
    ///
    /// Lookups key on the normalized form, the same key the slow path and
    /// result cache use.
    pub async fn resolve(&self, identifier: &str) -> Option<String> {
        let identifier = &normalize(identifier);
        if let Some(name) = self.local.get(identifier).await {
            debug!(identifier, "fast path: local snapshot hit");
            return Some(name);
        }

        let remote = self.remote.as_ref()?;
        match tokio::time::timeout(remote.timeout, self.remote_lookup(remote, identifier)).await {
            Ok(Ok(Some(name))) => {
                debug!(identifier, "fast path: remote lookup hit");
                Some(name)
            }
            Ok(Ok(None)) => {
                debug!(identifier, "fast path: remote lookup miss");
                None
            }
            Ok(Err(e)) => {
                debug!(identifier, error = %e, "fast path: remote lookup failed, treating as miss");
                None
            }
            Err(_) => {
                debug!(
                    identifier,
                    timeout_secs = remote.timeout.as_secs_f64(),
                    "fast path: remote lookup timed out, treating as miss"
                );
                None
            }
        }
    }

    async fn remote_lookup(
        &self,
        remote: &RemoteLookup,
        identifier: &str,
    ) -> reqwest::Result<Option<String>> {
        let url = format!(
            "{}/compound/smiles/{}/property/IUPACName/JSON",
            remote.base_url.trim_end_matches('/'),
            urlencoding::encode(identifier)
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let body: PropertyResponse = response.json().await?;
        Ok(body
            .property_table
            .properties
            .into_iter()
            .find_map(|p| p.iupac_name))
    }
}
