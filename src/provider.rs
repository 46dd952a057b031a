//! DNS provider port and the Hetzner-compatible wire client.
//!
//! The provider is the only component speaking HTTP to the DNS API; the
//! reconciler and orchestrator see the `DnsProvider` trait so tests can
//! substitute an in-memory provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::SteerError;

/// Transport retries per API call.
const API_RETRIES: u32 = 3;

/// Cap for the exponential retry backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// One DNS zone in the provider account.
#[derive(Debug, Clone, Deserialize)]
pub struct Zone {
    /// Provider zone ID.
    pub id: String,
    /// Zone name, e.g. `example.com`.
    pub name: String,
}

/// One record under a zone.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderRecord {
    /// Provider record ID.
    pub id: String,
    /// Record type, e.g. `A`.
    #[serde(rename = "type")]
    pub record_type: String,
    /// Name relative to the zone (`@` for the apex).
    pub name: String,
    /// Record value.
    pub value: String,
}

/// Body for record creation and updates.
#[derive(Debug, Clone, Serialize)]
pub struct RecordSpec {
    /// Owning zone ID.
    pub zone_id: String,
    /// Record type; always `A` here.
    #[serde(rename = "type")]
    pub record_type: String,
    /// Name relative to the zone.
    pub name: String,
    /// Record value.
    pub value: String,
    /// TTL in seconds.
    pub ttl: u32,
}

/// DNS provider operations the reconciler needs.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// All zones in the account.
    async fn list_zones(&self) -> Result<Vec<Zone>, SteerError>;

    /// All records under a zone.
    async fn list_records(&self, zone_id: &str) -> Result<Vec<ProviderRecord>, SteerError>;

    /// Create a record; returns the provider's view of it.
    async fn create_record(&self, spec: &RecordSpec) -> Result<ProviderRecord, SteerError>;

    /// Overwrite an existing record.
    async fn update_record(&self, record_id: &str, spec: &RecordSpec) -> Result<(), SteerError>;
}

/// Zone whose name is the longest suffix of `domain`, on label boundaries.
///
/// Equal-length suffixes of one domain are necessarily the same name, so
/// a tie means the account lists duplicate zones; it resolves to the
/// lexically smallest zone ID, independent of API response order.
pub fn match_zone<'a>(zones: &'a [Zone], domain: &str) -> Option<&'a Zone> {
    zones
        .iter()
        .filter(|z| domain == z.name || domain.ends_with(&format!(".{}", z.name)))
        .min_by(|a, b| {
            b.name
                .len()
                .cmp(&a.name.len())
                .then_with(|| a.id.cmp(&b.id))
        })
}

/// Record name for `domain` relative to its zone (`@` at the apex).
pub fn record_name(domain: &str, zone_name: &str) -> String {
    if domain == zone_name {
        "@".to_string()
    } else {
        domain
            .strip_suffix(&format!(".{zone_name}"))
            .unwrap_or(domain)
            .to_string()
    }
}

/// Hetzner-compatible DNS API client.
pub struct HetznerProvider {
    base: String,
    token: String,
    client: reqwest::Client,
}

impl HetznerProvider {
    /// Build a client with the given API base, bearer token, and total
    /// per-call timeout.
    pub fn new(base: String, token: String, timeout: Duration) -> Result<Self, SteerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path_and_query: &str,
    ) -> Result<T, SteerError> {
        let url = format!("{}{}", self.base, path_and_query);
        let mut backoff = Duration::from_secs(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .send()
                .await
            {
                Ok(response) => return Self::decode(response).await,
                Err(e) if attempt < API_RETRIES => {
                    warn!(url = %url, attempt, "DNS API request failed, retrying: {e}");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, SteerError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SteerError::provider(status.as_u16(), &body));
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct ZonesResponse {
    zones: Vec<Zone>,
}

#[derive(Debug, Deserialize)]
struct RecordsResponse {
    records: Vec<ProviderRecord>,
}

#[derive(Debug, Deserialize)]
struct RecordResponse {
    record: ProviderRecord,
}

#[async_trait]
impl DnsProvider for HetznerProvider {
    async fn list_zones(&self) -> Result<Vec<Zone>, SteerError> {
        let response: ZonesResponse = self.get_json("/zones?per_page=200").await?;
        debug!(zones = response.zones.len(), "listed provider zones");
        Ok(response.zones)
    }

    async fn list_records(&self, zone_id: &str) -> Result<Vec<ProviderRecord>, SteerError> {
        let response: RecordsResponse = self
            .get_json(&format!("/records?zone_id={zone_id}&per_page=200"))
            .await?;
        Ok(response.records)
    }

    async fn create_record(&self, spec: &RecordSpec) -> Result<ProviderRecord, SteerError> {
        let response = self
            .client
            .post(format!("{}/records", self.base))
            .bearer_auth(&self.token)
            .json(spec)
            .send()
            .await?;
        let created: RecordResponse = Self::decode(response).await?;
        debug!(record_id = %created.record.id, name = %spec.name, "created record");
        Ok(created.record)
    }

    async fn update_record(&self, record_id: &str, spec: &RecordSpec) -> Result<(), SteerError> {
        let response = self
            .client
            .put(format!("{}/records/{record_id}", self.base))
            .bearer_auth(&self.token)
            .json(spec)
            .send()
            .await?;
        let _: RecordResponse = Self::decode(response).await?;
        Ok(())
    }
}

/// Resolve the zone serving `domain`.
pub async fn find_zone(provider: &dyn DnsProvider, domain: &str) -> Result<Zone, SteerError> {
    let zones = provider.list_zones().await?;
    match_zone(&zones, domain)
        .cloned()
        .ok_or_else(|| SteerError::ZoneNotFound(domain.to_string()))
}

/// Find the A-record for `name` under `zone`, creating it with the
/// placeholder value `0.0.0.0` when absent. Returns the record ID.
pub async fn ensure_record(
    provider: &dyn DnsProvider,
    zone: &Zone,
    name: &str,
    ttl: u32,
) -> Result<String, SteerError> {
    let records = provider.list_records(&zone.id).await?;
    if let Some(existing) = records
        .iter()
        .find(|r| r.record_type == "A" && r.name == name)
    {
        return Ok(existing.id.clone());
    }

    let created = provider
        .create_record(&RecordSpec {
            zone_id: zone.id.clone(),
            record_type: "A".to_string(),
            name: name.to_string(),
            value: "0.0.0.0".to_string(),
            ttl,
        })
        .await?;
    Ok(created.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(id: &str, name: &str) -> Zone {
        Zone {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_match_zone_prefers_longest_suffix() {
        let zones = vec![zone("z1", "example.com"), zone("z2", "eu.example.com")];
        let matched = match_zone(&zones, "proxy.eu.example.com").unwrap();
        assert_eq!(matched.id, "z2");
    }

    #[test]
    fn test_match_zone_requires_label_boundary() {
        let zones = vec![zone("z1", "ample.com")];
        assert!(match_zone(&zones, "proxy.example.com").is_none());
    }

    #[test]
    fn test_match_zone_exact_domain() {
        let zones = vec![zone("z1", "example.com")];
        let matched = match_zone(&zones, "example.com").unwrap();
        assert_eq!(matched.id, "z1");
    }

    #[test]
    fn test_match_zone_duplicate_names_tie_break_on_id() {
        // An account listing the same zone name twice must resolve
        // deterministically regardless of response order.
        let zones = vec![zone("z9", "example.com"), zone("z1", "example.com")];
        assert_eq!(match_zone(&zones, "proxy.example.com").unwrap().id, "z1");

        let reversed = vec![zone("z1", "example.com"), zone("z9", "example.com")];
        assert_eq!(match_zone(&reversed, "proxy.example.com").unwrap().id, "z1");
    }

    #[test]
    fn test_match_zone_none_for_unrelated_domain() {
        let zones = vec![zone("z1", "example.com")];
        assert!(match_zone(&zones, "example.net").is_none());
    }

    #[test]
    fn test_record_name_relative_and_apex() {
        assert_eq!(record_name("proxy.example.com", "example.com"), "proxy");
        assert_eq!(
            record_name("a.b.example.com", "example.com"),
            "a.b"
        );
        assert_eq!(record_name("example.com", "example.com"), "@");
    }
}
