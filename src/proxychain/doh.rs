//! DNS-over-HTTPS resolver.
//!
//! Resolves upstream hostnames through Google's JSON DoH endpoint instead of
//! the system resolver, so local DNS filtering does not apply to proxied
//! targets. Plugged into reqwest via `reqwest::dns::Resolve`.

use std::net::{IpAddr, SocketAddr};

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const GOOGLE_DOH_ENDPOINT: &str = "https://dns.google/resolve";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const RECORD_A: u16 = 1;
const RECORD_AAAA: u16 = 28;

#[derive(Debug, Error)]
pub enum DohError {
    #[error("DoH query failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("DoH query for '{name}' returned status {status}")]
    Status { name: String, status: u32 },

    #[error("no A/AAAA records for '{0}'")]
    NoRecords(String),
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohRecord>,
}

#[derive(Debug, Deserialize)]
struct DohRecord {
    #[serde(rename = "type")]
    kind: u16,
    data: String,
}

/// `reqwest` resolver backed by a JSON DoH endpoint.
#[derive(Debug, Clone)]
pub struct DohResolver {
    endpoint: Url,
    client: reqwest::Client,
}

impl DohResolver {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            client: reqwest::Client::new(),
        }
    }

    pub fn google() -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(GOOGLE_DOH_ENDPOINT)?))
    }

    /// Look up A and AAAA records for `name`.
    pub async fn lookup(&self, name: &str) -> Result<Vec<IpAddr>, DohError> {
        let mut addrs = Vec::new();
        for record_type in ["A", "AAAA"] {
            let response: DohResponse = self
                .client
                .get(self.endpoint.clone())
                .query(&[("name", name), ("type", record_type)])
                .header("accept", "application/dns-json")
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            if response.status != 0 {
                return Err(DohError::Status {
                    name: name.to_string(),
                    status: response.status,
                });
            }
            addrs.extend(parse_answers(&response.answer));
        }
        if addrs.is_empty() {
            return Err(DohError::NoRecords(name.to_string()));
        }
        tracing::debug!(host = %name, addrs = ?addrs, "Resolved via DoH");
        Ok(addrs)
    }
}

fn parse_answers(answers: &[DohRecord]) -> Vec<IpAddr> {
    answers
        .iter()
        .filter(|record| record.kind == RECORD_A || record.kind == RECORD_AAAA)
        .filter_map(|record| record.data.parse().ok())
        .collect()
}

impl Resolve for DohResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.clone();
        Box::pin(async move {
            let ips = resolver
                .lookup(name.as_str())
                .await
                .map_err(|err| -> BoxError { Box::new(err) })?;
            let addrs: Addrs = Box::new(ips.into_iter().map(|ip| SocketAddr::new(ip, 0)));
            Ok::<_, BoxError>(addrs)
        })
    }
}
