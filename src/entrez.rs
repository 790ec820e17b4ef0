use std::collections::BTreeSet;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::domain::GeoAccession;
use crate::error::TrialmineError;

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const GDS_DB: &str = "gds";
const TOOL_NAME: &str = "trialmine";

/// One page of an Entrez search: record UIDs plus the total hit count the
/// server reports for the whole query.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub ids: Vec<String>,
    pub total: u64,
}

pub trait EntrezClient: Send + Sync {
    fn search(
        &self,
        keyword: &str,
        retmax: u64,
        retstart: u64,
    ) -> Result<SearchPage, TrialmineError>;
    fn fetch_summaries(&self, ids: &[String]) -> Result<String, TrialmineError>;
}

#[derive(Clone)]
pub struct EntrezHttpClient {
    client: Client,
    base_url: String,
    contact: String,
}

impl EntrezHttpClient {
    pub fn new(contact: &str, timeout: Duration) -> Result<Self, TrialmineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("trialmine/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| TrialmineError::EntrezHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| TrialmineError::EntrezHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: EUTILS_BASE.to_string(),
            contact: contact.to_string(),
        })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, TrialmineError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "Entrez request failed".to_string());
        Err(TrialmineError::EntrezStatus { status, message })
    }
}

impl EntrezClient for EntrezHttpClient {
    fn search(
        &self,
        keyword: &str,
        retmax: u64,
        retstart: u64,
    ) -> Result<SearchPage, TrialmineError> {
        let retmax = retmax.to_string();
        let retstart = retstart.to_string();
        let url = build_query_url(
            &format!("{}/esearch.fcgi", self.base_url),
            &[
                ("db", GDS_DB),
                ("term", keyword),
                ("retmax", retmax.as_str()),
                ("retstart", retstart.as_str()),
                ("retmode", "json"),
                ("tool", TOOL_NAME),
                ("email", self.contact.as_str()),
            ],
        );
        tracing::debug!(url, "entrez esearch");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| TrialmineError::EntrezHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        let payload: Value = response
            .json()
            .map_err(|err| TrialmineError::EntrezHttp(err.to_string()))?;

        let ids = payload["esearchresult"]["idlist"]
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        let total = payload["esearchresult"]["count"]
            .as_str()
            .and_then(|value| value.parse::<u64>().ok())
            .ok_or_else(|| {
                TrialmineError::EntrezPayload("esearch response missing count".to_string())
            })?;

        Ok(SearchPage { ids, total })
    }

    fn fetch_summaries(&self, ids: &[String]) -> Result<String, TrialmineError> {
        if ids.is_empty() {
            return Ok(String::new());
        }
        let id_list = ids.join(",");
        let url = build_query_url(
            &format!("{}/efetch.fcgi", self.base_url),
            &[
                ("db", GDS_DB),
                ("id", id_list.as_str()),
                ("rettype", "full"),
                ("retmode", "text"),
                ("tool", TOOL_NAME),
                ("email", self.contact.as_str()),
            ],
        );
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| TrialmineError::EntrezHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        response
            .text()
            .map_err(|err| TrialmineError::EntrezHttp(err.to_string()))
    }
}

/// Mine a raw Entrez text blob for GEO series accessions. Deduplicated and
/// sorted, so repeated extraction over the same text is stable.
pub fn extract_accessions(text: &str) -> Vec<GeoAccession> {
    let pattern = Regex::new(r"GSE\d{1,10}").unwrap();
    let mut found = BTreeSet::new();
    for value in pattern.find_iter(text) {
        found.insert(value.as_str().to_string());
    }
    found
        .into_iter()
        .filter_map(|value| value.parse().ok())
        .collect()
}

fn encode_url_component(value: &str) -> String {
    let mut out = String::new();
    for byte in value.as_bytes() {
        let ch = *byte as char;
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' || ch == '~' {
            out.push(ch);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn build_query_url(base: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return base.to_string();
    }
    let mut out = String::from(base);
    out.push('?');
    for (idx, (key, value)) in params.iter().enumerate() {
        if idx > 0 {
            out.push('&');
        }
        out.push_str(&encode_url_component(key));
        out.push('=');
        out.push_str(&encode_url_component(value));
    }
    out
}
