use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use scraper::{Html, Selector};
use serde::Serialize;

use crate::domain::{GeoAccession, PubmedId};
use crate::error::TrialmineError;

const GEO_ACCESSION_BASE: &str = "https://www.ncbi.nlm.nih.gov/geo/query/acc.cgi";

pub trait GeoClient: Send + Sync {
    fn fetch_series_page(&self, accession: &GeoAccession) -> Result<String, TrialmineError>;
}

#[derive(Clone)]
pub struct GeoHttpClient {
    client: Client,
}

impl GeoHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, TrialmineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("trialmine/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| TrialmineError::GeoHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| TrialmineError::GeoHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn series_url(accession: &GeoAccession) -> String {
        format!("{}?acc={}&view=full", GEO_ACCESSION_BASE, accession.as_str())
    }
}

impl GeoClient for GeoHttpClient {
    fn fetch_series_page(&self, accession: &GeoAccession) -> Result<String, TrialmineError> {
        let url = Self::series_url(accession);
        tracing::debug!(url, "geo series page");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| TrialmineError::GeoHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "GEO request failed".to_string());
            return Err(TrialmineError::GeoStatus { status, message });
        }
        response
            .text()
            .map_err(|err| TrialmineError::GeoHttp(err.to_string()))
    }
}

/// How the harvest of one series page went. A page that was fetched but
/// carries no PubMed links (`NoLinks`) is distinct from a page that could
/// not be fetched at all (`Unreachable`); both contribute zero identifiers
/// downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HarvestOutcome {
    Linked(Vec<PubmedId>),
    NoLinks,
    Unreachable,
}

impl HarvestOutcome {
    pub fn pubmed_ids(&self) -> &[PubmedId] {
        match self {
            HarvestOutcome::Linked(ids) => ids,
            HarvestOutcome::NoLinks | HarvestOutcome::Unreachable => &[],
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, HarvestOutcome::Unreachable)
    }

    pub fn label(&self) -> &'static str {
        match self {
            HarvestOutcome::Linked(_) => "linked",
            HarvestOutcome::NoLinks => "no_links",
            HarvestOutcome::Unreachable => "unreachable",
        }
    }
}

/// Cross-references harvested for one series, in the order the page lists
/// them. Duplicate links within one page are kept; deduplication happens
/// when the identifier set for detail extraction is built.
#[derive(Debug, Clone, Serialize)]
pub struct CrossRefRecord {
    pub accession: GeoAccession,
    pub outcome: HarvestOutcome,
}

/// Pull PubMed identifiers out of a series page: every anchor whose target
/// mentions `pubmed`, trailing number captured via `pubmed/(\d+)`.
pub fn extract_pubmed_links(html: &str) -> Vec<PubmedId> {
    let document = Html::parse_document(html);
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let id_pattern = Regex::new(r"pubmed/(\d+)").unwrap();
    let mut ids = Vec::new();
    for element in document.select(&anchors) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if !href.contains("pubmed") {
            continue;
        }
        if let Some(capture) = id_pattern.captures(href).and_then(|caps| caps.get(1)) {
            if let Ok(id) = capture.as_str().parse::<PubmedId>() {
                ids.push(id);
            }
        }
    }
    ids
}
