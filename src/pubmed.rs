use std::thread;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use scraper::{Html, Selector};
use serde::Serialize;

use crate::domain::{PubmedId, TrialId};
use crate::error::TrialmineError;

const PUBMED_BASE: &str = "https://pubmed.ncbi.nlm.nih.gov";

/// Region selectors searched for a trial registration number, in priority
/// order. The full page text is the final fallback; appending a new region
/// here extends the chain without touching the control flow.
const TRIAL_ID_REGIONS: &[&str] = &[
    "div[class*='abstract-content']",
    "div[class*='trial-registration']",
];

pub trait PubmedClient: Send + Sync {
    fn fetch_abstract_page(&self, id: &PubmedId) -> Result<String, TrialmineError>;
}

#[derive(Clone)]
pub struct PubmedHttpClient {
    client: Client,
}

impl PubmedHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, TrialmineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("trialmine/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| TrialmineError::PubmedHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| TrialmineError::PubmedHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn abstract_url(id: &PubmedId) -> String {
        format!("{}/{}/", PUBMED_BASE, id.as_str())
    }
}

impl PubmedClient for PubmedHttpClient {
    fn fetch_abstract_page(&self, id: &PubmedId) -> Result<String, TrialmineError> {
        let url = Self::abstract_url(id);
        tracing::debug!(url, "pubmed abstract page");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| TrialmineError::PubmedHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "PubMed request failed".to_string());
            return Err(TrialmineError::PubmedStatus { status, message });
        }
        response
            .text()
            .map_err(|err| TrialmineError::PubmedHttp(err.to_string()))
    }
}

/// Everything extracted for one PubMed identifier. Both fields stay `None`
/// when the page is unreachable; either can be `None` on its own when the
/// page simply lacks that datum.
#[derive(Debug, Clone, Serialize)]
pub struct DetailRecord {
    pub pubmed_id: PubmedId,
    pub trial_id: Option<TrialId>,
    pub publication_date: Option<NaiveDate>,
}

/// First `NCT` + 8 digits found, searching structured abstract regions
/// before falling back to the full page text.
pub fn extract_trial_id(html: &str) -> Option<TrialId> {
    let document = Html::parse_document(html);
    let pattern = Regex::new(r"NCT\d{8}").unwrap();
    for region in TRIAL_ID_REGIONS {
        let Ok(selector) = Selector::parse(region) else {
            continue;
        };
        for element in document.select(&selector) {
            let text = element.text().collect::<Vec<_>>().join(" ");
            if let Some(found) = pattern.find(&text) {
                return found.as_str().parse().ok();
            }
        }
    }
    let full_text = document.root_element().text().collect::<Vec<_>>().join(" ");
    pattern
        .find(&full_text)
        .and_then(|found| found.as_str().parse().ok())
}

/// Publication date from the first `span.cit` citation fragment.
pub fn extract_publication_date(html: &str) -> Option<NaiveDate> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("span.cit").ok()?;
    let citation = document.select(&selector).next()?;
    let text = citation.text().collect::<Vec<_>>().join(" ");
    parse_citation_date(&text)
}

/// `"2021 Jan 5"` parses as a full date; a bare `"2019"` becomes January 1st
/// of that year. A day-level fragment with an unparseable month yields no
/// date rather than degrading to the year.
pub fn parse_citation_date(text: &str) -> Option<NaiveDate> {
    let full = Regex::new(r"\d{4} [A-Za-z]{3} \d{1,2}").unwrap();
    if let Some(found) = full.find(text) {
        return NaiveDate::parse_from_str(found.as_str(), "%Y %b %d").ok();
    }
    let year_only = Regex::new(r"\d{4}").unwrap();
    let year: i32 = year_only.find(text)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, 1, 1)
}

/// Minimum-interval gate bounding the abstract-page request rate. The first
/// call passes immediately; each subsequent call pauses until `interval` has
/// elapsed since the previous one.
#[derive(Debug)]
pub struct MinIntervalGate {
    interval: Duration,
    last: Option<Instant>,
}

impl MinIntervalGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn wait(&mut self) {
        let pause = self.pause_for(Instant::now());
        if !pause.is_zero() {
            thread::sleep(pause);
        }
        self.last = Some(Instant::now());
    }

    fn pause_for(&self, now: Instant) -> Duration {
        match self.last {
            Some(last) => self.interval.saturating_sub(now.duration_since(last)),
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn citation_date_full() {
        assert_eq!(
            parse_citation_date("Lancet. 2021 Jan 5;397(10269):72-74."),
            NaiveDate::from_ymd_opt(2021, 1, 5)
        );
    }

    #[test]
    fn citation_date_year_only() {
        assert_eq!(
            parse_citation_date("Cureus. 2019."),
            NaiveDate::from_ymd_opt(2019, 1, 1)
        );
    }

    #[test]
    fn citation_date_missing() {
        assert_eq!(parse_citation_date("no date here"), None);
    }

    #[test]
    fn citation_date_bad_month_is_absent() {
        // Matches the day-level pattern but "Xyz" is not a month.
        assert_eq!(parse_citation_date("2021 Xyz 5"), None);
    }

    #[test]
    fn gate_first_pass_is_free() {
        let gate = MinIntervalGate::new(Duration::from_millis(500));
        assert_eq!(gate.pause_for(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn gate_pauses_for_remaining_interval() {
        let mut gate = MinIntervalGate::new(Duration::from_millis(500));
        let start = Instant::now();
        gate.last = Some(start);
        let pause = gate.pause_for(start + Duration::from_millis(100));
        assert_eq!(pause, Duration::from_millis(400));
        let pause = gate.pause_for(start + Duration::from_millis(700));
        assert_eq!(pause, Duration::ZERO);
    }
}
