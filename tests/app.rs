use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::NaiveDate;

use trialmine::app::{App, PipelineOptions, ProgressEvent, ProgressSink};
use trialmine::domain::{DateRange, GeoAccession, PubmedId};
use trialmine::entrez::{EntrezClient, SearchPage};
use trialmine::error::TrialmineError;
use trialmine::geo::{GeoClient, HarvestOutcome};
use trialmine::pubmed::PubmedClient;

struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}

fn options(page_size: u64) -> PipelineOptions {
    PipelineOptions {
        page_size,
        workers: 5,
        request_interval: Duration::ZERO,
    }
}

fn range_2022() -> DateRange {
    DateRange::new(
        NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2022, 12, 31).unwrap(),
    )
    .unwrap()
}

/// Serves `total` record UIDs page by page; every UID mines to one unique
/// series accession.
struct MockEntrez {
    total: u64,
    search_calls: Arc<Mutex<u64>>,
}

impl EntrezClient for MockEntrez {
    fn search(
        &self,
        _keyword: &str,
        retmax: u64,
        retstart: u64,
    ) -> Result<SearchPage, TrialmineError> {
        let mut calls = self.search_calls.lock().unwrap();
        *calls += 1;
        let remaining = self.total.saturating_sub(retstart);
        let count = remaining.min(retmax);
        let ids = (0..count).map(|i| (retstart + i + 1).to_string()).collect();
        Ok(SearchPage {
            ids,
            total: self.total,
        })
    }

    fn fetch_summaries(&self, ids: &[String]) -> Result<String, TrialmineError> {
        Ok(ids
            .iter()
            .map(|id| format!("1. Series record GSE{id}\n"))
            .collect())
    }
}

struct FailingEntrez;

impl EntrezClient for FailingEntrez {
    fn search(
        &self,
        _keyword: &str,
        _retmax: u64,
        _retstart: u64,
    ) -> Result<SearchPage, TrialmineError> {
        Err(TrialmineError::EntrezStatus {
            status: 503,
            message: "unavailable".to_string(),
        })
    }

    fn fetch_summaries(&self, _ids: &[String]) -> Result<String, TrialmineError> {
        Err(TrialmineError::EntrezHttp("unreachable".to_string()))
    }
}

/// Links every series to the PubMed id matching its accession digits;
/// optionally fails for one accession.
struct MockGeo {
    fail_for: Option<GeoAccession>,
}

impl GeoClient for MockGeo {
    fn fetch_series_page(&self, accession: &GeoAccession) -> Result<String, TrialmineError> {
        if self.fail_for.as_ref() == Some(accession) {
            return Err(TrialmineError::GeoHttp("timed out".to_string()));
        }
        let digits = accession.as_str().trim_start_matches("GSE");
        Ok(format!(
            "<html><body>\
             <a href=\"https://www.ncbi.nlm.nih.gov/pubmed/{digits}\">citation</a>\
             <a href=\"https://example.org/elsewhere\">other</a>\
             </body></html>"
        ))
    }
}

/// Every series page links the same single publication.
struct SharedLinkGeo;

impl GeoClient for SharedLinkGeo {
    fn fetch_series_page(&self, _accession: &GeoAccession) -> Result<String, TrialmineError> {
        Ok("<html><body><a href=\"/pubmed/999\">shared</a></body></html>".to_string())
    }
}

struct MockPubmed {
    fetch_calls: Arc<Mutex<u64>>,
}

impl PubmedClient for MockPubmed {
    fn fetch_abstract_page(&self, _id: &PubmedId) -> Result<String, TrialmineError> {
        let mut calls = self.fetch_calls.lock().unwrap();
        *calls += 1;
        Ok("<html><body>\
            <span class=\"cit\">2022 Mar 1;12(3):100-110.</span>\
            <div class=\"abstract-content selected\">Registered as NCT12345678.</div>\
            </body></html>"
            .to_string())
    }
}

#[test]
fn discovery_pages_until_reported_total() {
    let calls = Arc::new(Mutex::new(0));
    let entrez = MockEntrez {
        total: 25,
        search_calls: calls.clone(),
    };
    let app = App::new(
        entrez,
        MockGeo { fail_for: None },
        MockPubmed {
            fetch_calls: Arc::new(Mutex::new(0)),
        },
        options(10),
    );

    let accessions = app.discover("glioblastoma", &NullSink).unwrap();

    assert_eq!(accessions.len(), 25);
    assert_eq!(*calls.lock().unwrap(), 3);
}

#[test]
fn discovery_zero_results_is_empty_not_error() {
    let calls = Arc::new(Mutex::new(0));
    let entrez = MockEntrez {
        total: 0,
        search_calls: calls.clone(),
    };
    let app = App::new(
        entrez,
        MockGeo { fail_for: None },
        MockPubmed {
            fetch_calls: Arc::new(Mutex::new(0)),
        },
        options(10),
    );

    let accessions = app.discover("no hits", &NullSink).unwrap();

    assert!(accessions.is_empty());
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[test]
fn discovery_failure_is_fatal() {
    let app = App::new(
        FailingEntrez,
        MockGeo { fail_for: None },
        MockPubmed {
            fetch_calls: Arc::new(Mutex::new(0)),
        },
        options(10),
    );

    let result = app.run("keyword", range_2022(), &NullSink);
    assert_matches!(result, Err(TrialmineError::EntrezStatus { status: 503, .. }));
}

#[test]
fn harvest_failure_degrades_to_unreachable() {
    let failing: GeoAccession = "GSE3".parse().unwrap();
    let entrez = MockEntrez {
        total: 5,
        search_calls: Arc::new(Mutex::new(0)),
    };
    let app = App::new(
        entrez,
        MockGeo {
            fail_for: Some(failing.clone()),
        },
        MockPubmed {
            fetch_calls: Arc::new(Mutex::new(0)),
        },
        options(10),
    );

    let accessions = app.discover("keyword", &NullSink).unwrap();
    let cross_refs = app.harvest(&accessions, &NullSink);

    assert_eq!(cross_refs.len(), accessions.len());
    let unreachable: Vec<_> = cross_refs
        .iter()
        .filter(|record| record.outcome.is_unreachable())
        .collect();
    assert_eq!(unreachable.len(), 1);
    assert_eq!(unreachable[0].accession, failing);
    assert!(unreachable[0].outcome.pubmed_ids().is_empty());
}

#[test]
fn details_deduplicate_shared_links() {
    let entrez = MockEntrez {
        total: 4,
        search_calls: Arc::new(Mutex::new(0)),
    };
    let fetches = Arc::new(Mutex::new(0));
    let app = App::new(
        entrez,
        SharedLinkGeo,
        MockPubmed {
            fetch_calls: fetches.clone(),
        },
        options(10),
    );

    let accessions = app.discover("keyword", &NullSink).unwrap();
    let cross_refs = app.harvest(&accessions, &NullSink);
    let (details, unreachable) = app.extract_details(&cross_refs, &NullSink);

    assert_eq!(details.len(), 1);
    assert_eq!(*fetches.lock().unwrap(), 1);
    assert_eq!(unreachable, 0);
}

#[test]
fn run_upholds_stage_invariants() {
    let failing: GeoAccession = "GSE2".parse().unwrap();
    let entrez = MockEntrez {
        total: 5,
        search_calls: Arc::new(Mutex::new(0)),
    };
    let app = App::new(
        entrez,
        MockGeo {
            fail_for: Some(failing),
        },
        MockPubmed {
            fetch_calls: Arc::new(Mutex::new(0)),
        },
        options(10),
    );

    let run = app.run("keyword", range_2022(), &NullSink).unwrap();

    assert_eq!(run.cross_refs.len(), run.accessions.len());
    let unique_links: std::collections::BTreeSet<_> = run
        .cross_refs
        .iter()
        .flat_map(|record| record.outcome.pubmed_ids().iter())
        .collect();
    assert_eq!(run.details.len(), unique_links.len());
    for record in &run.filtered {
        assert!(
            run.details
                .iter()
                .any(|detail| detail.pubmed_id == record.pubmed_id)
        );
    }

    assert_eq!(run.summary.accessions, 5);
    assert_eq!(run.summary.unreachable_series, 1);
    assert_eq!(run.summary.pubmed_ids, 4);
    assert_eq!(run.summary.included, 4);
    assert_eq!(run.summary.excluded, 0);

    for record in &run.filtered {
        let trial = record.trial_id.as_ref().unwrap();
        assert_eq!(trial.as_str(), "NCT12345678");
        assert_eq!(
            record.publication_date,
            NaiveDate::from_ymd_opt(2022, 3, 1)
        );
    }
}

#[test]
fn run_excludes_records_outside_window() {
    let entrez = MockEntrez {
        total: 3,
        search_calls: Arc::new(Mutex::new(0)),
    };
    let app = App::new(
        entrez,
        MockGeo { fail_for: None },
        MockPubmed {
            fetch_calls: Arc::new(Mutex::new(0)),
        },
        options(10),
    );

    let range = DateRange::new(
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
    )
    .unwrap();
    let run = app.run("keyword", range, &NullSink).unwrap();

    assert!(run.filtered.is_empty());
    assert_eq!(run.summary.excluded, run.details.len());
}

#[test]
fn harvest_of_empty_set_is_empty() {
    let entrez = MockEntrez {
        total: 0,
        search_calls: Arc::new(Mutex::new(0)),
    };
    let app = App::new(
        entrez,
        MockGeo { fail_for: None },
        MockPubmed {
            fetch_calls: Arc::new(Mutex::new(0)),
        },
        options(10),
    );

    let cross_refs = app.harvest(&[], &NullSink);
    assert!(cross_refs.is_empty());

    let (details, unreachable) = app.extract_details(&cross_refs, &NullSink);
    assert!(details.is_empty());
    assert_eq!(unreachable, 0);
}

#[test]
fn no_links_is_distinct_from_unreachable() {
    struct EmptyPageGeo;
    impl GeoClient for EmptyPageGeo {
        fn fetch_series_page(&self, _accession: &GeoAccession) -> Result<String, TrialmineError> {
            Ok("<html><body>no links at all</body></html>".to_string())
        }
    }

    let entrez = MockEntrez {
        total: 2,
        search_calls: Arc::new(Mutex::new(0)),
    };
    let app = App::new(
        entrez,
        EmptyPageGeo,
        MockPubmed {
            fetch_calls: Arc::new(Mutex::new(0)),
        },
        options(10),
    );

    let accessions = app.discover("keyword", &NullSink).unwrap();
    let cross_refs = app.harvest(&accessions, &NullSink);

    for record in &cross_refs {
        assert_eq!(record.outcome, HarvestOutcome::NoLinks);
        assert!(!record.outcome.is_unreachable());
    }
}
