use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::domain::{DateRange, GeoAccession, PubmedId};
use crate::entrez::{self, EntrezClient};
use crate::error::TrialmineError;
use crate::filter::filter_by_date;
use crate::geo::{CrossRefRecord, GeoClient, HarvestOutcome, extract_pubmed_links};
use crate::pubmed::{
    DetailRecord, MinIntervalGate, PubmedClient, extract_publication_date, extract_trial_id,
};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub page_size: u64,
    pub workers: usize,
    pub request_interval: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            workers: 5,
            request_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub fraction: Option<f64>,
}

pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub accessions: usize,
    pub unreachable_series: usize,
    pub pubmed_ids: usize,
    pub unreachable_abstracts: usize,
    pub included: usize,
    pub excluded: usize,
}

/// All four stage outputs of one pipeline run. Nothing is cached outside
/// this object; a caller that wants to reuse intermediate results holds on
/// to it.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub keyword: String,
    pub accessions: Vec<GeoAccession>,
    pub cross_refs: Vec<CrossRefRecord>,
    pub details: Vec<DetailRecord>,
    pub filtered: Vec<DetailRecord>,
    pub summary: RunSummary,
}

pub struct App<E: EntrezClient, G: GeoClient, P: PubmedClient> {
    entrez: E,
    geo: G,
    pubmed: P,
    options: PipelineOptions,
}

impl<E: EntrezClient, G: GeoClient, P: PubmedClient> App<E, G, P> {
    pub fn new(entrez: E, geo: G, pubmed: P, options: PipelineOptions) -> Self {
        Self {
            entrez,
            geo,
            pubmed,
            options,
        }
    }

    pub fn run(
        &self,
        keyword: &str,
        range: DateRange,
        sink: &dyn ProgressSink,
    ) -> Result<PipelineRun, TrialmineError> {
        let accessions = self.discover(keyword, sink)?;
        let cross_refs = self.harvest(&accessions, sink);
        let (details, unreachable_abstracts) = self.extract_details(&cross_refs, sink);
        let filtered = filter_by_date(&details, range);

        let summary = RunSummary {
            accessions: accessions.len(),
            unreachable_series: cross_refs
                .iter()
                .filter(|record| record.outcome.is_unreachable())
                .count(),
            pubmed_ids: details.len(),
            unreachable_abstracts,
            included: filtered.len(),
            excluded: details.len() - filtered.len(),
        };
        sink.event(ProgressEvent {
            message: format!(
                "filter; included {}, excluded {}",
                summary.included, summary.excluded
            ),
            fraction: Some(1.0),
        });

        Ok(PipelineRun {
            keyword: keyword.to_string(),
            accessions,
            cross_refs,
            details,
            filtered,
            summary,
        })
    }

    /// Paginate the Entrez search and mine every page's record text for
    /// series accessions. Any failure here is fatal: a broken page leaves
    /// the accession set untrustworthy.
    pub fn discover(
        &self,
        keyword: &str,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<GeoAccession>, TrialmineError> {
        let page_size = self.options.page_size.max(1);
        let mut found = BTreeSet::new();
        let mut offset = 0u64;
        loop {
            let page = self.entrez.search(keyword, page_size, offset)?;
            if page.ids.is_empty() {
                break;
            }
            let text = self.entrez.fetch_summaries(&page.ids)?;
            found.extend(entrez::extract_accessions(&text));
            offset += page_size;

            let covered = offset.min(page.total);
            let fraction = if page.total == 0 {
                1.0
            } else {
                covered as f64 / page.total as f64
            };
            sink.event(ProgressEvent {
                message: format!(
                    "discover; {} series after {}/{} records",
                    found.len(),
                    covered,
                    page.total
                ),
                fraction: Some(fraction),
            });

            if offset >= page.total {
                break;
            }
        }
        Ok(found.into_iter().collect())
    }

    /// Fetch every series page over a fixed-size worker pool and collect the
    /// PubMed cross-references. One record per accession, stored in
    /// submission order through pre-sized slots; progress is emitted in
    /// completion order. A failed fetch degrades to `Unreachable` for that
    /// accession only.
    pub fn harvest(
        &self,
        accessions: &[GeoAccession],
        sink: &dyn ProgressSink,
    ) -> Vec<CrossRefRecord> {
        let total = accessions.len();
        if total == 0 {
            return Vec::new();
        }
        let workers = self.options.workers.clamp(1, total);
        let slots: Vec<Mutex<Option<CrossRefRecord>>> =
            (0..total).map(|_| Mutex::new(None)).collect();
        let cursor = AtomicUsize::new(0);
        let completed = AtomicUsize::new(0);

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let index = cursor.fetch_add(1, Ordering::Relaxed);
                        if index >= total {
                            break;
                        }
                        let accession = &accessions[index];
                        let outcome = match self.geo.fetch_series_page(accession) {
                            Ok(html) => {
                                let ids = extract_pubmed_links(&html);
                                if ids.is_empty() {
                                    HarvestOutcome::NoLinks
                                } else {
                                    HarvestOutcome::Linked(ids)
                                }
                            }
                            Err(_) => HarvestOutcome::Unreachable,
                        };
                        if let Ok(mut slot) = slots[index].lock() {
                            *slot = Some(CrossRefRecord {
                                accession: accession.clone(),
                                outcome,
                            });
                        }
                        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                        sink.event(ProgressEvent {
                            message: format!(
                                "harvest; {}/{} series pages ({})",
                                done,
                                total,
                                accession.as_str()
                            ),
                            fraction: Some(done as f64 / total as f64),
                        });
                    }
                });
            }
        });

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.into_inner()
                    .unwrap_or(None)
                    .unwrap_or_else(|| CrossRefRecord {
                        accession: accessions[index].clone(),
                        outcome: HarvestOutcome::Unreachable,
                    })
            })
            .collect()
    }

    /// Walk the deduplicated PubMed identifier set strictly sequentially,
    /// rate-bounded by the interval gate, and extract a detail record for
    /// every identifier. Returns the records plus the count of unreachable
    /// abstract pages.
    pub fn extract_details(
        &self,
        cross_refs: &[CrossRefRecord],
        sink: &dyn ProgressSink,
    ) -> (Vec<DetailRecord>, usize) {
        let ids: BTreeSet<PubmedId> = cross_refs
            .iter()
            .flat_map(|record| record.outcome.pubmed_ids().iter().cloned())
            .collect();
        let total = ids.len();
        let mut gate = MinIntervalGate::new(self.options.request_interval);
        let mut details = Vec::with_capacity(total);
        let mut unreachable = 0usize;

        for (index, id) in ids.into_iter().enumerate() {
            gate.wait();
            let record = match self.pubmed.fetch_abstract_page(&id) {
                Ok(html) => DetailRecord {
                    trial_id: extract_trial_id(&html),
                    publication_date: extract_publication_date(&html),
                    pubmed_id: id,
                },
                Err(_) => {
                    unreachable += 1;
                    DetailRecord {
                        pubmed_id: id,
                        trial_id: None,
                        publication_date: None,
                    }
                }
            };
            details.push(record);

            let done = index + 1;
            sink.event(ProgressEvent {
                message: format!(
                    "extract; {}/{} abstracts ({}%)",
                    done,
                    total,
                    done * 100 / total
                ),
                fraction: Some(done as f64 / total as f64),
            });
        }

        if unreachable > 0 {
            sink.event(ProgressEvent {
                message: format!("extract; {unreachable} of {total} abstracts unreachable"),
                fraction: None,
            });
        }

        (details, unreachable)
    }
}
