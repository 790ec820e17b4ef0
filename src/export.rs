use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use crate::app::PipelineRun;
use crate::error::TrialmineError;
use crate::pubmed::DetailRecord;

/// Placeholder shown in exported tables for an absent trial registration
/// number. Never produced by extraction itself; presentation only.
pub const NCT_NOT_FOUND: &str = "NCT not found";

/// Collapse a keyword to a filesystem-safe token: every character outside
/// `[A-Za-z0-9_]` becomes `_`.
pub fn sanitize_keyword(keyword: &str) -> String {
    let pattern = Regex::new(r"[^A-Za-z0-9_]").unwrap();
    pattern.replace_all(keyword.trim(), "_").into_owned()
}

#[derive(Debug, Serialize)]
struct AccessionRow<'a> {
    accession: &'a str,
}

#[derive(Debug, Serialize)]
struct CrossRefRow<'a> {
    accession: &'a str,
    outcome: &'static str,
    pubmed_ids: String,
}

#[derive(Debug, Serialize)]
struct DetailRow<'a> {
    pubmed_id: &'a str,
    trial_id: &'a str,
    publication_date: Option<NaiveDate>,
}

impl<'a> DetailRow<'a> {
    fn from_record(record: &'a DetailRecord) -> Self {
        Self {
            pubmed_id: record.pubmed_id.as_str(),
            trial_id: record
                .trial_id
                .as_ref()
                .map(|id| id.as_str())
                .unwrap_or(NCT_NOT_FOUND),
            publication_date: record.publication_date,
        }
    }
}

/// Write the four stage outputs as CSV files into
/// `<output_dir>/<sanitized_keyword>_<date>/`, one file per stage. Returns
/// the directory that was written.
pub fn export_run(
    run: &PipelineRun,
    output_dir: &Path,
    today: NaiveDate,
) -> Result<PathBuf, TrialmineError> {
    let folder = output_dir.join(format!(
        "{}_{}",
        sanitize_keyword(&run.keyword),
        today.format("%Y-%m-%d")
    ));
    fs::create_dir_all(&folder).map_err(|err| TrialmineError::Export(err.to_string()))?;

    let accession_rows: Vec<AccessionRow<'_>> = run
        .accessions
        .iter()
        .map(|accession| AccessionRow {
            accession: accession.as_str(),
        })
        .collect();
    write_csv(&folder.join("1_accessions.csv"), &accession_rows)?;

    let cross_ref_rows: Vec<CrossRefRow<'_>> = run
        .cross_refs
        .iter()
        .map(|record| CrossRefRow {
            accession: record.accession.as_str(),
            outcome: record.outcome.label(),
            pubmed_ids: record
                .outcome
                .pubmed_ids()
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect();
    write_csv(&folder.join("2_cross_references.csv"), &cross_ref_rows)?;

    let detail_rows: Vec<DetailRow<'_>> = run.details.iter().map(DetailRow::from_record).collect();
    write_csv(&folder.join("3_details.csv"), &detail_rows)?;

    let filtered_rows: Vec<DetailRow<'_>> =
        run.filtered.iter().map(DetailRow::from_record).collect();
    write_csv(&folder.join("4_filtered.csv"), &filtered_rows)?;

    Ok(folder)
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), TrialmineError> {
    let mut writer =
        csv::Writer::from_path(path).map_err(|err| TrialmineError::Export(err.to_string()))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|err| TrialmineError::Export(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| TrialmineError::Export(err.to_string()))
}
