use std::path::PathBuf;

use chrono::NaiveDate;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum TrialmineError {
    #[error("invalid GEO series accession: {0}")]
    InvalidAccession(String),

    #[error("invalid PubMed identifier: {0}")]
    InvalidPubmedId(String),

    #[error("invalid trial registration identifier: {0}")]
    InvalidTrialId(String),

    #[error("invalid date range: end {end} precedes start {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error(
        "missing contact identifier (pass --contact, set TRIALMINE_CONTACT, or add \"contact\" to trialmine.json)"
    )]
    MissingContact,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("Entrez request failed: {0}")]
    EntrezHttp(String),

    #[error("Entrez returned status {status}: {message}")]
    EntrezStatus { status: u16, message: String },

    #[error("unexpected Entrez payload: {0}")]
    EntrezPayload(String),

    #[error("GEO request failed: {0}")]
    GeoHttp(String),

    #[error("GEO returned status {status}: {message}")]
    GeoStatus { status: u16, message: String },

    #[error("PubMed request failed: {0}")]
    PubmedHttp(String),

    #[error("PubMed returned status {status}: {message}")]
    PubmedStatus { status: u16, message: String },

    #[error("export failed: {0}")]
    Export(String),
}
