use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::TrialmineError;

/// GEO series accession, e.g. `GSE123456`. Prefix `GSE` plus 1-10 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeoAccession(String);

impl GeoAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeoAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GeoAccession {
    type Err = TrialmineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let digits = normalized.strip_prefix("GSE").unwrap_or("");
        let is_valid = (1..=10).contains(&digits.len())
            && digits.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(TrialmineError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Numeric PubMed record identifier. Ordered lexicographically so that
/// identifier sets iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PubmedId(String);

impl PubmedId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PubmedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PubmedId {
    type Err = TrialmineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty() && trimmed.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(TrialmineError::InvalidPubmedId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// ClinicalTrials.gov registration number: `NCT` plus exactly 8 digits.
///
/// Construction enforces the strict form, so a present `TrialId` always
/// satisfies the pattern the date filter requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrialId(String);

impl TrialId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TrialId {
    type Err = TrialmineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let digits = normalized.strip_prefix("NCT").unwrap_or("");
        let is_valid = digits.len() == 8 && digits.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(TrialmineError::InvalidTrialId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Inclusive publication-date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TrialmineError> {
        if end < start {
            return Err(TrialmineError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}
