use crate::domain::DateRange;
use crate::pubmed::DetailRecord;

/// Select the records with a publication date inside the inclusive range and
/// a validated trial registration number. Records without a date are
/// excluded, never matched by default. Pure projection over the input.
pub fn filter_by_date(records: &[DetailRecord], range: DateRange) -> Vec<DetailRecord> {
    records
        .iter()
        .filter(|record| {
            record.trial_id.is_some()
                && record
                    .publication_date
                    .is_some_and(|date| range.contains(date))
        })
        .cloned()
        .collect()
}
