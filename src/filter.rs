//src/filter.rs

use ahash::AHashMap;

use crate::config::FilterThresholds;
use crate::types::AlignmentRecord;

/// Keeps the records whose identity, coverage and score all reach the
/// thresholds. Order is preserved; applying it twice changes nothing.
pub fn filter_records(
    records: &[AlignmentRecord],
    thresholds: &FilterThresholds,
) -> Vec<AlignmentRecord> {
    records
        .iter()
        .filter(|record| thresholds.passes(record))
        .cloned()
        .collect()
}

/// Collapses hits that cover the same stretch of a query.
///
/// Within each query, hits are ordered by start; for each neighbouring pair
/// whose overlap exceeds `max_overlap` of the shorter span, the one with the
/// lower identity is dropped (the earlier one on equal identity). Survivors
/// keep their input order.
pub fn remove_overlapping_hits(
    records: &[AlignmentRecord],
    max_overlap: f64,
) -> Vec<AlignmentRecord> {
    let mut by_query: AHashMap<&str, Vec<usize>> = AHashMap::new();
    for (idx, record) in records.iter().enumerate() {
        by_query.entry(record.query_id.as_str()).or_default().push(idx);
    }

    let mut removed = vec![false; records.len()];
    for indices in by_query.values_mut() {
        indices.sort_by_key(|&i| (records[i].start, records[i].end, i));

        for pair in indices.windows(2) {
            let (a, b) = (&records[pair[0]], &records[pair[1]]);
            let overlap = a.end.min(b.end).saturating_sub(a.start.max(b.start));
            let shorter = a.span().min(b.span());
            if shorter == 0 {
                continue;
            }
            if overlap as f64 / shorter as f64 > max_overlap {
                if a.identity > b.identity {
                    removed[pair[1]] = true;
                } else {
                    removed[pair[0]] = true;
                }
            }
        }
    }

    let dropped = removed.iter().filter(|&&r| r).count();
    if dropped > 0 {
        log::debug!("Removed {dropped} overlapping hits");
    }

    records
        .iter()
        .zip(removed)
        .filter(|(_, removed)| !removed)
        .map(|(record, _)| record.clone())
        .collect()
}
