//src/best_hit.rs

use std::cmp::Ordering;

use crate::types::{AlignmentRecord, AnnotationCategory, BestHit, BestHitTable};

/// Ranks two hits of the same query; `Greater` means `a` is the better hit.
///
/// Priority: score (higher first) -> identity (higher first) -> coverage
/// (higher first) -> reference_id (lexicographically smaller first) ->
/// query start, then end (smaller first).
pub fn compare_hits(a: &AlignmentRecord, b: &AlignmentRecord) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then_with(|| a.identity.total_cmp(&b.identity))
        .then_with(|| a.coverage.total_cmp(&b.coverage))
        .then_with(|| b.reference_id.cmp(&a.reference_id))
        .then_with(|| b.start.cmp(&a.start))
        .then_with(|| b.end.cmp(&a.end))
}

/// Picks one hit per query. Queries without records are simply absent.
/// The result does not depend on the order of `records`.
pub fn resolve_best_hits(
    records: &[AlignmentRecord],
    category: AnnotationCategory,
) -> BestHitTable {
    let mut best: ahash::AHashMap<&str, &AlignmentRecord> = ahash::AHashMap::new();

    for record in records {
        best.entry(record.query_id.as_str())
            .and_modify(|current| {
                if compare_hits(record, *current) == Ordering::Greater {
                    *current = record;
                }
            })
            .or_insert(record);
    }

    log::debug!(
        "{category}: {} best hits from {} records",
        best.len(),
        records.len()
    );

    best.into_iter()
        .map(|(query_id, record)| (query_id.to_string(), BestHit::from_record(record, category)))
        .collect()
}
