//src/taxonomy.rs

use ahash::AHashMap;
use std::cmp::Ordering;

use crate::error::MergeWarning;
use crate::types::{join_lineage, TaxonomyAssignment, TaxonomyTable};

/// Current pick for one query plus the distinct lineages that tied with it.
struct Pick<'a> {
    best: &'a TaxonomyAssignment,
    tied: Vec<&'a TaxonomyAssignment>,
}

/// Higher confidence first, then the longer (more specific) lineage.
fn rank(a: &TaxonomyAssignment, b: &TaxonomyAssignment) -> Ordering {
    a.confidence
        .total_cmp(&b.confidence)
        .then_with(|| a.specificity().cmp(&b.specificity()))
}

/// Reduces classifier candidates to one assignment per query.
///
/// Candidates are taken in input order. Equal confidence and equal
/// specificity with a different lineage keeps the first one seen and yields
/// an `AmbiguousTaxonomy` warning; warnings come back sorted by query id.
pub fn join_taxonomy(candidates: &[TaxonomyAssignment]) -> (TaxonomyTable, Vec<MergeWarning>) {
    let mut picks: AHashMap<&str, Pick> = AHashMap::new();

    for candidate in candidates {
        match picks.get_mut(candidate.query_id.as_str()) {
            None => {
                picks.insert(
                    candidate.query_id.as_str(),
                    Pick {
                        best: candidate,
                        tied: Vec::new(),
                    },
                );
            }
            Some(pick) => match rank(candidate, pick.best) {
                Ordering::Greater => {
                    pick.best = candidate;
                    pick.tied.clear();
                }
                Ordering::Equal => {
                    let differs = candidate.lineage != pick.best.lineage
                        && !pick.tied.iter().any(|t| t.lineage == candidate.lineage);
                    if differs {
                        pick.tied.push(candidate);
                    }
                }
                Ordering::Less => {}
            },
        }
    }

    let mut warnings = Vec::new();
    let mut table = TaxonomyTable::with_capacity(picks.len());
    for (query_id, pick) in picks {
        if !pick.tied.is_empty() {
            warnings.push(MergeWarning::AmbiguousTaxonomy {
                query_id: query_id.to_string(),
                kept: pick.best.lineage_string(),
                discarded: pick.tied.iter().map(|t| join_lineage(&t.lineage)).collect(),
                confidence: pick.best.confidence,
            });
        }
        table.insert(query_id.to_string(), pick.best.clone());
    }

    warnings.sort_by(|a, b| match (a, b) {
        (
            MergeWarning::AmbiguousTaxonomy { query_id: qa, .. },
            MergeWarning::AmbiguousTaxonomy { query_id: qb, .. },
        ) => qa.cmp(qb),
        _ => Ordering::Equal,
    });
    for warning in &warnings {
        log::warn!("{warning}");
    }

    (table, warnings)
}
