// src/summary.rs

use ahash::AHashMap;
use std::fmt::Write as _;

use crate::types::{join_lineage, AnnotationCategory, MergedRecord, UNCLASSIFIED};

/// Number of queries whose best hit in `category` is `reference_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceCount {
    pub category: AnnotationCategory,
    pub reference_id: String,
    pub queries: u64,
}

/// One row of the lineage report. Only queries carrying at least one hit
/// are counted.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxonReportRow {
    pub pct: f64,                // share of annotated queries in this clade
    pub queries: u64,            // clade count: this prefix and everything below it
    pub tax_queries: u64,        // queries whose lineage ends exactly here
    pub name: String,            // last rank of the prefix
    pub lineage: String,         // full prefix, ranks joined by ';'
    pub depth: usize,            // indentation level
    pub children: Vec<String>,   // child prefixes, report order
}

/// Per-sample totals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSummary {
    pub sample: String,
    pub total_queries: u64,
    pub classified: u64,
    pub unclassified: u64,
    /// Queries with at least one ARG, plasmid or MGE hit.
    pub annotated: u64,
    pub arg_hits: u64,
    pub plasmid_hits: u64,
    pub mge_hits: u64,
}

impl SampleSummary {
    pub fn hits(&self, category: AnnotationCategory) -> u64 {
        match category {
            AnnotationCategory::Arg => self.arg_hits,
            AnnotationCategory::Plasmid => self.plasmid_hits,
            AnnotationCategory::Mge => self.mge_hits,
        }
    }
}

/// All aggregates handed to the plotting side.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryReport {
    pub sample: SampleSummary,
    pub reference_counts: Vec<ReferenceCount>,
    pub taxon_rows: Vec<TaxonReportRow>,
}

/// Per-prefix counts while building the lineage tree.
#[derive(Default, Debug, Clone)]
struct NodeStats {
    name: String,
    self_queries: u64,
    clade_queries: u64,
}

type ChildrenMap = AHashMap<String, Vec<String>>;

// The tree root is the empty prefix; it is not reported itself.
const ROOT: &str = "";

pub fn build_summary(rows: &[MergedRecord], sample: &str) -> SummaryReport {
    let summary = sample_summary(rows, sample);
    let reference_counts = reference_counts(rows);
    let taxon_rows = build_taxon_report(rows);
    log::info!(
        "{sample}: {} queries, {} annotated, {} classified",
        summary.total_queries,
        summary.annotated,
        summary.classified
    );
    SummaryReport {
        sample: summary,
        reference_counts,
        taxon_rows,
    }
}

pub fn sample_summary(rows: &[MergedRecord], sample: &str) -> SampleSummary {
    let mut summary = SampleSummary {
        sample: sample.to_string(),
        total_queries: rows.len() as u64,
        ..Default::default()
    };
    for record in rows {
        if record.taxonomy.is_classified() {
            summary.classified += 1;
        } else {
            summary.unclassified += 1;
        }
        if record.has_any_hit() {
            summary.annotated += 1;
        }
        summary.arg_hits += record.arg.is_hit() as u64;
        summary.plasmid_hits += record.plasmid.is_hit() as u64;
        summary.mge_hits += record.mge.is_hit() as u64;
    }
    summary
}

/// Hit counts per reference, grouped by category, most frequent first.
pub fn reference_counts(rows: &[MergedRecord]) -> Vec<ReferenceCount> {
    let mut counts: AHashMap<(AnnotationCategory, &str), u64> = AHashMap::new();
    for record in rows {
        for category in AnnotationCategory::ALL {
            if let Some(hit) = record.slot(category).hit() {
                *counts.entry((category, hit.reference_id.as_str())).or_insert(0) += 1;
            }
        }
    }

    let mut out: Vec<ReferenceCount> = counts
        .into_iter()
        .map(|((category, reference_id), queries)| ReferenceCount {
            category,
            reference_id: reference_id.to_string(),
            queries,
        })
        .collect();
    out.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then_with(|| b.queries.cmp(&a.queries))
            .then_with(|| a.reference_id.cmp(&b.reference_id))
    });
    out
}

/// Kraken-style clade report over lineage prefixes of annotated queries.
/// Annotated queries without taxonomy come first as a depth-0 `unclassified` row.
pub fn build_taxon_report(rows: &[MergedRecord]) -> Vec<TaxonReportRow> {
    let annotated: Vec<&MergedRecord> = rows.iter().filter(|r| r.has_any_hit()).collect();
    let total = annotated.len() as u64;
    let mut report = Vec::new();
    if total == 0 {
        return report;
    }

    let (mut stats_map, children_map) = build_lineage_tree(&annotated);
    accumulate_clade_stats(ROOT, &children_map, &mut stats_map);

    let unclassified = annotated
        .iter()
        .filter(|r| !r.taxonomy.is_classified())
        .count() as u64;
    if unclassified > 0 {
        report.push(TaxonReportRow {
            pct: 100.0 * unclassified as f64 / total as f64,
            queries: unclassified,
            tax_queries: unclassified,
            name: UNCLASSIFIED.to_string(),
            lineage: UNCLASSIFIED.to_string(),
            depth: 0,
            children: Vec::new(),
        });
    }

    for child in sorted_children(ROOT, &stats_map, &children_map) {
        dfs(&child, 0, &stats_map, &children_map, total, &mut report);
    }
    report
}

fn build_lineage_tree(annotated: &[&MergedRecord]) -> (AHashMap<String, NodeStats>, ChildrenMap) {
    let mut stats_map: AHashMap<String, NodeStats> = AHashMap::new();
    let mut children_map: ChildrenMap = AHashMap::new();
    stats_map.insert(ROOT.to_string(), NodeStats::default());

    for record in annotated {
        let Some(assignment) = record.taxonomy.assignment() else {
            continue;
        };
        let mut parent = ROOT.to_string();
        for depth in 0..assignment.lineage.len() {
            let key = join_lineage(&assignment.lineage[..=depth]);
            if !stats_map.contains_key(&key) {
                stats_map.insert(
                    key.clone(),
                    NodeStats {
                        name: assignment.lineage[depth].clone(),
                        ..Default::default()
                    },
                );
                children_map.entry(parent.clone()).or_default().push(key.clone());
            }
            parent = key;
        }
        if let Some(node) = stats_map.get_mut(&parent) {
            node.self_queries += 1;
        }
    }
    (stats_map, children_map)
}

/// Recursively sums self counts of descendants into each node's clade count.
fn accumulate_clade_stats(
    key: &str,
    children_map: &ChildrenMap,
    stats_map: &mut AHashMap<String, NodeStats>,
) -> u64 {
    let mut total = stats_map.get(key).map(|s| s.self_queries).unwrap_or(0);
    if let Some(kids) = children_map.get(key) {
        for child in kids {
            total += accumulate_clade_stats(child, children_map, stats_map);
        }
    }
    if let Some(node) = stats_map.get_mut(key) {
        node.clade_queries = total;
    }
    total
}

/// Children by clade count desc, then name for a stable order.
fn sorted_children(
    key: &str,
    stats_map: &AHashMap<String, NodeStats>,
    children_map: &ChildrenMap,
) -> Vec<String> {
    let mut kids = children_map.get(key).cloned().unwrap_or_default();
    kids.sort_by(|a, b| {
        let ca = stats_map.get(a).map(|s| s.clade_queries).unwrap_or(0);
        let cb = stats_map.get(b).map(|s| s.clade_queries).unwrap_or(0);
        cb.cmp(&ca).then_with(|| a.cmp(b))
    });
    kids
}

fn dfs(
    key: &str,
    depth: usize,
    stats_map: &AHashMap<String, NodeStats>,
    children_map: &ChildrenMap,
    total: u64,
    report: &mut Vec<TaxonReportRow>,
) {
    let Some(stats) = stats_map.get(key) else {
        return;
    };
    if stats.clade_queries == 0 {
        return;
    }

    let kids = sorted_children(key, stats_map, children_map);
    report.push(TaxonReportRow {
        pct: 100.0 * stats.clade_queries as f64 / total as f64,
        queries: stats.clade_queries,
        tax_queries: stats.self_queries,
        name: stats.name.clone(),
        lineage: key.to_string(),
        depth,
        children: kids.clone(),
    });

    for child in kids {
        dfs(&child, depth + 1, stats_map, children_map, total, report);
    }
}

// ---------------------------------------------------------------------------
// Text rendering
// ---------------------------------------------------------------------------

impl SummaryReport {
    /// `category  reference_id  queries`
    pub fn reference_counts_text(&self) -> String {
        let mut output = String::from("category\treference_id\tqueries\n");
        for row in &self.reference_counts {
            let _ = writeln!(output, "{}\t{}\t{}", row.category, row.reference_id, row.queries);
        }
        output
    }

    /// Indented clade report; the name column is indented by depth.
    pub fn taxon_report_text(&self) -> String {
        let mut output = String::from("%\tqueries\ttaxQueries\tlineage\tname\n");
        for row in &self.taxon_rows {
            let mut indented_name = String::new();
            for _ in 0..row.depth {
                indented_name.push_str("  ");
            }
            indented_name.push_str(&row.name);
            let _ = writeln!(
                output,
                "{:.4}\t{}\t{}\t{}\t{}",
                row.pct, row.queries, row.tax_queries, row.lineage, indented_name
            );
        }
        output
    }

    pub fn sample_summary_text(&self) -> String {
        let s = &self.sample;
        let mut output = String::from(
            "sample\ttotal_queries\tclassified\tunclassified\tannotated\tARG_hits\tPlasmid_hits\tMGE_hits\n",
        );
        let _ = writeln!(
            output,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            s.sample,
            s.total_queries,
            s.classified,
            s.unclassified,
            s.annotated,
            s.arg_hits,
            s.plasmid_hits,
            s.mge_hits
        );
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BestHit, HitSlot, TaxonomyAssignment, TaxonomySlot};

    fn hit(q: &str, category: AnnotationCategory, r: &str) -> HitSlot {
        HitSlot::Hit(BestHit {
            query_id: q.into(),
            category,
            reference_id: r.into(),
            score: 1.0,
            identity: 1.0,
            coverage: 1.0,
            start: 0,
            end: 1,
        })
    }

    fn row(q: &str, arg: Option<&str>, mge: Option<&str>, lineage: Option<&[&str]>) -> MergedRecord {
        MergedRecord {
            query_id: q.into(),
            arg: arg.map(|r| hit(q, AnnotationCategory::Arg, r)).unwrap_or(HitSlot::NoHit),
            plasmid: HitSlot::NoHit,
            mge: mge.map(|r| hit(q, AnnotationCategory::Mge, r)).unwrap_or(HitSlot::NoHit),
            taxonomy: match lineage {
                Some(l) => TaxonomySlot::Classified(TaxonomyAssignment {
                    query_id: q.into(),
                    lineage: l.iter().map(|s| s.to_string()).collect(),
                    confidence: 1.0,
                }),
                None => TaxonomySlot::Unclassified,
            },
        }
    }

    fn sample_rows() -> Vec<MergedRecord> {
        vec![
            row("r1", Some("blaTEM-1"), None, Some(&["Bacteria", "Escherichia"])),
            row("r2", Some("blaTEM-1"), Some("IS26"), Some(&["Bacteria", "Escherichia"])),
            row("r3", Some("sul1"), None, Some(&["Bacteria", "Klebsiella"])),
            row("r4", None, Some("IS26"), Some(&["Bacteria"])),
            row("r5", None, None, Some(&["Bacteria", "Salmonella"])),
            row("r6", Some("tetA"), None, None),
            row("r7", None, None, None),
        ]
    }

    #[test]
    fn sample_totals() {
        let s = sample_summary(&sample_rows(), "S1");
        assert_eq!(s.total_queries, 7);
        assert_eq!(s.classified, 5);
        assert_eq!(s.unclassified, 2);
        assert_eq!(s.annotated, 5);
        assert_eq!(s.hits(AnnotationCategory::Arg), 4);
        assert_eq!(s.hits(AnnotationCategory::Mge), 2);
        assert_eq!(s.hits(AnnotationCategory::Plasmid), 0);
    }

    #[test]
    fn reference_counts_are_grouped_and_ranked() {
        let counts = reference_counts(&sample_rows());
        let flat: Vec<(AnnotationCategory, &str, u64)> = counts
            .iter()
            .map(|c| (c.category, c.reference_id.as_str(), c.queries))
            .collect();
        assert_eq!(
            flat,
            vec![
                (AnnotationCategory::Arg, "blaTEM-1", 2),
                (AnnotationCategory::Arg, "sul1", 1),
                (AnnotationCategory::Arg, "tetA", 1),
                (AnnotationCategory::Mge, "IS26", 2),
            ]
        );
    }

    #[test]
    fn taxon_report_counts_prefixes_of_annotated_queries() {
        let rows = build_taxon_report(&sample_rows());
        let flat: Vec<(&str, u64, u64, usize)> = rows
            .iter()
            .map(|r| (r.lineage.as_str(), r.queries, r.tax_queries, r.depth))
            .collect();
        assert_eq!(
            flat,
            vec![
                ("unclassified", 1, 1, 0),
                ("Bacteria", 4, 1, 0),
                ("Bacteria;Escherichia", 2, 2, 1),
                ("Bacteria;Klebsiella", 1, 1, 1),
            ]
        );
        assert_eq!(rows[1].pct, 80.0);
        assert_eq!(rows[1].children, vec!["Bacteria;Escherichia", "Bacteria;Klebsiella"]);
    }

    #[test]
    fn nothing_annotated_gives_empty_report() {
        let rows = vec![row("r1", None, None, Some(&["Bacteria"]))];
        assert!(build_taxon_report(&rows).is_empty());
    }

    #[test]
    fn text_renderings_have_headers() {
        let report = build_summary(&sample_rows(), "S1");
        assert!(report.reference_counts_text().starts_with("category\treference_id\tqueries\nARG\tblaTEM-1\t2\n"));
        assert!(report.taxon_report_text().contains("40.0000\t2\t2\tBacteria;Escherichia\t  Escherichia\n"));
        assert!(report.sample_summary_text().ends_with("S1\t7\t5\t2\t5\t4\t0\t2\n"));
    }
}
