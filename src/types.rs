//src/types.rs

use ahash::AHashMap;
use std::fmt;
use std::str::FromStr;

/// Literal written in a category column when a query has no surviving hit.
pub const NO_HIT: &str = "no hit";

/// Literal written in the lineage column when a query has no taxonomy.
pub const UNCLASSIFIED: &str = "unclassified";

/// Separator between rank labels when a lineage is written as one string.
pub const LINEAGE_SEPARATOR: char = ';';

/// The annotation databases a read is aligned against.
/// Each one carries its own reference database and thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnnotationCategory {
    Arg,
    Plasmid,
    Mge,
}

impl AnnotationCategory {
    /// All categories in output column order.
    pub const ALL: [AnnotationCategory; 3] = [
        AnnotationCategory::Arg,
        AnnotationCategory::Plasmid,
        AnnotationCategory::Mge,
    ];

    /// Column prefix used in the merged table (`ARG_hit`, `Plasmid_score`, ...).
    pub fn label(&self) -> &'static str {
        match self {
            AnnotationCategory::Arg => "ARG",
            AnnotationCategory::Plasmid => "Plasmid",
            AnnotationCategory::Mge => "MGE",
        }
    }
}

impl fmt::Display for AnnotationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AnnotationCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "arg" => Ok(AnnotationCategory::Arg),
            "plasmid" | "plsdb" => Ok(AnnotationCategory::Plasmid),
            "mge" => Ok(AnnotationCategory::Mge),
            other => Err(format!("unknown annotation category '{other}'")),
        }
    }
}

/// One alignment line of tool output, in a tool-independent shape.
/// `start`/`end` are coordinates on the query (the read or contig).
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRecord {
    pub query_id: String,
    pub reference_id: String,
    pub score: f64,
    pub identity: f64, // fraction in [0, 1]
    pub coverage: f64, // fraction in [0, 1]
    pub start: u64,
    pub end: u64,
}

impl AlignmentRecord {
    /// Length of the aligned span on the query.
    pub fn span(&self) -> u64 {
        self.end - self.start
    }
}

/// The single retained hit of one query in one category.
#[derive(Debug, Clone, PartialEq)]
pub struct BestHit {
    pub query_id: String,
    pub category: AnnotationCategory,
    pub reference_id: String,
    pub score: f64,
    pub identity: f64,
    pub coverage: f64,
    pub start: u64,
    pub end: u64,
}

impl BestHit {
    pub fn from_record(record: &AlignmentRecord, category: AnnotationCategory) -> Self {
        Self {
            query_id: record.query_id.clone(),
            category,
            reference_id: record.reference_id.clone(),
            score: record.score,
            identity: record.identity,
            coverage: record.coverage,
            start: record.start,
            end: record.end,
        }
    }
}

/// A taxonomic call for one query. The lineage runs from the broadest rank
/// to the most specific one.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxonomyAssignment {
    pub query_id: String,
    pub lineage: Vec<String>,
    pub confidence: f64,
}

impl TaxonomyAssignment {
    /// Number of ranks; a longer lineage is a more specific call.
    pub fn specificity(&self) -> usize {
        self.lineage.len()
    }

    pub fn lineage_string(&self) -> String {
        join_lineage(&self.lineage)
    }
}

pub fn join_lineage(ranks: &[String]) -> String {
    let mut out = String::new();
    for (i, rank) in ranks.iter().enumerate() {
        if i > 0 {
            out.push(LINEAGE_SEPARATOR);
        }
        out.push_str(rank);
    }
    out
}

/// A category column of the merged table: either the resolved best hit or
/// the explicit "no hit" marker.
#[derive(Debug, Clone, PartialEq)]
pub enum HitSlot {
    Hit(BestHit),
    NoHit,
}

impl HitSlot {
    pub fn hit(&self) -> Option<&BestHit> {
        match self {
            HitSlot::Hit(hit) => Some(hit),
            HitSlot::NoHit => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, HitSlot::Hit(_))
    }
}

/// The taxonomy column of the merged table.
#[derive(Debug, Clone, PartialEq)]
pub enum TaxonomySlot {
    Classified(TaxonomyAssignment),
    Unclassified,
}

impl TaxonomySlot {
    pub fn assignment(&self) -> Option<&TaxonomyAssignment> {
        match self {
            TaxonomySlot::Classified(assignment) => Some(assignment),
            TaxonomySlot::Unclassified => None,
        }
    }

    pub fn is_classified(&self) -> bool {
        matches!(self, TaxonomySlot::Classified(_))
    }
}

/// One row of the final table. Every column is always populated.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub query_id: String,
    pub arg: HitSlot,
    pub plasmid: HitSlot,
    pub mge: HitSlot,
    pub taxonomy: TaxonomySlot,
}

impl MergedRecord {
    pub fn slot(&self, category: AnnotationCategory) -> &HitSlot {
        match category {
            AnnotationCategory::Arg => &self.arg,
            AnnotationCategory::Plasmid => &self.plasmid,
            AnnotationCategory::Mge => &self.mge,
        }
    }

    /// True when at least one category column holds a real hit.
    pub fn has_any_hit(&self) -> bool {
        AnnotationCategory::ALL
            .iter()
            .any(|&category| self.slot(category).is_hit())
    }
}

/// query_id -> best hit, for one category.
pub type BestHitTable = AHashMap<String, BestHit>;

/// query_id -> reconciled taxonomy.
pub type TaxonomyTable = AHashMap<String, TaxonomyAssignment>;
