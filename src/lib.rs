// src/lib.rs
pub mod types;
pub mod error;
pub mod config;
pub mod parse;
pub mod taxdb;
pub mod classifier;
pub mod filter;
pub mod best_hit;
pub mod taxonomy;
pub mod merge;
pub mod summary;
pub mod tools;

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub use crate::classifier::ClassifierFormat;
pub use crate::config::{CategoryConfig, Delimiter, FilterThresholds, MergeConfig};
pub use crate::error::{MergeError, MergeWarning, RecordError};
pub use crate::parse::SourceFormat;
pub use crate::types::{
    AlignmentRecord, AnnotationCategory, BestHit, HitSlot, MergedRecord, TaxonomyAssignment,
    TaxonomySlot, NO_HIT, UNCLASSIFIED,
};

use crate::best_hit::resolve_best_hits;
use crate::classifier::read_classifier_file;
use crate::filter::{filter_records, remove_overlapping_hits};
use crate::merge::{
    merge_annotations, render_merged_table, save_merged_table, write_file_atomic, CategoryTables,
};
use crate::parse::read_alignment_file;
use crate::summary::{build_summary, SummaryReport};
use crate::taxdb::TaxDb;
use crate::taxonomy::join_taxonomy;
use crate::tools::ToolOutputs;
use crate::types::{BestHitTable, TaxonomyTable};

/// One aligner output file and its layout.
#[derive(Debug, Clone)]
pub struct AlignmentInput {
    pub path: PathBuf,
    pub format: SourceFormat,
}

/// Classifier output plus the taxDB used to expand taxids into lineages.
#[derive(Debug, Clone)]
pub struct TaxonomyInput {
    pub path: PathBuf,
    pub format: ClassifierFormat,
    pub taxdb: Option<PathBuf>,
}

/// Everything one merge run reads. A `None` category counts as skipped.
#[derive(Debug, Clone, Default)]
pub struct MergeInputs {
    pub sample: String,
    pub arg: Option<AlignmentInput>,
    pub plasmid: Option<AlignmentInput>,
    pub mge: Option<AlignmentInput>,
    pub taxonomy: Option<TaxonomyInput>,
}

impl MergeInputs {
    pub fn alignment(&self, category: AnnotationCategory) -> Option<&AlignmentInput> {
        match category {
            AnnotationCategory::Arg => self.arg.as_ref(),
            AnnotationCategory::Plasmid => self.plasmid.as_ref(),
            AnnotationCategory::Mge => self.mge.as_ref(),
        }
    }

    /// Inputs for the files written by `tools::run_annotation_tools`.
    pub fn from_tool_outputs(sample: &str, outputs: &ToolOutputs, taxdb: Option<PathBuf>) -> Self {
        Self {
            sample: sample.to_string(),
            arg: Some(AlignmentInput {
                path: outputs.arg_paf.clone(),
                format: SourceFormat::Paf,
            }),
            plasmid: Some(AlignmentInput {
                path: outputs.plasmid_paf.clone(),
                format: SourceFormat::Paf,
            }),
            mge: Some(AlignmentInput {
                path: outputs.mge_psl.clone(),
                format: SourceFormat::Psl,
            }),
            taxonomy: outputs.centrifuge_result.as_ref().map(|path| TaxonomyInput {
                path: path.clone(),
                format: ClassifierFormat::Centrifuge,
                taxdb,
            }),
        }
    }
}

/// Output of a merge run. Text is generated on demand.
#[derive(Debug, Clone)]
pub struct MergeResults {
    pub sample: String,
    /// One row per observed query, sorted by query id.
    pub merged: Vec<MergedRecord>,
    pub summary: SummaryReport,
    /// Every non-fatal diagnostic, in category order then taxonomy.
    pub warnings: Vec<MergeWarning>,
    pub delimiter: Delimiter,
}

impl MergeResults {
    pub fn get_merged_table(&self) -> String {
        render_merged_table(&self.merged, self.delimiter)
    }

    pub fn get_reference_counts(&self) -> String {
        self.summary.reference_counts_text()
    }

    pub fn get_taxon_report(&self) -> String {
        self.summary.taxon_report_text()
    }

    pub fn get_sample_summary(&self) -> String {
        self.summary.sample_summary_text()
    }

    /// Writes the merged table and the three summary tables into `dir`.
    pub fn write_outputs(&self, dir: &Path) -> Result<Vec<PathBuf>, MergeError> {
        check_sample_name(&self.sample)?;
        fs::create_dir_all(dir).map_err(|e| MergeError::io(dir, e))?;

        let merged_path = dir.join(format!("{}_merged.{}", self.sample, self.delimiter.extension()));
        save_merged_table(&self.merged, self.delimiter, &merged_path)?;

        let mut written = vec![merged_path];
        for (suffix, text) in [
            ("gene_counts", self.get_reference_counts()),
            ("taxon_counts", self.get_taxon_report()),
            ("summary", self.get_sample_summary()),
        ] {
            let path = dir.join(format!("{}_{suffix}.tsv", self.sample));
            write_file_atomic(&path, |writer| writer.write_all(text.as_bytes()))?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Sample names become file name prefixes, so they must stay a single
/// path component.
fn check_sample_name(sample: &str) -> Result<(), MergeError> {
    if sample.is_empty()
        || sample == "."
        || sample == ".."
        || sample.contains(['/', '\\'])
    {
        return Err(MergeError::InvalidConfig(format!(
            "sample name '{sample}' must be non-empty and contain no path separators"
        )));
    }
    Ok(())
}

/// What one category branch hands to the merge.
struct CategoryOutcome {
    hits: BestHitTable,
    observed: Vec<String>,
    warnings: Vec<MergeWarning>,
}

struct TaxonomyOutcome {
    table: TaxonomyTable,
    observed: Vec<String>,
    warnings: Vec<MergeWarning>,
}

fn missing_category(category: AnnotationCategory, file: Option<PathBuf>) -> CategoryOutcome {
    let warning = MergeWarning::MissingCategoryInput { category, file };
    log::warn!("{warning}");
    CategoryOutcome {
        hits: BestHitTable::new(),
        observed: Vec::new(),
        warnings: vec![warning],
    }
}

/// Parse -> filter -> (overlap removal) -> best hit, for one category.
fn resolve_category(
    category: AnnotationCategory,
    inputs: &MergeInputs,
    config: &MergeConfig,
) -> Result<CategoryOutcome, MergeError> {
    let Some(input) = inputs.alignment(category) else {
        return Ok(missing_category(category, None));
    };
    let Some(parsed) = read_alignment_file(&input.path, input.format, config.max_malformed_fraction)?
    else {
        return Ok(missing_category(category, Some(input.path.clone())));
    };
    if parsed.records.is_empty() {
        let mut outcome = missing_category(category, Some(input.path.clone()));
        outcome.warnings.extend(parsed.warnings);
        return Ok(outcome);
    }

    let settings = config.category(category);
    let mut kept = filter_records(&parsed.records, &settings.thresholds);
    if let Some(max_overlap) = settings.overlap_fraction {
        kept = remove_overlapping_hits(&kept, max_overlap);
    }
    let hits = resolve_best_hits(&kept, category);

    log::info!(
        "{category}: {} records from {}, {} pass thresholds, {} queries with a best hit",
        parsed.records.len(),
        input.path.display(),
        kept.len(),
        hits.len()
    );

    Ok(CategoryOutcome {
        hits,
        observed: parsed.records.into_iter().map(|r| r.query_id).collect(),
        warnings: parsed.warnings,
    })
}

fn resolve_taxonomy(
    input: Option<&TaxonomyInput>,
    config: &MergeConfig,
) -> Result<TaxonomyOutcome, MergeError> {
    let empty = TaxonomyOutcome {
        table: TaxonomyTable::new(),
        observed: Vec::new(),
        warnings: Vec::new(),
    };
    let Some(input) = input else {
        log::info!("No taxonomy input; every query is {UNCLASSIFIED}");
        return Ok(empty);
    };

    let taxdb = match &input.taxdb {
        Some(path) => Some(TaxDb::load(path)?),
        None => {
            if input.format.needs_taxdb() {
                log::warn!(
                    "No taxDB given for {}; lineages fall back to taxid labels",
                    input.path.display()
                );
            }
            None
        }
    };

    let Some(output) = read_classifier_file(
        &input.path,
        input.format,
        taxdb.as_ref(),
        config.max_malformed_fraction,
    )?
    else {
        log::warn!(
            "Classifier output {} not found; every query is {UNCLASSIFIED}",
            input.path.display()
        );
        return Ok(empty);
    };

    let (table, mut warnings) = join_taxonomy(&output.candidates);
    log::info!(
        "Taxonomy: {} candidates, {} queries classified",
        output.candidates.len(),
        table.len()
    );

    let mut all_warnings = output.warnings;
    all_warnings.append(&mut warnings);
    Ok(TaxonomyOutcome {
        table,
        observed: output.observed,
        warnings: all_warnings,
    })
}

/// Runs the whole merge for one sample.
///
/// The three categories and the taxonomy are read and resolved in parallel;
/// the merge waits for all four. Any fatal error abandons the run and no
/// table is produced.
pub fn run_merge(inputs: &MergeInputs, config: &MergeConfig) -> Result<MergeResults, MergeError> {
    config.validate()?;
    check_sample_name(&inputs.sample)?;

    let ((arg, plasmid), (mge, taxonomy)) = rayon::join(
        || {
            rayon::join(
                || resolve_category(AnnotationCategory::Arg, inputs, config),
                || resolve_category(AnnotationCategory::Plasmid, inputs, config),
            )
        },
        || {
            rayon::join(
                || resolve_category(AnnotationCategory::Mge, inputs, config),
                || resolve_taxonomy(inputs.taxonomy.as_ref(), config),
            )
        },
    );
    let (arg, plasmid, mge, taxonomy) = (arg?, plasmid?, mge?, taxonomy?);

    let mut observed: BTreeSet<String> = BTreeSet::new();
    let mut warnings = Vec::new();
    for outcome in [&arg, &plasmid, &mge] {
        observed.extend(outcome.observed.iter().cloned());
        warnings.extend(outcome.warnings.iter().cloned());
    }
    observed.extend(taxonomy.observed.iter().cloned());
    warnings.extend(taxonomy.warnings.iter().cloned());

    let merged = merge_annotations(
        CategoryTables {
            arg: &arg.hits,
            plasmid: &plasmid.hits,
            mge: &mge.hits,
        },
        &taxonomy.table,
        &observed,
    );
    log::info!("Merged {} queries", merged.len());

    let summary = build_summary(&merged, &inputs.sample);

    Ok(MergeResults {
        sample: inputs.sample.clone(),
        merged,
        summary,
        warnings,
        delimiter: config.delimiter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_categories_yield_only_markers() {
        let dir = tempfile::tempdir().unwrap();
        let plasmid = dir.path().join("plasmid.tsv");
        fs::write(&plasmid, "q2\tNZ_CP012345\t0.9\t0.95\t0.9\t0\t5000\n").unwrap();

        let inputs = MergeInputs {
            sample: "S1".into(),
            plasmid: Some(AlignmentInput {
                path: plasmid,
                format: SourceFormat::Tabular,
            }),
            ..Default::default()
        };
        let results = run_merge(&inputs, &MergeConfig::default()).unwrap();

        assert_eq!(results.merged.len(), 1);
        let q2 = &results.merged[0];
        assert_eq!(q2.arg, HitSlot::NoHit);
        assert_eq!(q2.mge, HitSlot::NoHit);
        assert_eq!(q2.taxonomy, TaxonomySlot::Unclassified);
        assert_eq!(q2.plasmid.hit().unwrap().reference_id, "NZ_CP012345");

        let missing: Vec<AnnotationCategory> = results
            .warnings
            .iter()
            .filter_map(|w| match w {
                MergeWarning::MissingCategoryInput { category, .. } => Some(*category),
                _ => None,
            })
            .collect();
        assert_eq!(missing, vec![AnnotationCategory::Arg, AnnotationCategory::Mge]);
    }

    #[test]
    fn invalid_config_is_rejected_before_reading() {
        let mut config = MergeConfig::default();
        config.arg.thresholds.min_identity = 2.0;
        assert!(matches!(
            run_merge(&MergeInputs::default(), &config),
            Err(MergeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn sample_name_must_be_a_single_path_component() {
        for sample in ["../x", "a/b", "a\\b", "..", ""] {
            let inputs = MergeInputs {
                sample: sample.into(),
                ..Default::default()
            };
            assert!(
                matches!(run_merge(&inputs, &MergeConfig::default()), Err(MergeError::InvalidConfig(_))),
                "{sample:?} accepted"
            );
        }

        let dir = tempfile::tempdir().unwrap();
        let inputs = MergeInputs {
            sample: "S1".into(),
            ..Default::default()
        };
        let mut results = run_merge(&inputs, &MergeConfig::default()).unwrap();
        results.sample = "../escape".into();
        let out = dir.path().join("out");
        assert!(results.write_outputs(&out).is_err());
        assert!(!dir.path().join("escape_merged.tsv").exists());
    }

    #[test]
    fn category_inputs_are_looked_up_by_category() {
        let outputs = ToolOutputs {
            arg_paf: PathBuf::from("w/S1_ARG.paf"),
            plasmid_paf: PathBuf::from("w/S1_plsdb.paf"),
            mge_psl: PathBuf::from("w/S1_MGE.psl"),
            centrifuge_result: None,
        };
        let inputs = MergeInputs::from_tool_outputs("S1", &outputs, None);

        let mge = inputs.alignment(AnnotationCategory::Mge).unwrap();
        assert_eq!(mge.path, PathBuf::from("w/S1_MGE.psl"));
        assert_eq!(mge.format, SourceFormat::Psl);
        assert_eq!(
            inputs.alignment(AnnotationCategory::Plasmid).unwrap().path,
            PathBuf::from("w/S1_plsdb.paf")
        );
        assert!(inputs.taxonomy.is_none());
    }
}
