//src/merge.rs

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::Delimiter;
use crate::error::MergeError;
use crate::types::{
    AnnotationCategory, BestHitTable, HitSlot, MergedRecord, TaxonomySlot, TaxonomyTable,
    NO_HIT, UNCLASSIFIED,
};

/// Column names of the merged table, in order.
pub const MERGED_HEADER: [&str; 8] = [
    "query_id",
    "ARG_hit",
    "ARG_score",
    "Plasmid_hit",
    "Plasmid_score",
    "MGE_hit",
    "MGE_score",
    "taxonomy_lineage",
];

/// The three per-category best-hit tables handed to the merge.
#[derive(Debug, Clone, Copy)]
pub struct CategoryTables<'a> {
    pub arg: &'a BestHitTable,
    pub plasmid: &'a BestHitTable,
    pub mge: &'a BestHitTable,
}

impl<'a> CategoryTables<'a> {
    pub fn get(&self, category: AnnotationCategory) -> &'a BestHitTable {
        match category {
            AnnotationCategory::Arg => self.arg,
            AnnotationCategory::Plasmid => self.plasmid,
            AnnotationCategory::Mge => self.mge,
        }
    }
}

/// Builds one complete row per observed query, sorted by query id.
///
/// `observed` is the union of query ids seen in any input; ids present in a
/// table but missing from `observed` are added too, so no hit is ever lost.
/// Nothing is filtered here.
pub fn merge_annotations(
    hits: CategoryTables<'_>,
    taxonomy: &TaxonomyTable,
    observed: &BTreeSet<String>,
) -> Vec<MergedRecord> {
    let mut query_ids: BTreeSet<&str> = observed.iter().map(String::as_str).collect();
    for category in AnnotationCategory::ALL {
        query_ids.extend(hits.get(category).keys().map(String::as_str));
    }
    query_ids.extend(taxonomy.keys().map(String::as_str));

    let slot = |category: AnnotationCategory, query_id: &str| -> HitSlot {
        match hits.get(category).get(query_id) {
            Some(hit) => HitSlot::Hit(hit.clone()),
            None => HitSlot::NoHit,
        }
    };

    query_ids
        .into_iter()
        .map(|query_id| MergedRecord {
            query_id: query_id.to_string(),
            arg: slot(AnnotationCategory::Arg, query_id),
            plasmid: slot(AnnotationCategory::Plasmid, query_id),
            mge: slot(AnnotationCategory::Mge, query_id),
            taxonomy: match taxonomy.get(query_id) {
                Some(assignment) => TaxonomySlot::Classified(assignment.clone()),
                None => TaxonomySlot::Unclassified,
            },
        })
        .collect()
}

/// Cells of one output row, markers included.
pub fn merged_row(record: &MergedRecord) -> [String; 8] {
    let hit_cells = |slot: &HitSlot| match slot.hit() {
        Some(hit) => (hit.reference_id.clone(), hit.score.to_string()),
        None => (NO_HIT.to_string(), NO_HIT.to_string()),
    };
    let (arg_hit, arg_score) = hit_cells(&record.arg);
    let (plasmid_hit, plasmid_score) = hit_cells(&record.plasmid);
    let (mge_hit, mge_score) = hit_cells(&record.mge);
    let lineage = match &record.taxonomy {
        TaxonomySlot::Classified(assignment) => assignment.lineage_string(),
        TaxonomySlot::Unclassified => UNCLASSIFIED.to_string(),
    };

    [
        record.query_id.clone(),
        arg_hit,
        arg_score,
        plasmid_hit,
        plasmid_score,
        mge_hit,
        mge_score,
        lineage,
    ]
}

/// Writes header plus rows to any sink.
pub fn write_merged_table<W: Write>(
    rows: &[MergedRecord],
    delimiter: Delimiter,
    sink: W,
) -> Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter.byte())
        .from_writer(sink);
    writer.write_record(MERGED_HEADER)?;
    for record in rows {
        writer.write_record(merged_row(record))?;
    }
    writer.flush()?;
    Ok(())
}

/// Renders the merged table as text.
pub fn render_merged_table(rows: &[MergedRecord], delimiter: Delimiter) -> String {
    let mut buf = Vec::new();
    // writing into a Vec cannot fail
    let _ = write_merged_table(rows, delimiter, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Writes `path` through a `.part` sibling that is renamed into place once
/// complete. On failure the sibling is removed and `path` is left as it was.
pub fn write_file_atomic<F>(path: &Path, write: F) -> Result<(), MergeError>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let tmp_path = partial_path(path);
    let result = File::create(&tmp_path).and_then(|file| {
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush()?;
        drop(writer);
        fs::rename(&tmp_path, path)
    });
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(MergeError::io(path, e));
    }
    Ok(())
}

/// Writes the merged table to `path`.
pub fn save_merged_table(
    rows: &[MergedRecord],
    delimiter: Delimiter,
    path: &Path,
) -> Result<(), MergeError> {
    write_file_atomic(path, |writer| {
        write_merged_table(rows, delimiter, writer).map_err(io::Error::from)
    })?;
    log::info!("Wrote {} merged rows to {}", rows.len(), path.display());
    Ok(())
}
