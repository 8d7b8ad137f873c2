//src/classifier.rs

use std::path::Path;
use std::str::FromStr;

use crate::error::{MergeError, MergeWarning, RecordError};
use crate::parse::{field, fraction, is_comment, non_empty, read_records};
use crate::taxdb::TaxDb;
use crate::types::{TaxonomyAssignment, LINEAGE_SEPARATOR};

/// Output layouts of the taxonomic classifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierFormat {
    /// `query_id lineage confidence`, ranks separated by `;`.
    Tabular,
    /// Centrifuge `-S` result file.
    Centrifuge,
    /// Kraken per-read output (`C/U read_id taxid length hitlist`).
    Kraken,
}

impl ClassifierFormat {
    /// Whether lineages must be looked up in a taxDB.
    pub fn needs_taxdb(&self) -> bool {
        !matches!(self, ClassifierFormat::Tabular)
    }
}

impl FromStr for ClassifierFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tabular" | "tsv" => Ok(ClassifierFormat::Tabular),
            "centrifuge" => Ok(ClassifierFormat::Centrifuge),
            "kraken" | "krakenuniq" => Ok(ClassifierFormat::Kraken),
            other => Err(format!(
                "unknown classifier format '{other}' (tabular, centrifuge, kraken)"
            )),
        }
    }
}

/// What the classifier said about one query on one line.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierCall {
    Lineage { lineage: Vec<String>, confidence: f64 },
    TaxId { taxid: u32, confidence: f64 },
    Unclassified,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierLine {
    pub query_id: String,
    pub call: ClassifierCall,
}

/// Parses one classifier output line. Comments and header rows give `Ok(None)`.
pub fn parse_classifier_line(
    line: &str,
    format: ClassifierFormat,
) -> Result<Option<ClassifierLine>, RecordError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if is_comment(line) {
        return Ok(None);
    }
    let fields: Vec<&str> = line.split('\t').collect();

    match format {
        ClassifierFormat::Tabular => parse_tabular(&fields),
        ClassifierFormat::Centrifuge => parse_centrifuge(&fields),
        ClassifierFormat::Kraken => parse_kraken(&fields),
    }
}

fn need(fields: &[&str], expected: usize) -> Result<(), RecordError> {
    if fields.len() < expected {
        return Err(RecordError::FieldCount {
            expected,
            found: fields.len(),
        });
    }
    Ok(())
}

fn parse_tabular(fields: &[&str]) -> Result<Option<ClassifierLine>, RecordError> {
    if fields[0] == "query_id" {
        return Ok(None);
    }
    need(fields, 3)?;
    let query_id = non_empty(fields[0], "query_id")?;
    let lineage: Vec<String> = fields[1]
        .split(LINEAGE_SEPARATOR)
        .map(str::trim)
        .filter(|rank| !rank.is_empty())
        .map(str::to_string)
        .collect();
    if lineage.is_empty() {
        return Err(RecordError::EmptyField { field: "lineage" });
    }
    let confidence = fraction(field(fields, 2, "confidence")?, "confidence")?;

    Ok(Some(ClassifierLine {
        query_id: query_id.to_string(),
        call: ClassifierCall::Lineage { lineage, confidence },
    }))
}

// readID  seqID  taxID  score  2ndBestScore  hitLength  queryLength  numMatches
fn parse_centrifuge(fields: &[&str]) -> Result<Option<ClassifierLine>, RecordError> {
    if fields[0] == "readID" {
        return Ok(None);
    }
    need(fields, 8)?;
    let query_id = non_empty(fields[0], "readID")?;
    let taxid: u32 = field(fields, 2, "taxID")?;
    let num_matches: u32 = field(fields, 7, "numMatches")?;
    if num_matches == 0 {
        return Err(RecordError::InvalidValue {
            field: "numMatches",
            value: fields[7].to_string(),
        });
    }

    let call = if taxid == 0 {
        ClassifierCall::Unclassified
    } else {
        ClassifierCall::TaxId {
            taxid,
            confidence: 1.0 / num_matches as f64,
        }
    };
    Ok(Some(ClassifierLine {
        query_id: query_id.to_string(),
        call,
    }))
}

fn parse_kraken(fields: &[&str]) -> Result<Option<ClassifierLine>, RecordError> {
    need(fields, 3)?;
    let query_id = non_empty(fields[1], "read_id")?;
    let call = match fields[0].trim() {
        "U" => ClassifierCall::Unclassified,
        "C" => {
            let taxid = kraken_taxid(fields[2])?;
            if taxid == 0 {
                ClassifierCall::Unclassified
            } else {
                ClassifierCall::TaxId {
                    taxid,
                    confidence: 1.0,
                }
            }
        }
        other => {
            return Err(RecordError::InvalidValue {
                field: "status",
                value: other.to_string(),
            })
        }
    };
    Ok(Some(ClassifierLine {
        query_id: query_id.to_string(),
        call,
    }))
}

/// Accepts a bare taxid or the `Name (taxid 562)` form written with `--use-names`.
fn kraken_taxid(raw: &str) -> Result<u32, RecordError> {
    let raw = raw.trim();
    let digits = match raw.rfind("(taxid ") {
        Some(pos) => raw[pos + 7..].trim_end_matches(')').trim(),
        None => raw,
    };
    digits.parse().map_err(|_| RecordError::NotNumeric {
        field: "taxid",
        value: raw.to_string(),
    })
}

/// Parsed classifier file.
#[derive(Debug, Clone, Default)]
pub struct ClassifierOutput {
    /// Every query id the classifier mentioned, classified or not, in file order.
    pub observed: Vec<String>,
    /// Candidate assignments in file order, possibly several per query.
    pub candidates: Vec<TaxonomyAssignment>,
    pub data_lines: usize,
    pub warnings: Vec<MergeWarning>,
}

/// Reads a classifier output file and resolves taxids through `taxdb`.
/// Without a taxDB, a taxid becomes the one-rank lineage `taxid:<n>`.
/// `Ok(None)` when the file does not exist.
pub fn read_classifier_file(
    path: &Path,
    format: ClassifierFormat,
    taxdb: Option<&TaxDb>,
    max_malformed_fraction: f64,
) -> Result<Option<ClassifierOutput>, MergeError> {
    let Some(parsed) = read_records(path, max_malformed_fraction, |line| {
        parse_classifier_line(line, format)
    })?
    else {
        return Ok(None);
    };

    let mut output = ClassifierOutput {
        data_lines: parsed.data_lines,
        warnings: parsed.warnings,
        ..Default::default()
    };

    for line in parsed.records {
        let candidate = match line.call {
            ClassifierCall::Lineage { lineage, confidence } => Some((lineage, confidence)),
            ClassifierCall::TaxId { taxid, confidence } => {
                let lineage = match taxdb {
                    Some(db) => db.lineage(taxid),
                    None => vec![format!("taxid:{taxid}")],
                };
                Some((lineage, confidence))
            }
            ClassifierCall::Unclassified => None,
        };

        if let Some((lineage, confidence)) = candidate {
            output.candidates.push(TaxonomyAssignment {
                query_id: line.query_id.clone(),
                lineage,
                confidence,
            });
        }
        output.observed.push(line.query_id);
    }

    log::debug!(
        "{}: {} classifier candidates over {} lines",
        path.display(),
        output.candidates.len(),
        output.data_lines
    );
    Ok(Some(output))
}
