//src/parse.rs

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{MergeError, MergeWarning, RecordError};
use crate::types::AlignmentRecord;

/// Tabular layouts the aligners emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// minimap2 PAF (12 mandatory columns, optional `AS:i` tag used as score).
    Paf,
    /// PSL as written by `maf-convert psl` from LAST output; the read is the PSL target.
    Psl,
    /// `query_id reference_id score identity coverage start end`
    Tabular,
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "paf" => Ok(SourceFormat::Paf),
            "psl" => Ok(SourceFormat::Psl),
            "tabular" | "tsv" => Ok(SourceFormat::Tabular),
            other => Err(format!("unknown alignment format '{other}' (paf, psl, tabular)")),
        }
    }
}

const PAF_FIELDS: usize = 12;
const PSL_FIELDS: usize = 21;
const TABULAR_FIELDS: usize = 7;

/// True for blank lines and `#` comments, which every format tolerates.
#[inline]
pub(crate) fn is_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn is_header(line: &str, format: SourceFormat) -> bool {
    match format {
        SourceFormat::Paf => false,
        // psLayout banner, the two column-title lines and the dashed rule
        SourceFormat::Psl => {
            let trimmed = line.trim_start();
            trimmed.starts_with("psLayout")
                || trimmed.starts_with("match")
                || trimmed.starts_with("---")
        }
        SourceFormat::Tabular => line.split('\t').next() == Some("query_id"),
    }
}

pub(crate) fn field<T: FromStr>(
    fields: &[&str],
    idx: usize,
    name: &'static str,
) -> Result<T, RecordError> {
    let raw = fields[idx].trim();
    raw.parse().map_err(|_| RecordError::NotNumeric {
        field: name,
        value: raw.to_string(),
    })
}

pub(crate) fn finite(value: f64, name: &'static str) -> Result<f64, RecordError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(RecordError::NotNumeric {
            field: name,
            value: value.to_string(),
        })
    }
}

pub(crate) fn fraction(value: f64, name: &'static str) -> Result<f64, RecordError> {
    let value = finite(value, name)?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(RecordError::OutOfRange { field: name, value })
    }
}

pub(crate) fn non_empty<'a>(value: &'a str, name: &'static str) -> Result<&'a str, RecordError> {
    let value = value.trim();
    if value.is_empty() {
        Err(RecordError::EmptyField { field: name })
    } else {
        Ok(value)
    }
}

fn ordered(start: u64, end: u64) -> Result<(), RecordError> {
    if end < start {
        Err(RecordError::InvertedCoordinates { start, end })
    } else {
        Ok(())
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn expect_fields(fields: &[&str], expected: usize) -> Result<(), RecordError> {
    if fields.len() < expected {
        Err(RecordError::FieldCount {
            expected,
            found: fields.len(),
        })
    } else {
        Ok(())
    }
}

/// Parses one line of aligner output.
///
/// Returns `Ok(None)` for comments and header lines, `Ok(Some(_))` for a
/// record, and an error describing why a data line is malformed.
pub fn parse_alignment_line(
    line: &str,
    format: SourceFormat,
) -> Result<Option<AlignmentRecord>, RecordError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if is_comment(line) || is_header(line, format) {
        return Ok(None);
    }
    let fields: Vec<&str> = line.split('\t').collect();

    let record = match format {
        SourceFormat::Paf => parse_paf(&fields)?,
        SourceFormat::Psl => parse_psl(&fields)?,
        SourceFormat::Tabular => parse_tabular(&fields)?,
    };
    Ok(Some(record))
}

fn parse_paf(fields: &[&str]) -> Result<AlignmentRecord, RecordError> {
    expect_fields(fields, PAF_FIELDS)?;
    let query_id = non_empty(fields[0], "query_name")?;
    let start: u64 = field(fields, 2, "query_start")?;
    let end: u64 = field(fields, 3, "query_end")?;
    ordered(start, end)?;
    let reference_id = non_empty(fields[5], "target_name")?;
    let target_len: u64 = field(fields, 6, "target_len")?;
    let target_start: u64 = field(fields, 7, "target_start")?;
    let target_end: u64 = field(fields, 8, "target_end")?;
    ordered(target_start, target_end)?;
    let matches: u64 = field(fields, 9, "matches")?;
    let block_len: u64 = field(fields, 10, "block_len")?;

    // AS:i is minimap2's DP alignment score; without it fall back to matching bases
    let mut score = matches as f64;
    for tag in &fields[PAF_FIELDS..] {
        if let Some(value) = tag.strip_prefix("AS:i:") {
            score = value.trim().parse().map_err(|_| RecordError::NotNumeric {
                field: "AS",
                value: value.to_string(),
            })?;
        }
    }

    // block_len counts query insertions, so block_len / target_len can pass 1.0;
    // the target span cannot
    let coverage = ratio(target_end - target_start, target_len);

    Ok(AlignmentRecord {
        query_id: query_id.to_string(),
        reference_id: reference_id.to_string(),
        score: finite(score, "AS")?,
        identity: fraction(ratio(matches, block_len), "identity")?,
        coverage: fraction(coverage, "coverage")?,
        start,
        end,
    })
}

fn parse_psl(fields: &[&str]) -> Result<AlignmentRecord, RecordError> {
    expect_fields(fields, PSL_FIELDS)?;
    let matches: u64 = field(fields, 0, "matches")?;
    let reference_id = non_empty(fields[9], "q_name")?;
    let q_len: u64 = field(fields, 10, "q_len")?;
    let q_start: u64 = field(fields, 11, "q_start")?;
    let q_end: u64 = field(fields, 12, "q_end")?;
    ordered(q_start, q_end)?;
    let query_id = non_empty(fields[13], "t_name")?;
    let t_start: u64 = field(fields, 15, "t_start")?;
    let t_end: u64 = field(fields, 16, "t_end")?;
    ordered(t_start, t_end)?;

    let aligned = q_end - q_start;
    Ok(AlignmentRecord {
        query_id: query_id.to_string(),
        reference_id: reference_id.to_string(),
        score: matches as f64,
        identity: fraction(ratio(matches, aligned), "identity")?,
        coverage: fraction(ratio(aligned, q_len), "coverage")?,
        start: t_start,
        end: t_end,
    })
}

fn parse_tabular(fields: &[&str]) -> Result<AlignmentRecord, RecordError> {
    expect_fields(fields, TABULAR_FIELDS)?;
    let score: f64 = field(fields, 2, "score")?;
    let identity: f64 = field(fields, 3, "identity")?;
    let coverage: f64 = field(fields, 4, "coverage")?;
    let start: u64 = field(fields, 5, "start")?;
    let end: u64 = field(fields, 6, "end")?;
    ordered(start, end)?;

    Ok(AlignmentRecord {
        query_id: non_empty(fields[0], "query_id")?.to_string(),
        reference_id: non_empty(fields[1], "reference_id")?.to_string(),
        score: finite(score, "score")?,
        identity: fraction(identity, "identity")?,
        coverage: fraction(coverage, "coverage")?,
        start,
        end,
    })
}

// ---------------------------------------------------------------------------
// File reading
// ---------------------------------------------------------------------------

/// Records from one file plus what was tolerated while reading it.
#[derive(Debug, Clone)]
pub struct ParsedFile<T> {
    pub path: PathBuf,
    pub records: Vec<T>,
    /// Non-comment, non-header lines, malformed ones included.
    pub data_lines: usize,
    pub warnings: Vec<MergeWarning>,
}

/// Opens a text file, decompressing it when the name ends with `.gz`.
/// A file that does not exist yields `Ok(None)`.
pub fn open_reader(path: &Path) -> Result<Option<Box<dyn BufRead>>, MergeError> {
    let f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(MergeError::io(path, e)),
    };

    let is_gz = path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    let reader: Box<dyn BufRead> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };
    Ok(Some(reader))
}

/// Reads a file line by line through `parse`, skipping malformed lines as
/// long as their share stays within `max_malformed_fraction`. A fraction of
/// zero makes the first malformed line fatal.
///
/// `parse` returns `Ok(None)` for lines that carry no record.
pub fn read_records<T, F>(
    path: &Path,
    max_malformed_fraction: f64,
    mut parse: F,
) -> Result<Option<ParsedFile<T>>, MergeError>
where
    F: FnMut(&str) -> Result<Option<T>, RecordError>,
{
    let Some(mut reader) = open_reader(path)? else {
        return Ok(None);
    };

    let mut records = Vec::new();
    let mut malformed: Vec<(usize, RecordError)> = Vec::new();
    let mut data_lines = 0usize;
    let mut buf: Vec<u8> = Vec::new();
    let mut line_no = 0usize;

    loop {
        buf.clear();
        if reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| MergeError::io(path, e))?
            == 0
        {
            break; // EOF
        }
        line_no += 1;

        let parsed = std::str::from_utf8(&buf)
            .map_err(|e| RecordError::NotUtf8 {
                offset: e.valid_up_to(),
            })
            .and_then(|line| parse(line));
        match parsed {
            Ok(Some(record)) => {
                data_lines += 1;
                records.push(record);
            }
            Ok(None) => {}
            Err(cause) if max_malformed_fraction == 0.0 => {
                return Err(MergeError::MalformedRecord {
                    file: path.to_path_buf(),
                    line: line_no,
                    cause,
                });
            }
            Err(cause) => {
                data_lines += 1;
                log::debug!("{}:{}: {}", path.display(), line_no, cause);
                malformed.push((line_no, cause));
            }
        }
    }

    if let Some((first_line, first_cause)) = malformed.first() {
        let share = malformed.len() as f64 / data_lines as f64;
        if malformed.len() == data_lines || share > max_malformed_fraction {
            return Err(MergeError::CorruptInputFile {
                file: path.to_path_buf(),
                malformed: malformed.len(),
                total: data_lines,
                max_fraction: max_malformed_fraction,
                first_line: *first_line,
                first_cause: first_cause.clone(),
            });
        }
        log::warn!(
            "{}: skipped {} malformed of {} data lines",
            path.display(),
            malformed.len(),
            data_lines
        );
    }

    let warnings = malformed
        .into_iter()
        .map(|(line, cause)| MergeWarning::SkippedMalformed {
            file: path.to_path_buf(),
            line,
            cause,
        })
        .collect();

    Ok(Some(ParsedFile {
        path: path.to_path_buf(),
        records,
        data_lines,
        warnings,
    }))
}

/// Reads a whole aligner output file. `Ok(None)` when the file is absent.
pub fn read_alignment_file(
    path: &Path,
    format: SourceFormat,
    max_malformed_fraction: f64,
) -> Result<Option<ParsedFile<AlignmentRecord>>, MergeError> {
    read_records(path, max_malformed_fraction, |line| {
        parse_alignment_line(line, format)
    })
}
