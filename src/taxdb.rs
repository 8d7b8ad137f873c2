//src/taxdb.rs

use ahash::AHashMap;
use std::io::BufRead;
use std::path::Path;

use crate::error::MergeError;
use crate::parse::open_reader;

pub type ParentMap = AHashMap<u32, u32>;
pub type NameMap = AHashMap<u32, String>;

/// NCBI-style root taxon, left out of lineages.
pub const ROOT_TAXID: u32 = 1;

/// Guards lineage walks against cycles in a broken taxDB.
const MAX_LINEAGE_DEPTH: usize = 128;

/// Taxonomy tree used to turn classifier taxids into lineages.
#[derive(Debug, Default, Clone)]
pub struct TaxDb {
    pub parents: ParentMap,
    pub names: NameMap,
}

impl TaxDb {
    /// Parses a taxDB file in the format:
    /// ```text
    /// <taxid>\t<parentid>\t<taxname>\t<rank>
    /// ```
    /// The rank column is required but not kept. Lines with fewer than four
    /// fields or a non-numeric taxid are skipped.
    pub fn load<P: AsRef<Path>>(filepath: P) -> Result<Self, MergeError> {
        let path = filepath.as_ref();
        let reader = open_reader(path)?.ok_or_else(|| {
            MergeError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "taxDB file not found"),
            )
        })?;

        let mut db = TaxDb::default();
        for line_result in reader.lines() {
            let line = line_result.map_err(|e| MergeError::io(path, e))?;
            db.insert_line(&line);
        }
        log::info!("Loaded {} taxa from {}", db.parents.len(), path.display());
        Ok(db)
    }

    fn insert_line(&mut self, line: &str) {
        // e.g. "562\t561\tEscherichia coli\tspecies"
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 4 {
            return;
        }

        let taxid: u32 = parts[0].trim().parse().unwrap_or(0);
        let parentid: u32 = parts[1].trim().parse().unwrap_or(0);

        if taxid != 0 {
            self.parents.insert(taxid, parentid);
            self.names.insert(taxid, parts[2].trim().to_string());
        }
    }

    /// Lineage of `taxid`, broadest rank first, root excluded.
    /// An unknown taxid yields the single label `taxid:<n>`.
    pub fn lineage(&self, taxid: u32) -> Vec<String> {
        if !self.parents.contains_key(&taxid) {
            return vec![format!("taxid:{taxid}")];
        }

        let mut lineage = Vec::new();
        let mut current = taxid;
        for _ in 0..MAX_LINEAGE_DEPTH {
            if current == 0 || current == ROOT_TAXID {
                break;
            }
            let label = self
                .names
                .get(&current)
                .cloned()
                .unwrap_or_else(|| format!("taxid:{current}"));
            lineage.push(label);

            match self.parents.get(&current) {
                Some(&parent) if parent != current => current = parent,
                _ => break,
            }
        }
        if lineage.is_empty() {
            // a call at the root itself
            let label = self
                .names
                .get(&taxid)
                .cloned()
                .unwrap_or_else(|| format!("taxid:{taxid}"));
            lineage.push(label);
        }
        lineage.reverse();
        lineage
    }
}
