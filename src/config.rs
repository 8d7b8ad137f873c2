//src/config.rs

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::MergeError;
use crate::types::{AlignmentRecord, AnnotationCategory};

/// Minimum bar an alignment must meet to be kept. All three are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterThresholds {
    pub min_identity: f64,
    pub min_coverage: f64,
    pub min_score: f64,
}

impl FilterThresholds {
    pub fn new(min_identity: f64, min_coverage: f64, min_score: f64) -> Self {
        Self {
            min_identity,
            min_coverage,
            min_score,
        }
    }

    #[inline]
    pub fn passes(&self, record: &AlignmentRecord) -> bool {
        record.identity >= self.min_identity
            && record.coverage >= self.min_coverage
            && record.score >= self.min_score
    }

    fn validate(&self, category: AnnotationCategory) -> Result<(), MergeError> {
        check_fraction(&format!("{category}.min_identity"), self.min_identity)?;
        check_fraction(&format!("{category}.min_coverage"), self.min_coverage)?;
        if !self.min_score.is_finite() || self.min_score < 0.0 {
            return Err(MergeError::InvalidConfig(format!(
                "{category}.min_score must be a finite non-negative number, got {}",
                self.min_score
            )));
        }
        Ok(())
    }
}

/// Overlap bar used when overlap removal is switched on without a fraction.
pub const DEFAULT_OVERLAP_FRACTION: f64 = 0.8;

/// Per-category settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryConfig {
    pub thresholds: FilterThresholds,
    /// When set, hits on the same query overlapping by more than this
    /// fraction of the shorter span are collapsed to the higher-identity one.
    pub overlap_fraction: Option<f64>,
}

impl CategoryConfig {
    pub fn default_for(category: AnnotationCategory) -> Self {
        match category {
            AnnotationCategory::Arg => Self {
                thresholds: FilterThresholds::new(0.75, 0.9, 0.0),
                overlap_fraction: None,
            },
            AnnotationCategory::Plasmid => Self {
                thresholds: FilterThresholds::new(0.7, 0.7, 0.0),
                overlap_fraction: None,
            },
            AnnotationCategory::Mge => Self {
                thresholds: FilterThresholds::new(0.7, 0.7, 0.0),
                overlap_fraction: Some(DEFAULT_OVERLAP_FRACTION),
            },
        }
    }
}

/// Column delimiter of the written tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    #[default]
    Tab,
    Comma,
}

impl Delimiter {
    pub fn byte(&self) -> u8 {
        match self {
            Delimiter::Tab => b'\t',
            Delimiter::Comma => b',',
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Delimiter::Tab => "tsv",
            Delimiter::Comma => "csv",
        }
    }
}

impl FromStr for Delimiter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tab" | "tsv" | "\t" => Ok(Delimiter::Tab),
            "comma" | "csv" | "," => Ok(Delimiter::Comma),
            other => Err(format!("unknown delimiter '{other}' (expected tab or comma)")),
        }
    }
}

/// Everything the merge core needs, passed explicitly to each stage.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeConfig {
    pub arg: CategoryConfig,
    pub plasmid: CategoryConfig,
    pub mge: CategoryConfig,
    /// Largest tolerated share of malformed data lines in one input file.
    pub max_malformed_fraction: f64,
    pub delimiter: Delimiter,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            arg: CategoryConfig::default_for(AnnotationCategory::Arg),
            plasmid: CategoryConfig::default_for(AnnotationCategory::Plasmid),
            mge: CategoryConfig::default_for(AnnotationCategory::Mge),
            max_malformed_fraction: 0.1,
            delimiter: Delimiter::Tab,
        }
    }
}

impl MergeConfig {
    pub fn category(&self, category: AnnotationCategory) -> &CategoryConfig {
        match category {
            AnnotationCategory::Arg => &self.arg,
            AnnotationCategory::Plasmid => &self.plasmid,
            AnnotationCategory::Mge => &self.mge,
        }
    }

    pub fn category_mut(&mut self, category: AnnotationCategory) -> &mut CategoryConfig {
        match category {
            AnnotationCategory::Arg => &mut self.arg,
            AnnotationCategory::Plasmid => &mut self.plasmid,
            AnnotationCategory::Mge => &mut self.mge,
        }
    }

    pub fn validate(&self) -> Result<(), MergeError> {
        for category in AnnotationCategory::ALL {
            let settings = self.category(category);
            settings.thresholds.validate(category)?;
            if let Some(fraction) = settings.overlap_fraction {
                check_fraction(&format!("{category}.overlap_fraction"), fraction)?;
            }
        }
        check_fraction("max_malformed_fraction", self.max_malformed_fraction)
    }

    /// Parses a JSON settings document on top of the defaults.
    /// Omitted fields keep their default value.
    pub fn from_json_str(text: &str) -> Result<Self, MergeError> {
        let settings: SettingsFile = serde_json::from_str(text)
            .map_err(|e| MergeError::InvalidConfig(e.to_string()))?;
        let config = settings.apply(MergeConfig::default())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MergeError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| MergeError::io(path, e))?;
        log::debug!("Loaded settings from {}", path.display());
        Self::from_json_str(&text)
    }
}

fn check_fraction(name: &str, value: f64) -> Result<(), MergeError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(MergeError::InvalidConfig(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

// On-disk shape: every field optional so a file can override only what it names.

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CategorySettings {
    min_identity: Option<f64>,
    min_coverage: Option<f64>,
    min_score: Option<f64>,
    overlap_fraction: Option<f64>,
    /// `false` turns overlap removal off, `true` turns it on.
    remove_overlaps: Option<bool>,
}

impl CategorySettings {
    fn apply(&self, base: &mut CategoryConfig) {
        if let Some(v) = self.min_identity {
            base.thresholds.min_identity = v;
        }
        if let Some(v) = self.min_coverage {
            base.thresholds.min_coverage = v;
        }
        if let Some(v) = self.min_score {
            base.thresholds.min_score = v;
        }
        if let Some(v) = self.overlap_fraction {
            base.overlap_fraction = Some(v);
        }
        match self.remove_overlaps {
            Some(false) => base.overlap_fraction = None,
            Some(true) if base.overlap_fraction.is_none() => {
                base.overlap_fraction = Some(DEFAULT_OVERLAP_FRACTION);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    arg: Option<CategorySettings>,
    plasmid: Option<CategorySettings>,
    mge: Option<CategorySettings>,
    max_malformed_fraction: Option<f64>,
    delimiter: Option<String>,
}

impl SettingsFile {
    fn apply(self, mut config: MergeConfig) -> Result<MergeConfig, MergeError> {
        for (category, settings) in [
            (AnnotationCategory::Arg, &self.arg),
            (AnnotationCategory::Plasmid, &self.plasmid),
            (AnnotationCategory::Mge, &self.mge),
        ] {
            if let Some(settings) = settings {
                settings.apply(config.category_mut(category));
            }
        }
        if let Some(v) = self.max_malformed_fraction {
            config.max_malformed_fraction = v;
        }
        if let Some(d) = &self.delimiter {
            config.delimiter = d.parse().map_err(MergeError::InvalidConfig)?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_per_category_bars() {
        let config = MergeConfig::default();
        assert_eq!(config.arg.thresholds.min_identity, 0.75);
        assert_eq!(config.arg.thresholds.min_coverage, 0.9);
        assert_eq!(config.plasmid.thresholds.min_coverage, 0.7);
        assert_eq!(config.mge.overlap_fraction, Some(0.8));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_settings_keep_remaining_defaults() {
        let config = MergeConfig::from_json_str(
            r#"{ "arg": { "min_identity": 0.8 }, "delimiter": "comma" }"#,
        )
        .unwrap();
        assert_eq!(config.arg.thresholds.min_identity, 0.8);
        assert_eq!(config.arg.thresholds.min_coverage, 0.9);
        assert_eq!(config.delimiter, Delimiter::Comma);
        assert_eq!(config.mge, CategoryConfig::default_for(AnnotationCategory::Mge));
    }

    #[test]
    fn out_of_range_fraction_is_rejected() {
        let err = MergeConfig::from_json_str(r#"{ "plasmid": { "min_coverage": 1.5 } }"#)
            .unwrap_err();
        assert!(matches!(err, MergeError::InvalidConfig(msg) if msg.contains("Plasmid.min_coverage")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(MergeConfig::from_json_str(r#"{ "threads": 8 }"#).is_err());
    }

    #[test]
    fn overlap_removal_can_be_switched() {
        let config = MergeConfig::from_json_str(r#"{ "mge": { "remove_overlaps": false } }"#).unwrap();
        assert_eq!(config.mge.overlap_fraction, None);

        let config = MergeConfig::from_json_str(
            r#"{ "mge": { "overlap_fraction": 0.5, "remove_overlaps": false } }"#,
        )
        .unwrap();
        assert_eq!(config.mge.overlap_fraction, None);

        let config = MergeConfig::from_json_str(r#"{ "arg": { "remove_overlaps": true } }"#).unwrap();
        assert_eq!(config.arg.overlap_fraction, Some(DEFAULT_OVERLAP_FRACTION));

        let config = MergeConfig::from_json_str(
            r#"{ "plasmid": { "overlap_fraction": 0.5, "remove_overlaps": true } }"#,
        )
        .unwrap();
        assert_eq!(config.plasmid.overlap_fraction, Some(0.5));
    }

    #[test]
    fn negative_score_is_rejected() {
        let mut config = MergeConfig::default();
        config.mge.thresholds.min_score = -1.0;
        assert!(config.validate().is_err());
    }
}
