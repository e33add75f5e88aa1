//! Audit configuration
//!
//! Loaded once from YAML, validated, then handed to every component
//! explicitly. Any validation failure is fatal to the run.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Complete audit configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub language: LanguageConfig,
    pub coverage: CoverageConfig,
    pub filter: FilterConfig,
    pub visual: VisualConfig,
    pub formats: FormatConfig,
    pub run: RunConfig,
}

/// Target language and classifier policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    /// ISO 639-1 code of the locale under test
    pub target: String,

    /// Languages the statistical detector chooses between
    pub candidates: Vec<String>,

    /// Minimum detector confidence for a target-language verdict
    pub min_confidence: f64,

    /// Strings with fewer non-whitespace characters use the script heuristic
    pub min_statistical_chars: usize,

    /// Inclusive codepoint ranges of the target script; built-in table when absent
    pub script_ranges: Option<Vec<(u32, u32)>>,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            target: "ja".to_string(),
            candidates: vec![
                "ja".to_string(),
                "en".to_string(),
                "zh".to_string(),
                "ko".to_string(),
            ],
            min_confidence: 0.5,
            min_statistical_chars: 5,
            script_ranges: None,
        }
    }
}

/// Coverage verdict settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Minimum coverage percent (inclusive)
    pub threshold_percent: f64,

    /// Maximum number of non-target samples kept per page
    pub sample_limit: usize,

    /// Samples longer than this are truncated
    pub sample_max_chars: usize,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            threshold_percent: 70.0,
            sample_limit: 10,
            sample_max_chars: 140,
        }
    }
}

/// Text eligibility rules
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Product-name style terms, matched case-insensitively as substrings
    pub ignored_words: Vec<String>,

    /// Optional file with one ignored word per line
    pub ignored_words_file: Option<PathBuf>,

    /// CSS selectors whose subtrees are excluded
    pub ignore_selectors: Vec<String>,
}

/// When the visual check runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualTrigger {
    #[default]
    OnCoverageFailure,
    Always,
}

/// Visual regression settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    pub enabled: bool,

    /// Maximum tolerated fraction of differing pixels (0.0 - 1.0)
    pub diff_threshold: f64,

    /// Per-channel difference absorbed as anti-aliasing noise
    pub channel_tolerance: u8,

    pub trigger: VisualTrigger,

    /// Directory holding approved baselines
    pub baseline_dir: PathBuf,

    /// Directory for diff artifacts
    pub diff_dir: PathBuf,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            diff_threshold: 0.02,
            channel_tolerance: 5,
            trigger: VisualTrigger::default(),
            baseline_dir: PathBuf::from("snapshots"),
            diff_dir: PathBuf::from("reports/visual_diffs"),
        }
    }
}

/// A recognizer and the form every recognized match must take
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatRuleConfig {
    pub recognizer: String,
    pub expected: String,
}

impl FormatRuleConfig {
    fn new(recognizer: &str, expected: &str) -> Self {
        Self {
            recognizer: recognizer.to_string(),
            expected: expected.to_string(),
        }
    }
}

/// Locale format lint settings; defaults are the ja_JP conventions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    pub enabled: bool,

    /// Fail the page on any non-conformant category
    pub enforce: bool,

    pub date: FormatRuleConfig,
    pub time: FormatRuleConfig,
    pub number_grouping: FormatRuleConfig,
    pub currency: FormatRuleConfig,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            enforce: false,
            date: FormatRuleConfig::new(
                r"\d{4}[/\-.年]\d{1,2}[/\-.月]\d{1,2}日?|\d{1,2}[/\-.]\d{1,2}[/\-.]\d{2,4}",
                r"^\d{4}(?:年\d{1,2}月\d{1,2}日|/\d{1,2}/\d{1,2}|-\d{2}-\d{2})$",
            ),
            time: FormatRuleConfig::new(
                r"(?:午前|午後)\s?\d{1,2}:\d{2}|\d{1,2}:\d{2}(?::\d{2})?(?:\s?[AaPp][Mm])?",
                r"^\d{1,2}:\d{2}(?::\d{2})?$",
            ),
            number_grouping: FormatRuleConfig::new(
                r"\d{1,3}(?:[,'\x{00A0}\x{202F}]\d{3})+(?:\.\d+)?|\d{1,3}(?:\.\d{3}){2,}(?:,\d+)?|\d{1,3}\.\d{3},\d+",
                r"^\d{1,3}(?:,\d{3})+(?:\.\d+)?$",
            ),
            currency: FormatRuleConfig::new(
                r"[¥￥$€£]\s?\d[\d,]*(?:\.\d+)?|\d[\d,]*(?:\.\d+)?\s?(?:円|JPY|USD|EUR)",
                r"^(?:[¥￥]\s?\d[\d,]*|\d[\d,]*\s?円)$",
            ),
        }
    }
}

impl FormatConfig {
    pub fn rule(&self, category: crate::types::FormatCategory) -> &FormatRuleConfig {
        use crate::types::FormatCategory;
        match category {
            FormatCategory::Date => &self.date,
            FormatCategory::Time => &self.time,
            FormatCategory::NumberGrouping => &self.number_grouping,
            FormatCategory::Currency => &self.currency,
        }
    }
}

/// Run-wide execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Maximum pages analyzed at once
    pub concurrency: usize,

    /// Directory for the run report
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            output_dir: PathBuf::from("reports"),
        }
    }
}

impl AuditConfig {
    /// Parse configuration from a YAML string without touching the filesystem
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("malformed configuration: {}", e)))?;
        Ok(config)
    }

    /// Load, resolve the ignored-words file, and validate
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_yaml(&content)?;

        if let Some(words_file) = config.filter.ignored_words_file.clone() {
            let words_path = match path.parent() {
                Some(dir) if words_file.is_relative() => dir.join(&words_file),
                _ => words_file,
            };
            let words = read_word_list(&words_path)?;
            debug!("Loaded {} ignored words from {}", words.len(), words_path.display());
            config.filter.ignored_words.extend(words);
        }

        config.validate()?;
        info!(
            "Loaded configuration from {} (target: {}, threshold: {}%)",
            path.display(),
            config.language.target,
            config.coverage.threshold_percent
        );
        Ok(config)
    }

    /// Reject any setting that would silently invalidate verdicts
    pub fn validate(&self) -> Result<()> {
        let lang = &self.language;
        if lang.target.trim().is_empty() {
            return Err(Error::config("language.target must not be empty"));
        }
        for code in std::iter::once(&lang.target).chain(lang.candidates.iter()) {
            if !is_iso_639_1(code) {
                return Err(Error::config(format!(
                    "'{}' is not an ISO 639-1 language code",
                    code
                )));
            }
        }
        if lang.candidates.len() < 2 {
            return Err(Error::config(
                "language.candidates must list at least two languages",
            ));
        }
        if !lang.candidates.iter().any(|c| c.eq_ignore_ascii_case(&lang.target)) {
            return Err(Error::config(format!(
                "target language '{}' is not among language.candidates",
                lang.target
            )));
        }
        if !(0.0..=1.0).contains(&lang.min_confidence) {
            return Err(Error::config("language.min_confidence must be within 0.0..=1.0"));
        }
        if let Some(ranges) = &lang.script_ranges {
            if let Some((start, end)) = ranges.iter().find(|(start, end)| start > end) {
                return Err(Error::config(format!(
                    "script range {:#x}..{:#x} is inverted",
                    start, end
                )));
            }
        }

        let threshold = self.coverage.threshold_percent;
        if !threshold.is_finite() || !(0.0..=100.0).contains(&threshold) {
            return Err(Error::config("coverage.threshold_percent must be within 0..=100"));
        }

        let diff = self.visual.diff_threshold;
        if !diff.is_finite() || !(0.0..=1.0).contains(&diff) {
            return Err(Error::config("visual.diff_threshold must be within 0.0..=1.0"));
        }

        if self.filter.ignore_selectors.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::config("filter.ignore_selectors contains an empty selector"));
        }

        for category in crate::types::FormatCategory::ALL {
            let rule = self.formats.rule(category);
            for pattern in [&rule.recognizer, &rule.expected] {
                Regex::new(pattern).map_err(|e| {
                    Error::config(format!("formats.{}: {}", category.as_str(), e))
                })?;
            }
        }

        if self.run.concurrency == 0 {
            return Err(Error::config("run.concurrency must be at least 1"));
        }

        Ok(())
    }
}

fn is_iso_639_1(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic())
}

/// Read a word list, one entry per line, skipping blanks
pub fn read_word_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!("cannot read ignored words file {}: {}", path.display(), e))
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
