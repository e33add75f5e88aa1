//! Core types for LocAudit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Browser viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1440, height: 900 }
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A page to evaluate, identified by URL and viewport
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageTarget {
    pub url: String,
    #[serde(default)]
    pub viewport: Viewport,
}

impl PageTarget {
    pub fn new(url: impl Into<String>, viewport: Viewport) -> Self {
        Self { url: url.into(), viewport }
    }
}

/// Identity of an approved baseline screenshot
pub type BaselineKey = PageTarget;

// ============================================================================
// Text pipeline
// ============================================================================

/// One extracted DOM text fragment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    /// Raw text content
    pub text: String,

    /// Selectors matched by the element or one of its ancestors, outermost first
    #[serde(default)]
    pub matched_selectors: Vec<String>,

    /// Text comes from an input/textarea value
    #[serde(default)]
    pub from_input_value: bool,

    /// Element or an ancestor carries the ignore marker attribute
    #[serde(default)]
    pub ignore_marker: bool,
}

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.matched_selectors.push(selector.into());
        self
    }

    pub fn marked_ignored(mut self) -> Self {
        self.ignore_marker = true;
        self
    }

    pub fn input_value(mut self) -> Self {
        self.from_input_value = true;
        self
    }
}

/// Why a text node was excluded from coverage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterReason {
    None,
    NumericOnly,
    MarkedIgnored,
    SelectorIgnored,
    IgnoredWord,
}

/// Eligibility decision for one text node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterVerdict {
    pub eligible: bool,
    pub reason: FilterReason,
}

impl FilterVerdict {
    pub fn eligible() -> Self {
        Self { eligible: true, reason: FilterReason::None }
    }

    /// Exclusion verdict; `FilterReason::None` is not a valid exclusion reason
    pub fn excluded(reason: FilterReason) -> Self {
        debug_assert!(reason != FilterReason::None);
        Self { eligible: false, reason }
    }
}

/// How a classification was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    Statistical,
    ScriptHeuristic,
    Failed,
}

/// Language classification of one eligible text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// ISO 639-1 code, absent when indeterminate
    pub detected_language: Option<String>,
    pub confidence: Option<f64>,
    pub is_target_language: bool,
    pub method: ClassificationMethod,
}

impl ClassificationResult {
    pub fn indeterminate() -> Self {
        Self {
            detected_language: None,
            confidence: None,
            is_target_language: false,
            method: ClassificationMethod::Failed,
        }
    }
}

/// Coverage verdict for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    Passed,
    Failed,
    /// No eligible text; counts as passed
    NotApplicable,
}

/// Excluded node counts per filter reason
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedCounts {
    pub numeric_only: usize,
    pub marked_ignored: usize,
    pub selector_ignored: usize,
    pub ignored_word: usize,
}

impl ExcludedCounts {
    pub fn record(&mut self, reason: FilterReason) {
        match reason {
            FilterReason::None => {}
            FilterReason::NumericOnly => self.numeric_only += 1,
            FilterReason::MarkedIgnored => self.marked_ignored += 1,
            FilterReason::SelectorIgnored => self.selector_ignored += 1,
            FilterReason::IgnoredWord => self.ignored_word += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.numeric_only + self.marked_ignored + self.selector_ignored + self.ignored_word
    }
}

/// Translation coverage for one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCoverageReport {
    pub url: String,
    pub total_text_nodes: usize,
    pub eligible_text_nodes: usize,
    pub target_language_count: usize,
    pub coverage_percent: f64,
    pub threshold_percent: f64,
    pub non_target_samples: Vec<String>,
    pub excluded: ExcludedCounts,
    pub passed: bool,
    pub status: CoverageStatus,
}

// ============================================================================
// Locale formats
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatCategory {
    Date,
    Time,
    NumberGrouping,
    Currency,
}

impl FormatCategory {
    pub const ALL: [FormatCategory; 4] = [
        FormatCategory::Date,
        FormatCategory::Time,
        FormatCategory::NumberGrouping,
        FormatCategory::Currency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatCategory::Date => "date",
            FormatCategory::Time => "time",
            FormatCategory::NumberGrouping => "number_grouping",
            FormatCategory::Currency => "currency",
        }
    }
}

/// Lint result for one format category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub category: FormatCategory,
    pub found: bool,
    /// All matches satisfied the expected form (vacuously true when none found)
    pub conformant: bool,
    pub match_count: usize,
    pub non_conformant_samples: Vec<String>,
}

impl CategoryReport {
    pub fn empty(category: FormatCategory) -> Self {
        Self {
            category,
            found: false,
            conformant: true,
            match_count: 0,
            non_conformant_samples: Vec::new(),
        }
    }
}

/// Locale format lint for one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatReport {
    pub url: String,
    pub date: CategoryReport,
    pub time: CategoryReport,
    pub number_grouping: CategoryReport,
    pub currency: CategoryReport,
}

impl FormatReport {
    pub fn categories(&self) -> [&CategoryReport; 4] {
        [&self.date, &self.time, &self.number_grouping, &self.currency]
    }

    pub fn conformant(&self) -> bool {
        self.categories().iter().all(|c| c.conformant)
    }
}

// ============================================================================
// Visual regression
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualStatus {
    Passed,
    Failed,
    DimensionMismatch,
    BaselineCreated,
    BaselineUpdated,
}

/// Outcome of comparing a screenshot to its baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualDiffResult {
    pub baseline_exists: bool,
    /// Fraction of differing pixels; absent without a baseline
    pub diff_ratio: Option<f64>,
    pub diff_threshold: f64,
    pub differing_pixels: u64,
    pub total_pixels: u64,
    pub passed: bool,
    pub status: VisualStatus,
    pub diff_artifact_path: Option<String>,
    pub baseline_path: Option<String>,
}

// ============================================================================
// Run results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageErrorKind {
    Capture,
    BaselineRead,
    BaselineWrite,
    ArtifactWrite,
    Analysis,
    Cancelled,
}

/// An isolated failure while processing one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageError {
    pub kind: PageErrorKind,
    pub message: String,
}

impl PageError {
    pub fn new(kind: PageErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Passed,
    Failed,
    Error,
    Cancelled,
}

/// Everything the engine concluded about one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOutcome {
    pub url: String,
    pub viewport: Viewport,
    pub status: PageStatus,
    pub coverage: Option<PageCoverageReport>,
    pub formats: Option<FormatReport>,
    pub visual: Option<VisualDiffResult>,
    #[serde(default)]
    pub errors: Vec<PageError>,
}

impl PageOutcome {
    /// Outcome for a page that was never analyzed
    pub fn unprocessed(target: &PageTarget, status: PageStatus, error: PageError) -> Self {
        Self {
            url: target.url.clone(),
            viewport: target.viewport,
            status,
            coverage: None,
            formats: None,
            visual: None,
            errors: vec![error],
        }
    }
}

/// Result of a whole audit run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub cancelled: bool,
    pub pages: Vec<PageOutcome>,
}

impl RunReport {
    pub fn from_pages(
        pages: Vec<PageOutcome>,
        started_at: DateTime<Utc>,
        cancelled: bool,
    ) -> Self {
        let finished_at = Utc::now();
        let count = |status: PageStatus| pages.iter().filter(|p| p.status == status).count();
        let passed = count(PageStatus::Passed);
        let failed = count(PageStatus::Failed);
        let errored = count(PageStatus::Error) + count(PageStatus::Cancelled);

        Self {
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
            total: pages.len(),
            passed,
            failed,
            errored,
            cancelled,
            pages,
        }
    }

    /// True only when every page passed and nothing was cancelled
    pub fn success(&self) -> bool {
        !self.cancelled && self.passed == self.total
    }
}
