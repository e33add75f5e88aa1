//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use locaudit_common::{
    ClassificationMethod, ClassificationResult, PageOutcome, PageStatus, RunReport, VisualStatus,
};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// One page of a run report
#[derive(Serialize)]
pub struct PageRow<'a> {
    #[serde(flatten)]
    outcome: &'a PageOutcome,
}

impl<'a> From<&'a PageOutcome> for PageRow<'a> {
    fn from(outcome: &'a PageOutcome) -> Self {
        Self { outcome }
    }
}

impl TableDisplay for PageRow<'_> {
    fn headers() -> Vec<&'static str> {
        vec!["URL", "Viewport", "Coverage", "Formats", "Visual", "Status"]
    }

    fn row(&self) -> Vec<String> {
        let page = self.outcome;
        let coverage = page
            .coverage
            .as_ref()
            .map(|c| {
                format!(
                    "{:.1}% ({}/{})",
                    c.coverage_percent, c.target_language_count, c.eligible_text_nodes
                )
            })
            .unwrap_or_else(|| "-".to_string());
        let formats = page
            .formats
            .as_ref()
            .map(|f| {
                let bad: Vec<&str> = f
                    .categories()
                    .iter()
                    .filter(|c| !c.conformant)
                    .map(|c| c.category.as_str())
                    .collect();
                if bad.is_empty() {
                    "ok".to_string()
                } else {
                    bad.join(", ")
                }
            })
            .unwrap_or_else(|| "-".to_string());
        let visual = page
            .visual
            .as_ref()
            .map(|v| match (v.status, v.diff_ratio) {
                (VisualStatus::BaselineCreated, _) => "baseline created".to_string(),
                (VisualStatus::BaselineUpdated, _) => "baseline updated".to_string(),
                (VisualStatus::DimensionMismatch, _) => "size mismatch".to_string(),
                (_, Some(ratio)) => format!("{:.2}%", ratio * 100.0),
                (_, None) => "-".to_string(),
            })
            .unwrap_or_else(|| "-".to_string());

        vec![
            page.url.clone(),
            page.viewport.to_string(),
            coverage,
            formats,
            visual,
            status_label(page.status),
        ]
    }
}

fn status_label(status: PageStatus) -> String {
    match status {
        PageStatus::Passed => "passed".green().to_string(),
        PageStatus::Failed => "failed".red().to_string(),
        PageStatus::Error => "error".red().bold().to_string(),
        PageStatus::Cancelled => "cancelled".yellow().to_string(),
    }
}

/// A classified debugging input
#[derive(Serialize)]
pub struct ClassificationRow {
    pub text: String,
    #[serde(flatten)]
    pub result: ClassificationResult,
}

impl TableDisplay for ClassificationRow {
    fn headers() -> Vec<&'static str> {
        vec!["Text", "Language", "Confidence", "Method", "Target"]
    }

    fn row(&self) -> Vec<String> {
        let method = match self.result.method {
            ClassificationMethod::Statistical => "statistical",
            ClassificationMethod::ScriptHeuristic => "script",
            ClassificationMethod::Failed => "failed",
        };
        vec![
            self.text.clone(),
            self.result.detected_language.clone().unwrap_or_else(|| "?".to_string()),
            self.result
                .confidence
                .map(|c| format!("{:.2}", c))
                .unwrap_or_else(|| "-".to_string()),
            method.to_string(),
            if self.result.is_target_language { "yes" } else { "no" }.to_string(),
        ]
    }
}

/// Render rows as a table
pub fn render_table<T: TableDisplay>(items: &[T]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(T::headers());
    for item in items {
        table.add_row(item.row());
    }
    table
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() && format == OutputFormat::Table {
        println!("No items found.");
        return;
    }

    match format {
        OutputFormat::Table => println!("{}", render_table(items)),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
    }
}

/// Print a run report: per-page table plus totals, or the full JSON
pub fn print_report(report: &RunReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
        }
        OutputFormat::Table => {
            let rows: Vec<PageRow> = report.pages.iter().map(PageRow::from).collect();
            print_list(&rows, format);

            for page in report.pages.iter().filter(|p| !p.errors.is_empty()) {
                for err in &page.errors {
                    print_error(&format!("{}: {:?}: {}", page.url, err.kind, err.message));
                }
            }

            let summary = format!(
                "{} page(s): {} passed, {} failed, {} errored in {} ms",
                report.total, report.passed, report.failed, report.errored, report.duration_ms
            );
            if report.cancelled {
                print_warning(&format!("Run cancelled. {}", summary));
            } else if report.success() {
                print_success(&summary);
            } else {
                print_error(&summary);
            }
        }
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}
