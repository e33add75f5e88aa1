//! Per-page translation coverage

use locaudit_common::config::CoverageConfig;
use locaudit_common::{
    ClassificationResult, CoverageStatus, ExcludedCounts, FilterVerdict, PageCoverageReport,
    TextNode,
};
use tracing::debug;

/// Single-pass accumulator for one page
#[derive(Debug, Clone)]
pub struct CoverageAggregator {
    url: String,
    threshold_percent: f64,
    sample_limit: usize,
    sample_max_chars: usize,
    total: usize,
    eligible: usize,
    target: usize,
    samples: Vec<String>,
    excluded: ExcludedCounts,
}

impl CoverageAggregator {
    pub fn new(url: impl Into<String>, config: &CoverageConfig) -> Self {
        Self {
            url: url.into(),
            threshold_percent: config.threshold_percent,
            sample_limit: config.sample_limit,
            sample_max_chars: config.sample_max_chars,
            total: 0,
            eligible: 0,
            target: 0,
            samples: Vec::new(),
            excluded: ExcludedCounts::default(),
        }
    }

    /// Record one node. An eligible node without a classification counts as non-target.
    pub fn push(
        &mut self,
        node: &TextNode,
        verdict: &FilterVerdict,
        classification: Option<&ClassificationResult>,
    ) {
        self.total += 1;
        if !verdict.eligible {
            self.excluded.record(verdict.reason);
            return;
        }

        self.eligible += 1;
        if classification.is_some_and(|c| c.is_target_language) {
            self.target += 1;
        } else if self.samples.len() < self.sample_limit {
            self.samples.push(truncate(node.text.trim(), self.sample_max_chars));
        }
    }

    pub fn finish(self) -> PageCoverageReport {
        let (coverage_percent, passed, status) = if self.eligible == 0 {
            (100.0, true, CoverageStatus::NotApplicable)
        } else {
            // Compare on scaled counts so the inclusive boundary is exact
            let passed =
                self.target as f64 * 100.0 >= self.threshold_percent * self.eligible as f64;
            let percent = self.target as f64 * 100.0 / self.eligible as f64;
            let status = if passed { CoverageStatus::Passed } else { CoverageStatus::Failed };
            (percent, passed, status)
        };

        debug!(
            "Coverage for {}: {}/{} eligible of {} nodes ({:.1}%)",
            self.url, self.target, self.eligible, self.total, coverage_percent
        );

        PageCoverageReport {
            url: self.url,
            total_text_nodes: self.total,
            eligible_text_nodes: self.eligible,
            target_language_count: self.target,
            coverage_percent,
            threshold_percent: self.threshold_percent,
            non_target_samples: self.samples,
            excluded: self.excluded,
            passed,
            status,
        }
    }
}

/// Aggregate a page's node stream into a coverage report
pub fn aggregate<'a, I>(url: &str, items: I, config: &CoverageConfig) -> PageCoverageReport
where
    I: IntoIterator<Item = (&'a TextNode, FilterVerdict, Option<ClassificationResult>)>,
{
    let mut aggregator = CoverageAggregator::new(url, config);
    for (node, verdict, classification) in items {
        aggregator.push(node, &verdict, classification.as_ref());
    }
    aggregator.finish()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}
