//! Audit runner: per-page analysis and the concurrent run loop

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use locaudit_common::{
    AuditConfig, FormatReport, PageCoverageReport, PageError, PageErrorKind, PageOutcome,
    PageStatus, PageTarget, RunReport, TextNode, VisualDiffResult, VisualStatus, VisualTrigger,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::baseline::BaselineStore;
use crate::classifier::{LanguageClassifier, LanguageDetector, LinguaDetector};
use crate::coverage::CoverageAggregator;
use crate::error::EngineResult;
use crate::filter::TextFilter;
use crate::formats::{check_formats, LocaleRules};
use crate::manifest::PageInput;
use crate::visual::{Screenshot, VisualDiffer};

/// What the run does with baselines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BaselineMode {
    /// Compare against baselines, creating missing ones
    #[default]
    Compare,
    /// Overwrite every page's baseline with its current capture
    Approve,
}

/// The audit engine. Cheap to clone; all state is shared read-only.
#[derive(Clone)]
pub struct Engine {
    config: Arc<AuditConfig>,
    filter: Arc<TextFilter>,
    classifier: LanguageClassifier,
    rules: Arc<LocaleRules>,
    differ: Arc<VisualDiffer>,
    store: Arc<BaselineStore>,
    mode: BaselineMode,
}

impl Engine {
    /// Validate the configuration and build every component
    pub fn new(config: AuditConfig, detector: Arc<dyn LanguageDetector>) -> EngineResult<Self> {
        config.validate()?;
        let rules = LocaleRules::from_config(&config.formats)?;

        Ok(Self {
            filter: Arc::new(TextFilter::new(&config.filter)),
            classifier: LanguageClassifier::new(detector, &config.language),
            rules: Arc::new(rules),
            differ: Arc::new(VisualDiffer::new(&config.visual)),
            store: Arc::new(BaselineStore::new(&config.visual.baseline_dir)),
            config: Arc::new(config),
            mode: BaselineMode::default(),
        })
    }

    /// Engine backed by the lingua detector restricted to the configured candidates
    pub fn with_lingua(config: AuditConfig) -> EngineResult<Self> {
        config.validate()?;
        let detector = LinguaDetector::from_iso_codes(&config.language.candidates)?;
        Self::new(config, Arc::new(detector))
    }

    pub fn with_mode(mut self, mode: BaselineMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn classifier(&self) -> &LanguageClassifier {
        &self.classifier
    }

    pub fn baselines(&self) -> &BaselineStore {
        &self.store
    }

    /// Text pipeline: filter, classify eligible nodes, aggregate
    pub fn analyze_text(&self, url: &str, nodes: &[TextNode]) -> PageCoverageReport {
        let mut aggregator = CoverageAggregator::new(url, &self.config.coverage);
        for node in nodes {
            let verdict = self.filter.filter(node);
            let classification = verdict.eligible.then(|| self.classifier.classify(&node.text));
            aggregator.push(node, &verdict, classification.as_ref());
        }
        aggregator.finish()
    }

    /// Format lint over the page's rendered text
    pub fn analyze_formats(&self, url: &str, nodes: &[TextNode]) -> FormatReport {
        let texts: Vec<String> = nodes
            .iter()
            .filter(|n| !n.from_input_value)
            .map(|n| n.text.clone())
            .collect();
        check_formats(url, &texts, &self.rules, self.config.coverage.sample_limit)
    }

    /// Analyze one page. Never fails: problems are recorded on the outcome.
    pub fn analyze_page(&self, input: PageInput) -> PageOutcome {
        let PageInput {
            target,
            text,
            screenshot,
            capture_error,
        } = input;

        if let Some(message) = capture_error {
            error!("Capture failed for {}: {}", target.url, message);
            return PageOutcome::unprocessed(
                &target,
                PageStatus::Error,
                PageError::new(PageErrorKind::Capture, message),
            );
        }

        let nodes = match text.load() {
            Ok(nodes) => nodes,
            Err(e) => {
                error!("Cannot load text for {}: {}", target.url, e);
                return PageOutcome::unprocessed(
                    &target,
                    PageStatus::Error,
                    PageError::new(PageErrorKind::Capture, e.to_string()),
                );
            }
        };

        let mut errors = Vec::new();
        let coverage = self.analyze_text(&target.url, &nodes);
        let formats = self
            .config
            .formats
            .enabled
            .then(|| self.analyze_formats(&target.url, &nodes));

        let shot = match screenshot.map(|source| source.load(&target)).transpose() {
            Ok(shot) => shot,
            Err(e) => {
                error!("Cannot load screenshot for {}: {}", target.url, e);
                errors.push(PageError::new(PageErrorKind::Capture, e.to_string()));
                None
            }
        };
        let visual = match &shot {
            Some(shot) => self.visual_stage(&target, shot, coverage.passed, &mut errors),
            None => {
                debug!("No screenshot for {}", target.url);
                None
            }
        };

        let formats_failed = self.config.formats.enforce
            && formats.as_ref().is_some_and(|f| !f.conformant());
        let visual_failed = visual.as_ref().is_some_and(|v| !v.passed);
        let status = if !errors.is_empty() {
            PageStatus::Error
        } else if !coverage.passed || visual_failed || formats_failed {
            PageStatus::Failed
        } else {
            PageStatus::Passed
        };

        info!(
            "{} [{}] coverage {:.1}% ({}/{}) visual {} -> {:?}",
            target.url,
            target.viewport,
            coverage.coverage_percent,
            coverage.target_language_count,
            coverage.eligible_text_nodes,
            visual
                .as_ref()
                .and_then(|v| v.diff_ratio)
                .map(|r| format!("{:.4}", r))
                .unwrap_or_else(|| "-".to_string()),
            status
        );

        PageOutcome {
            url: target.url,
            viewport: target.viewport,
            status,
            coverage: Some(coverage),
            formats,
            visual,
            errors,
        }
    }

    fn visual_stage(
        &self,
        target: &PageTarget,
        shot: &Screenshot,
        coverage_passed: bool,
        errors: &mut Vec<PageError>,
    ) -> Option<VisualDiffResult> {
        if !self.config.visual.enabled {
            return None;
        }

        if self.mode == BaselineMode::Approve {
            return match self.store.save(target, shot) {
                Ok(path) => Some(VisualDiffResult {
                    baseline_exists: true,
                    diff_ratio: None,
                    diff_threshold: self.differ.threshold(),
                    differing_pixels: 0,
                    total_pixels: shot.image().width() as u64 * shot.image().height() as u64,
                    passed: true,
                    status: VisualStatus::BaselineUpdated,
                    diff_artifact_path: None,
                    baseline_path: Some(path.display().to_string()),
                }),
                Err(e) => {
                    error!("{}", e);
                    errors.push(PageError::new(PageErrorKind::BaselineWrite, e.to_string()));
                    None
                }
            };
        }

        let due = self.config.visual.trigger == VisualTrigger::Always || !coverage_passed;
        if !due {
            return None;
        }

        let baseline = match self.store.load(target) {
            Ok(baseline) => baseline,
            Err(e) => {
                error!("Cannot read baseline for {}: {}", target.url, e);
                errors.push(PageError::new(PageErrorKind::BaselineRead, e.to_string()));
                return None;
            }
        };

        let mut comparison = self.differ.compare(shot, baseline.as_ref());
        let mut result = comparison.result;

        if baseline.is_none() {
            match self.store.save(target, shot) {
                Ok(path) => {
                    info!("Created first baseline for {} {}", target.url, target.viewport);
                    result.status = VisualStatus::BaselineCreated;
                    result.baseline_path = Some(path.display().to_string());
                }
                Err(e) => {
                    error!("{}", e);
                    errors.push(PageError::new(PageErrorKind::BaselineWrite, e.to_string()));
                }
            }
        } else {
            result.baseline_path = Some(self.store.image_path(target).display().to_string());
        }

        if let Some(artifact) = comparison.artifact.take() {
            match self.differ.write_artifact(target, &artifact) {
                Ok(path) => result.diff_artifact_path = Some(path.display().to_string()),
                Err(e) => {
                    warn!("{}", e);
                    errors.push(PageError::new(PageErrorKind::ArtifactWrite, e.to_string()));
                }
            }
        }

        Some(result)
    }

    /// Run a fixed list of pages
    pub async fn run(&self, pages: Vec<PageInput>, cancel: CancellationToken) -> RunReport {
        self.run_stream(stream::iter(pages), cancel).await
    }

    /// Run pages as the browser layer produces them. Output order matches input order.
    ///
    /// Pages not yet started when `cancel` fires are reported as cancelled;
    /// pages already on a worker run to completion.
    pub async fn run_stream<S>(&self, pages: S, cancel: CancellationToken) -> RunReport
    where
        S: Stream<Item = PageInput> + Send,
    {
        let started_at = Utc::now();
        let concurrency = self.config.run.concurrency.max(1);
        info!("Analyzing pages with concurrency {}", concurrency);

        let outcomes: Vec<PageOutcome> = pages
            .map(|input| {
                let engine = self.clone();
                let cancel = cancel.clone();
                async move {
                    let target = input.target.clone();
                    if cancel.is_cancelled() {
                        return cancelled(&target);
                    }
                    let worker = tokio::task::spawn_blocking(move || {
                        if cancel.is_cancelled() {
                            return cancelled(&input.target);
                        }
                        engine.analyze_page(input)
                    });
                    match worker.await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            error!("Analysis worker for {} failed: {}", target.url, e);
                            PageOutcome::unprocessed(
                                &target,
                                PageStatus::Error,
                                PageError::new(PageErrorKind::Analysis, e.to_string()),
                            )
                        }
                    }
                }
            })
            .buffered(concurrency)
            .collect()
            .await;

        let report = RunReport::from_pages(outcomes, started_at, cancel.is_cancelled());
        info!(
            "Run finished: {} passed, {} failed, {} errored ({} ms)",
            report.passed, report.failed, report.errored, report.duration_ms
        );
        report
    }
}

fn cancelled(target: &PageTarget) -> PageOutcome {
    PageOutcome::unprocessed(
        target,
        PageStatus::Cancelled,
        PageError::new(PageErrorKind::Cancelled, "run cancelled before analysis"),
    )
}

/// Write the run report as JSON into `output_dir`
pub fn write_report(report: &RunReport, output_dir: &Path) -> EngineResult<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let path = output_dir.join("run-report.json");
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::tests::ScriptDetector;
    use image::{Rgba, RgbaImage};
    use locaudit_common::{CoverageStatus, Viewport};
    use tempfile::TempDir;

    fn engine(tmp: &TempDir, trigger: VisualTrigger) -> Engine {
        let mut config = AuditConfig::default();
        config.filter.ignored_words = vec!["API".to_string()];
        config.visual.trigger = trigger;
        config.visual.baseline_dir = tmp.path().join("snapshots");
        config.visual.diff_dir = tmp.path().join("diffs");
        Engine::new(config, Arc::new(ScriptDetector::new())).unwrap()
    }

    fn target() -> PageTarget {
        PageTarget::new("https://example.com/settings", Viewport::new(20, 10))
    }

    fn shot(rgba: [u8; 4]) -> Screenshot {
        Screenshot::new(RgbaImage::from_pixel(20, 10, Rgba(rgba)), &target(), Utc::now())
    }

    fn untranslated() -> Vec<TextNode> {
        vec![
            TextNode::new("プロフィール"),
            TextNode::new("Account settings"),
            TextNode::new("Change password"),
            TextNode::new("100"),
            TextNode::new("My API Key"),
        ]
    }

    #[test]
    fn test_translated_page_passes_without_visual() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp, VisualTrigger::OnCoverageFailure);
        let input = PageInput::new(
            target(),
            vec![TextNode::new("プロフィール"), TextNode::new("パスワード変更")],
        )
        .with_screenshot(shot([0, 0, 0, 255]));

        let outcome = engine.analyze_page(input);
        assert_eq!(outcome.status, PageStatus::Passed);
        assert!(outcome.visual.is_none());
        assert_eq!(engine.baselines().state(&target()), crate::baseline::BaselineState::Absent);
    }

    #[test]
    fn test_failing_coverage_triggers_visual_and_creates_baseline() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp, VisualTrigger::OnCoverageFailure);
        let input = PageInput::new(target(), untranslated()).with_screenshot(shot([0, 0, 0, 255]));

        let outcome = engine.analyze_page(input);
        let coverage = outcome.coverage.unwrap();
        assert_eq!(coverage.total_text_nodes, 5);
        assert_eq!(coverage.eligible_text_nodes, 3);
        assert_eq!(coverage.target_language_count, 1);
        assert_eq!(coverage.status, CoverageStatus::Failed);

        let visual = outcome.visual.unwrap();
        assert!(!visual.baseline_exists);
        assert_eq!(visual.status, VisualStatus::BaselineCreated);
        assert_eq!(outcome.status, PageStatus::Failed);
    }

    #[test]
    fn test_capture_error_is_isolated() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp, VisualTrigger::Always);
        let outcome = engine.analyze_page(PageInput::new(target(), vec![]).with_capture_error("timeout"));
        assert_eq!(outcome.status, PageStatus::Error);
        assert_eq!(outcome.errors[0].kind, PageErrorKind::Capture);
        assert!(outcome.coverage.is_none());
    }

    #[test]
    fn test_approve_mode_overwrites_baseline() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp, VisualTrigger::Always);
        engine.analyze_page(PageInput::new(target(), vec![]).with_screenshot(shot([0, 0, 0, 255])));

        let approve = engine.clone().with_mode(BaselineMode::Approve);
        let outcome =
            approve.analyze_page(PageInput::new(target(), vec![]).with_screenshot(shot([255, 0, 0, 255])));
        assert_eq!(outcome.visual.unwrap().status, VisualStatus::BaselineUpdated);

        let stored = engine.baselines().load(&target()).unwrap().unwrap();
        assert_eq!(stored.image().get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_enforced_formats_fail_page() {
        let tmp = TempDir::new().unwrap();
        let mut config = AuditConfig::default();
        config.formats.enforce = true;
        config.visual.enabled = false;
        config.visual.baseline_dir = tmp.path().join("snapshots");
        let engine = Engine::new(config, Arc::new(ScriptDetector::new())).unwrap();

        let outcome = engine.analyze_page(PageInput::new(
            target(),
            vec![TextNode::new("更新日 03/15/2024")],
        ));
        assert!(outcome.coverage.unwrap().passed);
        assert!(!outcome.formats.unwrap().date.conformant);
        assert_eq!(outcome.status, PageStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_run_reports_unstarted_pages() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp, VisualTrigger::OnCoverageFailure);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = engine
            .run(vec![PageInput::new(target(), vec![TextNode::new("設定")])], cancel)
            .await;
        assert!(report.cancelled);
        assert_eq!(report.pages[0].status, PageStatus::Cancelled);
        assert!(!report.success());
    }

    #[test]
    fn test_write_report() {
        let tmp = TempDir::new().unwrap();
        let report = RunReport::from_pages(vec![], Utc::now(), false);
        let path = write_report(&report, &tmp.path().join("out")).unwrap();
        let parsed: RunReport = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed.total, 0);
    }
}
