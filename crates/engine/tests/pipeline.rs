//! End-to-end runs through the engine with a deterministic detector

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use futures::SinkExt;
use image::{Rgba, RgbaImage};
use locaudit_common::{
    AuditConfig, PageErrorKind, PageStatus, PageTarget, RunReport, TextNode, Viewport,
    VisualStatus, VisualTrigger,
};
use locaudit_engine::{
    load_inputs, write_report, BaselineMode, Detection, Engine, EngineResult, LanguageDetector,
    PageInput, Screenshot,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Kana or kanji => ja, everything else => en
struct KanaDetector;

impl LanguageDetector for KanaDetector {
    fn detect(&self, text: &str) -> EngineResult<Option<Detection>> {
        let japanese = text
            .chars()
            .any(|c| matches!(c as u32, 0x3040..=0x30FF | 0x4E00..=0x9FFF));
        Ok(Some(Detection {
            language: if japanese { "ja" } else { "en" }.to_string(),
            confidence: Some(0.95),
        }))
    }
}

fn config(tmp: &TempDir) -> AuditConfig {
    let mut config = AuditConfig::default();
    config.visual.trigger = VisualTrigger::Always;
    config.visual.baseline_dir = tmp.path().join("snapshots");
    config.visual.diff_dir = tmp.path().join("diffs");
    config.run.concurrency = 2;
    config
}

fn engine(tmp: &TempDir) -> Engine {
    Engine::new(config(tmp), Arc::new(KanaDetector)).unwrap()
}

fn target(path: &str) -> PageTarget {
    PageTarget::new(format!("https://app.example.com/#/{}", path), Viewport::new(40, 20))
}

fn page(path: &str, image: RgbaImage) -> PageInput {
    let target = target(path);
    let shot = Screenshot::new(image, &target, Utc::now());
    PageInput::new(target, vec![TextNode::new("アカウント設定"), TextNode::new("ログアウト")])
        .with_screenshot(shot)
}

fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(rgba))
}

#[tokio::test]
async fn first_run_creates_baseline_and_second_run_matches() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);

    let first = engine
        .run(vec![page("settings", solid(40, 20, [200, 200, 200, 255]))], CancellationToken::new())
        .await;
    let visual = first.pages[0].visual.as_ref().unwrap();
    assert_eq!(visual.status, VisualStatus::BaselineCreated);
    assert!(!visual.baseline_exists);
    assert!(visual.passed);
    assert!(first.success());

    let second = engine
        .run(vec![page("settings", solid(40, 20, [200, 200, 200, 255]))], CancellationToken::new())
        .await;
    let visual = second.pages[0].visual.as_ref().unwrap();
    assert_eq!(visual.status, VisualStatus::Passed);
    assert!(visual.baseline_exists);
    assert_eq!(visual.diff_ratio, Some(0.0));
    assert!(visual.diff_artifact_path.is_none());
}

#[tokio::test]
async fn regression_above_threshold_fails_with_artifact() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);
    engine
        .run(vec![page("billing", solid(40, 20, [0, 0, 0, 255]))], CancellationToken::new())
        .await;

    // 10% of rows change
    let mut changed = solid(40, 20, [0, 0, 0, 255]);
    for x in 0..40 {
        for y in 0..2 {
            changed.put_pixel(x, y, Rgba([255, 255, 255, 255]));
        }
    }
    let report = engine
        .run(vec![page("billing", changed)], CancellationToken::new())
        .await;

    let outcome = &report.pages[0];
    assert_eq!(outcome.status, PageStatus::Failed);
    let visual = outcome.visual.as_ref().unwrap();
    assert_eq!(visual.status, VisualStatus::Failed);
    assert_eq!(visual.differing_pixels, 80);
    assert!((visual.diff_ratio.unwrap() - 0.1).abs() < 1e-9);

    let artifact = image::open(visual.diff_artifact_path.as_ref().unwrap()).unwrap();
    assert_eq!(artifact.width(), 120);
    assert_eq!(artifact.height(), 20);
}

#[tokio::test]
async fn dimension_mismatch_is_a_hard_failure() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);
    engine
        .run(vec![page("home", solid(40, 20, [9, 9, 9, 255]))], CancellationToken::new())
        .await;

    let report = engine
        .run(vec![page("home", solid(40, 30, [9, 9, 9, 255]))], CancellationToken::new())
        .await;
    let visual = report.pages[0].visual.as_ref().unwrap();
    assert_eq!(visual.status, VisualStatus::DimensionMismatch);
    assert_eq!(visual.diff_ratio, Some(1.0));
    assert!(!visual.passed);
    assert!(Path::new(visual.diff_artifact_path.as_ref().unwrap()).is_file());
}

#[tokio::test]
async fn approve_mode_replaces_baseline() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);
    engine
        .run(vec![page("profile", solid(40, 20, [0, 0, 0, 255]))], CancellationToken::new())
        .await;

    let approved = engine
        .clone()
        .with_mode(BaselineMode::Approve)
        .run(vec![page("profile", solid(40, 20, [50, 60, 70, 255]))], CancellationToken::new())
        .await;
    assert_eq!(
        approved.pages[0].visual.as_ref().unwrap().status,
        VisualStatus::BaselineUpdated
    );

    let report = engine
        .run(vec![page("profile", solid(40, 20, [50, 60, 70, 255]))], CancellationToken::new())
        .await;
    assert_eq!(report.pages[0].visual.as_ref().unwrap().diff_ratio, Some(0.0));
}

#[tokio::test]
async fn failing_pages_do_not_affect_neighbours_and_order_is_kept() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);

    let untranslated = PageInput::new(
        target("reports"),
        vec![
            TextNode::new("Monthly report"),
            TextNode::new("Download CSV"),
            TextNode::new("2024"),
        ],
    );
    let pages = vec![
        page("a", solid(40, 20, [1, 1, 1, 255])),
        PageInput::new(target("b"), vec![]).with_capture_error("navigation timeout after 30s"),
        untranslated,
        page("d", solid(40, 20, [4, 4, 4, 255])),
    ];
    let urls: Vec<String> = pages.iter().map(|p| p.target.url.clone()).collect();

    let report = engine.run(pages, CancellationToken::new()).await;
    assert_eq!(report.pages.iter().map(|p| p.url.clone()).collect::<Vec<_>>(), urls);

    let statuses: Vec<PageStatus> = report.pages.iter().map(|p| p.status).collect();
    assert_eq!(
        statuses,
        vec![PageStatus::Passed, PageStatus::Error, PageStatus::Failed, PageStatus::Passed]
    );
    assert_eq!(report.pages[1].errors[0].kind, PageErrorKind::Capture);

    let coverage = report.pages[2].coverage.as_ref().unwrap();
    assert_eq!(coverage.eligible_text_nodes, 2);
    assert_eq!(coverage.non_target_samples.len(), 2);

    assert_eq!((report.total, report.passed, report.failed, report.errored), (4, 2, 1, 1));
    assert!(!report.success());
}

#[tokio::test]
async fn baseline_write_failure_is_isolated_to_its_page() {
    let tmp = TempDir::new().unwrap();
    let blocker = tmp.path().join("snapshots");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let mut config = config(&tmp);
    config.visual.baseline_dir = blocker;
    let engine = Engine::new(config, Arc::new(KanaDetector)).unwrap();

    let pages = vec![
        page("a", solid(40, 20, [5, 5, 5, 255])),
        PageInput::new(target("b"), vec![TextNode::new("ダッシュボード")]),
    ];
    let report = engine.run(pages, CancellationToken::new()).await;

    assert_eq!(report.pages[0].status, PageStatus::Error);
    assert_eq!(report.pages[0].errors[0].kind, PageErrorKind::BaselineWrite);
    assert!(report.pages[0].coverage.as_ref().unwrap().passed);
    assert_eq!(report.pages[1].status, PageStatus::Passed);
    assert_eq!(report.errored, 1);
    assert!(!report.success());
}

#[tokio::test]
async fn pages_arriving_after_cancellation_are_not_analyzed() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);
    let cancel = CancellationToken::new();
    let (mut tx, rx) = futures::channel::mpsc::unbounded::<PageInput>();

    let run = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.run_stream(rx, cancel).await })
    };

    tx.send(page("first", solid(40, 20, [0, 0, 0, 255]))).await.unwrap();
    cancel.cancel();
    tx.send(page("second", solid(40, 20, [0, 0, 0, 255]))).await.unwrap();
    drop(tx);

    let report = run.await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.total, 2);
    assert_eq!(report.pages[1].status, PageStatus::Cancelled);
    assert_eq!(report.pages[1].errors[0].kind, PageErrorKind::Cancelled);
    assert!(!report.success());
}

#[tokio::test]
async fn manifest_run_writes_report() {
    let tmp = TempDir::new().unwrap();
    let captures = tmp.path().join("captures");
    std::fs::create_dir_all(&captures).unwrap();

    solid(40, 20, [10, 20, 30, 255]).save(captures.join("login.png")).unwrap();
    std::fs::write(
        captures.join("login.json"),
        r#"["ログイン", "パスワードを忘れた場合", {"text": "Acme", "ignore_marker": true}, "12,345"]"#,
    )
    .unwrap();
    let manifest = tmp.path().join("manifest.yaml");
    std::fs::write(
        &manifest,
        r#"
pages:
  - url: https://app.example.com/#/login
    viewport: { width: 40, height: 20 }
    text_nodes: captures/login.json
    screenshot: captures/login.png
  - url: https://app.example.com/#/missing
    text_nodes: captures/missing.json
"#,
    )
    .unwrap();

    let engine = engine(&tmp);
    let inputs = load_inputs(&manifest).unwrap();
    let report = engine.run(inputs, CancellationToken::new()).await;

    let login = &report.pages[0];
    assert_eq!(login.status, PageStatus::Passed);
    let coverage = login.coverage.as_ref().unwrap();
    assert_eq!(coverage.total_text_nodes, 4);
    assert_eq!(coverage.eligible_text_nodes, 2);
    assert_eq!(coverage.coverage_percent, 100.0);
    assert!(login.formats.as_ref().unwrap().number_grouping.found);

    let missing = &report.pages[1];
    assert_eq!(missing.status, PageStatus::Error);
    assert_eq!(missing.errors[0].kind, PageErrorKind::Capture);

    let path = write_report(&report, &tmp.path().join("reports")).unwrap();
    let parsed: RunReport = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(parsed.total, 2);
    assert_eq!(parsed.pages[0].url, "https://app.example.com/#/login");
}
