//! LocAudit analysis engine
//!
//! This crate turns what a browser capture produced for each page into a
//! per-page verdict:
//! - Filters text nodes that should not count toward translation coverage
//! - Classifies the remaining text by language
//! - Aggregates a coverage percentage and compares it to the threshold
//! - Lints dates, times, numbers and currency against locale conventions
//! - Compares screenshots to approved baselines and renders diff artifacts
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Engine::run_stream                        │
//! │      (bounded, order-preserving, cancellable workers)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  analyze_page(PageInput) -> PageOutcome                      │
//! │    ├── TextFilter::filter(node) -> FilterVerdict             │
//! │    ├── LanguageClassifier::classify(text)                    │
//! │    │     ├── LanguageDetector (lingua)                       │
//! │    │     └── script heuristic for short strings              │
//! │    ├── CoverageAggregator -> PageCoverageReport              │
//! │    ├── check_formats(texts, LocaleRules) -> FormatReport     │
//! │    └── VisualDiffer::compare(current, baseline)              │
//! │          └── BaselineStore (png + json sidecar per key)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RunReport -> run-report.json                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod baseline;
pub mod classifier;
pub mod coverage;
pub mod error;
pub mod filter;
pub mod formats;
pub mod manifest;
pub mod runner;
pub mod visual;

pub use baseline::{BaselineState, BaselineStore};
pub use classifier::{Detection, LanguageClassifier, LanguageDetector, LinguaDetector};
pub use error::{EngineError, EngineResult};
pub use manifest::{load_inputs, CaptureManifest, PageInput};
pub use runner::{write_report, BaselineMode, Engine};
pub use visual::{Screenshot, VisualDiffer};
