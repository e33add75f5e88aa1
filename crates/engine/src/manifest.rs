//! Capture manifest: the browser layer's output, read from disk
//!
//! ```yaml
//! pages:
//!   - url: https://app.example.com/#/settings
//!     viewport: { width: 1440, height: 900 }
//!     text_nodes: captures/settings.json     # or an inline list
//!     screenshot: captures/settings.png
//!   - url: https://app.example.com/#/billing
//!     error: "navigation timeout after 30s"
//! ```
//!
//! Page files are resolved relative to the manifest and loaded lazily on the
//! worker that analyzes the page, so one bad file only affects its own page.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use locaudit_common::{PageTarget, TextNode, Viewport};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::visual::Screenshot;

/// Where a page's text nodes come from
#[derive(Debug, Clone)]
pub enum TextSource {
    Nodes(Vec<TextNode>),
    File(PathBuf),
}

impl TextSource {
    pub fn load(self) -> EngineResult<Vec<TextNode>> {
        match self {
            TextSource::Nodes(nodes) => Ok(nodes),
            TextSource::File(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    EngineError::Capture(format!("cannot read {}: {}", path.display(), e))
                })?;
                let entries: Vec<NodeEntry> = serde_json::from_str(&content).map_err(|e| {
                    EngineError::Capture(format!("malformed text nodes in {}: {}", path.display(), e))
                })?;
                Ok(entries.into_iter().map(NodeEntry::into_node).collect())
            }
        }
    }
}

/// Where a page's screenshot comes from
#[derive(Debug, Clone)]
pub enum ScreenshotSource {
    Captured(Screenshot),
    File {
        path: PathBuf,
        captured_at: Option<DateTime<Utc>>,
    },
}

impl ScreenshotSource {
    pub fn load(self, target: &PageTarget) -> EngineResult<Screenshot> {
        match self {
            ScreenshotSource::Captured(shot) => Ok(shot),
            ScreenshotSource::File { path, captured_at } => Screenshot::open(&path, target, captured_at)
                .map_err(|e| EngineError::Capture(format!("cannot decode {}: {}", path.display(), e))),
        }
    }
}

/// Everything the browser layer produced for one page
#[derive(Debug, Clone)]
pub struct PageInput {
    pub target: PageTarget,
    pub text: TextSource,
    pub screenshot: Option<ScreenshotSource>,
    pub capture_error: Option<String>,
}

impl PageInput {
    pub fn new(target: PageTarget, nodes: Vec<TextNode>) -> Self {
        Self {
            target,
            text: TextSource::Nodes(nodes),
            screenshot: None,
            capture_error: None,
        }
    }

    pub fn with_screenshot(mut self, shot: Screenshot) -> Self {
        self.screenshot = Some(ScreenshotSource::Captured(shot));
        self
    }

    pub fn with_capture_error(mut self, message: impl Into<String>) -> Self {
        self.capture_error = Some(message.into());
        self
    }
}

/// A text node given either as plain text or in full
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum NodeEntry {
    Text(String),
    Node(TextNode),
}

impl NodeEntry {
    fn into_node(self) -> TextNode {
        match self {
            NodeEntry::Text(text) => TextNode::new(text),
            NodeEntry::Node(node) => node,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ManifestText {
    Inline(Vec<NodeEntry>),
    File(PathBuf),
}

#[derive(Debug, Clone, Deserialize)]
struct ManifestPage {
    url: String,
    #[serde(default)]
    viewport: Viewport,
    #[serde(default)]
    text_nodes: Option<ManifestText>,
    #[serde(default)]
    screenshot: Option<PathBuf>,
    #[serde(default)]
    captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureManifest {
    pages: Vec<ManifestPage>,
}

impl CaptureManifest {
    /// Parse YAML (a superset of JSON)
    pub fn from_yaml(content: &str) -> EngineResult<Self> {
        let manifest: Self = serde_yaml::from_str(content).map_err(|e| {
            locaudit_common::Error::config(format!("malformed capture manifest: {}", e))
        })?;
        Ok(manifest)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Resolve into page inputs; relative paths are taken from `base_dir`
    pub fn into_inputs(self, base_dir: &Path) -> Vec<PageInput> {
        let resolve = |path: PathBuf| {
            if path.is_relative() {
                base_dir.join(path)
            } else {
                path
            }
        };

        self.pages
            .into_iter()
            .map(|page| {
                let text = match page.text_nodes {
                    Some(ManifestText::Inline(entries)) => {
                        TextSource::Nodes(entries.into_iter().map(NodeEntry::into_node).collect())
                    }
                    Some(ManifestText::File(path)) => TextSource::File(resolve(path)),
                    None => TextSource::Nodes(Vec::new()),
                };
                PageInput {
                    target: PageTarget::new(page.url, page.viewport),
                    text,
                    screenshot: page.screenshot.map(|path| ScreenshotSource::File {
                        path: resolve(path),
                        captured_at: page.captured_at,
                    }),
                    capture_error: page.error,
                }
            })
            .collect()
    }
}

/// Load a manifest file into page inputs
pub fn load_inputs(path: &Path) -> EngineResult<Vec<PageInput>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        locaudit_common::Error::config(format!("cannot read manifest {}: {}", path.display(), e))
    })?;
    let manifest = CaptureManifest::from_yaml(&content)?;
    if manifest.is_empty() {
        warn!("Manifest {} lists no pages", path.display());
    } else {
        info!("Loaded {} page(s) from {}", manifest.len(), path.display());
    }

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    debug!("Resolving page files relative to {}", base_dir.display());
    Ok(manifest.into_inputs(base_dir))
}
