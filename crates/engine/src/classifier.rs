//! Language classification
//!
//! The statistical detector sits behind [`LanguageDetector`] so the rest of the
//! engine never depends on a particular library. Short strings, and strings
//! the detector cannot decide, fall back to a Unicode script heuristic.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use lingua::{Language, LanguageDetectorBuilder};
use locaudit_common::{ClassificationMethod, ClassificationResult, LanguageConfig};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

/// Confidence reported for script-heuristic verdicts
pub const SCRIPT_HEURISTIC_CONFIDENCE: f64 = 1.0;

/// A detected language label and the detector's confidence in it
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// ISO 639-1 code
    pub language: String,
    pub confidence: Option<f64>,
}

/// Offline language detector; must be safe for concurrent use
pub trait LanguageDetector: Send + Sync {
    /// `Ok(None)` means the detector could not decide
    fn detect(&self, text: &str) -> EngineResult<Option<Detection>>;
}

/// Detector backed by lingua's n-gram models
pub struct LinguaDetector {
    detector: lingua::LanguageDetector,
}

impl LinguaDetector {
    /// Build a detector restricted to the given ISO 639-1 codes, models preloaded
    pub fn from_iso_codes(codes: &[String]) -> EngineResult<Self> {
        let languages = codes
            .iter()
            .map(|code| language_for_code(code))
            .collect::<EngineResult<Vec<_>>>()?;
        if languages.len() < 2 {
            return Err(locaudit_common::Error::config(
                "language detection needs at least two candidate languages",
            )
            .into());
        }

        let detector = LanguageDetectorBuilder::from_languages(&languages)
            .with_preloaded_language_models()
            .build();
        info!("Loaded language models for {}", codes.join(", "));

        Ok(Self { detector })
    }
}

impl LanguageDetector for LinguaDetector {
    fn detect(&self, text: &str) -> EngineResult<Option<Detection>> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.detector.compute_language_confidence_values(text)
        }));

        match outcome {
            Ok(values) => Ok(top_detection(&values)),
            Err(_) => Err(EngineError::ClassificationFailure(
                "language detector panicked".to_string(),
            )),
        }
    }
}

/// Best-scoring language from confidence values sorted high to low.
/// Undecided when nothing scored or the top two tie.
fn top_detection(values: &[(Language, f64)]) -> Option<Detection> {
    let &(language, confidence) = values.first()?;
    if confidence <= 0.0 {
        return None;
    }
    if let Some(&(_, runner_up)) = values.get(1) {
        if (confidence - runner_up).abs() < f64::EPSILON {
            return None;
        }
    }
    Some(Detection {
        language: language.iso_code_639_1().to_string(),
        confidence: Some(confidence),
    })
}

fn language_for_code(code: &str) -> EngineResult<Language> {
    Language::all()
        .into_iter()
        .find(|language| language.iso_code_639_1().to_string().eq_ignore_ascii_case(code))
        .ok_or_else(|| {
            locaudit_common::Error::config(format!(
                "language '{}' is not supported by the detector",
                code
            ))
            .into()
        })
}

/// Inclusive codepoint ranges identifying a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRanges(Vec<(u32, u32)>);

impl ScriptRanges {
    pub fn new(ranges: Vec<(u32, u32)>) -> Self {
        Self(ranges)
    }

    /// Built-in ranges for a language's script; empty when the script is not distinctive
    pub fn for_language(code: &str) -> Self {
        let ranges: &[(u32, u32)] = match code.to_ascii_lowercase().as_str() {
            // Hiragana, Katakana, CJK ext A, CJK unified, halfwidth katakana
            "ja" => &[
                (0x3040, 0x309F),
                (0x30A0, 0x30FF),
                (0x3400, 0x4DBF),
                (0x4E00, 0x9FFF),
                (0xFF66, 0xFF9F),
            ],
            "zh" => &[(0x3400, 0x4DBF), (0x4E00, 0x9FFF)],
            // Hangul syllables, jamo, compatibility jamo
            "ko" => &[(0xAC00, 0xD7AF), (0x1100, 0x11FF), (0x3130, 0x318F)],
            "ru" | "uk" | "bg" | "sr" => &[(0x0400, 0x04FF)],
            "el" => &[(0x0370, 0x03FF)],
            "he" => &[(0x0590, 0x05FF)],
            "ar" | "fa" => &[(0x0600, 0x06FF)],
            "hi" | "mr" => &[(0x0900, 0x097F)],
            "th" => &[(0x0E00, 0x0E7F)],
            _ => &[],
        };
        Self(ranges.to_vec())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, c: char) -> bool {
        let cp = c as u32;
        self.0.iter().any(|&(start, end)| (start..=end).contains(&cp))
    }

    /// Any codepoint of the text falls inside the script
    pub fn matches(&self, text: &str) -> bool {
        text.chars().any(|c| self.contains(c))
    }
}

/// Classification policy around a shared detector
#[derive(Clone)]
pub struct LanguageClassifier {
    detector: Arc<dyn LanguageDetector>,
    target: String,
    script: ScriptRanges,
    min_confidence: f64,
    min_statistical_chars: usize,
}

impl LanguageClassifier {
    pub fn new(detector: Arc<dyn LanguageDetector>, config: &LanguageConfig) -> Self {
        let script = match &config.script_ranges {
            Some(ranges) => ScriptRanges::new(ranges.clone()),
            None => ScriptRanges::for_language(&config.target),
        };
        if script.is_empty() {
            warn!(
                "No script ranges for '{}'; short strings will never count as target language",
                config.target
            );
        }

        Self {
            detector,
            target: config.target.to_ascii_lowercase(),
            script,
            min_confidence: config.min_confidence,
            min_statistical_chars: config.min_statistical_chars,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Never fails: detector errors become an indeterminate result.
    ///
    /// Short strings, undecided detections and detections below
    /// `min_confidence` are decided by the target-script heuristic.
    pub fn classify(&self, text: &str) -> ClassificationResult {
        let significant = text.chars().filter(|c| !c.is_whitespace()).count();
        if significant < self.min_statistical_chars {
            return self.by_script(text);
        }

        match self.detector.detect(text) {
            Ok(Some(detection)) => {
                let clears_bar = detection
                    .confidence
                    .map_or(true, |c| c >= self.min_confidence);
                if !clears_bar {
                    debug!(
                        "Detector unsure ({} at {:?}), using script heuristic",
                        detection.language, detection.confidence
                    );
                    return self.by_script(text);
                }
                ClassificationResult {
                    is_target_language: detection.language.eq_ignore_ascii_case(&self.target),
                    detected_language: Some(detection.language),
                    confidence: detection.confidence,
                    method: ClassificationMethod::Statistical,
                }
            }
            Ok(None) => {
                debug!("Detector undecided, using script heuristic");
                self.by_script(text)
            }
            Err(e) => {
                warn!("Classification failed, treating as indeterminate: {}", e);
                ClassificationResult::indeterminate()
            }
        }
    }

    fn by_script(&self, text: &str) -> ClassificationResult {
        let hit = self.script.matches(text);
        ClassificationResult {
            detected_language: hit.then(|| self.target.clone()),
            confidence: Some(if hit { SCRIPT_HEURISTIC_CONFIDENCE } else { 0.0 }),
            is_target_language: hit,
            method: ClassificationMethod::ScriptHeuristic,
        }
    }
}
