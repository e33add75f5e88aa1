//! Text eligibility filter
//!
//! Exclusion checks run in a fixed order and the first match wins:
//! numeric-only, ignore marker (or input value), ignore selector, ignored word.

use locaudit_common::{FilterConfig, FilterReason, FilterVerdict, TextNode};

/// Compiled filter rules for one run
#[derive(Debug, Clone)]
pub struct TextFilter {
    ignore_selectors: Vec<String>,
    /// Lowercased, trimmed, non-empty
    ignored_words: Vec<String>,
}

impl TextFilter {
    pub fn new(config: &FilterConfig) -> Self {
        let ignored_words = config
            .ignored_words
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        let ignore_selectors = config
            .ignore_selectors
            .iter()
            .map(|s| s.trim().to_string())
            .collect();

        Self {
            ignore_selectors,
            ignored_words,
        }
    }

    pub fn filter(&self, node: &TextNode) -> FilterVerdict {
        if is_numeric_only(&node.text) {
            return FilterVerdict::excluded(FilterReason::NumericOnly);
        }

        // Input values are not rendered text
        if node.ignore_marker || node.from_input_value {
            return FilterVerdict::excluded(FilterReason::MarkedIgnored);
        }

        if node
            .matched_selectors
            .iter()
            .any(|s| self.ignore_selectors.iter().any(|ignored| ignored == s.trim()))
        {
            return FilterVerdict::excluded(FilterReason::SelectorIgnored);
        }

        if !self.ignored_words.is_empty() {
            let normalized = normalize(&node.text).to_lowercase();
            if self.ignored_words.iter().any(|w| normalized.contains(w.as_str())) {
                return FilterVerdict::excluded(FilterReason::IgnoredWord);
            }
        }

        FilterVerdict::eligible()
    }
}

/// One-shot filter without a precompiled rule set
pub fn filter(node: &TextNode, config: &FilterConfig) -> FilterVerdict {
    TextFilter::new(config).filter(node)
}

/// No letter in any script
pub fn is_numeric_only(text: &str) -> bool {
    !text.chars().any(char::is_alphabetic)
}

/// Trim and collapse internal whitespace runs to a single space
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
