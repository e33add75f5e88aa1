//! Locale format lint
//!
//! Each category scans every text for recognizer matches and checks that each
//! match takes the expected form. Categories are independent of each other.

use chrono::NaiveDate;
use locaudit_common::config::FormatConfig;
use locaudit_common::{CategoryReport, FormatCategory, FormatReport};
use regex::Regex;
use tracing::debug;

use crate::error::EngineResult;

/// Compiled recognizer and expected-form predicate for one category
#[derive(Debug, Clone)]
pub struct FormatRule {
    category: FormatCategory,
    recognizer: Regex,
    expected: Regex,
}

impl FormatRule {
    pub fn new(category: FormatCategory, recognizer: &str, expected: &str) -> EngineResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                locaudit_common::Error::config(format!("formats.{}: {}", category.as_str(), e))
            })
        };
        Ok(Self {
            category,
            recognizer: compile(recognizer)?,
            expected: compile(expected)?,
        })
    }

    fn conforms(&self, matched: &str) -> bool {
        if !self.expected.is_match(matched) {
            return false;
        }
        match self.category {
            FormatCategory::Date => is_calendar_date(matched),
            _ => true,
        }
    }

    fn check(&self, texts: &[String], sample_limit: usize) -> CategoryReport {
        let mut report = CategoryReport::empty(self.category);
        for text in texts {
            for m in self.recognizer.find_iter(text) {
                report.match_count += 1;
                if !self.conforms(m.as_str()) {
                    report.conformant = false;
                    if report.non_conformant_samples.len() < sample_limit {
                        report.non_conformant_samples.push(m.as_str().to_string());
                    }
                }
            }
        }
        report.found = report.match_count > 0;
        report
    }
}

/// Format rules for the target locale
#[derive(Debug, Clone)]
pub struct LocaleRules {
    date: FormatRule,
    time: FormatRule,
    number_grouping: FormatRule,
    currency: FormatRule,
}

impl LocaleRules {
    pub fn from_config(config: &FormatConfig) -> EngineResult<Self> {
        let rule = |category: FormatCategory| {
            let cfg = config.rule(category);
            FormatRule::new(category, &cfg.recognizer, &cfg.expected)
        };
        Ok(Self {
            date: rule(FormatCategory::Date)?,
            time: rule(FormatCategory::Time)?,
            number_grouping: rule(FormatCategory::NumberGrouping)?,
            currency: rule(FormatCategory::Currency)?,
        })
    }

    /// ja_JP conventions
    pub fn japanese() -> EngineResult<Self> {
        Self::from_config(&FormatConfig::default())
    }
}

/// Lint a page's texts against the locale rules
pub fn check_formats(
    url: &str,
    page_text: &[String],
    rules: &LocaleRules,
    sample_limit: usize,
) -> FormatReport {
    let report = FormatReport {
        url: url.to_string(),
        date: rules.date.check(page_text, sample_limit),
        time: rules.time.check(page_text, sample_limit),
        number_grouping: rules.number_grouping.check(page_text, sample_limit),
        currency: rules.currency.check(page_text, sample_limit),
    };
    debug!(
        "Format check for {}: {}",
        url,
        report
            .categories()
            .iter()
            .map(|c| format!("{}={}/{}", c.category.as_str(), c.conformant, c.match_count))
            .collect::<Vec<_>>()
            .join(" ")
    );
    report
}

/// Year-first dates must name a real day
fn is_calendar_date(text: &str) -> bool {
    let parts: Vec<u32> = text
        .split(|c: char| !c.is_ascii_digit())
        .filter(|p| !p.is_empty())
        .filter_map(|p| p.parse().ok())
        .collect();
    match parts.as_slice() {
        [year, month, day] if *year >= 1000 => {
            NaiveDate::from_ymd_opt(*year as i32, *month, *day).is_some()
        }
        _ => true,
    }
}
