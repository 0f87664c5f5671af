// FormatSelector - deterministic variant selection
//
// Rule, in order:
// 1. "best" → highest rank
// 2. exact quality match
// 3. highest rank strictly below the target, else the lowest rank above it
//
// Qualities are unique within a variant set and ranks are total, so two
// candidates can never tie.

use std::fmt;

use super::errors::DownloadError;
use super::models::{Quality, QualityTarget, StreamVariant};

/// Which way the selector moved when the exact quality was missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    Lower,
    Higher,
}

/// Chosen variant plus how it was chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection<'a> {
    pub variant: &'a StreamVariant,
    pub requested: QualityTarget,
    pub fallback: Option<Fallback>,
}

impl Selection<'_> {
    /// User-facing explanation when the requested quality was not available
    pub fn notice(&self) -> Option<String> {
        let fallback = self.fallback?;
        let direction = match fallback {
            Fallback::Lower => "closest lower",
            Fallback::Higher => "closest higher; nothing lower exists",
        };
        Some(format!(
            "{} not available, using {} ({})",
            self.requested, self.variant.quality, direction
        ))
    }
}

impl fmt::Display for Selection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.notice() {
            Some(notice) => f.write_str(&notice),
            None => write!(f, "{}", self.variant.quality),
        }
    }
}

/// Format selector with deterministic fallback
pub struct FormatSelector;

impl FormatSelector {
    /// Pick the variant for `target`. An empty set is a caller bug.
    pub fn select<'a>(
        variants: &'a [StreamVariant],
        target: &QualityTarget,
    ) -> Result<Selection<'a>, DownloadError> {
        if variants.is_empty() {
            return Err(DownloadError::InvariantViolation(
                "variant selection called with an empty variant set".to_string(),
            ));
        }

        let (variant, fallback) = match target {
            QualityTarget::Best => (Self::highest(variants), None),
            QualityTarget::Exact(wanted) => Self::closest(variants, *wanted),
        };

        Ok(Selection {
            variant,
            requested: *target,
            fallback,
        })
    }

    fn highest(variants: &[StreamVariant]) -> &StreamVariant {
        // Non-empty is checked by the caller
        variants
            .iter()
            .max_by_key(|v| v.rank())
            .unwrap_or(&variants[0])
    }

    fn closest(variants: &[StreamVariant], wanted: Quality) -> (&StreamVariant, Option<Fallback>) {
        if let Some(exact) = variants.iter().find(|v| v.quality == wanted) {
            return (exact, None);
        }

        let lower = variants
            .iter()
            .filter(|v| v.rank() < wanted.rank())
            .max_by_key(|v| v.rank());
        if let Some(lower) = lower {
            return (lower, Some(Fallback::Lower));
        }

        let higher = variants
            .iter()
            .min_by_key(|v| v.rank())
            .unwrap_or(&variants[0]);
        (higher, Some(Fallback::Higher))
    }

    /// Labels of a variant set, best first, for log lines
    pub fn describe(variants: &[StreamVariant]) -> String {
        let mut qualities: Vec<Quality> = variants.iter().map(|v| v.quality).collect();
        qualities.sort_unstable_by(|a, b| b.cmp(a));
        qualities
            .iter()
            .map(|q| q.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
