//! Candidate normalization.
//!
//! Turns raw extractor output into uniform [`MemoryCandidate`] values.
//! Nothing here fails: malformed items are dropped and counted, out-of-range
//! confidences are clamped, unknown categories become `context`.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::types::{CandidateId, MemoryCandidate, MemoryCategory, RawExtraction, RawMemory};

/// Prefixes that extraction models like to prepend to statements.
const EXTRACTION_PREFIXES: &[&str] = &[
    "Remember:",
    "User preference:",
    "User likes:",
    "User dislikes:",
    "Important:",
    "Note:",
    "Memory:",
];

/// Default maximum length (in chars) of a stored source excerpt.
pub const DEFAULT_EXCERPT_LIMIT: usize = 500;

/// Counters describing what normalization had to repair or drop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NormalizationReport {
    /// Raw items seen across all extractions.
    pub raw_count: usize,
    /// Items dropped for empty text or unusable confidence.
    pub malformed: usize,
    /// Items whose confidence was clamped into [0, 1].
    pub clamped: usize,
    /// Items whose category label was unknown and became `context`.
    pub coerced: usize,
}

/// Output of [`Normalizer::normalize`].
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub candidates: Vec<MemoryCandidate>,
    pub report: NormalizationReport,
}

/// Converts raw extractions into candidates with provenance.
#[derive(Debug, Clone)]
pub struct Normalizer {
    excerpt_limit: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            excerpt_limit: DEFAULT_EXCERPT_LIMIT,
        }
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum excerpt length kept on each candidate.
    pub fn with_excerpt_limit(mut self, limit: usize) -> Self {
        self.excerpt_limit = limit;
        self
    }

    /// Normalize a set of raw extractions.
    ///
    /// Output order is `(conversation_id, chunk_index, appearance order)`
    /// regardless of the order extractions arrive in. Extractions sharing a
    /// conversation and chunk are ordered by their content, so ordinals do
    /// not depend on arrival order either.
    pub fn normalize(&self, mut raw: Vec<RawExtraction>) -> NormalizedBatch {
        raw.sort_by_cached_key(|e| {
            (
                e.conversation_id.clone(),
                e.chunk_index,
                e.excerpt.clone(),
                serde_json::to_string(&e.memories).unwrap_or_default(),
            )
        });

        let mut batch = NormalizedBatch::default();
        let mut ordinals: HashMap<(String, usize), usize> = HashMap::new();

        for extraction in &raw {
            let excerpt = extraction
                .excerpt
                .as_deref()
                .map(|e| truncate_chars(e.trim(), self.excerpt_limit))
                .filter(|e| !e.is_empty());

            for item in &extraction.memories {
                batch.report.raw_count += 1;

                let ordinal = ordinals
                    .entry((extraction.conversation_id.clone(), extraction.chunk_index))
                    .or_insert(0);
                let id = CandidateId::new(&extraction.conversation_id, extraction.chunk_index, *ordinal);
                *ordinal += 1;

                match self.normalize_item(item, &id, &mut batch.report) {
                    Some((text, category, confidence)) => {
                        let source_excerpt = excerpt.clone().or_else(|| {
                            item.reasoning
                                .as_deref()
                                .map(|r| truncate_chars(r.trim(), self.excerpt_limit))
                                .filter(|r| !r.is_empty())
                        });
                        batch.candidates.push(MemoryCandidate {
                            id,
                            text,
                            category,
                            confidence,
                            source_conversation_id: extraction.conversation_id.clone(),
                            chunk_index: extraction.chunk_index,
                            source_excerpt,
                            created_at: extraction.created_at,
                        });
                    }
                    None => batch.report.malformed += 1,
                }
            }
        }

        info!(
            "Normalized {} raw memories into {} candidates ({} malformed, {} clamped, {} coerced)",
            batch.report.raw_count,
            batch.candidates.len(),
            batch.report.malformed,
            batch.report.clamped,
            batch.report.coerced
        );
        batch
    }

    fn normalize_item(
        &self,
        item: &RawMemory,
        id: &CandidateId,
        report: &mut NormalizationReport,
    ) -> Option<(String, MemoryCategory, f64)> {
        let text = clean_text(item.content.as_deref().unwrap_or_default());
        if text.is_empty() {
            debug!("Dropping {}: empty text", id);
            return None;
        }

        let Some(raw_confidence) = item.confidence.as_ref().and_then(parse_confidence) else {
            debug!("Dropping {}: missing or unparseable confidence {:?}", id, item.confidence);
            return None;
        };
        let confidence = raw_confidence.clamp(0.0, 1.0);
        if confidence != raw_confidence {
            debug!("Clamped confidence of {} from {} to {}", id, raw_confidence, confidence);
            report.clamped += 1;
        }

        let label = item.category.as_deref().unwrap_or_default();
        let category = match label.parse::<MemoryCategory>() {
            Ok(category) => category,
            Err(_) => {
                warn!("Unknown category {:?} on {}, using context", label, id);
                report.coerced += 1;
                MemoryCategory::Context
            }
        };

        Some((text, category, confidence))
    }
}

/// Clean a statement for storage: collapse whitespace, drop surrounding
/// quotes and extraction prefixes, capitalize the first letter.
pub fn clean_text(content: &str) -> String {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut text = collapsed.trim_matches(|c| c == '"' || c == '\'').trim();

    for prefix in EXTRACTION_PREFIXES {
        if let Some(head) = text.get(..prefix.len()) {
            if head.eq_ignore_ascii_case(prefix) {
                text = text[prefix.len()..].trim_start();
            }
        }
    }

    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_lowercase() => first.to_uppercase().chain(chars).collect(),
        Some(_) => text.to_string(),
        None => String::new(),
    }
}

/// Read a confidence value. Accepts numbers, numeric strings and
/// percentages (`"85%"`). Non-finite values are rejected.
pub fn parse_confidence(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(pct) => pct.trim().parse::<f64>().ok().map(|v| v / 100.0),
                None => s.parse::<f64>().ok(),
            }
        }
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
