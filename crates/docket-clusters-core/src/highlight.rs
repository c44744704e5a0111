//! Phrase-overlap highlighting of one document against its cluster.
//!
//! Every character of the document gets the largest cluster-wide count of
//! any phrase occurrence covering it (overlaps take the dominant count, they
//! do not add up). Equal neighbouring values collapse into runs, and each
//! run's intensity is its count normalised by [`Normalization`].
//!
//! Offsets are character offsets, not byte offsets. Intensities are exact;
//! rounding for display belongs to the renderer.

use serde::{Deserialize, Serialize};

use crate::models::{DocId, PhraseOccurrence};

/// How run counts are scaled to intensities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// `count / cluster_size`: 1.0 means every cluster member shares the text.
    ClusterSize(usize),
    /// `count / max count in this document`: the strongest run is 1.0.
    MaxFrequency,
}

/// A maximal stretch of text sharing one overlap count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighlightRun {
    pub frequency: usize,
    pub intensity: f64,
    pub text: String,
}

/// Highlight `text` (the analysed text of `document_id`) using the phrases
/// mined for its cluster.
///
/// Occurrences in other documents are ignored; ranges are clamped to the
/// text and empty ranges skipped. Empty or phrase-free text yields exactly
/// one run with intensity 0.
pub fn highlight(
    text: &str,
    phrases: &[PhraseOccurrence],
    document_id: DocId,
    normalization: Normalization,
) -> Vec<HighlightRun> {
    let chars: Vec<char> = text.chars().collect();
    let mut frequencies = vec![0usize; chars.len()];

    for phrase in phrases {
        for occ in phrase.occurrences.iter().filter(|o| o.document_id == document_id) {
            let end = occ.end.min(chars.len());
            if occ.start >= end {
                continue;
            }
            for f in &mut frequencies[occ.start..end] {
                *f = (*f).max(phrase.count);
            }
        }
    }

    let divisor = match normalization {
        Normalization::ClusterSize(size) => size,
        Normalization::MaxFrequency => frequencies.iter().copied().max().unwrap_or(0),
    } as f64;
    let intensity = |frequency: usize| {
        if frequency == 0 || divisor == 0.0 {
            0.0
        } else {
            frequency as f64 / divisor
        }
    };

    let mut runs: Vec<HighlightRun> = Vec::new();
    let mut start = 0;
    for i in 1..=chars.len() {
        if i == chars.len() || frequencies[i] != frequencies[start] {
            let frequency = frequencies[start];
            runs.push(HighlightRun {
                frequency,
                intensity: intensity(frequency),
                text: chars[start..i].iter().collect(),
            });
            start = i;
        }
    }

    if runs.is_empty() {
        runs.push(HighlightRun {
            frequency: 0,
            intensity: 0.0,
            text: String::new(),
        });
    }
    runs
}
