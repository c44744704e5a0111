//! Choosing a corpus when several cover the same docket.

use crate::models::Corpus;

/// The preferred corpus: best extraction method first (4-gram, sentence,
/// other), then lowest id.
pub fn select_corpus(corpora: Vec<Corpus>) -> Option<Corpus> {
    corpora
        .into_iter()
        .min_by_key(|c| (c.method.preference(), c.id))
}
