//! Shared fixtures for unit tests.

use crate::models::{Corpus, CorpusMethod, DocId, DocumentMetadata};
use crate::store::memory::InMemoryStore;

#[derive(Debug, Clone, Copy)]
pub struct WorkedIds {
    pub a: DocId,
    pub b: DocId,
    pub c: DocId,
    pub d: DocId,
}

/// Corpus 1 with documents A..D and edges
/// A–B 0.95, A–C 0.82, B–C 0.60, C–D 0.55.
pub fn worked_example() -> (InMemoryStore, WorkedIds) {
    let ids = WorkedIds { a: 1, b: 2, c: 3, d: 4 };
    let store = InMemoryStore::new();
    store
        .insert_corpus(Corpus {
            id: 1,
            docket_id: "EPA-HQ-OAR-2009-0234".into(),
            method: CorpusMethod::FourGram,
            metadata: serde_json::json!({ "parser": "4-gram" }),
        })
        .unwrap();
    for (id, name) in [(ids.a, "A"), (ids.b, "B"), (ids.c, "C"), (ids.d, "D")] {
        store
            .insert_document(
                1,
                DocumentMetadata {
                    id,
                    title: Some(format!("Comment {}", name)),
                    submitter_name: Some(format!("Submitter {}", name)),
                    submitter_organization: None,
                },
                &format!("Comment text from {}.", name),
            )
            .unwrap();
    }
    store.insert_edge(1, ids.a, ids.b, 0.95).unwrap();
    store.insert_edge(1, ids.a, ids.c, 0.82).unwrap();
    store.insert_edge(1, ids.b, ids.c, 0.60).unwrap();
    store.insert_edge(1, ids.c, ids.d, 0.55).unwrap();
    (store, ids)
}
