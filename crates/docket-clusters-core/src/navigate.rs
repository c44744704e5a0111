//! Read-only queries over an already-built hierarchy.

use serde::Serialize;

use crate::hierarchy::HierarchyNode;
use crate::models::DocId;

/// Cutoffs closer than this are the same level.
pub const CUTOFF_EPSILON: f64 = 1e-9;

/// One level of a document's cluster chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TraceEntry {
    pub cutoff: f64,
    /// Name of the node containing the document at this cutoff.
    pub cluster: DocId,
    pub size: usize,
}

fn same_cutoff(a: f64, b: f64) -> bool {
    (a - b).abs() < CUTOFF_EPSILON
}

/// The node at exactly `cutoff` whose members include `doc`.
///
/// Depth-first; a branch is only descended while its cutoff is below the
/// requested one. `None` means the document does not cluster at that level.
pub fn find_node(nodes: &[HierarchyNode], doc: DocId, cutoff: f64) -> Option<&HierarchyNode> {
    for node in nodes {
        if !node.contains(doc) {
            continue;
        }
        if same_cutoff(node.cutoff(), cutoff) {
            return Some(node);
        }
        if node.cutoff() < cutoff {
            if let Some(found) = find_node(node.children(), doc, cutoff) {
                return Some(found);
            }
        }
    }
    None
}

/// Every level at which `doc` clusters, loosest first.
///
/// Cutoffs are strictly increasing and sizes never increase along the
/// chain, because each node's members contain its children's.
pub fn trace_doc(nodes: &[HierarchyNode], doc: DocId) -> Vec<TraceEntry> {
    let mut out = Vec::new();
    let mut level = nodes;
    while let Some(node) = level.iter().find(|n| n.contains(doc)) {
        out.push(TraceEntry {
            cutoff: node.cutoff(),
            cluster: node.name(),
            size: node.size(),
        });
        level = node.children();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::hierarchy::{build_hierarchy, Hierarchy, HierarchyParams};
    use crate::testing::{worked_example, WorkedIds};
    use pretty_assertions::assert_eq;

    async fn worked_hierarchy() -> (Hierarchy, WorkedIds) {
        let (store, ids) = worked_example();
        let params = HierarchyParams::new(vec![0.5, 0.6, 0.7, 0.8, 0.9], 2);
        let h = build_hierarchy(&store, 1, &params, &CancelToken::new())
            .await
            .unwrap();
        (h, ids)
    }

    #[tokio::test]
    async fn test_find_node_at_each_level() {
        let (h, ids) = worked_hierarchy().await;

        let top = find_node(&h.nodes, ids.d, 0.5).unwrap();
        assert_eq!(top.size(), 4);

        let mid = find_node(&h.nodes, ids.c, 0.7).unwrap();
        assert_eq!(mid.size(), 3);
        assert_eq!(mid.cutoff(), 0.7);

        let tight = find_node(&h.nodes, ids.b, 0.9).unwrap();
        assert_eq!(tight.members().len(), 2);
    }

    #[tokio::test]
    async fn test_find_node_absent() {
        let (h, ids) = worked_hierarchy().await;
        assert!(find_node(&h.nodes, ids.d, 0.6).is_none());
        assert!(find_node(&h.nodes, ids.c, 0.9).is_none());
        // a cutoff that is not one of the levels
        assert!(find_node(&h.nodes, ids.a, 0.65).is_none());
        assert!(find_node(&h.nodes, 404, 0.5).is_none());
    }

    #[tokio::test]
    async fn test_trace_worked_example() {
        let (h, ids) = worked_hierarchy().await;
        let trace = trace_doc(&h.nodes, ids.c);
        let shape: Vec<(f64, usize)> = trace.iter().map(|t| (t.cutoff, t.size)).collect();
        assert_eq!(shape, vec![(0.5, 4), (0.6, 3), (0.7, 3), (0.8, 3)]);
        assert!(trace.iter().all(|t| t.cluster == ids.a));
    }

    #[tokio::test]
    async fn test_trace_monotonic_for_every_document() {
        let (h, ids) = worked_hierarchy().await;
        for doc in [ids.a, ids.b, ids.c, ids.d] {
            let trace = trace_doc(&h.nodes, doc);
            assert!(!trace.is_empty());
            for pair in trace.windows(2) {
                assert!(pair[1].cutoff > pair[0].cutoff);
                assert!(pair[1].size <= pair[0].size);
            }
        }
        assert!(trace_doc(&h.nodes, 404).is_empty());
    }

    #[tokio::test]
    async fn test_trace_agrees_with_find_node() {
        let (h, ids) = worked_hierarchy().await;
        for entry in trace_doc(&h.nodes, ids.b) {
            let node = find_node(&h.nodes, ids.b, entry.cutoff).unwrap();
            assert_eq!(node.name(), entry.cluster);
            assert_eq!(node.size(), entry.size);
        }
    }
}
