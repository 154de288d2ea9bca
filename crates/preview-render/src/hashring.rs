//! A Ketama-style consistent hash ring over `md5`, standing in for the
//! `github.com/ngerakines/ketama` dependency used by the original downloader
//! and uploader to pick a tram host or S3 bucket endpoint for a given key.
//! No Rust Ketama crate exists in the retrieved corpus, so this reimplements
//! the same virtual-node scheme directly on top of `md5`, already a
//! dependency.

use std::collections::BTreeMap;

/// Virtual nodes placed per real node, matching the original's
/// `ketama.NewRing(180)`.
const VNODES_PER_NODE: u32 = 180;

/// A consistent hash ring mapping arbitrary keys onto a fixed set of nodes
/// (tram hosts, S3-compatible endpoints, …). Construction is a one-time
/// "bake" step; lookups never mutate the ring.
pub struct HashRing {
    /// Sorted by ring position for `BTreeMap::range` lookups.
    points: BTreeMap<u32, String>,
}

impl HashRing {
    /// Build a ring over `nodes`, each placed at `VNODES_PER_NODE` points.
    /// Returns `None` if `nodes` is empty — callers should treat that as
    /// "tram disabled" / "no endpoints configured" rather than panicking.
    pub fn new(nodes: &[String]) -> Option<Self> {
        if nodes.is_empty() {
            return None;
        }
        let mut points = BTreeMap::new();
        for node in nodes {
            for vnode in 0..VNODES_PER_NODE {
                let digest = md5::compute(format!("{node}-{vnode}"));
                let point = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
                points.insert(point, node.clone());
            }
        }
        Some(Self { points })
    }

    /// The node responsible for `key`, walking clockwise from `key`'s point
    /// and wrapping around to the first entry if none is found past it.
    pub fn hash(&self, key: &str) -> &str {
        let digest = md5::compute(key);
        let point = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        self.points
            .range(point..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, node)| node.as_str())
            .expect("ring is never empty once constructed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_node_list_yields_no_ring() {
        assert!(HashRing::new(&[]).is_none());
    }

    #[test]
    fn same_key_always_maps_to_the_same_node() {
        let ring = HashRing::new(&["a".into(), "b".into(), "c".into()]).unwrap();
        let first = ring.hash("some-source-asset-id").to_string();
        for _ in 0..10 {
            assert_eq!(ring.hash("some-source-asset-id"), first);
        }
    }

    #[test]
    fn distributes_across_all_nodes_for_varied_keys() {
        let nodes = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let ring = HashRing::new(&nodes).unwrap();
        let mut seen = std::collections::HashSet::new();
        for i in 0..200 {
            seen.insert(ring.hash(&format!("key-{i}")).to_string());
        }
        assert_eq!(seen.len(), 3);
    }
}
