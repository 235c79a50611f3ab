//! Dedup keys: how the graph decides two candidates are the same entity.

use sha2::{Digest, Sha256};
use tracery_types::Node;

/// Lower-case and collapse runs of whitespace.
pub fn normalize_content(content: &str) -> String {
    content
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 hex digest of the normalized content.
pub fn dedup_key(content: &str) -> String {
    let digest = Sha256::digest(normalize_content(content).as_bytes());
    hex::encode(digest)
}

/// The dedup key a node should be stored under.
///
/// Session and File nodes have well-known ids and are keyed by them; every
/// other node is keyed by its content.
pub fn dedup_key_for(node: &Node) -> String {
    if node.node_type.is_auto_created() {
        node.id.clone()
    } else {
        dedup_key(&node.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracery_types::NodeType;

    #[test]
    fn test_normalization_ignores_case_and_spacing() {
        assert_eq!(
            dedup_key("Use a  60-day\nLookback"),
            dedup_key("use a 60-day lookback")
        );
        assert_ne!(dedup_key("use a 60-day lookback"), dedup_key("use a 90-day lookback"));
    }

    #[test]
    fn test_key_is_hex_sha256() {
        let key = dedup_key("x");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_structural_nodes_keyed_by_id() {
        let session = Node::session("S1");
        assert_eq!(dedup_key_for(&session), "session:S1");

        let file = Node::file("./src/risk.py");
        assert_eq!(dedup_key_for(&file), file.id);

        let insight = Node::new(NodeType::Insight, "caching helps");
        assert_eq!(dedup_key_for(&insight), dedup_key("caching helps"));
    }
}
