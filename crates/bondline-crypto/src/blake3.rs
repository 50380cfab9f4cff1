//! Domain-separated BLAKE3 hashing for snapshot trees.
//!
//! ```text
//! leaf  = BLAKE3(0x00 || data)
//! inner = BLAKE3_keyed(K, left || right)
//! K     = BLAKE3_derive_key("Bondline v1 merkle-inner-node", "")
//! ```
//!
//! Leaves are unkeyed and inner nodes keyed, so a 64-byte inner preimage
//! cannot be passed off as a leaf.

use std::sync::OnceLock;

use bondline_types::Hash;

/// Context string for the inner-node key.
pub const INNER_NODE_CONTEXT: &str = "Bondline v1 merkle-inner-node";

const LEAF_PREFIX: u8 = 0x00;

fn inner_node_key() -> &'static Hash {
    static KEY: OnceLock<Hash> = OnceLock::new();
    KEY.get_or_init(|| ::blake3::derive_key(INNER_NODE_CONTEXT, &[]))
}

/// Hash of a leaf's encoded data.
pub fn merkle_leaf(data: &[u8]) -> Hash {
    let mut hasher = ::blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash of an inner node. Order-sensitive; callers sort the pair.
pub fn merkle_inner(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = ::blake3::Hasher::new_keyed(inner_node_key());
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}
