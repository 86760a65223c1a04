//! Content-addressed node identity

use sha2::{Digest, Sha256};

use crate::model::{Layer, NodeLabel};

/// Compute a node id from the canonical identity fields.
///
/// The hash input is order-defined: `key=value` lines sorted by field
/// name, UTF-8, newline-joined. The range is part of the identity only
/// for symbol nodes (classes, functions), which lets a file keep its id
/// while a function that moves gets a new one.
///
/// The id is the first 16 bytes of a SHA-256 digest, hex-encoded:
/// exactly 32 lowercase hex characters.
pub fn node_id(layer: Layer, label: NodeLabel, node_path: &str, range: Option<(u32, u32)>) -> String {
    // Sorted by field name: end_line, label, layer, node_path, start_line.
    let mut canonical = String::new();
    if let Some((_, end)) = range {
        canonical.push_str(&format!("end_line={end}\n"));
    }
    canonical.push_str(&format!("label={}\n", label.as_str()));
    canonical.push_str(&format!("layer={}\n", layer.as_str()));
    canonical.push_str(&format!("node_path={node_path}\n"));
    if let Some((start, _)) = range {
        canonical.push_str(&format!("start_line={start}\n"));
    }

    let digest = Sha256::digest(canonical.as_bytes());
    hex_lower(&digest[..16])
}

/// A node id is exactly 32 lowercase hex characters; everything else is
/// rejected by validators.
pub fn is_valid_node_id(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
