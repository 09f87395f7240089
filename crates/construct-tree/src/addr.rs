//! Stable node addresses.
//!
//! An address is a short printable identifier derived from the chain of ids
//! between the root and a node. Organizational `Default` wrapper nodes are
//! excluded from the digest so that introducing or removing such a grouping
//! level never changes the addresses underneath it.

use sha1::{Digest, Sha1};

/// Scheme marker prefixed to every address. Downstream tools key on it, so
/// it must stay bit-exact.
const SCHEME_PREFIX: &str = "c8";

/// Id value excluded from address computation (case-sensitive).
const HIDDEN_COMPONENT: &str = "Default";

/// Compute the address for a chain of ids from the root (inclusive, the root
/// contributing an empty component) down to a node.
///
/// Each non-hidden component is fed to SHA-1 followed by a `\n` delimiter
/// byte, which keeps component boundaries unambiguous. The result is the
/// scheme prefix plus 40 lowercase hex characters: 42 characters total.
pub(crate) fn address_of(components: &[String]) -> String {
    let mut hasher = Sha1::new();
    for component in components.iter().filter(|c| c.as_str() != HIDDEN_COMPONENT) {
        hasher.update(component.as_bytes());
        hasher.update(b"\n");
    }
    let hex: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("{SCHEME_PREFIX}{hex}")
}
