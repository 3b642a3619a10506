//! DOM drift detection for cached selectors.
//!
//! On each cache hit the element's neighborhood is fingerprinted and
//! compared bitwise against the snapshot stored at admission time. A
//! Hamming ratio above the profile threshold means the page changed
//! underneath the selector: the entry is stale.

use crate::browser::ElementSnapshot;
use crate::profile::RuntimeProfile;
use sha2::{Digest, Sha256};

/// Fingerprint an element's attribute set and structural context.
///
/// Attributes are sorted so the hash is order-independent; the tag and
/// role anchor the structural part.
pub fn fingerprint(snapshot: &ElementSnapshot) -> String {
    let mut attrs: Vec<(&String, &String)> = snapshot.attributes.iter().collect();
    attrs.sort();

    let mut hasher = Sha256::new();
    hasher.update(snapshot.tag.as_bytes());
    hasher.update(b"|");
    if let Some(role) = &snapshot.role {
        hasher.update(role.as_bytes());
    }
    hasher.update(b"|");
    for (name, value) in attrs {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b";");
    }
    format!("{:x}", hasher.finalize())
}

/// Short prefix used in selector metadata.
pub fn fingerprint_prefix(snapshot: &ElementSnapshot) -> String {
    fingerprint(snapshot).chars().take(12).collect()
}

/// Bitwise Hamming distance ratio between two hex fingerprints.
///
/// Returns 1.0 for malformed or length-mismatched input, which reads as
/// maximal drift and safely invalidates.
pub fn hamming_ratio(a: &str, b: &str) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let mut differing = 0u32;
    let mut total = 0u32;
    for (ca, cb) in a.chars().zip(b.chars()) {
        let (va, vb) = match (ca.to_digit(16), cb.to_digit(16)) {
            (Some(va), Some(vb)) => (va, vb),
            _ => return 1.0,
        };
        differing += (va ^ vb).count_ones();
        total += 4;
    }
    differing as f64 / total as f64
}

/// Whether the current fingerprint has drifted past the profile threshold.
pub fn is_drifted(stored: &str, current: &str, profile: RuntimeProfile) -> bool {
    hamming_ratio(stored, current) > profile.drift_threshold()
}
