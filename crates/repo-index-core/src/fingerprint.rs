//! Content fingerprints for change detection.
//!
//! A pull request is re-embedded only when its fingerprint changes. The
//! fingerprint covers the title, body, and changed file paths in the order
//! the data source returned them; path order is significant.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of `title + "\n\n" + body + "\n\n" + paths.join("\n")`.
pub fn fingerprint<S: AsRef<str>>(title: &str, body: &str, file_paths: &[S]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n\n");
    hasher.update(body.as_bytes());
    hasher.update(b"\n\n");
    for (i, path) in file_paths.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(path.as_ref().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
