//! Vector object codec: JSON, then gzip.
//!
//! [`encode`] and [`decode`] are inverses. [`decode`] also checks the
//! structural invariants a well-formed object must hold (map keys equal
//! item ids, one vector length across the store, finite components), so a
//! blob that
//! decompresses and parses but is inconsistent is still reported as
//! corrupt.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::CodecError;
use crate::models::VectorObject;

/// Content type recorded alongside the encoded blob.
pub const CONTENT_TYPE: &str = "application/gzip";

/// Serialize and gzip a vector object.
///
/// Objects that [`decode`] would reject are refused here too.
pub fn encode(object: &VectorObject) -> Result<Vec<u8>, CodecError> {
    validate(object)?;
    let json = serde_json::to_vec(object)?;
    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 4), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Gunzip and deserialize a vector object.
pub fn decode(bytes: &[u8]) -> Result<VectorObject, CodecError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;
    let object: VectorObject = serde_json::from_slice(&json)?;
    validate(&object)?;
    Ok(object)
}

fn validate(object: &VectorObject) -> Result<(), CodecError> {
    for (key, issue) in &object.issues {
        if key != &issue.id {
            return Err(CodecError::Invalid(format!(
                "issue entry '{}' has id '{}'",
                key, issue.id
            )));
        }
    }
    for (key, pr) in &object.pull_requests {
        if key != &pr.id {
            return Err(CodecError::Invalid(format!(
                "pull request entry '{}' has id '{}'",
                key, pr.id
            )));
        }
    }

    if let Some(dims) = object.dims() {
        let mismatched = object
            .issues
            .values()
            .map(|i| (&i.id, i.vector.len()))
            .chain(object.pull_requests.values().map(|p| (&p.id, p.vector.len())))
            .find(|(_, len)| *len != dims);
        if let Some((id, len)) = mismatched {
            return Err(CodecError::Invalid(format!(
                "entry '{}' has {} dimensions, expected {}",
                id, len, dims
            )));
        }
    }

    let non_finite = object
        .issues
        .values()
        .map(|i| (&i.id, &i.vector))
        .chain(object.pull_requests.values().map(|p| (&p.id, &p.vector)))
        .find(|(_, v)| v.iter().any(|x| !x.is_finite()));
    if let Some((id, _)) = non_finite {
        return Err(CodecError::Invalid(format!(
            "entry '{}' has a non-finite component",
            id
        )));
    }

    Ok(())
}
