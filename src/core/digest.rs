//! SG-011: BLAKE3 fingerprints of rendered templates.

use super::codegen;
use super::error::TemplateError;
use super::types::Template;

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Fingerprint of the template's canonical JSON rendering. Two templates
/// with the same fingerprint serialize to the same bytes.
pub fn fingerprint(template: &Template) -> Result<String, TemplateError> {
    Ok(hash_string(&codegen::to_json(template)?))
}
