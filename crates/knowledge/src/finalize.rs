//! Answer finalization.

/// Truncate a generated answer after its last period.
///
/// Text without a period is returned unchanged. Applying this twice gives
/// the same result as applying it once.
pub fn finalize_answer(raw: &str) -> String {
    match raw.rfind('.') {
        Some(pos) => raw[..=pos].to_string(),
        None => raw.to_string(),
    }
}
