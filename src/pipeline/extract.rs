//! Strip content-type fencing from oracle output.

use crate::errors::AttemptFailure;

const FENCE: &str = "```";

/// Fence labels accepted as equivalent, grouped by the canonical tag.
const ALIASES: [&[&str]; 4] = [
    &["protobuf", "proto", "proto3"],
    &["go", "golang"],
    &["dockerfile", "docker"],
    &["bash", "sh", "shell"],
];

/// Whether a fence labelled `label` is acceptable for a stage tagged `tag`.
fn label_matches(label: &str, tag: &str) -> bool {
    if label.eq_ignore_ascii_case(tag) {
        return true;
    }
    ALIASES.iter().any(|group| {
        group.iter().any(|a| a.eq_ignore_ascii_case(tag))
            && group.iter().any(|a| a.eq_ignore_ascii_case(label))
    })
}

/// Extract the code body from a completion for a stage whose fence tag is
/// `tag`.
///
/// The request prompt already opens the fence and generation stops at the
/// closing one, so the common case is bare code. A completion that repeats
/// the opening fence is unwrapped when its label matches `tag`, one of its
/// common aliases, or is empty. Anything after a closing fence is dropped.
pub fn extract_code(raw: &str, tag: &str) -> Result<String, AttemptFailure> {
    let mut body = raw.trim();

    if let Some(rest) = body.strip_prefix(FENCE) {
        let (label, after) = match rest.split_once('\n') {
            Some((label, after)) => (label.trim(), after),
            None => (rest.trim(), ""),
        };
        if !label.is_empty() && !label_matches(label, tag) {
            return Err(AttemptFailure::ForeignFence {
                expected: tag.to_string(),
                found: label.to_string(),
            });
        }
        body = after;
    }

    if let Some(end) = body.find(FENCE) {
        body = &body[..end];
    }

    let body = body.trim();
    if body.is_empty() {
        return Err(AttemptFailure::EmptyOutput);
    }
    Ok(format!("{}\n", body))
}
