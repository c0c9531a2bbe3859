//! Fastlink preprocessing
//!
//! Rewrites the `(target)[label]` shorthand into a standard Markdown link
//! rooted at the site: `[label](/target)`.

use regex::bytes::{Captures, Regex};
use std::sync::LazyLock;

/// `target` has no whitespace or `)`, `label` has no `]`; both non-empty.
static FASTLINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(([^)\s]+)\)\[([^\]]+)\]").expect("fastlink pattern is valid")
});

/// Rewrite every fastlink in `raw`. Text that does not fully match is kept verbatim.
///
/// The output form `[label](/target)` never matches the shorthand, so running
/// this again on its own output is a no-op.
pub fn preprocess(raw: &[u8]) -> Vec<u8> {
    FASTLINK
        .replace_all(raw, |caps: &Captures<'_>| {
            let target = &caps[1];
            let label = &caps[2];
            let mut link = Vec::with_capacity(target.len() + label.len() + 5);
            link.push(b'[');
            link.extend_from_slice(label);
            link.extend_from_slice(b"](/");
            link.extend_from_slice(target);
            link.push(b')');
            link
        })
        .into_owned()
}
