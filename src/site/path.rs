//! Request path → artifact path
//!
//! Only plain relative segments survive normalization, so a resolved page
//! can never point outside the build directory.

use std::path::{Path, PathBuf};

use crate::compiler::{OUTPUT_EXTENSION, RESERVED_NAMES, ROOT_DOCUMENT};

/// A request path that names a page in the build tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePath {
    /// `/`-separated path relative to the build root, without extension
    relative: String,
}

impl PagePath {
    /// Normalize a raw (percent-encoded) request path.
    ///
    /// `/` maps to the root document. Empty and `.` segments are dropped;
    /// `..`, backslashes, NUL bytes and reserved top-level names are rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let decoded = urlencoding::decode(raw).ok()?;
        if decoded.contains('\\') || decoded.contains('\0') {
            return None;
        }

        let mut segments = Vec::new();
        for segment in decoded.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return None,
                s => segments.push(s),
            }
        }

        match segments.first() {
            None => {
                return Some(Self {
                    relative: ROOT_DOCUMENT.to_string(),
                })
            }
            Some(first) if RESERVED_NAMES.contains(first) => return None,
            Some(_) => {}
        }

        Some(Self {
            relative: segments.join("/"),
        })
    }

    /// Page key used by analytics, e.g. `/index` or `/docs/intro`
    pub fn analytics_key(&self) -> String {
        format!("/{}", self.relative)
    }

    /// Location of the compiled artifact under `build_root`
    pub fn artifact(&self, build_root: &Path) -> PathBuf {
        let mut path = build_root.to_path_buf();
        for segment in self.relative.split('/') {
            path.push(segment);
        }
        let file_name = format!(
            "{}.{}",
            path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
            OUTPUT_EXTENSION
        );
        path.set_file_name(file_name);
        path
    }
}
