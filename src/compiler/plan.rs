//! Source namespace → output namespace mapping.
//!
//! Kept independent of the directory walk so it can be exercised against a
//! virtual file listing.

use std::path::{Component, Path, PathBuf};

pub const DOCUMENT_EXTENSION: &str = "gmd";
pub const OUTPUT_EXTENSION: &str = "html";

/// A single document to compile, both sides relative to their roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileTarget {
    pub source: PathBuf,
    pub artifact: PathBuf,
}

/// Map a source-relative path to its artifact-relative path.
///
/// Returns `None` for anything that is not a document, and for paths that
/// would escape the output root.
pub fn artifact_path(relative: &Path) -> Option<PathBuf> {
    if relative.extension()? != DOCUMENT_EXTENSION {
        return None;
    }
    if relative.file_stem().map_or(true, |stem| stem.is_empty()) {
        return None;
    }
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }
    Some(relative.with_extension(OUTPUT_EXTENSION))
}

/// Build compile targets for every document in a listing of relative file paths.
pub fn plan<I, P>(relative_files: I) -> Vec<CompileTarget>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    relative_files
        .into_iter()
        .filter_map(|p| {
            let source = p.as_ref();
            artifact_path(source).map(|artifact| CompileTarget {
                source: source.to_path_buf(),
                artifact,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_path_rewrites_extension() {
        assert_eq!(
            artifact_path(Path::new("index.gmd")),
            Some(PathBuf::from("index.html"))
        );
        assert_eq!(
            artifact_path(Path::new("docs/guide/setup.gmd")),
            Some(PathBuf::from("docs/guide/setup.html"))
        );
    }

    #[test]
    fn test_artifact_path_keeps_inner_dots() {
        assert_eq!(
            artifact_path(Path::new("notes/v1.2.gmd")),
            Some(PathBuf::from("notes/v1.2.html"))
        );
    }

    #[test]
    fn test_non_documents_are_skipped() {
        assert_eq!(artifact_path(Path::new("logo.png")), None);
        assert_eq!(artifact_path(Path::new("README")), None);
        assert_eq!(artifact_path(Path::new("page.gmd.bak")), None);
        assert_eq!(artifact_path(Path::new("page.GMD")), None);
        assert_eq!(artifact_path(Path::new(".gmd")), None);
    }

    #[test]
    fn test_escaping_paths_are_rejected() {
        assert_eq!(artifact_path(Path::new("../outside.gmd")), None);
        assert_eq!(artifact_path(Path::new("/abs/page.gmd")), None);
    }

    #[test]
    fn test_plan_over_virtual_listing() {
        let listing = [
            "index.gmd",
            "about.gmd",
            "img/photo.jpg",
            "blog/2024/post.gmd",
            "blog/draft.txt",
        ];
        let targets = plan(listing);
        let artifacts: Vec<_> = targets.iter().map(|t| t.artifact.clone()).collect();
        assert_eq!(
            artifacts,
            vec![
                PathBuf::from("index.html"),
                PathBuf::from("about.html"),
                PathBuf::from("blog/2024/post.html"),
            ]
        );
        assert_eq!(targets[2].source, PathBuf::from("blog/2024/post.gmd"));
    }
}
