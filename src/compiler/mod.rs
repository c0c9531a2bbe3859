//! Source tree → HTML build tree
//!
//! A compile is all-or-nothing: the first filesystem error aborts it and is
//! returned to the caller, which is expected to refuse to serve.

pub mod fastlink;
pub mod plan;
pub mod render;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

pub use fastlink::preprocess;
pub use plan::{artifact_path, plan, CompileTarget, DOCUMENT_EXTENSION, OUTPUT_EXTENSION};
pub use render::{MarkdownRenderer, Renderer};

/// Name of the document served at `/`, without extension
pub const ROOT_DOCUMENT: &str = "index";

/// Top-level names the router keeps for non-document traffic
pub const RESERVED_NAMES: &[&str] = &["assets", "analytics"];

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("source directory {0} does not exist or is not a directory")]
    MissingSourceRoot(PathBuf),
    #[error("index.gmd not found in {0}; please create it")]
    MissingRootDocument(PathBuf),
    #[error("do not create an '{name}' directory inside {root}; the '/{name}' path is reserved")]
    ReservedDirectory { root: PathBuf, name: &'static str },
    #[error("build directory {build} must not be the source directory or contain it ({source_root})")]
    BuildRootOverlap { build: PathBuf, source_root: PathBuf },
    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to clear build directory {path}: {source}")]
    Clean { path: PathBuf, source: io::Error },
}

/// Outcome of a successful compile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileReport {
    pub documents: usize,
    pub skipped: usize,
}

/// Check the structural preconditions of a source tree.
pub fn check_source_tree(source_root: &Path) -> Result<(), CompileError> {
    if !source_root.is_dir() {
        return Err(CompileError::MissingSourceRoot(source_root.to_path_buf()));
    }

    let root_document = source_root.join(format!("{ROOT_DOCUMENT}.{DOCUMENT_EXTENSION}"));
    if !root_document.is_file() {
        return Err(CompileError::MissingRootDocument(source_root.to_path_buf()));
    }

    for &name in RESERVED_NAMES {
        if source_root.join(name).is_dir() {
            return Err(CompileError::ReservedDirectory {
                root: source_root.to_path_buf(),
                name,
            });
        }
    }

    Ok(())
}

/// Refuse a build root that is, or contains, the source root.
pub fn check_build_root(source_root: &Path, build_root: &Path) -> Result<(), CompileError> {
    let source = absolute(source_root);
    let build = absolute(build_root);
    if source.starts_with(&build) {
        return Err(CompileError::BuildRootOverlap {
            build: build_root.to_path_buf(),
            source_root: source_root.to_path_buf(),
        });
    }
    Ok(())
}

fn absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Compile every document under `source_root` into `build_root`.
///
/// The build root is emptied first so no artifact outlives its source.
pub fn compile(
    source_root: &Path,
    build_root: &Path,
    renderer: &dyn Renderer,
) -> Result<CompileReport, CompileError> {
    check_source_tree(source_root)?;
    check_build_root(source_root, build_root)?;

    remove_build_root(build_root)?;
    fs::create_dir_all(build_root).map_err(|source| CompileError::CreateDir {
        path: build_root.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    // Symlinked documents compile like regular ones; link cycles surface as walk errors
    for entry in WalkDir::new(source_root).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        // WalkDir yields paths prefixed by the root it was given
        if let Ok(relative) = entry.path().strip_prefix(source_root) {
            files.push(relative.to_path_buf());
        }
    }

    let targets = plan(&files);
    let report = CompileReport {
        documents: targets.len(),
        skipped: files.len() - targets.len(),
    };

    for target in &targets {
        compile_document(source_root, build_root, target, renderer)?;
    }

    info!(
        documents = report.documents,
        skipped = report.skipped,
        "Compiled {} into {}",
        source_root.display(),
        build_root.display()
    );
    Ok(report)
}

fn compile_document(
    source_root: &Path,
    build_root: &Path,
    target: &CompileTarget,
    renderer: &dyn Renderer,
) -> Result<(), CompileError> {
    let source_path = source_root.join(&target.source);
    let output_path = build_root.join(&target.artifact);

    let raw = fs::read(&source_path).map_err(|source| CompileError::Read {
        path: source_path.clone(),
        source,
    })?;
    let html = renderer.render(&preprocess(&raw));

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).map_err(|source| CompileError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(&output_path, html).map_err(|source| CompileError::Write {
        path: output_path.clone(),
        source,
    })?;

    debug!(source = %target.source.display(), artifact = %target.artifact.display(), "compiled document");
    Ok(())
}

/// Remove the build root. A missing directory is not an error.
///
/// Fails with [`CompileError::BuildRootOverlap`] instead of deleting anything
/// when the build root would take the sources with it.
pub fn clean(source_root: &Path, build_root: &Path) -> Result<(), CompileError> {
    check_build_root(source_root, build_root)?;
    remove_build_root(build_root)
}

fn remove_build_root(build_root: &Path) -> Result<(), CompileError> {
    match fs::remove_dir_all(build_root) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CompileError::Clean {
            path: build_root.to_path_buf(),
            source,
        }),
    }
}
