use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Files that make up a deployable copy of the front end.
pub const DEFAULT_EXPORT_FILES: [&str; 7] = [
    "index.html",
    "styles.css",
    "script.js",
    "config.js",
    "config.sample.js",
    "google_apps_script.gs",
    "README.md",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    #[error("refusing to export into '{0}': it contains the source directory")]
    UnsafeOutput(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub out_dir: PathBuf,
    pub copied: Vec<String>,
    pub skipped: Vec<String>,
}

/// Recreates `out_dir` and copies `files` from `root` into it. Missing
/// files are skipped with a warning.
pub fn export_static(root: &Path, out_dir: &Path, files: &[&str]) -> Result<ExportReport, ExportError> {
    guard_output(root, out_dir)?;

    if out_dir.exists() {
        fs::remove_dir_all(out_dir).map_err(io_error("failed to clear", out_dir))?;
    }
    fs::create_dir_all(out_dir).map_err(io_error("failed to create", out_dir))?;

    let mut report = ExportReport {
        out_dir: out_dir.to_path_buf(),
        copied: Vec::new(),
        skipped: Vec::new(),
    };
    for file in files {
        let source = root.join(file);
        if !source.is_file() {
            tracing::warn!(file = %file, "skipping missing file");
            report.skipped.push(file.to_string());
            continue;
        }
        let target = out_dir.join(file);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_error("failed to create", parent))?;
        }
        fs::copy(&source, &target).map_err(io_error("failed to copy", &source))?;
        tracing::debug!(file = %file, "copied");
        report.copied.push(file.to_string());
    }
    Ok(report)
}

fn guard_output(root: &Path, out_dir: &Path) -> Result<(), ExportError> {
    let Ok(out_dir) = out_dir.canonicalize() else {
        return Ok(());
    };
    let root = root
        .canonicalize()
        .map_err(io_error("failed to resolve", root))?;
    if root.starts_with(&out_dir) {
        return Err(ExportError::UnsafeOutput(out_dir));
    }
    Ok(())
}

fn io_error<'a>(
    action: &'static str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> ExportError + 'a {
    move |source| ExportError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}
