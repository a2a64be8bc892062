//! End-to-end build: compile → link → attach → publish.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use databook_shared::{BuildConfig, CanonicalName, DataBookError, Result};

use crate::assembler::{self, MERGED_FILE_NAME, scan_build_area};
use crate::compiler::{self, sha256_file};
use crate::tools::Toolkit;
use crate::watermark::WatermarkContext;

/// Result of a completed build.
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// Path of the published book.
    pub output: PathBuf,
    /// Documents merged inline, the table of contents included.
    pub documents: usize,
    /// Reference documents carried alongside the book.
    pub references: usize,
    pub raw_pages: usize,
    pub visible_pages: usize,
    pub bookmarks: usize,
    /// Inputs passed over with a naming warning.
    pub skipped: Vec<PathBuf>,
    /// SHA-256 of the published file.
    pub sha256: String,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a document's build-area artifact has been produced.
    fn document_compiled(&self, name: &CanonicalName, current: usize, total: usize);
    /// Called for each document merged into the book.
    fn document_linked(&self, name: &CanonicalName, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &BuildResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn document_compiled(&self, _name: &CanonicalName, _current: usize, _total: usize) {}
    fn document_linked(&self, _name: &CanonicalName, _current: usize, _total: usize) {}
    fn done(&self, _result: &BuildResult) {}
}

/// Run the full pipeline.
///
/// 1. Clean the build areas and compile every source document
/// 2. Link the authored build area into one outlined, watermarked file
/// 3. Attach the reference documents (or copy when attaching is off)
/// 4. Publish to the configured output
#[instrument(skip_all, fields(root = %config.root.display(), output = %config.output.display()))]
pub fn build(
    config: &BuildConfig,
    tools: &Toolkit,
    progress: &dyn ProgressReporter,
) -> Result<BuildResult> {
    let start = Instant::now();
    info!(title = %config.title, datestamp = %config.datestamp, "starting build");

    let compiled = compiler::compile(config, tools, progress)?;
    let inline = compiled.manifest.inline_paths();
    let references = compiled.manifest.reference_paths();

    link_and_publish(config, tools, progress, &inline, &references, compiled.skipped, start)
}

/// Link and publish from whatever the build areas hold, without compiling.
#[instrument(skip_all, fields(build = %config.build_dir.display(), output = %config.output.display()))]
pub fn resume(
    config: &BuildConfig,
    tools: &Toolkit,
    progress: &dyn ProgressReporter,
) -> Result<BuildResult> {
    let start = Instant::now();

    progress.phase("Scanning build areas");
    let inline = scan_build_area(&config.build_dir)?;
    if inline.is_empty() {
        return Err(DataBookError::validation(format!(
            "build area {} holds no documents; run compile first",
            config.build_dir.display()
        )));
    }
    let references = scan_build_area(&config.build_ref_dir)?;
    info!(documents = inline.len(), references = references.len(), "resuming from build areas");

    link_and_publish(config, tools, progress, &inline, &references, Vec::new(), start)
}

fn link_and_publish(
    config: &BuildConfig,
    tools: &Toolkit,
    progress: &dyn ProgressReporter,
    inline: &[PathBuf],
    references: &[PathBuf],
    mut skipped: Vec<PathBuf>,
    start: Instant,
) -> Result<BuildResult> {
    progress.phase("Linking documents");
    let merged = config.build_dir.join(MERGED_FILE_NAME);
    let ctx = WatermarkContext::from(config);
    let mut binder = tools.binder();
    let report = assembler::link(inline, binder.as_mut(), &ctx, &merged)?;

    let total = report.linked.len();
    for (i, name) in report.linked.iter().enumerate() {
        progress.document_linked(name, i + 1, total);
    }

    if config.attach_references && !references.is_empty() {
        progress.phase("Attaching reference documents");
    } else {
        progress.phase("Publishing");
    }
    publish(config, tools, &merged, references)?;

    skipped.extend(report.skipped);
    let result = BuildResult {
        output: config.output.clone(),
        documents: report.linked.len(),
        references: references.len(),
        raw_pages: report.state.raw_pages,
        visible_pages: report.state.visible_pages,
        bookmarks: report.bookmarks.len(),
        skipped,
        sha256: sha256_file(&config.output)?,
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        output = %result.output.display(),
        documents = result.documents,
        references = result.references,
        raw_pages = result.raw_pages,
        elapsed_ms = result.elapsed.as_millis(),
        "build complete"
    );

    Ok(result)
}

/// Write the final artifact next to the output and rename it into place.
///
/// References are attached to the merged file when enabled; otherwise the
/// merged file is copied as is. A failure leaves any previous output untouched.
pub fn publish(
    config: &BuildConfig,
    tools: &Toolkit,
    merged: &Path,
    references: &[PathBuf],
) -> Result<()> {
    let output = &config.output;
    let file_name = output
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DataBookError::config(format!("output {} has no file name", output.display())))?;
    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| DataBookError::io(dir, e))?;
    let temp = dir.join(format!(".{file_name}.tmp"));

    let staged = if config.attach_references && !references.is_empty() {
        tools.attacher.attach(merged, references, &temp)
    } else {
        if !references.is_empty() {
            info!(count = references.len(), "attaching disabled, reference documents left out");
        }
        std::fs::copy(merged, &temp)
            .map(|_| ())
            .map_err(|e| DataBookError::io(merged, e))
    };

    let renamed = staged.and_then(|()| {
        std::fs::rename(&temp, output).map_err(|e| DataBookError::io(output, e))
    });
    if renamed.is_err() {
        let _ = std::fs::remove_file(&temp);
    }
    renamed
}
