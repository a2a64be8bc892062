//! Classification pass.
//!
//! Walks the section directories under the book root, registers every
//! recognised document in the table of contents, and produces one canonical
//! artifact per document:
//!
//! - Authored: rendered into the authored build area.
//! - Prepared: staleness-checked, then copied.
//! - Direct: copied.
//! - Reference: stamped on every page into the reference build area.
//!
//! Finally the table of contents is rendered as document `0.0` and the build
//! manifest is written next to the artifacts.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use databook_shared::{
    BuildConfig, BuildManifest, CURRENT_SCHEMA_VERSION, DataBookError, Document, DocumentKind,
    ManifestEntry, Result,
};

use crate::classify::{SectionDir, is_section_candidate};
use crate::pipeline::ProgressReporter;
use crate::toc::{ATTACHMENT_SUFFIX, Contents};
use crate::tools::Toolkit;
use crate::watermark::{WatermarkContext, reference_watermark};

/// Build manifest file, written to the authored build area.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Markdown source of the table of contents, written to the authored build area.
pub const TOC_SOURCE_NAME: &str = ".toc.md";

/// Result of walking the source tree, before any artifact is produced.
#[derive(Debug, Default)]
pub struct Survey {
    pub contents: Contents,
    /// Recognised documents in canonical order.
    pub documents: Vec<Document>,
    /// Directories and files passed over with a naming warning.
    pub skipped: Vec<PathBuf>,
}

/// Result of a full classification pass.
#[derive(Debug)]
pub struct CompileOutput {
    pub contents: Contents,
    pub manifest: BuildManifest,
    pub skipped: Vec<PathBuf>,
}

/// Create both build areas and delete the files left in them.
pub fn prepare_build_areas(config: &BuildConfig) -> Result<()> {
    for dir in [&config.build_dir, &config.build_ref_dir] {
        std::fs::create_dir_all(dir).map_err(|e| DataBookError::io(dir, e))?;
        let mut removed = 0usize;
        for path in sorted_entries(dir)? {
            if path.is_file() {
                std::fs::remove_file(&path).map_err(|e| DataBookError::io(&path, e))?;
                removed += 1;
            }
        }
        debug!(dir = %dir.display(), removed, "build area cleaned");
    }
    Ok(())
}

/// Walk `root` and classify every section directory and file in it.
///
/// Naming problems are warnings: the offending directory or file is recorded
/// in [`Survey::skipped`] and contributes nothing.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn survey(root: &Path) -> Result<Survey> {
    let mut survey = Survey::default();

    for dir in sorted_entries(root)? {
        let Some(dir_name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !dir.is_dir() || !is_section_candidate(dir_name) {
            continue;
        }

        let section = match SectionDir::parse(&dir) {
            Ok(section) => section,
            Err(e) => {
                warn!(directory = %dir.display(), error = %e, "skipping section directory");
                survey.skipped.push(dir);
                continue;
            }
        };
        if let Err(e) = survey.contents.add_section(section.number, &section.name) {
            warn!(directory = %dir.display(), error = %e, "skipping section directory");
            survey.skipped.push(dir);
            continue;
        }

        for file in sorted_entries(&section.path)? {
            if !file.is_file() {
                continue;
            }
            let document = match file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| DataBookError::naming(format!("{file:?} has no usable name")))
                .and_then(|name| section.document(name))
            {
                Ok(document) => document,
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "skipping file");
                    survey.skipped.push(file);
                    continue;
                }
            };

            let toc_name = match document.kind {
                DocumentKind::Reference => format!("{}{ATTACHMENT_SUFFIX}", document.name),
                _ => document.name.clone(),
            };
            if let Err(e) = survey.contents.add_sub_section(
                document.section_number,
                document.document_number,
                &toc_name,
            ) {
                warn!(file = %file.display(), error = %e, "skipping file");
                survey.skipped.push(file);
                continue;
            }

            debug!(document = %document.canonical_name, kind = %document.kind, "classified");
            survey.documents.push(document);
        }
    }

    survey
        .documents
        .sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));
    info!(
        sections = survey.contents.section_count(),
        documents = survey.documents.len(),
        skipped = survey.skipped.len(),
        "survey complete"
    );
    Ok(survey)
}

/// Run the classification pass: clean the build areas and produce every artifact.
#[instrument(skip_all, fields(root = %config.root.display()))]
pub fn compile(
    config: &BuildConfig,
    tools: &Toolkit,
    progress: &dyn ProgressReporter,
) -> Result<CompileOutput> {
    progress.phase("Preparing build areas");
    prepare_build_areas(config)?;

    progress.phase("Scanning sections");
    let Survey {
        contents,
        documents,
        skipped,
    } = survey(&config.root)?;

    progress.phase("Compiling documents");
    let ctx = WatermarkContext::from(config);
    let total = documents.len();
    let mut inline = Vec::new();
    let mut references = Vec::new();

    for (i, document) in documents.iter().enumerate() {
        let artifact_path = produce(document, config, tools, &ctx)?;
        let entry = ManifestEntry {
            canonical_name: document.canonical_name.clone(),
            kind: document.kind,
            source_path: document.source_path.clone(),
            sha256: sha256_file(&artifact_path)?,
            artifact_path,
        };
        progress.document_compiled(&document.canonical_name, i + 1, total);
        if document.kind.is_inline() {
            inline.push(entry);
        } else {
            references.push(entry);
        }
    }

    progress.phase("Rendering table of contents");
    inline.push(render_toc(&contents, config, tools)?);
    inline.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));
    references.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));

    let manifest = BuildManifest {
        schema_version: CURRENT_SCHEMA_VERSION,
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        title: config.title.clone(),
        datestamp: config.datestamp.clone(),
        created_at: chrono::Utc::now(),
        documents: inline,
        references,
    };
    write_json(&config.build_dir.join(MANIFEST_FILE_NAME), &manifest)?;

    info!(
        documents = manifest.documents.len(),
        references = manifest.references.len(),
        skipped = skipped.len(),
        "compile complete"
    );

    Ok(CompileOutput {
        contents,
        manifest,
        skipped,
    })
}

/// Produce the build-area artifact of one document and return its path.
fn produce(
    document: &Document,
    config: &BuildConfig,
    tools: &Toolkit,
    ctx: &WatermarkContext,
) -> Result<PathBuf> {
    let name = &document.canonical_name;
    let source = &document.source_path;
    debug!(document = %name, kind = document.kind.describe(), "producing artifact");

    match document.kind {
        DocumentKind::Authored => {
            let output = config.build_dir.join(name.file_name());
            tools
                .renderer
                .render(source, &output, document.section_number == 0)?;
            Ok(output)
        }
        DocumentKind::Prepared => {
            let directory = source.parent().unwrap_or(Path::new("."));
            let file_name = source
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            tools.staleness.check(directory, file_name)?;
            copy_artifact(source, &config.build_dir.join(name.file_name()))
        }
        DocumentKind::Direct => copy_artifact(source, &config.build_dir.join(name.file_name())),
        DocumentKind::Reference => {
            let output = config.build_ref_dir.join(name.reference_file_name());
            tools
                .stamper
                .stamp_all_pages(&output, &reference_watermark(ctx, name), source)?;
            Ok(output)
        }
    }
}

fn copy_artifact(source: &Path, output: &Path) -> Result<PathBuf> {
    std::fs::copy(source, output).map_err(|e| DataBookError::io(source, e))?;
    Ok(output.to_path_buf())
}

/// Write the TOC source and render it as document `0.0` without a cover page.
fn render_toc(contents: &Contents, config: &BuildConfig, tools: &Toolkit) -> Result<ManifestEntry> {
    let source = config.build_dir.join(TOC_SOURCE_NAME);
    std::fs::write(&source, contents.render_toc()).map_err(|e| DataBookError::io(&source, e))?;

    let canonical_name = contents.toc_canonical_name()?;
    let output = config.build_dir.join(canonical_name.file_name());
    tools.renderer.render(&source, &output, false)?;
    debug!(entries = contents.document_count(), "table of contents rendered");

    Ok(ManifestEntry {
        canonical_name,
        kind: DocumentKind::Authored,
        sha256: sha256_file(&output)?,
        source_path: source,
        artifact_path: output,
    })
}

/// Read the manifest written by the last compile.
pub fn load_manifest(build_dir: &Path) -> Result<BuildManifest> {
    let path = build_dir.join(MANIFEST_FILE_NAME);
    let content = std::fs::read_to_string(&path).map_err(|e| DataBookError::io(&path, e))?;
    serde_json::from_str(&content).map_err(|e| {
        DataBookError::validation(format!("invalid manifest {}: {e}", path.display()))
    })
}

/// Hex SHA-256 of a file's contents.
pub(crate) fn sha256_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| DataBookError::io(path, e))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Write pretty JSON via a temp file and rename.
fn write_json<T: serde::Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(|e| {
        DataBookError::validation(format!("JSON serialization failed: {e}"))
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));
    std::fs::write(&temp, json).map_err(|e| DataBookError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| DataBookError::io(path, e))?;
    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

/// Entries of `dir`, sorted by path.
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)
        .map_err(|e| DataBookError::io(dir, e))?
        .map(|entry| entry.map(|e| e.path()).map_err(|e| DataBookError::io(dir, e)))
        .collect::<Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}
