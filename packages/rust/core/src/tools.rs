//! Capabilities the pipeline needs from external tools.
//!
//! Each tool is a narrow trait so the compile and link phases can be driven
//! by fakes in tests. [`Toolkit::from_config`] wires the real adapters:
//! `pandoc` for rendering, `lopdf` for page work, `pdftk` for attachments.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use databook_pdf::{OverlayStyle, PdfBinder};
use databook_shared::{BookmarkTree, BuildConfig, DataBookError, Result};

/// Renders a Markdown source into a PDF.
pub trait Renderer {
    fn render(&self, source: &Path, output: &Path, cover_page: bool) -> Result<()>;
}

/// Verifies a prepared document is newer than its declared source.
pub trait StalenessCheck {
    fn check(&self, directory: &Path, file_name: &str) -> Result<()>;
}

/// Writes a copy of `input` with `text` on every page.
pub trait Stamper {
    fn stamp_all_pages(&self, output: &Path, text: &str, input: &Path) -> Result<()>;
}

/// Embeds files as attachments of a carrier document.
pub trait Attacher {
    fn attach(&self, carrier: &Path, files: &[PathBuf], output: &Path) -> Result<()>;
}

/// Builds the merged document one page at a time.
pub trait Binder {
    /// Make a file's pages available; returns its page count.
    fn open(&mut self, path: &Path) -> Result<usize>;
    /// Append page `index` of the open file, overlaid with `watermark` when given.
    fn append_page(&mut self, index: usize, watermark: Option<&str>) -> Result<()>;
    /// Write the merged document with its outline.
    fn finish(&mut self, outline: &BookmarkTree, output: &Path) -> Result<()>;
}

/// The full set of tools one build uses.
pub struct Toolkit {
    pub renderer: Box<dyn Renderer>,
    pub staleness: Box<dyn StalenessCheck>,
    pub stamper: Box<dyn Stamper>,
    pub attacher: Box<dyn Attacher>,
    pub new_binder: Box<dyn Fn() -> Box<dyn Binder>>,
}

impl Toolkit {
    /// Real adapters configured from the build config.
    pub fn from_config(config: &BuildConfig) -> Self {
        let style = OverlayStyle {
            font_size: config.watermark.font_size,
            margin: config.watermark.margin,
            ..OverlayStyle::default()
        };
        Self {
            renderer: Box::new(PandocRenderer {
                program: config.tools.pandoc.clone(),
                args: config.tools.pandoc_args.clone(),
                cover_args: config.tools.cover_args.clone(),
            }),
            staleness: Box::new(MtimeStalenessCheck {
                dependencies: config.dependencies.clone(),
            }),
            stamper: Box::new(LopdfStamper { style }),
            attacher: Box::new(PdftkAttacher {
                program: config.tools.pdftk.clone(),
            }),
            new_binder: Box::new(move || Box::new(PdfBinder::new(style))),
        }
    }

    /// A fresh binder for one link run.
    pub fn binder(&self) -> Box<dyn Binder> {
        (self.new_binder)()
    }
}

// ---------------------------------------------------------------------------
// Process helpers
// ---------------------------------------------------------------------------

/// Shell-like rendering of a command for diagnostics.
fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|part| {
            let part = part.to_string_lossy();
            if part.contains(' ') || part.is_empty() {
                format!("\"{part}\"")
            } else {
                part.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a command to completion; a non-zero exit surfaces its stderr verbatim.
fn run(cmd: &mut Command) -> Result<()> {
    let command = describe(cmd);
    debug!(%command, "running external tool");

    let output = cmd.output().map_err(|e| {
        DataBookError::tool(&command, format!("failed to start: {e}"))
    })?;

    if !output.status.success() {
        let mut diagnostic = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if diagnostic.is_empty() {
            diagnostic = format!("exited with {}", output.status);
        }
        return Err(DataBookError::tool(command, diagnostic));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

/// Renders Markdown with `pandoc <source> -o <output> [args...]`.
#[derive(Debug, Clone)]
pub struct PandocRenderer {
    pub program: String,
    pub args: Vec<String>,
    /// Appended for section 0 documents.
    pub cover_args: Vec<String>,
}

impl Renderer for PandocRenderer {
    fn render(&self, source: &Path, output: &Path, cover_page: bool) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg(source).arg("-o").arg(output).args(&self.args);
        if cover_page {
            cmd.args(&self.cover_args);
        }
        if let Some(dir) = source.parent().filter(|d| !d.as_os_str().is_empty()) {
            // Relative image links in the source resolve from its directory.
            cmd.arg("--resource-path").arg(dir);
        }
        run(&mut cmd)
    }
}

/// Compares modification times of prepared documents and their declared sources.
#[derive(Debug, Clone, Default)]
pub struct MtimeStalenessCheck {
    /// `(document, source)` pairs.
    pub dependencies: Vec<(PathBuf, PathBuf)>,
}

impl StalenessCheck for MtimeStalenessCheck {
    fn check(&self, directory: &Path, file_name: &str) -> Result<()> {
        let document = directory.join(file_name);
        let Some((_, source)) = self.dependencies.iter().find(|(doc, _)| *doc == document) else {
            debug!(document = %document.display(), "no declared dependency");
            return Ok(());
        };

        let modified = |path: &Path| {
            std::fs::metadata(path)
                .and_then(|m| m.modified())
                .map_err(|e| DataBookError::io(path, e))
        };
        if modified(&document)? < modified(source)? {
            return Err(DataBookError::Stale {
                document,
                dependency: source.clone(),
            });
        }
        debug!(document = %document.display(), source = %source.display(), "dependency up to date");
        Ok(())
    }
}

/// Stamps pages in-process with `lopdf`.
#[derive(Debug, Clone, Copy)]
pub struct LopdfStamper {
    pub style: OverlayStyle,
}

impl Stamper for LopdfStamper {
    fn stamp_all_pages(&self, output: &Path, text: &str, input: &Path) -> Result<()> {
        let pages = databook_pdf::stamp_all_pages(output, text, input, &self.style)?;
        debug!(pages, input = %input.display(), "reference watermark stamped");
        Ok(())
    }
}

/// Attaches files with `pdftk <carrier> attach_files <files...> output <output>`.
#[derive(Debug, Clone)]
pub struct PdftkAttacher {
    pub program: String,
}

impl Attacher for PdftkAttacher {
    fn attach(&self, carrier: &Path, files: &[PathBuf], output: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg(carrier)
            .arg("attach_files")
            .args(files)
            .arg("output")
            .arg(output);
        run(&mut cmd)?;
        info!(count = files.len(), "reference documents attached");
        Ok(())
    }
}

impl Binder for PdfBinder {
    fn open(&mut self, path: &Path) -> Result<usize> {
        PdfBinder::open(self, path)
    }

    fn append_page(&mut self, index: usize, watermark: Option<&str>) -> Result<()> {
        PdfBinder::append_page(self, index, watermark)
    }

    fn finish(&mut self, outline: &BookmarkTree, output: &Path) -> Result<()> {
        PdfBinder::finish(self, outline, output)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    use super::*;

    /// Everything the fake tools were asked to do.
    #[derive(Debug, Default)]
    pub(crate) struct Calls {
        pub rendered: Vec<(PathBuf, PathBuf, bool)>,
        pub stamped: Vec<(PathBuf, String)>,
        pub attached: Vec<(PathBuf, Vec<PathBuf>, PathBuf)>,
        pub watermarks: Vec<Option<String>>,
    }

    pub(crate) type SharedCalls = Rc<RefCell<Calls>>;

    const FAKE_PDF: &[u8] = b"%PDF-1.5 fake\n";

    struct FakeRenderer(SharedCalls);

    impl Renderer for FakeRenderer {
        fn render(&self, source: &Path, output: &Path, cover_page: bool) -> Result<()> {
            std::fs::read(source).map_err(|e| DataBookError::io(source, e))?;
            std::fs::write(output, FAKE_PDF).map_err(|e| DataBookError::io(output, e))?;
            self.0
                .borrow_mut()
                .rendered
                .push((source.to_path_buf(), output.to_path_buf(), cover_page));
            Ok(())
        }
    }

    /// Reports every listed file name as stale.
    pub(crate) struct FakeStaleness(pub HashSet<String>);

    impl StalenessCheck for FakeStaleness {
        fn check(&self, directory: &Path, file_name: &str) -> Result<()> {
            if self.0.contains(file_name) {
                return Err(DataBookError::Stale {
                    document: directory.join(file_name),
                    dependency: directory.join("source.xlsx"),
                });
            }
            Ok(())
        }
    }

    struct FakeStamper(SharedCalls);

    impl Stamper for FakeStamper {
        fn stamp_all_pages(&self, output: &Path, text: &str, input: &Path) -> Result<()> {
            std::fs::copy(input, output).map_err(|e| DataBookError::io(input, e))?;
            self.0
                .borrow_mut()
                .stamped
                .push((output.to_path_buf(), text.to_string()));
            Ok(())
        }
    }

    /// Appends the attachment names to the carrier; fails when `fail` is set.
    pub(crate) struct FakeAttacher {
        pub calls: SharedCalls,
        pub fail: bool,
    }

    impl Attacher for FakeAttacher {
        fn attach(&self, carrier: &Path, files: &[PathBuf], output: &Path) -> Result<()> {
            self.calls.borrow_mut().attached.push((
                carrier.to_path_buf(),
                files.to_vec(),
                output.to_path_buf(),
            ));
            if self.fail {
                return Err(DataBookError::tool("pdftk attach_files", "Error: unable to open"));
            }
            let mut bytes = std::fs::read(carrier).map_err(|e| DataBookError::io(carrier, e))?;
            for file in files {
                bytes.extend_from_slice(format!("attached {}\n", file.display()).as_bytes());
            }
            std::fs::write(output, bytes).map_err(|e| DataBookError::io(output, e))
        }
    }

    /// One page per input file; writes the merged file names on finish.
    struct FakeBinder {
        calls: SharedCalls,
        merged: Vec<String>,
        open: Option<String>,
    }

    impl Binder for FakeBinder {
        fn open(&mut self, path: &Path) -> Result<usize> {
            if !path.is_file() {
                return Err(DataBookError::Pdf(format!("{}: not found", path.display())));
            }
            self.open = path.file_name().map(|n| n.to_string_lossy().into_owned());
            Ok(1)
        }

        fn append_page(&mut self, _index: usize, watermark: Option<&str>) -> Result<()> {
            self.merged.extend(self.open.clone());
            self.calls
                .borrow_mut()
                .watermarks
                .push(watermark.map(String::from));
            Ok(())
        }

        fn finish(&mut self, _outline: &BookmarkTree, output: &Path) -> Result<()> {
            std::fs::write(output, self.merged.join("\n")).map_err(|e| DataBookError::io(output, e))
        }
    }

    /// A toolkit of fakes that record into the returned call log.
    pub(crate) fn fake_toolkit() -> (Toolkit, SharedCalls) {
        let calls = SharedCalls::default();
        let binder_calls = calls.clone();
        let tools = Toolkit {
            renderer: Box::new(FakeRenderer(calls.clone())),
            staleness: Box::new(FakeStaleness(HashSet::new())),
            stamper: Box::new(FakeStamper(calls.clone())),
            attacher: Box::new(FakeAttacher {
                calls: calls.clone(),
                fail: false,
            }),
            new_binder: Box::new(move || {
                Box::new(FakeBinder {
                    calls: binder_calls.clone(),
                    merged: Vec::new(),
                    open: None,
                })
            }),
        };
        (tools, calls)
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("databook-tools-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn describe_quotes_arguments_with_spaces() {
        let mut cmd = Command::new("pdftk");
        cmd.arg("01-01 [Scope] [Overview].pdf").arg("output").arg("out.pdf");
        assert_eq!(
            describe(&cmd),
            "pdftk \"01-01 [Scope] [Overview].pdf\" output out.pdf"
        );
    }

    #[test]
    fn missing_program_is_a_tool_error() {
        let attacher = PdftkAttacher {
            program: "databook-no-such-tool".into(),
        };
        let err = attacher
            .attach(Path::new("a.pdf"), &[PathBuf::from("b.pdf")], Path::new("c.pdf"))
            .unwrap_err();
        match err {
            DataBookError::Tool { command, .. } => {
                assert!(command.starts_with("databook-no-such-tool a.pdf attach_files b.pdf"));
            }
            other => panic!("expected tool error, got {other}"),
        }
    }

    #[test]
    fn undeclared_prepared_document_passes() {
        let check = MtimeStalenessCheck::default();
        assert!(check.check(Path::new("/book/#1 Scope"), "#2&Appendix.pdf").is_ok());
    }

    #[test]
    fn older_prepared_document_is_stale() {
        let tmp = temp_dir();
        let section = tmp.join("#1 Scope");
        std::fs::create_dir_all(&section).unwrap();
        let document = section.join("#2&Appendix.pdf");
        let source = tmp.join("appendix.xlsx");

        std::fs::write(&document, b"%PDF").unwrap();
        let earlier = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&document)
            .unwrap()
            .set_modified(earlier)
            .unwrap();
        std::fs::write(&source, b"data").unwrap();

        let check = MtimeStalenessCheck {
            dependencies: vec![(document.clone(), source.clone())],
        };
        let err = check.check(&section, "#2&Appendix.pdf").unwrap_err();
        assert!(matches!(err, DataBookError::Stale { .. }));

        let fresh = MtimeStalenessCheck {
            dependencies: vec![(source.clone(), document.clone())],
        };
        assert!(fresh.check(&tmp, "appendix.xlsx").is_ok());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_declared_source_is_fatal() {
        let tmp = temp_dir();
        let document = tmp.join("#1&Report.pdf");
        std::fs::write(&document, b"%PDF").unwrap();
        let check = MtimeStalenessCheck {
            dependencies: vec![(document, tmp.join("gone.docx"))],
        };
        assert!(matches!(
            check.check(&tmp, "#1&Report.pdf"),
            Err(DataBookError::Io { .. })
        ));
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
