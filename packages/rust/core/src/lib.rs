//! Core pipeline orchestration and domain logic for DataBook.
//!
//! This crate ties together source classification, the table of contents,
//! watermarking, and page assembly into the end-to-end `build` workflow.
//! External tools sit behind the traits in [`tools`].

pub mod assembler;
pub mod classify;
pub mod compiler;
pub mod pipeline;
pub mod toc;
pub mod tools;
pub mod watermark;

pub use assembler::{AssemblyState, LinkReport, MERGED_FILE_NAME, link, scan_build_area};
pub use classify::{Classification, ParsedName, SectionDir, classify};
pub use compiler::{CompileOutput, Survey, compile, load_manifest, prepare_build_areas, survey};
pub use pipeline::{BuildResult, ProgressReporter, SilentProgress, build, publish, resume};
pub use toc::Contents;
pub use tools::{Attacher, Binder, Renderer, Stamper, StalenessCheck, Toolkit};
pub use watermark::{WatermarkContext, authored_watermark, reference_watermark};
