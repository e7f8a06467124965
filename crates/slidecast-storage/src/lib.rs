//! On-disk storage for conversion jobs.
//!
//! Every job owns three directories under a common base path:
//! - `uploads/<job id>/` holds the uploaded deck
//! - `temp/<job id>/` is scratch space for intermediate PDFs and pages
//! - `output/<job id>/` holds the finished `output.mp4`

pub mod error;
pub mod local;

pub use error::{StorageError, StorageResult};
pub use local::{sanitize_filename, validate_base_path, FileStorage, JobPaths, OUTPUT_FILE_NAME};
