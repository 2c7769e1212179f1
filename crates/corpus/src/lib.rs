//! # KB Corpus
//!
//! Record model for the knowledge index and loading of record collections.
//!
//! Records are produced by ingestion (cloning, rendering, chunking) and arrive
//! here as JSON Lines, one object per record:
//!
//! ```text
//! {"id": "...", "title": "...", "source_type": "repo_file",
//!  "path": "data/repos/...", "url": null, "tags": ["..."], "content": "..."}
//! ```
//!
//! Loading is the only fallible step. Once a [`RecordSet`] exists it is
//! immutable and can be shared across concurrent queries.

mod error;
mod record_set;
mod types;

pub use error::{CorpusError, Result};
pub use record_set::RecordSet;
pub use types::{Record, SourceType};
