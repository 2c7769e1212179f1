//! Command-line adapters over the knowledge-index ranking core.
//!
//! The `kb` binary wires these modules to clap subcommands:
//! - [`output`] renders `query` results as text, JSON or Markdown
//! - [`candidates`] produces the deduplicated source list for agent selection
//! - [`eval`] and [`report`] run a retrieval benchmark and write its artifacts
//! - [`config`] resolves settings from flags, `KB_*` variables and `kb.toml`

pub mod candidates;
pub mod config;
pub mod eval;
pub mod output;
pub mod report;
