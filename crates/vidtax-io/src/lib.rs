//! # vidtax-io
//!
//! Durable JSON state for the pipeline stages.
//!
//! - [`CheckpointStore`]: a stage's idempotency ledger. The whole document is
//!   rewritten after every unit of work, so a crash loses at most the unit that
//!   was in flight.
//! - [`JsonArtifact`]: read/write helpers for full-materialization artifacts
//!   (draft tree, canonical tree, path index) that one stage writes and the
//!   next one reads whole.
//!
//! Every write goes to a temp file in the target directory, is fsynced, then
//! renamed over the target. Readers never observe a half-written file.
//!
//! ```rust,no_run
//! use std::collections::BTreeSet;
//! use vidtax_io::CheckpointStore;
//!
//! let mut ck: CheckpointStore<BTreeSet<String>> =
//!     CheckpointStore::open("data/indexed_ytids.json")?;
//! ck.state_mut().insert("v42".to_string());
//! ck.flush()?;
//! # Ok::<(), vidtax_io::IoError>(())
//! ```
mod artifact;
mod checkpoint;
mod errors;

pub use artifact::JsonArtifact;
pub use checkpoint::CheckpointStore;
pub use errors::IoError;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
