//! Write-behind issue cache with debounced SQLite persistence.
//!
//! `spool` is the persistence core of an issue-tracking integration layer.
//! The hosting application reads and mutates an in-memory, per-project view
//! of issues instantly; durable writes to the on-disk SQLite store are
//! deferred, batched behind a trailing-edge debounce, and reconciled with an
//! external sync command that mirrors the same store to a remote.
//!
//! The moving parts, bottom up:
//!
//! - [`storage`] - store access and the persistence applier; the schema is
//!   owned by the external CLI and never created here
//! - [`cache`] - the optimistic in-memory cache and mutation API
//! - [`queue`] - per-project pending items, debounce deadlines, history
//! - [`flush`] - the background dispatcher and flush worker pool
//! - [`Spool`] - the facade wiring it all together
//!
//! ```no_run
//! use spool::{NewIssue, Spool, SpoolConfig};
//! use std::path::Path;
//!
//! let spool = Spool::new(SpoolConfig::default());
//! let project = Path::new("/path/to/project");
//! let issue = spool
//!     .create(project, NewIssue { title: "Fix bug".into(), ..Default::default() })
//!     .expect("valid title");
//! assert_eq!(spool.get(project, &issue.id).unwrap().title, "Fix bug");
//! spool.shutdown();
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod flush;
pub mod logging;
pub mod model;
pub mod queue;
mod spool;
pub mod storage;
pub mod sync;
pub mod util;

pub use cache::{IssueCache, ListFilters, NewIssue};
pub use config::SpoolConfig;
pub use error::{Result, SpoolError};
pub use model::{Dependency, DependencyType, Issue, IssueType, IssueUpdate, Priority, Status};
pub use queue::{ItemStatus, QueueEvent, QueueItem, QueueOp, WriteQueue};
pub use spool::Spool;
