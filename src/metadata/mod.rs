//! Metadata enrichment pipeline.
//!
//! # Module layout
//!
//! - [`provider`] -- Provider trait and the normalised result type.
//! - [`providers`] -- Concrete providers (TMDB) and startup selection.
//! - [`validator`] -- Existence and idempotent-skip checks.
//! - [`fetcher`] -- Provider lookup with timeout plus artwork processing.
//! - [`updater`] -- Transactional persistence of a fetched result.
//! - [`progress`] -- Scan job counters and progress percentage.
//! - [`processor`] -- The [`JobHandler`](crate::queue::JobHandler) tying the
//!   stages together.

pub mod fetcher;
pub mod processor;
pub mod progress;
pub mod provider;
pub mod providers;
pub mod updater;
pub mod validator;

pub use fetcher::MetadataFetcher;
pub use processor::MetadataProcessor;
pub use progress::{progress, ProgressTracker};
pub use provider::{MediaMetadataResult, MetadataProvider};
pub use updater::MetadataUpdater;
pub use validator::{MetadataValidator, Validation};
