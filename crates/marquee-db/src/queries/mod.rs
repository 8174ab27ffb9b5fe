//! Database query operations.
//!
//! Functions take a `&rusqlite::Connection` so they compose inside a caller's
//! transaction (`Transaction` derefs to `Connection`).

pub mod external_ids;
pub mod genres;
pub mod libraries;
pub mod media;
pub mod scan_jobs;
