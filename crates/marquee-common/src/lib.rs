//! Marquee-Common: Shared types, constants, and utilities.
//!
//! This crate provides common functionality used across marquee:
//!
//! - **Typed IDs**: Type-safe UUID wrappers for media, libraries and scan jobs
//! - **Core Types**: Enums for media types, artwork roles and scan/metadata status
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use marquee_common::{ImageRole, MediaId, MediaType, Error, Result};
//!
//! let media_id = MediaId::new();
//! assert_eq!(MediaType::Movie.folder(), "movies");
//! assert_eq!(ImageRole::Logo.max_width(), 300);
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("media"))
//! }
//! ```

pub mod error;
pub mod ids;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
