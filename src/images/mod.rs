//! Local artwork cache.
//!
//! [`ImageStorage`] owns the on-disk layout and encoding rules;
//! [`ImagePipeline`] downloads provider artwork into it.

mod pipeline;
mod storage;

pub use pipeline::{ImagePipeline, ProcessedImage};
pub use storage::{encode_for_role, ImageStorage, JPEG_QUALITY};
