//! Marquee - durable metadata enrichment for media libraries
//!
//! This library crate exposes the queue, pipeline and wiring used by the
//! `marquee` binary, for integration testing.

pub mod app;
pub mod config;
pub mod images;
pub mod metadata;
pub mod queue;
