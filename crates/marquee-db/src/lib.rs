//! Marquee-DB: Database schema, migrations, and query operations
//!
//! This crate provides the persistence side of the metadata pipeline using
//! SQLite with rusqlite and r2d2 connection pooling.
//!
//! # Modules
//!
//! - `migrations` - Database schema migrations
//! - `pool` - Connection pool management
//! - `models` - Rust models matching database schema
//! - `queries` - Database query operations
//!
//! # Example
//!
//! ```no_run
//! use marquee_common::MediaType;
//! use marquee_db::pool::{get_conn, init_pool};
//! use marquee_db::queries::libraries;
//!
//! let pool = init_pool("/var/lib/marquee/marquee.db").unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let library = libraries::create_library(&conn, "Movies", MediaType::Movie).unwrap();
//! println!("Created library: {}", library.name);
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
