// src/lib.rs

//! Catalog Sync Library
//!
//! Incrementally maintains a catalog of repositories found through a
//! rate-limited search API, reusing previous results for repositories
//! that did not change.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
