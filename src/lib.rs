//! dgnsync - incremental synchronization of design files into a target
//! repository.
//!
//! This crate provides the change-detection engine behind the `dgnsync` CLI.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Source documents (files, models, elements, views) in a job arena
//! - [`hash`] - Normalized content hashing
//! - [`provenance`] - Per-record provenance and identity policy
//! - [`storage`] - SQLite store: SyncInfo mapping and target repository
//! - [`sync`] - Change detection, deletion inference and the conversion driver
//! - [`config`] - Database path resolution and job configuration
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod hash;
pub mod model;
pub mod provenance;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
