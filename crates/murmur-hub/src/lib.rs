//! Murmur hub crate - model catalog, on-disk cache store, and downloads.
//!
//! Answers "which models exist", "is model X fully present on disk", and
//! "download model X with byte-accurate progress". The remote hub is a
//! capability trait so tests run against an in-memory mock.

pub mod catalog;
pub mod client;
pub mod store;

pub use catalog::{find, repo_for, ModelDescriptor, MODELS};
pub use client::{HttpHub, HubFile, MockHub, ModelHub};
pub use store::{DownloadSession, ModelStore};
