//! # StemForge Model Loading
//!
//! Turns files on disk into [`sf_core::ModelSpec`] values:
//! - [`OnnxSession`] / [`OnnxSeparationModel`]: tract-backed inference behind
//!   the core's `Model` trait
//! - [`LocalRepo`]: a directory of metadata + weights, for single models and
//!   weighted bags
//! - [`AliasRegistry`]: explicit legacy-name table consulted at load time

mod engine;
mod error;
mod registry;
mod repo;

pub use engine::{effective_device, ModelMeta, OnnxSeparationModel, OnnxSession};
pub use error::{ModelError, ModelResult};
pub use registry::AliasRegistry;
pub use repo::{LocalRepo, RepoListing};
