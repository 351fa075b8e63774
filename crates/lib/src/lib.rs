//! flatbuild-lib: manifest-driven bundle builds.
//!
//! A bundle manifest declares an application, its runtime and an ordered list
//! of modules, each with ordered sources. This crate provides:
//! - `manifest`: loading and validating manifests
//! - `sequence`: the module build order
//! - `source`: fetching, verifying and applying sources
//! - `build`: per-module contexts and build protocols
//! - `cleanup`: glob-based pruning of the install prefix
//! - `finish`: finish-args aggregation and bundle metadata
//! - `orchestrate`: the build run tying the above together
//! - `checker` / `repin`: out-of-band upstream version checks and explicit re-pinning

pub mod build;
pub mod checker;
pub mod cleanup;
pub mod consts;
pub mod error;
pub mod finish;
pub mod manifest;
pub mod orchestrate;
pub mod platform;
pub mod repin;
pub mod sequence;
pub mod source;
pub mod util;

pub use error::ErrorKind;
