//! `relay-workspace` - project file glue for the relay editor bridge.
//!
//! Everything here is plain filesystem work: filtered tree walks, project-kind
//! detection, folder tree rendering, asset listing and selection grouping. The
//! HTTP routes in `relay-runtime` are thin wrappers over these functions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// Asset folder discovery and listing.
pub mod assets;
/// Workspace glue errors.
pub mod error;
/// Exclusion lists and recursive file collection.
pub mod files;
/// Project kind detection and folder tree rendering.
pub mod project;
/// Grouping of selected lines with their diagnostics.
pub mod selection;

pub use error::WorkspaceError;
