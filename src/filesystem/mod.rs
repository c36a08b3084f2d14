// src/filesystem/mod.rs

//! Filesystem-facing pieces of the staging engine: the filename safety
//! policy applied to client-chosen names, and stage location resolution and
//! destruction.

pub mod path;
pub mod stage;

pub use stage::{ContainerResolver, NoContainers, StageLocation};
