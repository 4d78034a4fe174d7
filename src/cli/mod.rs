//! Command implementations for the `runmanifest` binary

pub mod copy;
pub mod setup;
pub mod show;
