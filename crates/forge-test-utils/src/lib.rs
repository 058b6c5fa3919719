//! Shared test utilities for the forge-fixture workspace.
//!
//! This crate is a dev-dependency only and is never published.
//!
//! # Modules
//!
//! - [`git`]: inspecting repositories produced by the code under test
//! - [`docker`]: guards for tests that need a Docker daemon

pub mod docker;
pub mod git;
