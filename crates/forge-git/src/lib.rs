//! Local git operations for forge-fixture
//!
//! A thin service object over `git2` that initialises throwaway repositories,
//! commits files into them (including bare repositories, through a scratch
//! clone) and manipulates branches.

pub mod bare;
pub mod client;
pub mod error;

pub use client::{Author, GitClient, TEMP_DIR_PREFIX};
pub use error::{Error, Result};
