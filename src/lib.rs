pub mod boundary;
pub mod config;
pub mod domain;
pub mod editor;
pub mod error;
pub mod git;
pub mod manifest;
pub mod publish;
pub mod release;
pub mod ui;
pub mod xtest;

pub use error::{ConductorError, Result};
