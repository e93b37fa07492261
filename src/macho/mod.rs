//! Mach-O file format handling.
//!
//! This module provides types for reading thin Mach-O images and universal
//! binaries: headers, load commands, linked libraries, and install names.

mod constants;
mod context;
mod structs;

pub use constants::*;
pub use context::*;
pub use structs::*;
