//! ELF file format handling.
//!
//! This module reads just enough of an ELF file to relaunch it: the target
//! machine, the program interpreter, and the libraries named by the dynamic
//! section.

mod constants;
mod context;
mod structs;

pub use constants::*;
pub use context::*;
pub use structs::*;
