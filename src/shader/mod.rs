//! Shading programs and their typed parameter slots

pub mod builtin;
mod library;
mod program;
mod uniform;

pub use library::*;
pub use program::*;
pub use uniform::*;
