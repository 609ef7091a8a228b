//! Renderer error types

use thiserror::Error;

use crate::backend::BackendError;
use crate::shader::ShaderId;

/// Errors raised while configuring the renderer.
///
/// Per-draw paths never return these; a draw that cannot proceed is
/// skipped and logged instead.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("No shader registered under `{0}`")]
    UnknownShader(ShaderId),
    #[error("Uniform name must not be empty")]
    EmptyUniformName,
    #[error("Layer table is full ({0} layers)")]
    LayerTableFull(usize),
    #[error("Layer `{0}` already exists")]
    DuplicateLayer(String),
    #[error("Image data is {actual} bytes, expected {expected}")]
    ImageSize { expected: usize, actual: usize },
    #[error("Cube faces must be square and equally sized")]
    CubeFaceMismatch,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type RenderResult<T> = Result<T, RenderError>;
