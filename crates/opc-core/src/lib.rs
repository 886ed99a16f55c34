//! Core types for operator conformance testing.
//!
//! `opc-core` provides the value types shared by every other crate in the
//! workspace (`Tensor`, `Shape`, `AttributeSet`) and the
//! [`CompileExecuteAdapter`] trait, the one boundary to a tensor compiler
//! under test.
//!
//! # Crates built on top
//!
//! - `opc-cpu`: reference compile-and-execute backend for the host CPU
//! - `opc-conformance`: input synthesis, reference oracles, comparison and
//!   the scenario driver

pub mod attrs;
pub mod backend;
pub mod tensor;
pub mod types;

pub use attrs::{AttrError, AttrValue, AttributeSet};
pub use backend::{AdapterError, CompileExecuteAdapter};
pub use tensor::Tensor;
pub use types::Shape;

pub type Result<T> = std::result::Result<T, OpcError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum OpcError {
    #[error("invalid shape {shape}: {reason}")]
    InvalidShape { shape: Shape, reason: String },

    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Attr(#[from] AttrError),
}
