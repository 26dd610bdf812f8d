//! The CAD script language.
//!
//! Generated code is never run as host code. It is parsed into a [`Program`],
//! checked by [`validate`] and then interpreted by a [`Sandbox`] that can only
//! call the operations listed in [`capability::OPERATIONS`].
//!
//! ```text
//! params {
//!   width = 10mm
//! }
//! plate = box(width, width * 2, 2mm)
//! result = plate |> hole(5mm)
//! ```

pub mod ast;
pub mod capability;
mod error;
mod interpreter;
mod lexer;
mod parser;
mod validate;

pub use ast::{Position, Program};
pub use error::{ExecutionError, ValidationError};
pub use interpreter::{
    Artifact, ArtifactSelection, ExecutionLimits, RESULT_BINDING, Sandbox, TRAILING_EXPRESSION,
};
pub use parser::{MAX_DEPTH, parse_program};
pub use validate::{check_program, validate};
