//! Rendering error types

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by the renderer core
///
/// Everything here is a setup or programming error that propagates to the
/// host application's startup code; nothing is retried.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A shader stage failed to compile
    #[error("{stage} shader failed to compile:\n{log}")]
    CompileFailed {
        /// Stage name (`vertex`, `fragment`, `geometry`)
        stage: &'static str,
        /// Compiler info log, verbatim
        log: String,
    },

    /// A program failed to link
    #[error("Program failed to link:\n{log}")]
    LinkFailed {
        /// Linker info log, verbatim
        log: String,
    },

    /// Every binding point of a pool is leased
    #[error("All {capacity} binding points are in use")]
    BindingPointsExhausted {
        /// Pool size
        capacity: u32,
    },

    /// A shader block names a dependency that is not registered
    #[error("No renderer dependency is registered for block '{name}'")]
    UnknownDependency {
        /// Block name as declared in GLSL
        name: String,
    },

    /// A structured buffer has no field with this name
    #[error("'{buffer}' has no field '{field}'")]
    UnknownField {
        /// Buffer or dependency name
        buffer: String,
        /// Requested field
        field: String,
    },

    /// An element range does not fit the buffer
    #[error("Range {start}..{end} is out of bounds for length {len}")]
    OutOfRange {
        /// First element
        start: usize,
        /// One past the last element
        end: usize,
        /// Buffer length in elements
        len: usize,
    },

    /// The number of supplied values does not match the target range
    #[error("Expected {expected} values, got {actual}")]
    LengthMismatch {
        /// Values the range holds
        expected: usize,
        /// Values supplied
        actual: usize,
    },

    /// A structure layout is unusable
    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    /// The driver reported an attribute location outside the active range
    #[error("Attribute '{name}' has location {location} but only {count} attributes are active")]
    InvalidAttributeLocation {
        /// Attribute name
        name: String,
        /// Reported location
        location: u32,
        /// Active attribute count
        count: usize,
    },

    /// A device object handle is unknown or was deleted
    #[error("Invalid {kind} handle {id}")]
    InvalidHandle {
        /// Object kind
        kind: &'static str,
        /// Raw handle value
        id: u64,
    },

    /// A batch or chain pass targets a stage without a framebuffer
    #[error("Pass {pass} cannot draw into stage {target}: {reason}")]
    InvalidStageTarget {
        /// Drawing pass index
        pass: usize,
        /// Target stage index
        target: usize,
        /// Why the target is unusable
        reason: &'static str,
    },

    /// A uniform value does not match the uniform's GLSL type
    #[error("Uniform '{name}' of type {expected} cannot take {actual}")]
    UniformTypeMismatch {
        /// Uniform name
        name: String,
        /// GLSL type name
        expected: &'static str,
        /// Description of the supplied value
        actual: String,
    },

    /// An active uniform has no location in the linked program
    #[error("Uniform '{name}' has no location")]
    UnknownUniform {
        /// Uniform name
        name: String,
    },

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
