//! Error types for the display core
//!
//! Errors fall into three groups. Resource errors (shader compilation, program
//! linking, GPU allocation, required uniforms) and configuration errors (a
//! drawable missing mandatory state, a core of the wrong type) are fatal for
//! the current render call. Context loss is transient: the display resets and
//! rebuilds on the next frame.

use crate::render::gl::ShaderStage;

/// Errors raised by the display core
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    /// A shader failed to compile
    #[error("{stage:?} shader failed to compile: {log}")]
    ShaderCompile {
        /// Stage that failed
        stage: ShaderStage,
        /// Compiler info log
        log: String,
    },

    /// A program failed to link
    #[error("Program {program} failed to link: {log}")]
    ProgramLink {
        /// Display-level program id
        program: u32,
        /// Linker info log
        log: String,
    },

    /// A uniform declared as required was not found in the linked program
    #[error("Program {program} is missing required uniform {name}")]
    MissingUniform {
        /// Display-level program id
        program: u32,
        /// Uniform name
        name: String,
    },

    /// GPU resource creation failed (buffers, textures, framebuffers)
    #[error("Resource creation failed: {0}")]
    ResourceCreation(String),

    /// The scene handed the display incomplete or inconsistent state
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The graphics context was lost; the pass was abandoned
    #[error("Graphics context lost")]
    ContextLost,

    /// No object with this id exists in the display
    #[error("Unknown object: {0}")]
    UnknownObject(String),

    /// A core handle does not refer to a live core
    #[error("Unknown or released core handle")]
    UnknownCore,

    /// A shared registry lock was poisoned by a panicking thread
    #[error("Shared registry poisoned: {0}")]
    RegistryPoisoned(&'static str),
}

impl RenderError {
    /// Whether the error terminates the current render call
    ///
    /// Everything except context loss is fatal. Context loss is recovered by
    /// rebuilding on the next frame.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ContextLost)
    }
}

/// Result type for display operations
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_context_loss_is_transient() {
        assert!(!RenderError::ContextLost.is_fatal());
        assert!(RenderError::Configuration("no geometry".into()).is_fatal());
        assert!(RenderError::ShaderCompile {
            stage: ShaderStage::Fragment,
            log: "syntax error".into(),
        }
        .is_fatal());
    }

    #[test]
    fn test_messages_carry_details() {
        let err = RenderError::MissingUniform {
            program: 3,
            name: "u_pickColor".into(),
        };
        assert_eq!(err.to_string(), "Program 3 is missing required uniform u_pickColor");
    }
}
