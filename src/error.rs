//! Errors raised while building, driving and tuning the compute pipeline.
//!
//! Startup failures (`Allocation`, `ShaderModule`, `Compile`, `Config`) and `Submission` are
//! fatal: the frame loop never recovers from them. Everything raised by a
//! parameter write or preset switch is recoverable and leaves the registry
//! exactly as it was before the call.

use thiserror::Error;

use crate::params::ElementType;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to allocate `{label}`: {reason}")]
    Allocation { label: String, reason: String },

    #[error("compute program `{program}` failed to compile: {reason}")]
    ShaderModule { program: String, reason: String },

    #[error("compute program failed to bind for stage `{stage}`: {reason}")]
    Compile { stage: String, reason: String },

    #[error("value for `{name}` does not fit {expected}: {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("unknown preset `{0}`")]
    UnknownPreset(String),

    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),

    #[error("parameter `{0}` is already registered")]
    DuplicateParameter(String),

    #[error("cannot register `{0}`: the resource layout has already been built")]
    RegistrySealed(String),

    #[error("parameter `{0}` is owned by the orchestrator and cannot be set externally")]
    LockedParameter(String),

    #[error("the reset stage has already been dispatched")]
    AlreadyPrimed,

    #[error("tick called before prime")]
    NotPrimed,

    #[error("queue submission failed: {0}")]
    Submission(String),

    #[error("buffer readback failed: {0}")]
    Readback(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn allocation(label: impl Into<String>, reason: impl ToString) -> Self {
        Error::Allocation {
            label: label.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn compile(stage: impl Into<String>, reason: impl ToString) -> Self {
        Error::Compile {
            stage: stage.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn shader_module(program: impl Into<String>, reason: impl ToString) -> Self {
        Error::ShaderModule {
            program: program.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn mismatch(
        name: &str,
        element_type: ElementType,
        components: usize,
        found: impl ToString,
    ) -> Self {
        let expected = if components == 1 {
            element_type.to_string()
        } else {
            format!("vec{}<{}>", components, element_type)
        };
        Error::TypeMismatch {
            name: name.to_owned(),
            expected,
            found: found.to_string(),
        }
    }

    /// Whether the error means the pipeline cannot keep running.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Allocation { .. }
                | Error::ShaderModule { .. }
                | Error::Compile { .. }
                | Error::Submission(_)
                | Error::Config(_)
                | Error::Io(_)
                | Error::Json(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_fatal_errors() {
        assert!(Error::allocation("pixels", "out of memory").is_fatal());
        assert!(Error::compile("fade", "missing entry point").is_fatal());
        assert!(Error::shader_module("compute.wgsl", "parse error").is_fatal());
        assert!(Error::Submission("device lost".into()).is_fatal());
        assert!(!Error::UnknownPreset("nope".into()).is_fatal());
        assert!(!Error::mismatch("count", ElementType::U32, 1, -1.0).is_fatal());
        assert!(!Error::AlreadyPrimed.is_fatal());
    }

    #[test]
    fn mismatch_names_vector_shape() {
        let err = Error::mismatch("offset", ElementType::F32, 2, "3 components");
        assert_eq!(
            err.to_string(),
            "value for `offset` does not fit vec2<f32>: 3 components"
        );
    }
}
