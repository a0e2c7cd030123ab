use crate::program::{Attribute, ProgramKind, Uniform};

/// Failures raised by the bloom pipeline and the backends it drives.
///
/// Setup failures (compilation, missing bindings) are fatal: the pipeline
/// never starts. The binding and handle variants flag programming errors and
/// abort the frame that hit them.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to compile {program} program: {message}")]
    ShaderCompile {
        program: ProgramKind,
        message: String,
    },
    #[error("{program} program does not declare uniform `{uniform}`")]
    MissingUniform {
        program: ProgramKind,
        uniform: Uniform,
    },
    #[error("{program} program does not declare attribute `{attribute}`")]
    MissingAttribute {
        program: ProgramKind,
        attribute: Attribute,
    },
    #[error("uniform `{uniform}` is not part of the {program} program binding table")]
    UnboundUniform {
        program: ProgramKind,
        uniform: Uniform,
    },
    #[error("attribute `{attribute}` is not part of the {program} program binding table")]
    UnboundAttribute {
        program: ProgramKind,
        attribute: Attribute,
    },
    #[error("attribute `{attribute}` expects {expected} components, got {actual}")]
    AttributeMismatch {
        attribute: Attribute,
        expected: u32,
        actual: u32,
    },
    #[error("draw supplies no vertex buffer for input location {location} of the {program} program")]
    MissingVertexStream { program: ProgramKind, location: u32 },
    #[error("uniform `{uniform}` received a value of the wrong type")]
    UniformType { uniform: Uniform },
    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u32 },
    #[error("render targets have not been allocated")]
    TargetsNotAllocated,
    #[error("render surface must be at least 1x1, requested {width}x{height}")]
    InvalidSurfaceSize { width: u32, height: u32 },
    #[error("draw issued outside of a frame")]
    NoFrameInFlight,
    #[error("surface error: {0}")]
    Surface(String),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_uniform_names_program_and_uniform() {
        let err = PipelineError::MissingUniform {
            program: ProgramKind::BrightPass,
            uniform: Uniform::MinBright,
        };
        assert_eq!(
            err.to_string(),
            "bright-pass program does not declare uniform `minBright`"
        );
    }

    #[test]
    fn invalid_surface_size_display() {
        let err = PipelineError::InvalidSurfaceSize {
            width: 0,
            height: 3,
        };
        assert_eq!(
            err.to_string(),
            "render surface must be at least 1x1, requested 0x3"
        );
    }
}
