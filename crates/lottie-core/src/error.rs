use thiserror::Error;

use crate::compiled::CompatibilityReport;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("keyframe group is empty")]
    EmptyKeyframes,

    #[error("keyframe times must increase strictly: {previous} then {next}")]
    UnorderedKeyframes { previous: f32, next: f32 },

    #[error("gradient declares {stops} stops but carries only {len} numbers")]
    MalformedGradient { stops: usize, len: usize },

    #[error("animation is not supported by the compiled strategy ({} issue(s))", .0.issues.len())]
    Unsupported(CompatibilityReport),

    #[error("timed out after {0:?} waiting for the surface")]
    Timeout(std::time::Duration),

    #[error("the surface dropped the request without replying")]
    Disconnected,

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("frame rate must be positive, got {0}")]
    InvalidFramerate(f32),

    #[error("timeline has {keys} key times, {values} values and {easings} easings")]
    MalformedTimeline {
        keys: usize,
        values: usize,
        easings: usize,
    },

    #[error("surface has no handle {0}")]
    MissingHandle(usize),
}

pub type Result<T> = std::result::Result<T, EngineError>;
