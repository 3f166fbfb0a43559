use thiserror::Error;

use crate::frame::FrameShape;

/// Failure causes the pipeline reports to its caller.
///
/// Reaching the end of a source is not an error; it ends the stream with
/// `StreamStatus::Completed`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    /// Pulling a frame failed (device disconnected, corrupt file).
    #[error("frame source unavailable: {0}")]
    SourceUnavailable(String),

    /// A single detection call failed.
    #[error("model invocation failed on frame {shape}: {reason}")]
    ModelInvocation { shape: FrameShape, reason: String },

    /// Detection kept failing and the stream was aborted.
    #[error("model unavailable after {consecutive_failures} consecutive failures: {last_error}")]
    ModelUnavailable {
        consecutive_failures: u32,
        last_error: String,
    },

    /// The display or recording sink rejected a frame.
    #[error("sink write failed: {0}")]
    SinkWrite(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn model_invocation(shape: FrameShape, reason: impl Into<String>) -> Self {
        Self::ModelInvocation {
            shape,
            reason: reason.into(),
        }
    }

    pub fn sink_write(err: &anyhow::Error) -> Self {
        Self::SinkWrite(format!("{:#}", err))
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
