use thiserror::Error;

/// Fatal pipeline conditions.
///
/// Every variant is non-recoverable for the object that reported it: the
/// caller discards the session or presenter and, if desired, constructs a
/// fresh one. End of stream is not an error and never surfaces here.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// One-time setup failed (hardware device, input stream, decoder,
    /// window, GL context, or shader program).
    #[error("initialization failed: {0}")]
    Init(String),

    /// The hardware decoder reported a hard failure retrieving a frame.
    #[error("hardware decode failed: {0}")]
    Decode(String),

    /// A decoded frame's exported layout does not match the supported
    /// two-plane 4:2:0 format.
    #[error("unsupported frame layout: {0}")]
    Format(String),

    /// A GPU step failed during presentation; the presenter is unusable.
    #[error("presentation failed: {0}")]
    Present(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = PipelineError::Format("3 layers, expected 2".into());
        assert_eq!(err.to_string(), "unsupported frame layout: 3 layers, expected 2");
    }
}
