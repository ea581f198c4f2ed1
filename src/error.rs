pub type SlidecastResult<T> = Result<T, SlidecastError>;

#[derive(thiserror::Error, Debug)]
pub enum SlidecastError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("synthesis error: {0}")]
    Synthesis(String),

    #[error("no supported encoder configuration: {0}")]
    EncoderUnsupported(String),

    #[error("encoder error: {0}")]
    EncoderRuntime(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SlidecastError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::Synthesis(msg.into())
    }

    pub fn encoder_unsupported(msg: impl Into<String>) -> Self {
        Self::EncoderUnsupported(msg.into())
    }

    pub fn encoder_runtime(msg: impl Into<String>) -> Self {
        Self::EncoderRuntime(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            SlidecastError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            SlidecastError::synthesis("x")
                .to_string()
                .contains("synthesis error:")
        );
        assert!(
            SlidecastError::encoder_unsupported("x")
                .to_string()
                .contains("no supported encoder configuration:")
        );
        assert!(
            SlidecastError::encoder_runtime("x")
                .to_string()
                .contains("encoder error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = SlidecastError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
