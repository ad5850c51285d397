/// Convenience result type used across the engine.
pub type RenderResult<T> = Result<T, RenderError>;

/// Error taxonomy of a render call. Every variant is fatal to the current render.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// Malformed or empty container.
    #[error("parse error: {0}")]
    Parse(String),

    /// The container has no track of the required kind.
    #[error("missing track: {0}")]
    MissingTrack(String),

    /// A sample could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// No encoder configuration candidate was accepted.
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// The encoder failed or produced an unusable bitstream.
    #[error("encode error: {0}")]
    Encode(String),

    /// The output container could not be assembled.
    #[error("mux error: {0}")]
    Mux(String),

    /// Invalid caller-provided options, style or cue data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RenderError {
    /// Build a [`RenderError::Parse`] value.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Build a [`RenderError::MissingTrack`] value.
    pub fn missing_track(msg: impl Into<String>) -> Self {
        Self::MissingTrack(msg.into())
    }

    /// Build a [`RenderError::Decode`] value.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build a [`RenderError::UnsupportedCodec`] value.
    pub fn unsupported_codec(msg: impl Into<String>) -> Self {
        Self::UnsupportedCodec(msg.into())
    }

    /// Build a [`RenderError::Encode`] value.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Build a [`RenderError::Mux`] value.
    pub fn mux(msg: impl Into<String>) -> Self {
        Self::Mux(msg.into())
    }

    /// Build a [`RenderError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<std::io::Error> for RenderError {
    fn from(err: std::io::Error) -> Self {
        Self::Other(anyhow::Error::new(err))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
