use thiserror::Error;

/// Errors from the line-oriented playlist parsers.
#[derive(Debug, Error)]
pub enum PlaylistError {
    /// A recognized tag carried a value that does not parse.
    #[error("invalid {tag} value `{value}`")]
    InvalidValue { tag: &'static str, value: String },

    /// `#EXTINF` without the duration/title separator.
    #[error("malformed #EXTINF line: `{0}`")]
    MalformedExtInf(String),
}

impl PlaylistError {
    pub fn invalid_value(tag: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            tag,
            value: value.into(),
        }
    }
}

/// Detail behind a terminal pipeline state. The pipeline's `update()`
/// surfaces failures as sink states; the matching `PipelineError` is kept
/// for diagnostics via `last_error()`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Opening or reading an upstream resource failed, or it was empty.
    #[error("failed to fetch `{url}`: {reason}")]
    Fetch { url: String, reason: &'static str },

    /// A playlist did not parse.
    #[error("playlist error: {0}")]
    Playlist(#[from] PlaylistError),

    /// A playlist or segment URI did not resolve.
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),

    /// The master playlist listed no renditions.
    #[error("master playlist has no renditions")]
    NoRenditions,

    /// The demuxer reported a non-recoverable error mid-segment.
    #[error("demux error: {0}")]
    Demux(#[from] ts::TsError),

    /// Pipeline state that should be unreachable.
    #[error("internal pipeline error: {0}")]
    Internal(&'static str),
}
