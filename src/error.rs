//! Error types for the capture pipeline

use thiserror::Error;

/// Result type alias for capture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while capturing a page
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Another controller already holds the channel to this target
    #[error("Channel to target {0} is busy")]
    ChannelBusy(String),

    /// Could not attach to the target (permission denied, target gone)
    #[error("Failed to attach: {0}")]
    Attach(String),

    /// A control command failed
    #[error("Protocol command {command} failed: {message}")]
    Protocol { command: String, message: String },

    /// Nothing was captured, so there is nothing to composite
    #[error("Capture produced no tiles")]
    EmptyCapture,

    /// Tiles were captured at a different scale than the one used to recombine them
    #[error("Inconsistent device scale: expected tile width {expected}px, found {found}px")]
    InconsistentScale { expected: u32, found: u32 },

    /// Selection rectangle is empty or malformed
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// A selection session is already active on this page view
    #[error("A selection is already active on {0}")]
    SelectionActive(String),

    /// The artifact could not be stored
    #[error("Failed to persist artifact: {0}")]
    ArtifactPersist(String),

    /// Raster decode or encode failure
    #[error("Image error: {0}")]
    Image(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn protocol(command: impl Into<String>, message: impl ToString) -> Self {
        Error::Protocol {
            command: command.into(),
            message: message.to_string(),
        }
    }

    /// Stable, machine-readable tag for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ChannelBusy(_) => "channel_busy",
            Error::Attach(_) => "attach",
            Error::Protocol { .. } => "protocol",
            Error::EmptyCapture => "empty_capture",
            Error::InconsistentScale { .. } => "inconsistent_scale",
            Error::InvalidSelection(_) => "invalid_selection",
            Error::SelectionActive(_) => "selection_active",
            Error::ArtifactPersist(_) => "artifact_persist",
            Error::Image(_) => "image",
            Error::Config(_) => "config",
            Error::Other(_) => "other",
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_names_command() {
        let e = Error::protocol("Page.captureScreenshot", "target closed");
        assert_eq!(
            e.to_string(),
            "Protocol command Page.captureScreenshot failed: target closed"
        );
        assert_eq!(e.kind(), "protocol");
    }

    #[test]
    fn busy_kind_is_stable() {
        assert_eq!(Error::ChannelBusy("tab-1".into()).kind(), "channel_busy");
    }
}
