use thiserror::Error;

/// All errors produced by soundlevel-core.
#[derive(Debug, Error)]
pub enum SoundLevelError {
    #[error("no compatible capture format found")]
    NoCompatibleFormat,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("analysis window has {actual} samples, engine expects {expected}")]
    WindowLength { expected: usize, actual: usize },

    #[error("engine session already started")]
    AlreadyStarted,

    #[error("engine session is closed; create a new engine")]
    SessionClosed,

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("capture source lost: {0}")]
    CaptureLost(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SoundLevelError>;
