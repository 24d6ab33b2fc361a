use thiserror::Error;

/// Errors raised while bringing up or driving the monitor.
#[derive(Debug, Error)]
pub enum GuardianError {
    #[error("invalid config: {0}")]
    Config(String),

    #[error("camera {0} could not be opened")]
    CameraUnavailable(i32),

    #[error("failed to load landmark model: {0}")]
    Model(String),

    #[error("landmark inference failed: {0}")]
    Inference(String),

    #[error("audio error: {0}")]
    Audio(String),

    #[error("penalty video unavailable: {0}")]
    VideoOpen(String),

    #[error("display error: {0}")]
    Display(String),

    #[error("opencv: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("config write: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, GuardianError>;
