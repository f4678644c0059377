use thiserror::Error;

/// Errors surfaced while adapting a conversation for a multimodal model.
///
/// Every variant aborts the current turn; nothing in this crate retries.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("malformed conversation: {0}")]
    MalformedConversation(String),
    #[error("failed to load image `{reference}`: {reason}")]
    ImageLoad { reference: String, reason: String },
    #[error(
        "invalid tiling constraint: min_tiles={min_tiles}, max_tiles={max_tiles}, tile_size={tile_size}"
    )]
    InvalidTilingConstraint {
        min_tiles: u32,
        max_tiles: u32,
        tile_size: u32,
    },
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("unknown model size `{0}`")]
    UnknownModelSize(String),
    #[error("device layout needs at least one compute unit, got {0}")]
    InvalidDeviceCount(usize),
    #[error("internal consistency violated: {0}")]
    InternalConsistency(String),
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl AdapterError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedConversation(message.into())
    }

    pub(crate) fn image_load(reference: impl Into<String>, reason: impl ToString) -> Self {
        Self::ImageLoad {
            reference: reference.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result alias for adapter operations.
pub type Result<T> = std::result::Result<T, AdapterError>;
