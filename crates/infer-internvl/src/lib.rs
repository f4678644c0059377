pub mod adapter;
pub mod prompt;

pub use adapter::InternVlAdapter;
pub use prompt::{IMG_CONTEXT_TOKEN, IMG_END_TOKEN, IMG_START_TOKEN, NUM_IMAGE_TOKEN};
