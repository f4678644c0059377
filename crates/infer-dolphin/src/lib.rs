pub mod adapter;
pub mod splice;

pub use adapter::{DolphinAdapter, MAX_NEW_TOKENS};
pub use splice::{IMAGE_TOKEN_INDEX, splice_image_marker};
