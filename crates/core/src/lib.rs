pub mod adapter;
pub mod conversation;
pub mod error;
pub mod inference;
pub mod layout;
pub mod runtime;
pub mod template;
pub mod tokenizer;
pub mod vision;

pub use adapter::{
    BackendKind, CallContext, ChatTokenizer, GenerationRequest, GenerativeModel, ModelResponse,
    MultimodalAdapter, PreparedInput, Prompt,
};
pub use conversation::{ChatMessage, ConversationTurn, ImageReference, Role, parse_conversation};
pub use error::{AdapterError, Result};
pub use inference::{decode_continuation, input_ids_tensor, normalize_text};
pub use layout::{DeviceLayoutMap, ModelSize, plan_device_layout};
pub use vision::{ImageTilingPipeline, TilingConfig, TilingGrid};
