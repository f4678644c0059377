//! The contract every model family implements, and the external capabilities
//! it talks to.

use std::fmt;

use anyhow::anyhow;
use candle_core::{DType, Device, Tensor};
use clap::ValueEnum;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::{
    conversation::{ChatMessage, ConversationTurn, ImageReference, Role},
    error::{AdapterError, Result},
    vision::FetchOptions,
};

/// Configuration value selecting a [`MultimodalAdapter`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[value(name = "internvl2")]
    #[serde(rename = "internvl2")]
    InternVl2,
    DolphinVision,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::InternVl2 => "internvl2",
            BackendKind::DolphinVision => "dolphin-vision",
        })
    }
}

/// Settings that belong to a single call.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub device: Device,
    pub dtype: DType,
    pub max_new_tokens: usize,
    pub use_cache: bool,
    /// `None` leaves log suppression to the adapter's own default.
    pub quiet: Option<bool>,
    pub fetch: FetchOptions,
}

impl Default for CallContext {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            dtype: DType::F32,
            max_new_tokens: 512,
            use_cache: true,
            quiet: None,
            fetch: FetchOptions::default(),
        }
    }
}

/// Backend-specific prompt skeleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prompt {
    Paired {
        history: Vec<(String, String)>,
        query: String,
    },
    Messages { messages: Vec<ChatMessage> },
}

impl Prompt {
    /// Flatten into chat messages, pairs first, query last.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        match self {
            Prompt::Paired { history, query } => {
                let mut messages = Vec::with_capacity(history.len() * 2 + 1);
                for (user, assistant) in history {
                    messages.push(ChatMessage::new(Role::User, user.clone()));
                    messages.push(ChatMessage::new(Role::Assistant, assistant.clone()));
                }
                messages.push(ChatMessage::new(Role::User, query.clone()));
                messages
            }
            Prompt::Messages { messages } => messages.clone(),
        }
    }
}

/// Output of [`MultimodalAdapter::prepare_inputs`], owned by its caller.
#[derive(Debug, Clone)]
pub struct PreparedInput {
    pub prompt: Prompt,
    pub images: Vec<ImageReference>,
    pub context: CallContext,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelResponse {
    pub raw: serde_json::Value,
    pub text: String,
}

impl ModelResponse {
    pub fn from_text(text: String) -> Self {
        Self {
            raw: serde_json::json!({ "response": text }),
            text,
        }
    }
}

/// Template rendering and tokenization, provided by the model's tokenizer.
pub trait ChatTokenizer {
    fn render_chat(&self, messages: &[ChatMessage], add_generation_prompt: bool)
    -> Result<String>;

    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String>;

    fn token_to_id(&self, token: &str) -> Option<u32>;

    fn tokenize_chat(
        &self,
        messages: &[ChatMessage],
        add_generation_prompt: bool,
    ) -> Result<Vec<u32>> {
        let text = self.render_chat(messages, add_generation_prompt)?;
        self.encode(&text)
    }
}

/// Inputs for one generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// `[1, seq]` i64 ids on the call's device.
    pub input_ids: &'a Tensor,
    pub pixel_values: Option<&'a Tensor>,
    pub max_new_tokens: usize,
    pub use_cache: bool,
    pub quiet: bool,
}

/// Forward/generate computation of the loaded model.
pub trait GenerativeModel {
    /// Returns the prompt ids followed by the generated continuation.
    fn generate(&self, request: GenerationRequest<'_>) -> anyhow::Result<Vec<i64>>;

    /// Model-specific image encoding used by backends that bypass tiling.
    fn encode_images(
        &self,
        _images: &[DynamicImage],
        _device: &Device,
        _dtype: DType,
    ) -> anyhow::Result<Tensor> {
        Err(anyhow!("this model does not provide an image encoder"))
    }
}

pub trait MultimodalAdapter: Send + Sync {
    fn id(&self) -> &'static str;

    fn kind(&self) -> BackendKind;

    /// Pure transformation of the conversation; the model is never invoked.
    fn prepare_inputs(
        &self,
        conversation: &[ConversationTurn],
        context: &CallContext,
    ) -> Result<PreparedInput>;

    /// Token ids for `prompt`, used to measure context-window usage.
    fn get_tokens(
        &self,
        prompt: &Prompt,
        tokenizer: &dyn ChatTokenizer,
        context: &CallContext,
    ) -> Result<Vec<u32>>;

    fn generate_outputs(
        &self,
        prompt: &Prompt,
        images: &[ImageReference],
        model: &dyn GenerativeModel,
        tokenizer: &dyn ChatTokenizer,
        context: &CallContext,
    ) -> Result<ModelResponse>;

    /// Convenience wrapper feeding a [`PreparedInput`] back into generation.
    fn generate_prepared(
        &self,
        prepared: &PreparedInput,
        model: &dyn GenerativeModel,
        tokenizer: &dyn ChatTokenizer,
    ) -> Result<ModelResponse> {
        self.generate_outputs(
            &prepared.prompt,
            &prepared.images,
            model,
            tokenizer,
            &prepared.context,
        )
    }
}

pub fn wrong_prompt(adapter: &str, expected: &str) -> AdapterError {
    AdapterError::MalformedConversation(format!("{adapter} expects a {expected} prompt"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paired_prompt_flattens_in_order() {
        let prompt = Prompt::Paired {
            history: vec![("A".into(), "B".into())],
            query: "C".into(),
        };
        let messages = prompt.to_messages();
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant, Role::User]);
        assert_eq!(messages[2].content, "C");
    }

    #[test]
    fn response_raw_mirrors_text() {
        let response = ModelResponse::from_text("hi".into());
        assert_eq!(response.raw["response"], "hi");
    }

    #[test]
    fn backend_kind_round_trips_through_serde() {
        let json = serde_json::to_string(&BackendKind::DolphinVision).unwrap();
        assert_eq!(json, "\"dolphin-vision\"");
        let kind: BackendKind = serde_json::from_str("\"internvl2\"").unwrap();
        assert_eq!(kind, BackendKind::InternVl2);
    }
}
