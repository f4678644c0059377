use std::path::Path;

use tokenizers::Tokenizer;

use crate::{
    adapter::ChatTokenizer,
    conversation::ChatMessage,
    error::{AdapterError, Result},
    template::{ChatTemplate, get_chat_template},
};

/// [`ChatTokenizer`] backed by a `tokenizer.json` and a registered template.
pub struct TemplateTokenizer {
    tokenizer: Tokenizer,
    template: ChatTemplate,
}

impl TemplateTokenizer {
    pub fn new(tokenizer: Tokenizer, template: ChatTemplate) -> Self {
        Self {
            tokenizer,
            template,
        }
    }

    pub fn from_file(path: &Path, template: &str) -> Result<Self> {
        let template = get_chat_template(template).ok_or_else(|| {
            AdapterError::Tokenizer(format!("unknown chat template `{template}`"))
        })?;
        let tokenizer = Tokenizer::from_file(path).map_err(|err| {
            AdapterError::Tokenizer(format!(
                "failed to load tokenizer from {}: {err}",
                path.display()
            ))
        })?;
        Ok(Self::new(tokenizer, template))
    }

    pub fn template(&self) -> &ChatTemplate {
        &self.template
    }
}

impl ChatTokenizer for TemplateTokenizer {
    fn render_chat(&self, messages: &[ChatMessage], add_generation_prompt: bool) -> Result<String> {
        Ok(self.template.render(messages, add_generation_prompt))
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|err| AdapterError::Tokenizer(format!("tokenization failed: {err}")))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.tokenizer
            .decode(ids, skip_special_tokens)
            .map_err(|err| AdapterError::Tokenizer(format!("decoding failed: {err}")))
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }
}
