//! Named chat templates used by [`crate::tokenizer::TemplateTokenizer`].

use std::{
    collections::BTreeMap,
    sync::{PoisonError, RwLock},
};

use once_cell::sync::Lazy;

use crate::{
    conversation::{ChatMessage, Role},
    error::{AdapterError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeparatorStyle {
    ChatMl,
    Llama3,
    Plain,
}

#[derive(Debug, Clone)]
pub struct ChatTemplate {
    pub name: String,
    /// Injected when the messages carry no system turn of their own.
    pub default_system_message: Option<String>,
    pub sep_style: SeparatorStyle,
    pub sep: String,
}

impl ChatTemplate {
    pub fn with_system_message<S: Into<String>>(mut self, system_message: S) -> Self {
        self.default_system_message = Some(system_message.into());
        self
    }

    pub fn render(&self, messages: &[ChatMessage], add_generation_prompt: bool) -> String {
        let has_system = messages.iter().any(|m| m.role == Role::System);
        let default_system = self
            .default_system_message
            .as_deref()
            .filter(|_| !has_system)
            .map(|content| ChatMessage::new(Role::System, content));
        let all = default_system.iter().chain(messages.iter());
        match self.sep_style {
            SeparatorStyle::ChatMl => render_chatml(all, add_generation_prompt),
            SeparatorStyle::Llama3 => render_llama3(all, add_generation_prompt),
            SeparatorStyle::Plain => self.render_plain(all),
        }
    }

    fn render_plain<'a>(&self, messages: impl Iterator<Item = &'a ChatMessage>) -> String {
        let mut buffer = String::new();
        for message in messages {
            let content = message.content.trim();
            if !content.is_empty() {
                buffer.push_str(content);
                buffer.push_str(&self.sep);
            }
        }
        buffer
    }
}

fn render_chatml<'a>(
    messages: impl Iterator<Item = &'a ChatMessage>,
    add_generation_prompt: bool,
) -> String {
    let mut buffer = String::new();
    for message in messages {
        buffer.push_str("<|im_start|>");
        buffer.push_str(message.role.as_str());
        buffer.push('\n');
        buffer.push_str(&message.content);
        buffer.push_str("<|im_end|>\n");
    }
    if add_generation_prompt {
        buffer.push_str("<|im_start|>assistant\n");
    }
    buffer
}

fn render_llama3<'a>(
    messages: impl Iterator<Item = &'a ChatMessage>,
    add_generation_prompt: bool,
) -> String {
    let mut buffer = String::from("<|begin_of_text|>");
    for message in messages {
        buffer.push_str("<|start_header_id|>");
        buffer.push_str(message.role.as_str());
        buffer.push_str("<|end_header_id|>\n\n");
        buffer.push_str(message.content.trim());
        buffer.push_str("<|eot_id|>");
    }
    if add_generation_prompt {
        buffer.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
    }
    buffer
}

static CHAT_TEMPLATES: Lazy<RwLock<BTreeMap<String, ChatTemplate>>> = Lazy::new(|| {
    let mut map = BTreeMap::new();
    for template in [chatml_template(), llama3_template(), plain_template()] {
        map.insert(template.name.clone(), template);
    }
    RwLock::new(map)
});

pub fn register_chat_template(template: ChatTemplate, override_existing: bool) -> Result<()> {
    let mut guard = CHAT_TEMPLATES
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    if !override_existing && guard.contains_key(&template.name) {
        return Err(AdapterError::Tokenizer(format!(
            "chat template `{}` has been registered",
            template.name
        )));
    }
    guard.insert(template.name.clone(), template);
    Ok(())
}

pub fn get_chat_template(name: &str) -> Option<ChatTemplate> {
    CHAT_TEMPLATES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .cloned()
}

fn chatml_template() -> ChatTemplate {
    ChatTemplate {
        name: "chatml".into(),
        default_system_message: None,
        sep_style: SeparatorStyle::ChatMl,
        sep: "<|im_end|>\n".into(),
    }
}

fn llama3_template() -> ChatTemplate {
    ChatTemplate {
        name: "llama3".into(),
        default_system_message: None,
        sep_style: SeparatorStyle::Llama3,
        sep: "<|eot_id|>".into(),
    }
}

fn plain_template() -> ChatTemplate {
    ChatTemplate {
        name: "plain".into(),
        default_system_message: None,
        sep_style: SeparatorStyle::Plain,
        sep: "\n".into(),
    }
}
