//! Role-tagged conversation records exchanged with the surrounding dialogue layer.

mod history;

use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, Result};

pub use history::{PairedHistory, extract_paired_history, inline_image_placeholders};

/// Textual marker standing in for an image inside a prompt.
pub const IMAGE_PLACEHOLDER: &str = "<image>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = AdapterError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(AdapterError::malformed(format!(
                "invalid role `{other}`, expected `user`, `system` or `assistant`"
            ))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an [`ImageReference`] points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource<'a> {
    Url(&'a str),
    Path(&'a Path),
}

/// A local path or an `http(s)` URL. Nothing is resolved until tiling runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageReference(String);

impl ImageReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn source(&self) -> ImageSource<'_> {
        if self.0.starts_with("http://") || self.0.starts_with("https://") {
            ImageSource::Url(&self.0)
        } else {
            ImageSource::Path(Path::new(&self.0))
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageReference {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The `image` field of a turn: one reference or an ordered list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageField {
    Single(ImageReference),
    Many(Vec<ImageReference>),
}

impl ImageField {
    pub fn references(&self) -> &[ImageReference] {
        match self {
            ImageField::Single(reference) => std::slice::from_ref(reference),
            ImageField::Many(references) => references,
        }
    }
}

/// One conversation turn as produced by the dialogue layer.
///
/// The role is kept as the wire string so that each prompt convention reports
/// an unexpected role itself, at the point it walks the turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageField>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role: role.as_str().to_owned(),
            content: content.into(),
            image: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_image(mut self, reference: impl Into<String>) -> Self {
        self.image = Some(ImageField::Single(ImageReference::new(reference)));
        self
    }

    pub fn with_images<I, S>(mut self, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let references = references.into_iter().map(ImageReference::new).collect();
        self.image = Some(ImageField::Many(references));
        self
    }

    pub fn role(&self) -> Result<Role> {
        self.role.parse()
    }

    pub fn images(&self) -> &[ImageReference] {
        self.image.as_ref().map(ImageField::references).unwrap_or(&[])
    }
}

/// Parse a JSON array of turn records.
pub fn parse_conversation(json: &str) -> Result<Vec<ConversationTurn>> {
    serde_json::from_str(json)
        .map_err(|err| AdapterError::malformed(format!("conversation is not valid JSON: {err}")))
}

/// Chat message handed to the tokenizer capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}
