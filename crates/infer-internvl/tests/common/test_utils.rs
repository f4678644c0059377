#![allow(dead_code)]

use std::{
    cell::RefCell,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use image::{DynamicImage, Rgb, RgbImage};
use mmbridge_core::{
    adapter::{ChatTokenizer, GenerationRequest, GenerativeModel},
    conversation::ChatMessage,
    template::{ChatTemplate, get_chat_template},
};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{Layer, layer::Context as LayerContext};

/// One id per character, rendered through the registered ChatML template.
pub struct CharTokenizer {
    template: ChatTemplate,
}

impl CharTokenizer {
    pub fn new() -> Self {
        Self {
            template: get_chat_template("chatml").expect("chatml is built in"),
        }
    }
}

impl ChatTokenizer for CharTokenizer {
    fn render_chat(
        &self,
        messages: &[ChatMessage],
        add_generation_prompt: bool,
    ) -> mmbridge_core::Result<String> {
        Ok(self.template.render(messages, add_generation_prompt))
    }

    fn encode(&self, text: &str) -> mmbridge_core::Result<Vec<u32>> {
        Ok(text.chars().map(u32::from).collect())
    }

    fn decode(&self, ids: &[u32], _skip_special_tokens: bool) -> mmbridge_core::Result<String> {
        Ok(ids.iter().filter_map(|&id| char::from_u32(id)).collect())
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        let mut chars = token.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(u32::from(c)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub input_ids: Vec<i64>,
    pub pixel_dims: Option<Vec<usize>>,
    pub pixel_dtype: Option<DType>,
    pub max_new_tokens: usize,
    pub use_cache: bool,
    pub quiet: bool,
}

/// Echoes the prompt and appends a fixed reply.
pub struct ScriptedModel {
    reply: String,
    pub calls: RefCell<Vec<RecordedCall>>,
    pub encoded_batches: RefCell<Vec<usize>>,
}

impl ScriptedModel {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_owned(),
            calls: RefCell::new(Vec::new()),
            encoded_batches: RefCell::new(Vec::new()),
        }
    }

    pub fn last_call(&self) -> RecordedCall {
        self.calls
            .borrow()
            .last()
            .cloned()
            .expect("model was invoked")
    }
}

impl GenerativeModel for ScriptedModel {
    fn generate(&self, request: GenerationRequest<'_>) -> Result<Vec<i64>> {
        tracing::warn!(quiet = request.quiet, "scripted model is not a real checkpoint");
        let input_ids = request
            .input_ids
            .squeeze(0)?
            .to_vec1::<i64>()
            .context("input ids must be a [1, seq] i64 tensor")?;
        self.calls.borrow_mut().push(RecordedCall {
            input_ids: input_ids.clone(),
            pixel_dims: request.pixel_values.map(|p| p.dims().to_vec()),
            pixel_dtype: request.pixel_values.map(|p| p.dtype()),
            max_new_tokens: request.max_new_tokens,
            use_cache: request.use_cache,
            quiet: request.quiet,
        });
        let mut output = input_ids;
        output.extend(self.reply.chars().map(|c| i64::from(u32::from(c))));
        Ok(output)
    }

    fn encode_images(
        &self,
        images: &[DynamicImage],
        device: &Device,
        _dtype: DType,
    ) -> Result<Tensor> {
        tracing::info!(images = images.len(), "scripted image encoder");
        self.encoded_batches.borrow_mut().push(images.len());
        Ok(Tensor::zeros((images.len(), 3, 4, 4), DType::F32, device)?)
    }
}

/// Text view of recorded ids; synthetic negative markers are skipped.
pub fn ids_to_text(ids: &[i64]) -> String {
    ids.iter()
        .filter_map(|&id| u32::try_from(id).ok())
        .filter_map(char::from_u32)
        .collect()
}

pub fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let path = dir.join(name);
    image.save(&path).expect("write test image");
    path
}

/// Host-side layer recording the level and target of every event.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<(Level, String)>>>);

impl EventLog {
    pub fn snapshot(&self) -> Vec<(Level, String)> {
        self.0.lock().expect("event log lock").clone()
    }

    pub fn count(&self, level: Level, target_prefix: &str) -> usize {
        self.snapshot()
            .iter()
            .filter(|(l, target)| *l == level && target.starts_with(target_prefix))
            .count()
    }

    pub fn saw_model(&self) -> bool {
        self.snapshot()
            .iter()
            .any(|(_, target)| target.ends_with("test_utils"))
    }
}

impl<S: Subscriber> Layer<S> for EventLog {
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let metadata = event.metadata();
        self.0
            .lock()
            .expect("event log lock")
            .push((*metadata.level(), metadata.target().to_owned()));
    }
}
