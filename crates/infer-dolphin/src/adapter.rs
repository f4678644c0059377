use image::DynamicImage;
use mmbridge_core::{
    adapter::{
        BackendKind, CallContext, ChatTokenizer, GenerationRequest, GenerativeModel,
        ModelResponse, MultimodalAdapter, PreparedInput, Prompt, wrong_prompt,
    },
    conversation::{ChatMessage, ConversationTurn, ImageReference, inline_image_placeholders},
    error::{AdapterError, Result},
    inference::{decode_continuation, input_ids_tensor},
    runtime::with_quiet_logging,
    vision::load_image,
};
use tracing::debug;

use crate::splice::splice_image_marker;

/// Generation budget the checkpoint ships with; callers cannot change it.
pub const MAX_NEW_TOKENS: usize = 2048;

/// Dolphin-Vision: the full chat goes to the template with `<image>` markers
/// inlined, and images are encoded by the model's own processor.
#[derive(Debug, Clone, Copy, Default)]
pub struct DolphinAdapter;

impl DolphinAdapter {
    pub fn new() -> Self {
        Self
    }

    fn generate_inline(
        &self,
        messages: &[ChatMessage],
        images: &[ImageReference],
        model: &dyn GenerativeModel,
        tokenizer: &dyn ChatTokenizer,
        context: &CallContext,
        quiet: bool,
    ) -> Result<ModelResponse> {
        if context.max_new_tokens != MAX_NEW_TOKENS {
            debug!(
                requested = context.max_new_tokens,
                budget = MAX_NEW_TOKENS,
                "dolphin-vision uses a fixed generation budget"
            );
        }

        let text = tokenizer.render_chat(messages, true)?;
        let prompt_ids = splice_image_marker(tokenizer, &text)?;

        let decoded = images
            .iter()
            .map(|reference| load_image(reference, &context.fetch))
            .collect::<Result<Vec<DynamicImage>>>()?;
        let encoded = with_quiet_logging(quiet, || {
            model.encode_images(&decoded, &context.device, context.dtype)
        })?;
        let pixel_values = encoded.to_device(&context.device)?.to_dtype(context.dtype)?;
        let input_ids = input_ids_tensor(&prompt_ids, &context.device)?;
        debug!(
            prompt_tokens = prompt_ids.len(),
            images = decoded.len(),
            "dolphin-vision generation"
        );

        let output = with_quiet_logging(quiet, || {
            model.generate(GenerationRequest {
                input_ids: &input_ids,
                pixel_values: Some(&pixel_values),
                max_new_tokens: MAX_NEW_TOKENS,
                use_cache: context.use_cache,
                quiet,
            })
        })?;
        let text = decode_continuation(tokenizer, prompt_ids.len(), &output)?;
        Ok(ModelResponse::from_text(text))
    }
}

impl MultimodalAdapter for DolphinAdapter {
    fn id(&self) -> &'static str {
        "dolphin-vision"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::DolphinVision
    }

    fn prepare_inputs(
        &self,
        conversation: &[ConversationTurn],
        context: &CallContext,
    ) -> Result<PreparedInput> {
        let (messages, images) = inline_image_placeholders(conversation)?;
        Ok(PreparedInput {
            prompt: Prompt::Messages { messages },
            images,
            context: context.clone(),
        })
    }

    fn get_tokens(
        &self,
        prompt: &Prompt,
        tokenizer: &dyn ChatTokenizer,
        _context: &CallContext,
    ) -> Result<Vec<u32>> {
        match prompt {
            Prompt::Messages { messages } => tokenizer.tokenize_chat(messages, true),
            Prompt::Paired { .. } => Err(wrong_prompt(self.id(), "message-list")),
        }
    }

    fn generate_outputs(
        &self,
        prompt: &Prompt,
        images: &[ImageReference],
        model: &dyn GenerativeModel,
        tokenizer: &dyn ChatTokenizer,
        context: &CallContext,
    ) -> Result<ModelResponse> {
        let Prompt::Messages { messages } = prompt else {
            return Err(wrong_prompt(self.id(), "message-list"));
        };
        if images.is_empty() {
            return Err(AdapterError::MalformedConversation(
                "dolphin-vision needs at least one image".into(),
            ));
        }
        // Model chatter is off unless the caller asks for it.
        let quiet = context.quiet.unwrap_or(true);
        self.generate_inline(messages, images, model, tokenizer, context, quiet)
    }
}
