use mmbridge_core::{
    adapter::{
        BackendKind, CallContext, ChatTokenizer, GenerationRequest, GenerativeModel,
        ModelResponse, MultimodalAdapter, PreparedInput, Prompt, wrong_prompt,
    },
    conversation::{ConversationTurn, ImageReference, extract_paired_history},
    error::Result,
    inference::{decode_continuation, input_ids_tensor},
    runtime::with_quiet_logging,
    vision::{ImageTilingPipeline, TilingConfig},
};
use tracing::debug;

use crate::prompt::{NUM_IMAGE_TOKEN, expand_image_tokens};

/// InternVL2 family (and NVLM-D, which shares its chat interface).
///
/// The conversation is reduced to `(user, assistant)` pairs plus one pending
/// query; only the query's images are tiled and sent with the prompt.
#[derive(Debug, Clone)]
pub struct InternVlAdapter {
    pipeline: ImageTilingPipeline,
    num_image_token: usize,
}

impl Default for InternVlAdapter {
    fn default() -> Self {
        Self::new(TilingConfig::default())
    }
}

impl InternVlAdapter {
    pub fn new(tiling: TilingConfig) -> Self {
        Self {
            pipeline: ImageTilingPipeline::new(tiling),
            num_image_token: NUM_IMAGE_TOKEN,
        }
    }

    pub fn with_num_image_token(mut self, num_image_token: usize) -> Self {
        self.num_image_token = num_image_token;
        self
    }

    pub fn pipeline(&self) -> &ImageTilingPipeline {
        &self.pipeline
    }

    #[allow(clippy::too_many_arguments)]
    fn generate_paired(
        &self,
        history: &[(String, String)],
        query: &str,
        images: &[ImageReference],
        model: &dyn GenerativeModel,
        tokenizer: &dyn ChatTokenizer,
        context: &CallContext,
        quiet: bool,
    ) -> Result<ModelResponse> {
        let pixel_values = if images.is_empty() {
            None
        } else {
            Some(self.pipeline.load_pixel_values(
                images,
                &context.device,
                context.dtype,
                &context.fetch,
            )?)
        };
        let query = match &pixel_values {
            Some(pixels) => expand_image_tokens(query, pixels.dim(0)?, self.num_image_token),
            None => query.to_owned(),
        };

        let messages = Prompt::Paired {
            history: history.to_vec(),
            query,
        }
        .to_messages();
        let text = tokenizer.render_chat(&messages, true)?;
        let prompt_ids: Vec<i64> = tokenizer
            .encode(&text)?
            .into_iter()
            .map(i64::from)
            .collect();
        let input_ids = input_ids_tensor(&prompt_ids, &context.device)?;
        debug!(
            prompt_tokens = prompt_ids.len(),
            tiles = pixel_values.as_ref().map(|p| p.dims()[0]).unwrap_or(0),
            max_new_tokens = context.max_new_tokens,
            "internvl2 generation"
        );

        let output = with_quiet_logging(quiet, || {
            model.generate(GenerationRequest {
                input_ids: &input_ids,
                pixel_values: pixel_values.as_ref(),
                max_new_tokens: context.max_new_tokens,
                use_cache: context.use_cache,
                quiet,
            })
        })?;
        let text = decode_continuation(tokenizer, prompt_ids.len(), &output)?;
        Ok(ModelResponse::from_text(text))
    }
}

impl MultimodalAdapter for InternVlAdapter {
    fn id(&self) -> &'static str {
        "internvl2"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::InternVl2
    }

    fn prepare_inputs(
        &self,
        conversation: &[ConversationTurn],
        context: &CallContext,
    ) -> Result<PreparedInput> {
        let paired = extract_paired_history(conversation)?;
        Ok(PreparedInput {
            prompt: Prompt::Paired {
                history: paired.history,
                query: paired.query,
            },
            images: paired.query_images,
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
            Prompt::Paired { .. } => tokenizer.tokenize_chat(&prompt.to_messages(), true),
            Prompt::Messages { .. } => Err(wrong_prompt(self.id(), "paired-history")),
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
        let Prompt::Paired { history, query } = prompt else {
            return Err(wrong_prompt(self.id(), "paired-history"));
        };
        let quiet = context.quiet.unwrap_or(false);
        self.generate_paired(history, query, images, model, tokenizer, context, quiet)
    }
}

