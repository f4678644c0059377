use mmbridge_core::{
    adapter::ChatTokenizer,
    conversation::IMAGE_PLACEHOLDER,
    error::{AdapterError, Result},
};
use tracing::{trace, warn};

/// Synthetic id the model swaps for its image embeddings.
pub const IMAGE_TOKEN_INDEX: i64 = -200;

/// Tokenize a rendered prompt with one image marker where `<image>` stood.
///
/// The model accepts a single marker per prompt: with several placeholders the
/// text before the first and after the last is kept and everything between
/// them is dropped.
pub fn splice_image_marker(tokenizer: &dyn ChatTokenizer, text: &str) -> Result<Vec<i64>> {
    let chunks: Vec<&str> = text.split(IMAGE_PLACEHOLDER).collect();
    let (first, last) = match chunks.as_slice() {
        [] | [_] => {
            return Err(AdapterError::InternalConsistency(format!(
                "rendered prompt carries no `{IMAGE_PLACEHOLDER}` placeholder"
            )));
        }
        [first, .., last] => (*first, *last),
    };
    if chunks.len() > 2 {
        warn!(
            placeholders = chunks.len() - 1,
            "collapsing image placeholders into a single marker"
        );
    }

    let mut ids: Vec<i64> = tokenizer
        .encode(first)?
        .into_iter()
        .map(i64::from)
        .collect();
    let marker_at = ids.len();
    ids.push(IMAGE_TOKEN_INDEX);
    ids.extend(tokenizer.encode(last)?.into_iter().map(i64::from));
    trace!(marker_at, total = ids.len(), "spliced image marker");
    Ok(ids)
}
