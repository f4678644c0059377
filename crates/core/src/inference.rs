use std::convert::TryFrom;

use candle_core::{DType, Device, Tensor};
use tracing::trace;

use crate::{
    adapter::ChatTokenizer,
    error::{AdapterError, Result},
};

/// Build the `[1, seq]` id tensor a model expects.
pub fn input_ids_tensor(ids: &[i64], device: &Device) -> Result<Tensor> {
    let tensor = Tensor::from_vec(ids.to_vec(), (1, ids.len()), device)?;
    Ok(tensor.to_dtype(DType::I64)?)
}

/// Decode the tokens generated after the echoed prompt.
///
/// Ids that do not fit a vocabulary entry (synthetic markers) are dropped.
pub fn decode_continuation(
    tokenizer: &dyn ChatTokenizer,
    prompt_len: usize,
    output: &[i64],
) -> Result<String> {
    let generated = output.get(prompt_len..).ok_or_else(|| {
        AdapterError::Backend(anyhow::anyhow!(
            "model returned {} ids for a prompt of {prompt_len}",
            output.len()
        ))
    })?;
    let ids: Vec<u32> = generated
        .iter()
        .filter_map(|&id| u32::try_from(id).ok())
        .collect();
    trace!(prompt_len, generated = ids.len(), "decoding continuation");
    let decoded = tokenizer.decode(&ids, true)?;
    Ok(normalize_text(&decoded))
}

/// Normalise decoder output line endings and surrounding whitespace.
pub fn normalize_text(s: &str) -> String {
    s.replace("\r\n", "\n").trim().to_string()
}
