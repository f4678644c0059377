use candle_core::{Device, Tensor};
use image::RgbImage;
use rayon::prelude::*;

use super::preprocess::ImageTileSet;
use crate::error::{AdapterError, Result};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Per-channel normalization applied after rescaling pixels to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

impl Normalization {
    fn validate(&self) -> Result<()> {
        if self.mean.iter().any(|m| !m.is_finite())
            || self.std.iter().any(|&s| s <= 0.0 || !s.is_finite())
        {
            return Err(AdapterError::InvalidImage(
                "invalid mean/std for normalisation".into(),
            ));
        }
        Ok(())
    }
}

/// Convert one tile into a `[3, height, width]` f32 tensor.
pub fn tile_to_tensor(tile: &RgbImage, norm: &Normalization, device: &Device) -> Result<Tensor> {
    norm.validate()?;
    let (width, height) = tile.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0f32; plane * 3];
    for (idx, pixel) in tile.pixels().enumerate() {
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            data[c * plane + idx] = (value - norm.mean[c]) / norm.std[c];
        }
    }
    Ok(Tensor::from_vec(
        data,
        (3, height as usize, width as usize),
        device,
    )?)
}

/// Stack every tile of `set` into `[n, 3, tile, tile]`.
pub fn tiles_to_tensor(
    set: &ImageTileSet,
    norm: &Normalization,
    device: &Device,
) -> Result<Tensor> {
    if set.is_empty() {
        return Err(AdapterError::InternalConsistency(
            "cannot stack an empty tile set".into(),
        ));
    }
    let tensors: Vec<Tensor> = if device.is_cpu() {
        set.tiles
            .par_iter()
            .map(|tile| tile_to_tensor(tile, norm, device))
            .collect::<Result<Vec<_>>>()?
    } else {
        set.tiles
            .iter()
            .map(|tile| tile_to_tensor(tile, norm, device))
            .collect::<Result<Vec<_>>>()?
    };
    Ok(Tensor::stack(&tensors, 0)?.contiguous()?)
}
