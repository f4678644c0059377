use candle_core::{DType, Device, Tensor};
use image::DynamicImage;
use tracing::info;

use super::{
    loader::{FetchOptions, load_image},
    normalize::{Normalization, tiles_to_tensor},
    preprocess::{ImageTileSet, dynamic_preprocess},
    tiler::TilingConfig,
};
use crate::{
    conversation::ImageReference,
    error::{AdapterError, Result},
};

/// Tiling plus normalization for one model family.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImageTilingPipeline {
    pub tiling: TilingConfig,
    pub normalization: Normalization,
}

impl ImageTilingPipeline {
    pub fn new(tiling: TilingConfig) -> Self {
        Self {
            tiling,
            normalization: Normalization::default(),
        }
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn tile(&self, image: &DynamicImage) -> Result<ImageTileSet> {
        dynamic_preprocess(image, &self.tiling)
    }

    /// `[n, 3, tile, tile]` f32 pixels for one decoded image.
    pub fn pixel_values(&self, image: &DynamicImage, device: &Device) -> Result<Tensor> {
        let set = self.tile(image)?;
        tiles_to_tensor(&set, &self.normalization, device)
    }

    /// Load every reference and concatenate their tiles in reference order.
    ///
    /// Constraints are checked before any image is resolved. The first failing
    /// reference aborts the whole batch.
    pub fn load_pixel_values(
        &self,
        references: &[ImageReference],
        device: &Device,
        dtype: DType,
        fetch: &FetchOptions,
    ) -> Result<Tensor> {
        self.tiling.validate()?;
        if references.is_empty() {
            return Err(AdapterError::MalformedConversation(
                "no image references to load".into(),
            ));
        }
        let mut per_image = Vec::with_capacity(references.len());
        for reference in references {
            let image = load_image(reference, fetch)?;
            let pixels = self.pixel_values(&image, device)?;
            info!(
                reference = %reference,
                tiles = pixels.dim(0)?,
                "prepared image tiles"
            );
            per_image.push(pixels);
        }
        let stacked = if per_image.len() == 1 {
            per_image.remove(0)
        } else {
            Tensor::cat(&per_image, 0)?
        };
        Ok(stacked.to_dtype(dtype)?)
    }
}
