use fast_image_resize as fir;
use image::{DynamicImage, GenericImageView, ImageBuffer, RgbImage, imageops};
use tracing::trace;

use super::tiler::{TilingConfig, TilingGrid, select_grid};
use crate::error::{AdapterError, Result};

/// Tiles cut from one source image, row-major, optionally followed by a thumbnail.
#[derive(Debug, Clone)]
pub struct ImageTileSet {
    pub grid: TilingGrid,
    pub tiles: Vec<RgbImage>,
    pub thumbnail: bool,
}

impl ImageTileSet {
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn expected_len(&self) -> usize {
        self.grid.tiles() as usize + usize::from(self.thumbnail)
    }
}

pub fn dynamic_preprocess(image: &DynamicImage, config: &TilingConfig) -> Result<ImageTileSet> {
    let (orig_width, orig_height) = image.dimensions();
    let grid = select_grid(orig_width, orig_height, config)?;
    let tile_size = config.tile_size;

    let overflow = || AdapterError::InvalidTilingConstraint {
        min_tiles: config.min_tiles,
        max_tiles: config.max_tiles,
        tile_size,
    };
    let target_width = tile_size.checked_mul(grid.cols).ok_or_else(overflow)?;
    let target_height = tile_size.checked_mul(grid.rows).ok_or_else(overflow)?;
    let base_rgb = image.to_rgb8();
    let resized = resize_rgb_image(&base_rgb, target_width, target_height)?;

    let mut tiles = Vec::with_capacity(grid.tiles() as usize + 1);
    for i in 0..grid.tiles() {
        let x = (i % grid.cols) * tile_size;
        let y = (i / grid.cols) * tile_size;
        tiles.push(imageops::crop_imm(&resized, x, y, tile_size, tile_size).to_image());
    }
    if tiles.len() != grid.tiles() as usize {
        return Err(AdapterError::InternalConsistency(format!(
            "cropped {} tiles from a {}x{} grid",
            tiles.len(),
            grid.cols,
            grid.rows
        )));
    }

    let thumbnail = config.use_thumbnail && !grid.is_single();
    if thumbnail {
        tiles.push(resize_rgb_image(&base_rgb, tile_size, tile_size)?);
    }
    trace!(
        width = orig_width,
        height = orig_height,
        cols = grid.cols,
        rows = grid.rows,
        thumbnail,
        "tiled image"
    );

    let set = ImageTileSet {
        grid,
        tiles,
        thumbnail,
    };
    if set.len() != set.expected_len() {
        return Err(AdapterError::InternalConsistency(format!(
            "tile set holds {} tiles, expected {}",
            set.len(),
            set.expected_len()
        )));
    }
    Ok(set)
}

/// Catmull-Rom convolution resize.
pub fn resize_rgb_image(image: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    if width == 0 || height == 0 {
        return Err(AdapterError::InvalidImage(
            "target dimensions must be positive".into(),
        ));
    }
    if image.dimensions() == (width, height) {
        return Ok(image.clone());
    }
    let mut owned = image.clone().into_raw();
    let src = fir::images::Image::from_slice_u8(
        image.width(),
        image.height(),
        owned.as_mut_slice(),
        fir::PixelType::U8x3,
    )
    .map_err(|err| AdapterError::InvalidImage(format!("unusable source buffer: {err}")))?;
    let mut dst = fir::images::Image::new(width, height, fir::PixelType::U8x3);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src, &mut dst, &options)
        .map_err(|err| AdapterError::InvalidImage(format!("resize failed: {err}")))?;
    ImageBuffer::from_raw(width, height, dst.into_vec()).ok_or_else(|| {
        AdapterError::InternalConsistency("resized buffer does not match its dimensions".into())
    })
}
