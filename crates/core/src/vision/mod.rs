pub mod loader;
pub mod normalize;
pub mod pipeline;
pub mod preprocess;
pub mod tiler;

pub use loader::{FetchOptions, load_image};
pub use normalize::{IMAGENET_MEAN, IMAGENET_STD, Normalization, tile_to_tensor, tiles_to_tensor};
pub use pipeline::ImageTilingPipeline;
pub use preprocess::{ImageTileSet, dynamic_preprocess, resize_rgb_image};
pub use tiler::{
    TilingConfig, TilingGrid, candidate_grids, find_closest_aspect_ratio, select_grid,
};
