use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mmbridge_config::{AppConfig, ConfigOverride, ConfigOverrides};
use mmbridge_core::{
    adapter::BackendKind,
    runtime::{DeviceKind, Precision},
};

#[derive(Parser, Debug)]
#[command(
    name = "mmbridge",
    author,
    version,
    about = "Adapt conversations and images for multimodal models",
    long_about = None
)]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Optional path to a configuration file (defaults to platform config dir).
    #[arg(long, value_name = "PATH", global = true, help_heading = "Application")]
    pub config: Option<PathBuf>,

    /// Model family whose prompt convention is used.
    #[arg(long, global = true, help_heading = "Application")]
    pub backend: Option<BackendKind>,

    /// Device backend to execute on (cpu/metal/cuda).
    #[arg(long, global = true, help_heading = "Inference")]
    pub device: Option<DeviceKind>,

    /// Numeric precision. Defaults to f32 on CPU and bf16 on Metal/CUDA.
    #[arg(long, global = true, help_heading = "Inference")]
    pub dtype: Option<Precision>,

    /// Edge length of one square tile in pixels.
    #[arg(long, global = true, help_heading = "Tiling")]
    pub tile_size: Option<u32>,

    /// Upper bound on tiles per image, thumbnail excluded.
    #[arg(long, global = true, help_heading = "Tiling")]
    pub max_tiles: Option<u32>,

    /// Only report errors.
    #[arg(long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show the tiling grid chosen for an image, optionally dumping the tiles.
    Tile(TileArgs),
    /// Print the prompt skeleton and image references for a conversation.
    Prepare(PrepareArgs),
    /// Count the prompt tokens a conversation occupies.
    Tokens(TokensArgs),
    /// Print the layer-to-device map for a sharded checkpoint.
    Layout(LayoutArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct TileArgs {
    /// Image path or http(s) URL.
    #[arg(long, value_name = "REF")]
    pub image: String,

    /// Directory that receives `tile_NN.png` files.
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct PrepareArgs {
    /// JSON file holding a list of conversation turns.
    #[arg(long, value_name = "PATH")]
    pub conversation: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct TokensArgs {
    #[arg(long, value_name = "PATH")]
    pub conversation: PathBuf,

    /// `tokenizer.json` of the target checkpoint.
    #[arg(long, value_name = "PATH")]
    pub tokenizer: PathBuf,

    /// Registered chat template name (chatml/llama3/plain).
    #[arg(long)]
    pub template: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct LayoutArgs {
    /// Model identifier, e.g. `InternVL2-26B` or `OpenGVLab/InternVL2-26B`.
    #[arg(long)]
    pub model: Option<String>,

    /// Number of compute units to spread the blocks over.
    #[arg(long)]
    pub units: Option<usize>,
}

impl From<&Args> for ConfigOverrides {
    fn from(args: &Args) -> Self {
        let global = &args.global;
        let mut overrides = ConfigOverrides::default();
        overrides.config_path = global.config.clone();
        overrides.backend = global.backend;
        overrides.inference.device = global.device;
        overrides.inference.precision = global.dtype;
        overrides.tiling.tile_size = global.tile_size;
        overrides.tiling.max_tiles = global.max_tiles;
        if global.quiet {
            overrides.inference.quiet = Some(true);
        }
        match &args.command {
            Command::Tokens(tokens) => {
                overrides.inference.template = tokens.template.clone();
            }
            Command::Layout(layout) => {
                overrides.layout.model = layout.model.clone();
                overrides.layout.units = layout.units;
            }
            Command::Tile(_) | Command::Prepare(_) => {}
        }
        overrides
    }
}

impl ConfigOverride for &Args {
    fn apply(self, config: &mut AppConfig) {
        config.apply_overrides(&ConfigOverrides::from(self));
    }
}
