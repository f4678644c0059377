use std::{fs, path::Path};

use anyhow::{Context, Result};
use mmbridge_config::{AppConfig, ConfigOverrides};
use mmbridge_core::{
    adapter::{BackendKind, MultimodalAdapter},
    conversation::{ConversationTurn, ImageReference, parse_conversation},
    layout::plan_device_layout,
    tokenizer::TemplateTokenizer,
    vision::{ImageTilingPipeline, load_image},
};
use mmbridge_infer_dolphin::DolphinAdapter;
use mmbridge_infer_internvl::InternVlAdapter;
use serde_json::json;
use tracing::info;

use crate::args::{Args, Command, LayoutArgs, PrepareArgs, TileArgs, TokensArgs};

pub fn run(args: Args) -> Result<()> {
    let (config, config_path) = AppConfig::load_with_overrides(ConfigOverrides::from(&args))?;
    info!(
        "Using configuration {} (backend `{}`)",
        config_path.display(),
        config.backend
    );

    match &args.command {
        Command::Tile(cmd) => run_tile(&config, cmd),
        Command::Prepare(cmd) => run_prepare(&config, cmd),
        Command::Tokens(cmd) => run_tokens(&config, cmd),
        Command::Layout(cmd) => run_layout(&config, cmd),
    }
}

fn select_adapter(config: &AppConfig) -> Box<dyn MultimodalAdapter> {
    match config.backend {
        BackendKind::InternVl2 => Box::new(InternVlAdapter::new(config.tiling)),
        BackendKind::DolphinVision => Box::new(DolphinAdapter::new()),
    }
}

fn load_conversation(path: &Path) -> Result<Vec<ConversationTurn>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read conversation from {}", path.display()))?;
    let turns = parse_conversation(&raw)
        .with_context(|| format!("failed to parse conversation at {}", path.display()))?;
    Ok(turns)
}

fn run_tile(config: &AppConfig, cmd: &TileArgs) -> Result<()> {
    let context = config.inference.call_context()?;
    let reference = ImageReference::new(cmd.image.as_str());
    let image = load_image(&reference, &context.fetch)?;
    let tiles = ImageTilingPipeline::new(config.tiling).tile(&image)?;
    info!(
        "Tiled {} ({}x{}) into a {}x{} grid",
        reference,
        image.width(),
        image.height(),
        tiles.grid.cols,
        tiles.grid.rows
    );

    if let Some(dir) = cmd.out.as_ref() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
        for (idx, tile) in tiles.tiles.iter().enumerate() {
            let path = dir.join(format!("tile_{idx:02}.png"));
            tile.save(&path)
                .with_context(|| format!("failed to write tile to {}", path.display()))?;
        }
    }

    let summary = json!({
        "image": reference,
        "grid": tiles.grid,
        "tiles": tiles.len(),
        "thumbnail": tiles.thumbnail,
        "tile_size": config.tiling.tile_size,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_prepare(config: &AppConfig, cmd: &PrepareArgs) -> Result<()> {
    let conversation = load_conversation(&cmd.conversation)?;
    let adapter = select_adapter(config);
    let context = config.inference.call_context()?;
    let prepared = adapter.prepare_inputs(&conversation, &context)?;
    let output = json!({
        "backend": adapter.id(),
        "prompt": prepared.prompt,
        "images": prepared.images,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_tokens(config: &AppConfig, cmd: &TokensArgs) -> Result<()> {
    let conversation = load_conversation(&cmd.conversation)?;
    let adapter = select_adapter(config);
    let context = config.inference.call_context()?;
    let tokenizer = TemplateTokenizer::from_file(&cmd.tokenizer, &config.inference.template)?;
    let prepared = adapter.prepare_inputs(&conversation, &context)?;
    let tokens = adapter.get_tokens(&prepared.prompt, &tokenizer, &context)?;
    info!(
        "{} prompt tokens with template `{}`",
        tokens.len(),
        tokenizer.template().name
    );
    println!("{}", tokens.len());
    Ok(())
}

fn run_layout(config: &AppConfig, _cmd: &LayoutArgs) -> Result<()> {
    let layout = plan_device_layout(&config.layout.model, config.layout.units)?;
    println!("{}", serde_json::to_string_pretty(&layout)?);
    Ok(())
}
