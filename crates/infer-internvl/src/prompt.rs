use mmbridge_core::conversation::IMAGE_PLACEHOLDER;

pub const IMG_START_TOKEN: &str = "<img>";
pub const IMG_END_TOKEN: &str = "</img>";
pub const IMG_CONTEXT_TOKEN: &str = "<IMG_CONTEXT>";

/// Vision tokens the projector emits per 448px tile.
pub const NUM_IMAGE_TOKEN: usize = 256;

/// Replace the first `<image>` in `query` with the context-token span for
/// `total_tiles` tiles, adding the placeholder first when the query lacks one.
pub fn expand_image_tokens(query: &str, total_tiles: usize, num_image_token: usize) -> String {
    let query = if query.contains(IMAGE_PLACEHOLDER) {
        query.to_owned()
    } else {
        format!("{IMAGE_PLACEHOLDER}\n{query}")
    };
    let span = format!(
        "{IMG_START_TOKEN}{}{IMG_END_TOKEN}",
        IMG_CONTEXT_TOKEN.repeat(num_image_token * total_tiles)
    );
    query.replacen(IMAGE_PLACEHOLDER, &span, 1)
}
