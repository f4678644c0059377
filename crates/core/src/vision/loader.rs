use std::{io::Cursor, time::Duration};

use image::{DynamicImage, ImageReader};
use reqwest::blocking::Client;
use tracing::debug;

use crate::{
    conversation::{ImageReference, ImageSource},
    error::{AdapterError, Result},
};

/// How remote references are fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub timeout: Option<Duration>,
}

/// Resolve and decode `reference`. Failures are not retried.
pub fn load_image(reference: &ImageReference, options: &FetchOptions) -> Result<DynamicImage> {
    match reference.source() {
        ImageSource::Url(url) => fetch_remote_image(reference, url, options),
        ImageSource::Path(path) => ImageReader::open(path)
            .map_err(|err| AdapterError::image_load(reference.as_str(), err))?
            .with_guessed_format()
            .map_err(|err| AdapterError::image_load(reference.as_str(), err))?
            .decode()
            .map_err(|err| AdapterError::image_load(reference.as_str(), err)),
    }
}

fn fetch_remote_image(
    reference: &ImageReference,
    url: &str,
    options: &FetchOptions,
) -> Result<DynamicImage> {
    debug!(url, timeout = ?options.timeout, "fetching remote image");
    let mut builder = Client::builder();
    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }
    let client = builder
        .build()
        .map_err(|err| AdapterError::image_load(url, format!("http client: {err}")))?;
    let bytes = client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.bytes())
        .map_err(|err| AdapterError::image_load(reference.as_str(), err))?;
    decode_bytes(reference, &bytes)
}

fn decode_bytes(reference: &ImageReference, bytes: &[u8]) -> Result<DynamicImage> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| AdapterError::image_load(reference.as_str(), err))?
        .decode()
        .map_err(|err| AdapterError::image_load(reference.as_str(), err))
}
