use crate::error::{ReportError, Result};
use crate::model::ImageSource;
use async_trait::async_trait;
use base64::Engine;
use image::GenericImageView;
use sha2::{Digest, Sha256};

/// Retrieves the bytes behind a remote image reference (a list item id, a
/// server-relative URL, ...). Implemented by the host application.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>>;
}

/// Fetcher for exports that only carry inline image data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFetcher;

#[async_trait]
impl ImageFetcher for NoopFetcher {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        Err(ReportError::Asset(format!(
            "no fetcher configured for remote image '{reference}'"
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageColorSpace {
    Gray,
    Rgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    /// JPEG bytes embedded as-is.
    Dct,
    /// Raw samples; the writer compresses them.
    Raw,
}

/// Image data in the form the PDF writer embeds.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub width: u32,
    pub height: u32,
    pub color_space: ImageColorSpace,
    pub encoding: ImageEncoding,
    pub data: Vec<u8>,
    pub alpha: Option<Vec<u8>>,
    pub content_hash: String,
}

impl EmbeddedImage {
    /// Height over width of the natural pixel size.
    pub fn aspect_ratio(&self) -> f32 {
        if self.width == 0 {
            return 1.0;
        }
        self.height as f32 / self.width as f32
    }
}

pub async fn resolve_image_bytes(source: &ImageSource, fetcher: &dyn ImageFetcher) -> Result<Vec<u8>> {
    match source {
        ImageSource::Bytes(bytes) => Ok(bytes.clone()),
        ImageSource::Url(url) => {
            if url.starts_with("data:") {
                let data = decode_data_url(url)
                    .ok_or_else(|| ReportError::Asset("malformed data URL".to_string()))?;
                return Ok(data);
            }
            fetcher.fetch(url).await
        }
    }
}

pub fn decode_image(data: &[u8]) -> Result<EmbeddedImage> {
    let format = image::guess_format(data)
        .map_err(|err| ReportError::Asset(format!("unrecognised image format: {err}")))?;
    let decoded = image::load_from_memory_with_format(data, format)
        .map_err(|err| ReportError::Asset(format!("image decode failed: {err}")))?;
    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return Err(ReportError::Asset("image has no pixels".to_string()));
    }
    let content_hash = hash_bytes(data);

    // PDF readers need Decode arrays and inversion hints for CMYK DCT
    // streams, so four-component JPEGs are re-embedded as RGB samples.
    if format == image::ImageFormat::Jpeg && jpeg_components(data) != Some(4) {
        let color_space = match decoded.color() {
            image::ColorType::L8 | image::ColorType::La8 => ImageColorSpace::Gray,
            _ => ImageColorSpace::Rgb,
        };
        return Ok(EmbeddedImage {
            width,
            height,
            color_space,
            encoding: ImageEncoding::Dct,
            data: data.to_vec(),
            alpha: None,
            content_hash,
        });
    }

    let rgba = decoded.to_rgba8();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        if a != 255 {
            has_alpha = true;
        }
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }

    Ok(EmbeddedImage {
        width,
        height,
        color_space: ImageColorSpace::Rgb,
        encoding: ImageEncoding::Raw,
        data: rgb,
        alpha: has_alpha.then_some(alpha),
        content_hash,
    })
}

pub(crate) fn decode_data_url(url: &str) -> Option<Vec<u8>> {
    let (header, payload) = url.strip_prefix("data:")?.split_once(',')?;
    if header.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .ok()
    } else {
        Some(payload.as_bytes().to_vec())
    }
}

/// Component count from the first SOF segment of a JPEG stream.
fn jpeg_components(data: &[u8]) -> Option<u8> {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        let is_frame = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            return data.get(pos + 9).copied();
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        pos += 2 + len;
    }
    None
}

fn hash_bytes(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}
