use crate::util::Result;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;

/// output encodings offered by the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Webp,
    Jpeg,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Webp => "image/webp",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }

    /// token used in cache keys.
    pub fn key_token(self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpg",
        }
    }
}

/// decodes `input`, optionally desaturates, and re-encodes at the requested
/// quality. format sniffing is left to the image crate, so the origin's
/// content-type header is irrelevant.
pub fn transcode(
    input: &[u8],
    format: OutputFormat,
    quality: u8,
    grayscale: bool,
) -> Result<Bytes> {
    let mut img = image::load_from_memory(input)?;

    if grayscale {
        img = img.grayscale();
    }

    let encoded = match format {
        OutputFormat::Jpeg => {
            let mut out = Vec::new();
            let mut encoder = JpegEncoder::new_with_quality(Cursor::new(&mut out), quality);
            // the jpeg encoder rejects rgba input, so flatten to the
            // narrowest supported color type first
            match img {
                DynamicImage::ImageLuma8(ref gray) => encoder.encode_image(gray)?,
                ref other => encoder.encode_image(&other.to_rgb8())?,
            }
            out
        }
        OutputFormat::Webp => {
            let rgba = img.to_rgba8();
            let encoder = webp::Encoder::from_rgba(&rgba, rgba.width(), rgba.height());
            encoder.encode(f32::from(quality)).to_vec()
        }
    };

    Ok(Bytes::from(encoded))
}
