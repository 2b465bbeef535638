//! Responsive Image Variants
//!
//! Decodes an uploaded image once and derives resized copies for each
//! requested width and output format. Widths larger than the source are
//! skipped rather than upscaled.

use std::io::Cursor;

use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Output formats for variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantFormat {
    Jpeg,
    Png,
    Webp,
}

impl VariantFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            VariantFormat::Jpeg => "jpg",
            VariantFormat::Png => "png",
            VariantFormat::Webp => "webp",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            VariantFormat::Jpeg => ImageFormat::Jpeg,
            VariantFormat::Png => ImageFormat::Png,
            VariantFormat::Webp => ImageFormat::WebP,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }
}

/// Widths × formats to generate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSpec {
    pub widths: Vec<u32>,
    pub formats: Vec<VariantFormat>,
}

impl Default for VariantSpec {
    fn default() -> Self {
        Self {
            widths: vec![320, 640, 1024, 1920],
            formats: vec![VariantFormat::Webp, VariantFormat::Jpeg],
        }
    }
}

/// One generated variant
#[derive(Debug, Clone, Serialize)]
pub struct ImageVariant {
    /// `{stem}-{width}w.{ext}`, or `{stem}.{ext}` for a full-size re-encode
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub format: VariantFormat,
    #[serde(skip)]
    pub body: Bytes,
}

fn stem(path: &str) -> &str {
    match path.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => stem,
        _ => path,
    }
}

fn encode(img: &DynamicImage, format: VariantFormat) -> Result<Bytes> {
    // JPEG has no alpha channel
    let img = match format {
        VariantFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        _ => DynamicImage::ImageRgba8(img.to_rgba8()),
    };
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format.image_format())?;
    Ok(Bytes::from(out.into_inner()))
}

fn decode(body: &[u8]) -> Result<DynamicImage> {
    if body.is_empty() {
        return Err(Error::Image("empty image payload".into()));
    }
    Ok(image::load_from_memory(body)?)
}

/// Generate resized variants of an image
pub fn generate_variants(path: &str, body: &[u8], spec: &VariantSpec) -> Result<Vec<ImageVariant>> {
    let source = decode(body)?;
    let (width, height) = source.dimensions();
    let stem = stem(path);

    let mut widths: Vec<u32> = spec
        .widths
        .iter()
        .copied()
        .filter(|w| *w > 0 && *w <= width)
        .collect();
    widths.sort_unstable();
    widths.dedup();

    let mut variants = Vec::with_capacity(widths.len() * spec.formats.len());
    for w in widths {
        let h = ((u64::from(height) * u64::from(w)) / u64::from(width)).max(1) as u32;
        let resized = source.resize_exact(w, h, FilterType::Lanczos3);
        for format in &spec.formats {
            variants.push(ImageVariant {
                path: format!("{}-{}w.{}", stem, w, format.extension()),
                width: w,
                height: h,
                format: *format,
                body: encode(&resized, *format)?,
            });
        }
    }
    Ok(variants)
}

/// Re-encode an image at full size in another format
pub fn reencode(path: &str, body: &[u8], format: VariantFormat) -> Result<ImageVariant> {
    let source = decode(body)?;
    let (width, height) = source.dimensions();
    Ok(ImageVariant {
        path: format!("{}.{}", stem(path), format.extension()),
        width,
        height,
        format,
        body: encode(&source, format)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use image::{Rgb, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_variants_skip_upscaling() {
        let body = png(800, 400);
        let spec = VariantSpec::default();
        let variants = generate_variants("img/hero.png", &body, &spec).unwrap();

        // 320 and 640 fit, 1024 and 1920 do not
        assert_eq!(variants.len(), 4);
        let first = &variants[0];
        assert_eq!(first.path, "img/hero-320w.webp");
        assert_eq!((first.width, first.height), (320, 160));
        assert_eq!(variants[1].path, "img/hero-320w.jpg");
        assert_eq!(variants[3].width, 640);

        for v in &variants {
            let decoded = image::load_from_memory(&v.body).unwrap();
            assert_eq!(decoded.dimensions(), (v.width, v.height));
        }
    }

    #[test]
    fn test_reencode() {
        let body = png(64, 32);
        let variant = reencode("logo.png", &body, VariantFormat::Jpeg).unwrap();
        assert_eq!(variant.path, "logo.jpg");
        assert_eq!((variant.width, variant.height), (64, 32));
        assert_eq!(
            image::guess_format(&variant.body).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_invalid_input() {
        assert_matches!(
            generate_variants("x.png", b"not an image", &VariantSpec::default()),
            Err(Error::Image(_))
        );
        assert_matches!(reencode("x.png", &[], VariantFormat::Png), Err(Error::Image(_)));
        assert_eq!(VariantFormat::parse("JPG"), Some(VariantFormat::Jpeg));
        assert_eq!(VariantFormat::parse("gif"), None);
    }
}
