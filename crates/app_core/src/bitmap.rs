//! Bitmap to PNG conversion with alpha detection

use crate::error::CoreError;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

/// Top-down 32bpp BGRA pixels read back from a native bitmap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBitmap {
    pub width: u32,
    pub height: u32,
    /// Bit depth of the source bitmap before it was read back as 32bpp
    pub source_bpp: u16,
    pub bgra: Vec<u8>,
}

impl RawBitmap {
    pub fn new(width: u32, height: u32, source_bpp: u16, bgra: Vec<u8>) -> Self {
        Self {
            width,
            height,
            source_bpp,
            bgra,
        }
    }

    fn validate(&self) -> Result<(), CoreError> {
        let expected = self.width as usize * self.height as usize * 4;
        if self.width == 0 || self.height == 0 || self.bgra.len() != expected {
            return Err(CoreError::InvalidBitmap(format!(
                "{}x{} with {} bytes",
                self.width,
                self.height,
                self.bgra.len()
            )));
        }
        Ok(())
    }

    /// Rows `start..start + rows` as a new bitmap
    pub fn rows(&self, start: u32, rows: u32) -> Option<RawBitmap> {
        let stride = self.width as usize * 4;
        let from = start as usize * stride;
        let to = from + rows as usize * stride;
        let bgra = self.bgra.get(from..to)?.to_vec();
        Some(RawBitmap::new(self.width, rows, self.source_bpp, bgra))
    }
}

/// Color and mask planes of an icon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconPixels {
    pub color: RawBitmap,
    /// AND mask read back as 32bpp; black marks opaque pixels
    pub mask: Option<RawBitmap>,
}

/// Any alpha strictly between fully transparent and fully opaque
pub fn has_partial_alpha(bgra: &[u8]) -> bool {
    bgra.chunks_exact(4).any(|px| px[3] > 0 && px[3] < 255)
}

fn encode_png(
    pixels: &[u8],
    width: u32,
    height: u32,
    color: ExtendedColorType,
) -> Result<Vec<u8>, CoreError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(pixels, width, height, color)?;
    Ok(out)
}

fn to_rgba(bgra: &[u8]) -> Vec<u8> {
    bgra.chunks_exact(4)
        .flat_map(|px| [px[2], px[1], px[0], px[3]])
        .collect()
}

fn to_rgb(bgra: &[u8]) -> Vec<u8> {
    bgra.chunks_exact(4)
        .flat_map(|px| [px[2], px[1], px[0]])
        .collect()
}

/// Encode a shell bitmap (thumbnail or item image).
///
/// Only a 32bpp source with partial alpha keeps its alpha channel; anything
/// else is written as opaque RGB.
pub fn encode_bitmap(bitmap: &RawBitmap) -> Result<Vec<u8>, CoreError> {
    bitmap.validate()?;

    if bitmap.source_bpp >= 32 && has_partial_alpha(&bitmap.bgra) {
        encode_png(
            &to_rgba(&bitmap.bgra),
            bitmap.width,
            bitmap.height,
            ExtendedColorType::Rgba8,
        )
    } else {
        encode_png(
            &to_rgb(&bitmap.bgra),
            bitmap.width,
            bitmap.height,
            ExtendedColorType::Rgb8,
        )
    }
}

/// Encode an icon as RGBA.
///
/// Icons without any alpha in the color plane take their transparency from
/// the AND mask, or are fully opaque when there is no mask.
pub fn encode_icon(icon: &IconPixels) -> Result<Vec<u8>, CoreError> {
    let color = &icon.color;
    color.validate()?;

    let mut rgba = to_rgba(&color.bgra);
    let has_alpha = color.bgra.chunks_exact(4).any(|px| px[3] != 0);

    if !has_alpha {
        let mask = icon
            .mask
            .as_ref()
            .filter(|m| m.width == color.width && m.height == color.height);

        for (i, px) in rgba.chunks_exact_mut(4).enumerate() {
            px[3] = match mask {
                Some(mask) if mask.bgra[i * 4] != 0 => 0,
                _ => 255,
            };
        }
    }

    encode_png(&rgba, color.width, color.height, ExtendedColorType::Rgba8)
}
