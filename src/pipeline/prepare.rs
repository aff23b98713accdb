//! Default image preparation
//!
//! Decode, mirror, flatten onto a background color and shrink to the
//! screen width. Output is raw RGB or RGBA rows, top to bottom.

use image::imageops::FilterType;
use image::io::Reader as ImageReader;
use image::DynamicImage;
use log::debug;
use std::io::Cursor;

use super::{ImagePayload, InputItem, InputSource, PixelFormat, Preparer};
use crate::error::PrepareError;
use crate::utils::flatten_pixel;

/// Mirroring applied after decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mirror {
    #[default]
    None,
    /// Left-right
    Horizontal,
    /// Top-bottom
    Vertical,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrepareSettings {
    pub mirror: Mirror,
    /// Flatten transparent pixels onto this color (output becomes RGB)
    pub background: Option<(u8, u8, u8)>,
    /// Images wider than this are scaled down, 0 = no limit
    pub max_width_px: u32,
}

/// Preparer backed by the `image` crate
#[derive(Debug, Clone, Default)]
pub struct ImagePreparer {
    settings: PrepareSettings,
}

impl ImagePreparer {
    pub fn new(settings: PrepareSettings) -> Self {
        Self { settings }
    }

    fn decode(&self, item: &InputItem) -> Result<DynamicImage, PrepareError> {
        let name = item.source.to_string();
        let owned;
        let data: &[u8] = match &item.source {
            InputSource::Path(path) => {
                owned = std::fs::read(path).map_err(|e| PrepareError::Read(name.clone(), e))?;
                &owned
            }
            InputSource::Bytes { data, .. } => data,
        };

        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| PrepareError::Read(name, e))?;
        Ok(reader.decode()?)
    }

    fn transform(&self, mut img: DynamicImage) -> DynamicImage {
        img = match self.settings.mirror {
            Mirror::None => img,
            Mirror::Horizontal => img.fliph(),
            Mirror::Vertical => img.flipv(),
            Mirror::Both => img.fliph().flipv(),
        };

        let max_w = self.settings.max_width_px;
        if max_w != 0 && img.width() > max_w {
            let h = (img.height() as u64 * max_w as u64 / img.width() as u64).max(1) as u32;
            debug!("Scaling {}x{} down to {}x{}", img.width(), img.height(), max_w, h);
            img = img.resize_exact(max_w, h, FilterType::Triangle);
        }
        img
    }
}

impl Preparer for ImagePreparer {
    fn prepare(&self, item: &InputItem) -> Result<ImagePayload, PrepareError> {
        let img = self.decode(item)?;
        if img.width() == 0 || img.height() == 0 {
            return Err(PrepareError::Empty);
        }
        let img = self.transform(img);
        let (width, height) = (img.width(), img.height());

        let (format, data) = match self.settings.background {
            Some(bg) => {
                let rgba = img.to_rgba8();
                let mut out = Vec::with_capacity(rgba.as_raw().len() / 4 * 3);
                for px in rgba.pixels() {
                    out.extend_from_slice(&flatten_pixel(px.0, bg));
                }
                (PixelFormat::Rgb, out)
            }
            None if img.color().has_alpha() => (PixelFormat::Rgba, img.to_rgba8().into_raw()),
            None => (PixelFormat::Rgb, img.to_rgb8().into_raw()),
        };

        Ok(ImagePayload {
            width,
            height,
            format,
            data,
            placement: item.placement,
        })
    }
}
