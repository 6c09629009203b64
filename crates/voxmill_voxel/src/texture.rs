//! Pixel storage for palettes and atlases.

use std::io::Cursor;

use glam::IVec2;

use crate::Color;

/// Which slot of a model's texture map a texture fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TextureType {
    /// The color palette / albedo texture.
    Diffuse,
    /// Emission colors, parallel to the diffuse palette.
    Emission,
}

/// A 2-D array of packed RGBA pixels.
///
/// Color palettes are one-row textures grown a pixel at a time with
/// [`add_pixel`](Texture::add_pixel); atlases are fixed-size and written with
/// [`set_pixel`](Texture::set_pixel).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Texture {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Texture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width * height) as usize],
        }
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u32>) -> Self {
        debug_assert_eq!(pixels.len(), (width * height) as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    #[inline]
    pub fn size(&self) -> IVec2 {
        IVec2::new(self.width as i32, self.height as i32)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Appends a pixel to a one-row texture, growing it by one column.
    ///
    /// Returns the column index of the new pixel.
    pub fn add_pixel(&mut self, color: Color) -> u32 {
        debug_assert!(self.height <= 1);
        self.pixels.push(color.as_rgba());
        self.width += 1;
        self.height = 1;
        self.width - 1
    }

    /// Writes a pixel at `x` in a one-row texture, growing the row on demand.
    pub fn put_pixel(&mut self, x: u32, color: Color) {
        debug_assert!(self.height <= 1);
        if x >= self.width {
            self.pixels.resize(x as usize + 1, 0);
            self.width = x + 1;
            self.height = 1;
        }
        self.pixels[x as usize] = color.as_rgba();
    }

    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Color) {
        self.pixels[(x + y * self.width) as usize] = color.as_rgba();
    }

    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> Color {
        Color::from_rgba(self.pixels[(x + y * self.width) as usize])
    }

    /// Encodes the texture as a PNG blob.
    pub fn as_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut bytes: Vec<u8> = Vec::new();
        let mut rgba = Vec::with_capacity(self.pixels.len() * 4);
        for pixel in &self.pixels {
            rgba.extend_from_slice(&pixel.to_le_bytes());
        }

        let encoder = image::png::PngEncoder::new(Cursor::new(&mut bytes));
        encoder.encode(&rgba, self.width, self.height, image::ColorType::Rgba8)?;
        Ok(bytes)
    }

    /// Decodes a PNG blob into a texture.
    pub fn from_png(data: &[u8]) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory_with_format(data, image::ImageFormat::Png)?.to_rgba8();
        let (width, height) = img.dimensions();
        let pixels = img
            .pixels()
            .map(|p| u32::from_le_bytes(p.0))
            .collect::<Vec<_>>();

        Ok(Self {
            width,
            height,
            pixels,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn palette_grows_one_pixel_at_a_time() {
        let mut palette = Texture::new();
        assert_eq!(palette.add_pixel(Color::new(1, 2, 3, 255)), 0);
        assert_eq!(palette.add_pixel(Color::new(4, 5, 6, 255)), 1);

        assert_eq!(palette.size(), IVec2::new(2, 1));
        assert_eq!(palette.get_pixel(1, 0), Color::new(4, 5, 6, 255));
    }

    #[test]
    fn put_pixel_grows_row() {
        let mut palette = Texture::new();
        palette.put_pixel(3, Color::WHITE);
        assert_eq!(palette.width(), 4);
        assert_eq!(palette.get_pixel(3, 0), Color::WHITE);
        assert_eq!(palette.get_pixel(0, 0), Color::TRANSPARENT);
    }

    #[test]
    fn png_roundtrip() {
        let mut texture = Texture::with_size(2, 2);
        texture.set_pixel(0, 0, Color::new(255, 0, 0, 255));
        texture.set_pixel(1, 1, Color::new(0, 0, 255, 128));

        let png = texture.as_png().unwrap();
        let decoded = Texture::from_png(&png).unwrap();
        assert_eq!(decoded, texture);
    }
}
