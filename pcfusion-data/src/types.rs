//! Pixel and raster primitives.
//!
//! `Rgba8` is the per-pixel color layout of every camera frame; `Raster` is the
//! generic row-major image container used for intermediate per-camera and
//! screen-space buffers.

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

/// 8-bit RGBA color, laid out exactly as stored in camera color buffers.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Pod, Zeroable)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Convert to normalized floats (0-1 range).
    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        )
    }

    /// Convert from normalized floats, clamping each channel.
    pub fn from_vec4(v: Vec4) -> Self {
        let c = v.clamp(Vec4::ZERO, Vec4::ONE) * 255.0 + Vec4::splat(0.5);
        Self::new(c.x as u8, c.y as u8, c.z as u8, c.w as u8)
    }

    /// True when the color channels carry no information (unmapped color pixel).
    pub fn is_black(self) -> bool {
        self.r == 0 && self.g == 0 && self.b == 0
    }
}

/// A dense row-major 2D buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T> {
    width: u32,
    height: u32,
    data: Vec<T>,
}

impl<T: Clone> Raster<T> {
    /// Create a raster filled with `value`.
    pub fn filled(width: u32, height: u32, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Reset every pixel to `value` without reallocating.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<T> Raster<T> {
    /// Wrap an existing buffer. Returns `None` if the length does not match.
    pub fn from_vec(width: u32, height: u32, data: Vec<T>) -> Option<Self> {
        (data.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> &T {
        &self.data[self.index(x, y)]
    }

    #[inline]
    pub fn get_mut(&mut self, x: u32, y: u32) -> &mut T {
        let i = self.index(x, y);
        &mut self.data[i]
    }

    /// Signed lookup that returns `None` outside the raster.
    #[inline]
    pub fn try_get(&self, x: i64, y: i64) -> Option<&T> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(&self.data[y as usize * self.width as usize + x as usize])
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_roundtrip_through_floats() {
        let c = Rgba8::new(10, 128, 255, 200);
        assert_eq!(Rgba8::from_vec4(c.to_vec4()), c);
    }

    #[test]
    fn test_rgba_from_vec4_clamps() {
        let c = Rgba8::from_vec4(Vec4::new(-1.0, 2.0, 0.5, 1.0));
        assert_eq!(c.r, 0);
        assert_eq!(c.g, 255);
        assert_eq!(c.b, 128);
    }

    #[test]
    fn test_rgba_bytes_layout() {
        let pixels = [Rgba8::new(1, 2, 3, 4), Rgba8::new(5, 6, 7, 8)];
        let bytes: &[u8] = bytemuck::cast_slice(&pixels);
        assert_eq!(bytes, &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_raster_indexing() {
        let mut r = Raster::filled(4, 3, 0u16);
        *r.get_mut(3, 2) = 7;
        assert_eq!(*r.get(3, 2), 7);
        assert_eq!(r.as_slice()[11], 7);
        assert_eq!(r.try_get(4, 0), None);
        assert_eq!(r.try_get(-1, 0), None);
        assert_eq!(r.try_get(3, 2), Some(&7));
    }

    #[test]
    fn test_raster_from_vec_checks_len() {
        assert!(Raster::from_vec(2, 2, vec![0u8; 3]).is_none());
        assert!(Raster::from_vec(2, 2, vec![0u8; 4]).is_some());
    }
}
