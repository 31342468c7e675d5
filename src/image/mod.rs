//! Camera frames and the regions networks look at.
//!
//! An [`Image`] is an owned RGBA frame. Networks never see a frame directly: they are given an
//! [`ImageView`], a possibly rotated rectangle of the frame that is resampled on access. The
//! landmark tracker uses this to hand an upright crop of a tilted hand to the landmark network.
//! Overlays are drawn through [`ImageViewMut`] with the [`draw`] functions.

pub mod draw;
mod jpeg;
mod rect;
mod resolution;


use std::fmt;

use embedded_graphics::{pixelcolor::raw::RawU32, prelude::PixelColor};
use image::{Rgba, RgbaImage};

pub use rect::*;
pub use resolution::*;

/// An 8-bit sRGB frame with alpha channel.
#[derive(Clone)]
pub struct Image {
    // Same byte layout as wgpu's `Rgba8UnormSrgb`, so frames are uploaded to the GUI unchanged.
    pub(crate) buf: RgbaImage,
}

impl Image {
    /// Creates a `width` by `height` image filled with [`Color::NULL`].
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: RgbaImage::new(width, height),
        }
    }

    /// Decodes a JFIF or Motion JPEG frame.
    pub fn decode_jpeg(data: &[u8]) -> anyhow::Result<Self> {
        jpeg::decode_jpeg(data)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Returns the rectangle covering the whole image, with its top left corner at `(0, 0)`.
    #[inline]
    pub fn rect(&self) -> Rect {
        Rect::from_top_left(0.0, 0.0, self.width() as f32, self.height() as f32)
    }

    /// Returns the color of a pixel.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the image.
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf[(x, y)].0)
    }

    /// Returns a view of the part of this image covered by `rect`.
    ///
    /// Pixels of the view that fall outside the image read as [`Color::NULL`].
    pub fn view(&self, rect: impl Into<RotatedRect>) -> ImageView<'_> {
        ImageView {
            area: sub_area(&self.rect().into(), rect.into()),
            image: self,
        }
    }

    /// Returns a mutable view of the part of this image covered by `rect`.
    ///
    /// Writes to pixels outside the image are discarded.
    pub fn view_mut(&mut self, rect: impl Into<RotatedRect>) -> ImageViewMut<'_> {
        ImageViewMut {
            area: sub_area(&self.rect().into(), rect.into()),
            image: self,
        }
    }

    /// Mirrors the image left to right, like the preview of a front-facing camera.
    pub fn mirror(&mut self) {
        image::imageops::flip_horizontal_in_place(&mut self.buf);
    }

    /// Returns the raw RGBA8 pixel data, row by row.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Image", self.width(), self.height())
    }
}

/// Places `rect`, given in the coordinates of a view covering `area`, in image coordinates.
///
/// Rotations accumulate: a view rotated by `a` of a view rotated by `b` is rotated by `a + b`
/// relative to the image.
fn sub_area(area: &RotatedRect, rect: RotatedRect) -> RotatedRect {
    let center = rect.rect().center();
    let [cx, cy] = area.transform_out(center.x, center.y);
    let size = rect.rect().size();
    RotatedRect::new(
        Rect::from_center(cx, cy, size.x, size.y),
        area.rotation_radians() + rect.rotation_radians(),
    )
}

/// Maps the view pixel `(x, y)` of `area` to the image pixel it samples, if it is in bounds.
fn image_pixel(area: &RotatedRect, image: &Image, x: u32, y: u32) -> Option<(u32, u32)> {
    // Transform pixel centers, not corners, so that rotating by a half turn maps pixels onto
    // each other exactly.
    let [ix, iy] = area.transform_out(x as f32 + 0.5, y as f32 + 0.5);
    let (ix, iy) = ((ix - 0.5).round(), (iy - 0.5).round());
    let in_bounds =
        ix >= 0.0 && iy >= 0.0 && ix < image.width() as f32 && iy < image.height() as f32;
    in_bounds.then_some((ix as u32, iy as u32))
}

fn sample(area: &RotatedRect, image: &Image, x: u32, y: u32) -> Color {
    image_pixel(area, image, x, y).map_or(Color::NULL, |(x, y)| image.get(x, y))
}

/// A read-only, possibly rotated region of an [`Image`].
#[derive(Clone, Copy)]
pub struct ImageView<'a> {
    image: &'a Image,
    area: RotatedRect,
}

impl<'a> ImageView<'a> {
    pub fn width(&self) -> u32 {
        self.area.rect().width() as u32
    }

    pub fn height(&self) -> u32 {
        self.area.rect().height() as u32
    }

    /// Returns a rectangle of the view's size, with its top left corner at `(0, 0)`.
    pub fn rect(&self) -> Rect {
        let size = self.area.rect().size();
        Rect::from_top_left(0.0, 0.0, size.x, size.y)
    }

    /// Returns the color at view coordinates `(x, y)`, or [`Color::NULL`] outside the image.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Color {
        sample(&self.area, self.image, x, y)
    }

    /// Returns a view of the part of this view covered by `rect`.
    ///
    /// `rect` may extend past this view, in which case the surrounding image is visible through
    /// the new view.
    pub fn view(&self, rect: impl Into<RotatedRect>) -> ImageView<'a> {
        ImageView {
            image: self.image,
            area: sub_area(&self.area, rect.into()),
        }
    }
}

impl fmt::Debug for ImageView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} ImageView at {:?}", self.width(), self.height(), self.area)
    }
}

/// A writable, possibly rotated region of an [`Image`].
pub struct ImageViewMut<'a> {
    image: &'a mut Image,
    area: RotatedRect,
}

impl<'a> ImageViewMut<'a> {
    pub fn width(&self) -> u32 {
        self.area.rect().width() as u32
    }

    pub fn height(&self) -> u32 {
        self.area.rect().height() as u32
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Color {
        sample(&self.area, self.image, x, y)
    }

    /// Sets the color at view coordinates `(x, y)`. Writes outside the image are discarded.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        if let Some((x, y)) = image_pixel(&self.area, self.image, x, y) {
            self.image.buf[(x, y)] = Rgba(color.0);
        }
    }

    /// Reborrows this view for a shorter lifetime.
    pub fn reborrow(&mut self) -> ImageViewMut<'_> {
        ImageViewMut {
            image: self.image,
            area: self.area,
        }
    }
}

impl fmt::Debug for ImageViewMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} ImageViewMut at {:?}", self.width(), self.height(), self.area)
    }
}

/// An 8-bit sRGB color with non-premultiplied alpha.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    /// Fully transparent black, returned for pixels outside of an image.
    pub const NULL: Self = Self([0, 0, 0, 0]);
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0, 255]);
    pub const GREEN: Self = Self([0, 255, 0, 255]);
    pub const BLUE: Self = Self([0, 0, 255, 255]);
    pub const YELLOW: Self = Self([255, 255, 0, 255]);
    pub const CYAN: Self = Self([0, 255, 255, 255]);

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
    }
}

impl PixelColor for Color {
    type Raw = RawU32;
}

/// Types that can be read as an [`ImageView`]: images and views.
pub trait AsImageView {
    fn as_view(&self) -> ImageView<'_>;
}

/// Types that can be written through an [`ImageViewMut`]: images and mutable views.
pub trait AsImageViewMut: AsImageView {
    fn as_view_mut(&mut self) -> ImageViewMut<'_>;
}

impl AsImageView for Image {
    fn as_view(&self) -> ImageView<'_> {
        self.view(self.rect())
    }
}

impl AsImageViewMut for Image {
    fn as_view_mut(&mut self) -> ImageViewMut<'_> {
        let rect = self.rect();
        self.view_mut(rect)
    }
}

impl AsImageView for ImageView<'_> {
    fn as_view(&self) -> ImageView<'_> {
        *self
    }
}

impl AsImageView for ImageViewMut<'_> {
    fn as_view(&self) -> ImageView<'_> {
        ImageView {
            image: self.image,
            area: self.area,
        }
    }
}

impl AsImageViewMut for ImageViewMut<'_> {
    fn as_view_mut(&mut self) -> ImageViewMut<'_> {
        self.reborrow()
    }
}
