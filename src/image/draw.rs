//! Overlay drawing.
//!
//! Every function returns a guard that can be used to customize the shape, which is drawn when
//! the guard is dropped. Shapes are clipped to the target image.

use std::convert::Infallible;

use embedded_graphics::{
    mono_font::{ascii, MonoTextStyle},
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};

use super::{AsImageViewMut, Color, ImageViewMut};

/// Guard returned by [`line`].
pub struct DrawLine<'a> {
    image: ImageViewMut<'a>,
    start: Point,
    end: Point,
    color: Color,
    stroke_width: u32,
}

impl DrawLine<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the line's stroke width (default 1).
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }
}

impl Drop for DrawLine<'_> {
    fn drop(&mut self) {
        let line = Line::new(self.start, self.end)
            .into_styled(PrimitiveStyle::with_stroke(self.color, self.stroke_width));
        render(&mut self.image, line);
    }
}

/// Guard returned by [`circle`].
pub struct DrawCircle<'a> {
    image: ImageViewMut<'a>,
    center: Point,
    diameter: u32,
    color: Color,
    filled: bool,
}

impl DrawCircle<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Fills the circle instead of only drawing its outline.
    pub fn filled(&mut self) -> &mut Self {
        self.filled = true;
        self
    }
}

impl Drop for DrawCircle<'_> {
    fn drop(&mut self) {
        let style = if self.filled {
            PrimitiveStyle::with_fill(self.color)
        } else {
            PrimitiveStyle::with_stroke(self.color, 1)
        };
        let circle = Circle::with_center(self.center, self.diameter).into_styled(style);
        render(&mut self.image, circle);
    }
}

/// Guard returned by [`text`].
pub struct DrawText<'a> {
    image: ImageViewMut<'a>,
    position: Point,
    text: &'a str,
    color: Color,
    alignment: Alignment,
    large: bool,
}

impl DrawText<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Starts the text at `x` instead of centering it there.
    pub fn align_left(&mut self) -> &mut Self {
        self.alignment = Alignment::Left;
        self
    }

    /// Uses a 10x20 font instead of the default 6x10 one.
    pub fn large(&mut self) -> &mut Self {
        self.large = true;
        self
    }
}

impl Drop for DrawText<'_> {
    fn drop(&mut self) {
        let font = if self.large {
            &ascii::FONT_10X20
        } else {
            &ascii::FONT_6X10
        };
        let style = TextStyleBuilder::new()
            .alignment(self.alignment)
            .baseline(Baseline::Middle)
            .build();
        let text = Text::with_text_style(
            self.text,
            self.position,
            MonoTextStyle::new(font, self.color),
            style,
        );
        render(&mut self.image, text);
    }
}

/// Draws a line from `(x0, y0)` to `(x1, y1)`.
pub fn line<I: AsImageViewMut>(
    image: &mut I,
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
) -> DrawLine<'_> {
    DrawLine {
        image: image.as_view_mut(),
        start: Point::new(x0, y0),
        end: Point::new(x1, y1),
        color: Color::WHITE,
        stroke_width: 1,
    }
}

/// Draws the outline of a circle centered at `(x, y)`.
pub fn circle<I: AsImageViewMut>(
    image: &mut I,
    x: i32,
    y: i32,
    diameter: u32,
) -> DrawCircle<'_> {
    DrawCircle {
        image: image.as_view_mut(),
        center: Point::new(x, y),
        diameter,
        color: Color::WHITE,
        filled: false,
    }
}

/// Draws a line of text, vertically centered on `y` and horizontally centered on `x`.
pub fn text<'a, I: AsImageViewMut>(
    image: &'a mut I,
    x: i32,
    y: i32,
    text: &'a str,
) -> DrawText<'a> {
    DrawText {
        image: image.as_view_mut(),
        position: Point::new(x, y),
        text,
        color: Color::WHITE,
        alignment: Alignment::Center,
        large: false,
    }
}

fn render<D: Drawable<Color = Color>>(image: &mut ImageViewMut<'_>, drawable: D) {
    let mut target = Target(image.reborrow());
    if let Err(never) = drawable.draw(&mut target) {
        match never {}
    }
}

struct Target<'a>(ImageViewMut<'a>);

impl OriginDimensions for Target<'_> {
    fn size(&self) -> Size {
        Size::new(self.0.width(), self.0.height())
    }
}

impl DrawTarget for Target<'_> {
    type Color = Color;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Infallible>
    where
        I: IntoIterator<Item = Pixel<Color>>,
    {
        let area = self.bounding_box();
        for Pixel(pos, color) in pixels {
            if area.contains(pos) {
                self.0.set(pos.x as u32, pos.y as u32, color);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;

    fn count(image: &Image, color: Color) -> usize {
        image.data().chunks(4).filter(|px| **px == color.0).count()
    }

    #[test]
    fn line_clips_to_image() {
        let mut image = Image::new(4, 4);
        line(&mut image, -10, 1, 10, 1).color(Color::RED);
        for x in 0..4 {
            assert_eq!(image.get(x, 1), Color::RED);
        }
        assert_eq!(count(&image, Color::RED), 4);
    }

    #[test]
    fn wide_line() {
        let mut image = Image::new(8, 8);
        line(&mut image, 0, 4, 7, 4).stroke_width(3);
        assert_eq!(image.get(3, 3), Color::WHITE);
        assert_eq!(image.get(3, 5), Color::WHITE);
        assert_eq!(image.get(3, 1), Color::NULL);
    }

    #[test]
    fn circle_outline_and_fill() {
        let mut image = Image::new(16, 16);
        circle(&mut image, 8, 8, 9).color(Color::BLUE);
        assert_eq!(image.get(8, 8), Color::NULL);
        assert!(count(&image, Color::BLUE) > 0);

        circle(&mut image, 8, 8, 3).color(Color::GREEN).filled();
        assert_eq!(image.get(8, 8), Color::GREEN);
    }

    #[test]
    fn circle_near_edge() {
        let mut image = Image::new(4, 4);
        circle(&mut image, 0, 0, 3).filled();
        assert_eq!(image.get(0, 0), Color::WHITE);
    }

    #[test]
    fn text_alignment() {
        let mut centered = Image::new(64, 16);
        text(&mut centered, 32, 8, "hands").color(Color::YELLOW);
        assert!(count(&centered, Color::YELLOW) > 0);

        let mut left = Image::new(64, 16);
        text(&mut left, 32, 8, "hands").align_left().color(Color::YELLOW);
        let leftmost = |image: &Image| {
            (0..64)
                .find(|&x| (0..16).any(|y| image.get(x, y) == Color::YELLOW))
                .unwrap()
        };
        assert!(leftmost(&left) >= 32);
        assert!(leftmost(&centered) < 32);
    }
}
