//! Rectangles for detections, regions of interest, and image views.
//!
//! All coordinates are in pixels, with Y pointing down. A [`RotatedRect`] turns clockwise on
//! screen for positive angles.

use std::fmt;

use nalgebra::{Rotation2, Vector2};

use super::AspectRatio;

/// A position or size.
pub type Vec2f = Vector2<f32>;

#[inline]
pub fn vec2(x: f32, y: f32) -> Vec2f {
    Vec2f::new(x, y)
}

/// Rotates `v` around the origin, clockwise on screen.
fn turn(v: Vec2f, radians: f32) -> Vec2f {
    Rotation2::new(radians) * v
}

/// An axis-aligned rectangle with non-negative size.
#[derive(Clone, Copy, PartialEq)]
pub struct Rect {
    center: Vec2f,
    size: Vec2f,
}

impl Rect {
    #[inline]
    pub fn from_center(x_center: f32, y_center: f32, width: f32, height: f32) -> Self {
        Self {
            center: vec2(x_center, y_center),
            size: vec2(width, height),
        }
    }

    #[inline]
    pub fn from_top_left(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::from_center(x + width * 0.5, y + height * 0.5, width, height)
    }

    /// The smallest rectangle containing all `points`, or `None` if there are none.
    pub fn bounding<I: IntoIterator<Item = [f32; 2]>>(points: I) -> Option<Self> {
        let mut points = points.into_iter().map(Vec2f::from);
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| (min.inf(&p), max.sup(&p)));
        Some(Self::from_corners(min, max))
    }

    fn from_corners(min: Vec2f, max: Vec2f) -> Self {
        Self {
            center: (min + max) * 0.5,
            size: max - min,
        }
    }

    /// Adds `amount` times the width and height on every side, keeping the center.
    #[must_use]
    pub fn grow_rel(&self, amount: f32) -> Self {
        Self {
            size: self.size * (1.0 + 2.0 * amount),
            ..*self
        }
    }

    /// Widens or heightens the rectangle around its center until it has the `target` aspect ratio.
    #[must_use]
    pub fn grow_to_fit_aspect(&self, target: AspectRatio) -> Self {
        let ratio = target.as_f32();
        let mut size = self.size;
        if self.height() * ratio >= self.width() {
            size.x = self.height() * ratio;
        } else {
            size.y = self.width() / ratio;
        }
        Self { size, ..*self }
    }

    #[inline]
    pub fn top_left(&self) -> Vec2f {
        self.center - self.size * 0.5
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.top_left().x
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.top_left().y
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.size.x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.size.y
    }

    #[inline]
    pub fn x_center(&self) -> f32 {
        self.center.x
    }

    #[inline]
    pub fn y_center(&self) -> f32 {
        self.center.y
    }

    #[inline]
    pub fn center(&self) -> Vec2f {
        self.center
    }

    #[inline]
    pub fn size(&self) -> Vec2f {
        self.size
    }

    fn area(&self) -> f32 {
        self.size.x * self.size.y
    }

    fn overlap_area(&self, other: &Self) -> f32 {
        let min = self.top_left().sup(&other.top_left());
        let max = (self.top_left() + self.size).inf(&(other.top_left() + other.size));
        let overlap = (max - min).sup(&Vec2f::zeros());
        overlap.x * overlap.y
    }

    /// Intersection over union. Two empty rectangles have an IoU of 0.
    pub fn iou(&self, other: &Self) -> f32 {
        let overlap = self.overlap_area(other);
        let union = self.area() + other.area() - overlap;
        if union == 0.0 {
            0.0
        } else {
            overlap / union
        }
    }
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect({}x{} around {},{})",
            self.size.x, self.size.y, self.center.x, self.center.y
        )
    }
}

/// A [`Rect`] turned clockwise around its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    rect: Rect,
    radians: f32,
}

impl RotatedRect {
    #[inline]
    pub fn new(rect: Rect, radians: f32) -> Self {
        Self { rect, radians }
    }

    /// The smallest rectangle turned by `radians` that contains all `points`.
    ///
    /// Returns `None` if there are no points.
    pub fn bounding<I: IntoIterator<Item = [f32; 2]>>(radians: f32, points: I) -> Option<Self> {
        // Bound the points in the rectangle's own orientation, then turn the center back.
        let upright = Rect::bounding(points.into_iter().map(|p| {
            let p = turn(Vec2f::from(p), -radians);
            [p.x, p.y]
        }))?;
        let center = turn(upright.center, radians);
        Some(Self::new(
            Rect {
                center,
                ..upright
            },
            radians,
        ))
    }

    #[inline]
    pub fn rotation_radians(&self) -> f32 {
        self.radians
    }

    /// The rectangle before rotation.
    #[inline]
    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    /// Replaces the rectangle, keeping the rotation.
    #[must_use]
    pub fn map(self, f: impl FnOnce(Rect) -> Rect) -> Self {
        Self::new(f(self.rect), self.radians)
    }

    pub fn center(&self) -> Vec2f {
        self.rect.center
    }

    #[must_use]
    pub fn grow_rel(&self, amount: f32) -> Self {
        self.map(|rect| rect.grow_rel(amount))
    }

    #[must_use]
    pub fn grow_to_fit_aspect(&self, target: AspectRatio) -> Self {
        self.map(|rect| rect.grow_to_fit_aspect(target))
    }

    /// The axis-aligned rectangle around all four rotated corners.
    pub fn bounding_rect(&self) -> Rect {
        let half = self.rect.size * 0.5;
        let extent = [vec2(half.x, half.y), vec2(half.x, -half.y)]
            .map(|corner| turn(corner, self.radians).abs())
            .into_iter()
            .fold(Vec2f::zeros(), |acc, c| acc.sup(&c));
        Rect::from_corners(self.center() - extent, self.center() + extent)
    }

    /// Maps a point from this rectangle's coordinates to the surrounding ones.
    ///
    /// Inside, the origin is the top left corner and the axes are turned with the rectangle.
    pub fn transform_out(&self, x: f32, y: f32) -> [f32; 2] {
        let half = self.rect.size * 0.5;
        let p = turn(vec2(x, y) - half, self.radians) + self.rect.center;
        [p.x, p.y]
    }
}

impl From<Rect> for RotatedRect {
    fn from(rect: Rect) -> Self {
        Self::new(rect, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::TAU;

    use approx::assert_abs_diff_eq;

    use super::*;

    const EPS: f32 = 1e-4;

    #[track_caller]
    fn assert_close(actual: [f32; 2], expected: [f32; 2]) {
        assert_abs_diff_eq!(actual[0], expected[0], epsilon = EPS);
        assert_abs_diff_eq!(actual[1], expected[1], epsilon = EPS);
    }

    #[test]
    fn top_left_and_center_agree() {
        let rect = Rect::from_top_left(10.0, 20.0, 30.0, 40.0);
        assert_eq!(rect, Rect::from_center(25.0, 40.0, 30.0, 40.0));
        assert_eq!([rect.x(), rect.y()], [10.0, 20.0]);
        assert_eq!([rect.x_center(), rect.y_center()], [25.0, 40.0]);
    }

    #[test]
    fn bounding_points() {
        assert_eq!(
            Rect::bounding([[0.0, 0.0], [1.0, 1.0], [-1.0, -1.0]]),
            Some(Rect::from_center(0.0, 0.0, 2.0, 2.0))
        );
        assert_eq!(
            Rect::bounding([[4.0, 2.0]]),
            Some(Rect::from_center(4.0, 2.0, 0.0, 0.0))
        );
        assert!(Rect::bounding([]).is_none());
    }

    #[test]
    fn iou() {
        let small = Rect::from_center(9.0, 9.0, 1.0, 1.0);
        let big = Rect::from_center(9.0, 9.0, 2.0, 2.0);
        assert_eq!(small.iou(&big), 0.25);
        assert_eq!(big.iou(&small), 0.25);

        let half = Rect::from_top_left(0.0, 0.0, 2.0, 2.0);
        let shifted = Rect::from_top_left(1.0, 0.0, 2.0, 2.0);
        assert_abs_diff_eq!(half.iou(&shifted), 2.0 / 6.0);

        let apart = Rect::from_top_left(10.0, 10.0, 2.0, 2.0);
        assert_eq!(half.iou(&apart), 0.0);

        let empty = Rect::from_center(0.0, 0.0, 0.0, 0.0);
        assert_eq!(empty.iou(&empty), 0.0);
    }

    #[test]
    fn growing() {
        let palm = Rect::from_center(10.0, 10.0, 10.0, 20.0);
        assert_eq!(palm.grow_rel(0.5), Rect::from_center(10.0, 10.0, 20.0, 40.0));

        let square = AspectRatio::new(1, 1).unwrap();
        assert_eq!(
            palm.grow_to_fit_aspect(square),
            Rect::from_center(10.0, 10.0, 20.0, 20.0)
        );
        assert_eq!(
            Rect::from_center(0.0, 0.0, 640.0, 480.0).grow_to_fit_aspect(square),
            Rect::from_center(0.0, 0.0, 640.0, 640.0)
        );
    }

    #[test]
    fn transform_out() {
        let offset: RotatedRect = Rect::from_top_left(10.0, 20.0, 1.0, 1.0).into();
        assert_close(offset.transform_out(0.0, 0.0), [10.0, 20.0]);

        // A quarter turn moves the top left corner to the top right.
        let quarter = RotatedRect::new(Rect::from_top_left(0.0, 0.0, 1.0, 1.0), TAU / 4.0);
        assert_close(quarter.transform_out(0.0, 0.0), [1.0, 0.0]);
        assert_close(quarter.transform_out(0.5, 0.5), [0.5, 0.5]);
        assert_close(quarter.transform_out(0.0, -1.0), [2.0, 0.0]);

        let half = RotatedRect::new(Rect::from_top_left(10.0, 20.0, 1.0, 1.0), TAU / 2.0);
        assert_close(half.transform_out(0.0, 0.0), [11.0, 21.0]);
    }

    #[test]
    fn rotated_bounding() {
        assert!(RotatedRect::bounding(0.0, []).is_none());

        let upright = RotatedRect::bounding(0.0, [[0.0, 0.0], [10.0, 4.0]]).unwrap();
        assert_eq!(*upright.rect(), Rect::from_top_left(0.0, 0.0, 10.0, 4.0));

        // The box is tall in its own orientation and lies flat on screen.
        let turned = RotatedRect::bounding(TAU / 4.0, [[0.0, 0.0], [10.0, 0.0]]).unwrap();
        assert_abs_diff_eq!(turned.rect().width(), 0.0, epsilon = EPS);
        assert_abs_diff_eq!(turned.rect().height(), 10.0, epsilon = EPS);
        assert_close([turned.center().x, turned.center().y], [5.0, 0.0]);
        assert_eq!(turned.rotation_radians(), TAU / 4.0);
    }

    #[test]
    fn bounding_rect_of_rotation() {
        let diamond = RotatedRect::new(Rect::from_center(0.0, 0.0, 2.0, 2.0), TAU / 8.0);
        let bounds = diamond.bounding_rect();
        assert_abs_diff_eq!(bounds.width(), 2.0 * 2f32.sqrt(), epsilon = EPS);
        assert_abs_diff_eq!(bounds.height(), 2.0 * 2f32.sqrt(), epsilon = EPS);
        assert_close([bounds.x_center(), bounds.y_center()], [0.0, 0.0]);

        let upright: RotatedRect = Rect::from_top_left(1.0, 2.0, 3.0, 4.0).into();
        assert_eq!(upright.bounding_rect(), Rect::from_top_left(1.0, 2.0, 3.0, 4.0));
    }
}
