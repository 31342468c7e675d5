//! Frame sizes and their aspect ratios.

use std::fmt;

/// Size of a frame, window, or network input in pixels.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Used to prefer the largest of several camera formats.
    pub fn num_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Returns `None` for an empty resolution.
    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        AspectRatio::new(self.width, self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A `width:height` ratio in lowest terms.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct AspectRatio {
    // Both nonzero, without common divisors.
    width: u32,
    height: u32,
}

impl AspectRatio {
    /// Reduces `width:height`. Returns `None` if either side is zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }

        let divisor = gcd(width, height);
        Some(Self {
            width: width / divisor,
            height: height / divisor,
        })
    }

    #[inline]
    pub fn as_f32(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl fmt::Debug for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_ratios() {
        let hd = Resolution::new(1280, 720).aspect_ratio().unwrap();
        assert_eq!(hd, AspectRatio::new(1920, 1080).unwrap());
        assert_eq!(hd.to_string(), "16:9");
        assert_eq!(
            Resolution::new(640, 480).aspect_ratio().unwrap().to_string(),
            "4:3"
        );
        assert_eq!(AspectRatio::new(192, 192).unwrap().as_f32(), 1.0);
    }

    #[test]
    fn empty_resolution_has_no_ratio() {
        assert_eq!(Resolution::new(0, 480).aspect_ratio(), None);
        assert_eq!(AspectRatio::new(640, 0), None);
    }

    #[test]
    fn display() {
        let res = Resolution::new(640, 480);
        assert_eq!(res.to_string(), "640x480");
        assert_eq!(format!("{res:?}"), "640x480");
        assert_eq!(res.num_pixels(), 307_200);
    }
}
