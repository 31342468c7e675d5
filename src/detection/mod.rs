//! Common functionality for object detection.
//!
//! A [`Detector`] runs a detection [`Network`] over an image of arbitrary size and maps the
//! resulting [`Detection`]s back into the image's coordinate system.

pub mod nms;
pub mod ssd;

use crate::image::{AsImageView, ImageView, Rect, RotatedRect};
use crate::nn::{Cnn, Outputs};
use crate::timer::Timer;

use self::nms::NonMaxSuppression;

/// Trait implemented by neural networks that detect objects in an input image.
pub trait Network: Send + Sync + 'static {
    /// Returns the [`Cnn`] to use for detection.
    fn cnn(&self) -> &Cnn;

    /// Extracts all detections with confidence above `threshold` from the network's output.
    ///
    /// Keypoint and detection positions are expected to be in the coordinate system of the
    /// network's input. Returns an error if the outputs do not have the expected shape.
    fn extract(
        &self,
        outputs: &Outputs,
        threshold: f32,
        detections: &mut Detections,
    ) -> anyhow::Result<()>;
}

/// A list of object detections.
#[derive(Debug, Default)]
pub struct Detections {
    vec: Vec<Detection>,
}

impl Detections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }

    pub fn clear(&mut self) {
        self.vec.clear();
    }

    pub fn push(&mut self, detection: Detection) {
        self.vec.push(detection);
    }

    /// Returns an iterator yielding the stored detections.
    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.vec.iter()
    }
}

impl<'a> IntoIterator for &'a Detections {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A generic object detector.
///
/// This type wraps a detection [`Network`], adapts input images to the network's aspect ratio,
/// and deduplicates the raw network output with [`NonMaxSuppression`].
pub struct Detector {
    network: Box<dyn Network>,
    detections: Detections,
    t_infer: Timer,
    t_extract: Timer,
    t_nms: Timer,
    thresh: f32,
    nms: NonMaxSuppression,
}

impl Detector {
    pub const DEFAULT_THRESHOLD: f32 = 0.5;

    pub fn new<N: Network>(network: N) -> Self {
        Self {
            network: Box::new(network),
            detections: Detections::new(),
            t_infer: Timer::new("infer"),
            t_extract: Timer::new("extract"),
            t_nms: Timer::new("nms"),
            thresh: Self::DEFAULT_THRESHOLD,
            nms: NonMaxSuppression::new(),
        }
    }

    /// Sets the minimum confidence for a detection to be reported.
    #[inline]
    pub fn set_threshold(&mut self, thresh: f32) {
        self.thresh = thresh;
    }

    /// Runs detection on `image`, returning the detections in the image's coordinate system.
    pub fn detect<V: AsImageView>(&mut self, image: &V) -> anyhow::Result<&Detections> {
        self.detect_impl(image.as_view())
    }

    fn detect_impl(&mut self, image: ImageView<'_>) -> anyhow::Result<&Detections> {
        self.detections.clear();

        let cnn = self.network.cnn();
        let input_res = cnn.input_resolution();

        // If the input image's aspect ratio doesn't match the CNN's input, create an oversized view
        // that does.
        let rect = image.rect().grow_to_fit_aspect(cnn.input_aspect_ratio());
        let view = image.view(rect);
        let outputs = self.t_infer.time(|| cnn.estimate(&view))?;
        log::trace!("inference result: {:?}", outputs);

        self.t_extract.time(|| {
            self.network
                .extract(&outputs, self.thresh, &mut self.detections)
        })?;

        self.t_nms.time(|| self.nms.process(&mut self.detections.vec));

        // Map all coordinates from the network's input coordinate system to `rect`'s system, then
        // remove the offset of the oversized rectangle.
        let scale = rect.width() / input_res.width() as f32;
        for det in &mut self.detections.vec {
            let r = det.rect;
            det.rect = Rect::from_center(
                r.x_center() * scale + rect.x(),
                r.y_center() * scale + rect.y(),
                r.width() * scale,
                r.height() * scale,
            );
            for kp in &mut det.keypoints {
                kp.x = kp.x * scale + rect.x();
                kp.y = kp.y * scale + rect.y();
            }
        }

        Ok(&self.detections)
    }

    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_infer, &self.t_extract, &self.t_nms].into_iter()
    }
}

/// A detected object.
///
/// A [`Detection`] consists of a [`Rect`] enclosing the detected object, a confidence value, an
/// optional rotation angle of the object, and a possibly empty set of located keypoints.
///
/// The confidence value lies between 0.0 and 1.0, which is achieved by passing the raw network
/// output through [`crate::num::sigmoid`]. [`nms::SuppressionMode::Average`] weighs detections by
/// their confidence, so it has to have the expected range.
#[derive(Debug, Clone)]
pub struct Detection {
    confidence: f32,
    angle: f32,
    rect: Rect,
    keypoints: Vec<Keypoint>,
}

impl Detection {
    pub fn new(confidence: f32, rect: Rect) -> Self {
        Self::with_keypoints(confidence, rect, Vec::new())
    }

    pub fn with_keypoints(confidence: f32, rect: Rect, keypoints: Vec<Keypoint>) -> Self {
        Self {
            confidence,
            angle: 0.0,
            rect,
            keypoints,
        }
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Returns the angle of the detected object, in radians, clockwise.
    ///
    /// Networks that do not compute an object angle leave this at 0.0.
    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Sets the angle of the detected object, in radians, clockwise.
    pub fn set_angle(&mut self, angle: f32) {
        self.angle = angle;
    }

    /// Returns the axis-aligned bounding rectangle containing the detected object.
    pub fn bounding_rect(&self) -> Rect {
        self.rect
    }

    pub fn set_bounding_rect(&mut self, rect: Rect) {
        self.rect = rect;
    }

    /// Returns the bounding rectangle, rotated by the detection's angle.
    pub fn rotated_rect(&self) -> RotatedRect {
        RotatedRect::new(self.rect, self.angle)
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }
}

/// A 2D keypoint produced as part of a [`Detection`].
///
/// The meaning of a keypoint depends on the specific detector and on its index in the keypoint
/// list. The palm detector uses them to compute the hand's rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    x: f32,
    y: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }
}
