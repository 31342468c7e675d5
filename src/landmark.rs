//! Following an object with a landmark network.
//!
//! A [`LandmarkTracker`] is seeded with a region of interest (for hands, the region computed from
//! a palm detection). Every frame, it cuts that region out of the image, runs the landmark
//! network on it, and moves the region to wherever the landmarks ended up. This way the network
//! sees the object upright and at roughly the same size, no matter where it is in the frame.

use crate::image::{AsImageView, ImageView, Resolution, RotatedRect};
use crate::nn::{Cnn, Outputs};

type Position = [f32; 3];

/// A fixed number of 3D landmark positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks {
    positions: Box<[Position]>,
}

impl Landmarks {
    /// Creates `len` landmarks at the origin.
    pub fn new(len: usize) -> Self {
        Self {
            positions: vec![[0.0; 3]; len].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut [Position] {
        &mut self.positions
    }

    pub fn map_positions(&mut self, mut f: impl FnMut(Position) -> Position) {
        for pos in self.positions.iter_mut() {
            *pos = f(*pos);
        }
    }

    /// Iterates over the X/Y coordinates of all landmarks.
    pub fn xy(&self) -> impl Iterator<Item = [f32; 2]> + '_ {
        self.positions.iter().map(|&[x, y, _]| [x, y])
    }
}

/// The decoded output of a landmark network.
pub trait Estimate: Send + 'static {
    fn landmarks_mut(&mut self) -> &mut Landmarks;

    /// How confident the network is that the object is still in view, from 0.0 to 1.0.
    fn confidence(&self) -> f32;

    /// The object's clockwise rotation, relative to the region it was estimated in.
    ///
    /// The tracker turns its region by this amount so that the next frame shows the object
    /// upright. `None` keeps the region's rotation.
    fn angle_radians(&self) -> Option<f32> {
        None
    }
}

/// A landmark network and the decoder for its outputs.
pub trait Network: Send + Sync + 'static {
    type Output: Estimate;

    fn cnn(&self) -> &Cnn;

    /// Decodes `outputs` into `estimate`, with positions in network input pixels.
    ///
    /// Fails if `outputs` do not have the shapes the network is known to produce.
    fn extract(&self, outputs: &Outputs, estimate: &mut Self::Output) -> anyhow::Result<()>;
}

/// Follows one object across frames with a landmark [`Network`].
pub struct LandmarkTracker<E: Estimate> {
    network: Box<dyn Network<Output = E>>,
    estimate: E,
    roi: Option<RotatedRect>,
    loss_thresh: f32,
}

impl<E: Estimate + Default> LandmarkTracker<E> {
    /// Creates a tracker with no region of interest.
    pub fn new<N: Network<Output = E>>(network: N) -> Self {
        Self {
            network: Box::new(network),
            estimate: E::default(),
            roi: None,
            loss_thresh: Self::DEFAULT_LOSS_THRESHOLD,
        }
    }
}

impl<E: Estimate> LandmarkTracker<E> {
    pub const DEFAULT_LOSS_THRESHOLD: f32 = 0.5;

    /// Margin added around the landmark bounds, relative to their size, when moving the region.
    const ROI_PADDING: f32 = 0.3;

    /// Sets the confidence below which the object counts as lost.
    pub fn set_loss_threshold(&mut self, threshold: f32) {
        self.loss_thresh = threshold;
    }

    /// The region that will be looked at in the next frame, or `None` once tracking is lost.
    pub fn roi(&self) -> Option<&RotatedRect> {
        self.roi.as_ref()
    }

    /// Starts tracking in `roi`. No padding is added.
    pub fn set_roi(&mut self, roi: impl Into<RotatedRect>) {
        self.roi = Some(roi.into());
    }

    /// Estimates landmarks in the current region of `image`, and moves the region along with them.
    ///
    /// Returns `Ok(None)` when there is no region to look at, or when the network's confidence
    /// drops below the loss threshold. The region is cleared in the latter case.
    pub fn track<V: AsImageView>(
        &mut self,
        image: &V,
    ) -> anyhow::Result<Option<TrackingResult<'_, E>>> {
        self.track_impl(image.as_view())
    }

    fn track_impl(&mut self, image: ImageView<'_>) -> anyhow::Result<Option<TrackingResult<'_, E>>> {
        let Some(roi) = self.roi else {
            return Ok(None);
        };

        let cnn = self.network.cnn();
        let view_rect = roi.map(|rect| rect.grow_to_fit_aspect(cnn.input_aspect_ratio()));
        let outputs = cnn.estimate(&image.view(view_rect))?;
        self.network.extract(&outputs, &mut self.estimate)?;

        let confidence = self.estimate.confidence();
        if confidence < self.loss_thresh {
            log::trace!("confidence {confidence} below {}, lost track", self.loss_thresh);
            self.roi = None;
            return Ok(None);
        }

        // The estimated angle is relative to the region, so read it before leaving its coordinates.
        let angle = roi.rotation_radians() + self.estimate.angle_radians().unwrap_or(0.0);
        to_image_coords(
            self.estimate.landmarks_mut(),
            view_rect,
            cnn.input_resolution(),
        );

        self.roi = RotatedRect::bounding(angle, self.estimate.landmarks_mut().xy())
            .map(|bounds| bounds.grow_rel(Self::ROI_PADDING));
        if self.roi.is_none() {
            return Ok(None);
        }

        Ok(Some(TrackingResult {
            view_rect,
            estimate: &self.estimate,
        }))
    }
}

/// Moves landmarks from the network input's pixel grid onto the image region it was sampled from.
///
/// Z is scaled like X, so depth stays in the same unit as image pixels.
fn to_image_coords(landmarks: &mut Landmarks, view_rect: RotatedRect, input_res: Resolution) {
    let scale = view_rect.rect().width() / input_res.width() as f32;
    landmarks.map_positions(|pos| {
        let [x, y, z] = pos.map(|c| c * scale);
        let [x, y] = view_rect.transform_out(x, y);
        [x, y, z]
    });
}

/// Landmarks found by [`LandmarkTracker::track`], in the coordinates of the tracked image.
pub struct TrackingResult<'a, E: Estimate> {
    view_rect: RotatedRect,
    estimate: &'a E,
}

impl<'a, E: Estimate> TrackingResult<'a, E> {
    /// The region of the image that was passed to the network.
    pub fn view_rect(&self) -> RotatedRect {
        self.view_rect
    }

    pub fn estimate(&self) -> &'a E {
        self.estimate
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::TAU;

    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::image::Rect;

    #[test]
    fn landmarks_accessors() {
        let mut lms = Landmarks::new(2);
        assert_eq!(lms.len(), 2);
        assert!(!lms.is_empty());
        lms.positions_mut()[1] = [2.0, 4.0, 6.0];
        lms.map_positions(|[x, y, z]| [x + 1.0, y, z]);
        assert_eq!(lms.xy().collect::<Vec<_>>(), [[1.0, 0.0], [3.0, 4.0]]);
    }

    #[test]
    fn upright_region_scales_and_offsets() {
        let mut lms = Landmarks::new(2);
        lms.positions_mut()[0] = [0.0, 0.0, 0.0];
        lms.positions_mut()[1] = [224.0, 112.0, 10.0];

        let view = Rect::from_top_left(100.0, 50.0, 448.0, 448.0).into();
        to_image_coords(&mut lms, view, Resolution::new(224, 224));
        assert_eq!(lms.positions()[0], [100.0, 50.0, 0.0]);
        assert_eq!(lms.positions()[1], [548.0, 274.0, 20.0]);
    }

    #[test]
    fn rotated_region() {
        let mut lms = Landmarks::new(1);
        // Top-center of the network input.
        lms.positions_mut()[0] = [112.0, 0.0, 0.0];

        // A quarter turn clockwise puts the region's top edge on the right.
        let view = RotatedRect::new(Rect::from_center(0.0, 0.0, 224.0, 224.0), TAU / 4.0);
        to_image_coords(&mut lms, view, Resolution::new(224, 224));
        let [x, y, _] = lms.positions()[0];
        assert_abs_diff_eq!(x, 112.0, epsilon = 1e-3);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-3);
    }
}
