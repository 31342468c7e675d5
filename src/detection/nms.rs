//! Non-Maximum Suppression and Averaging.
//!
//! The palm detector reports many overlapping candidates for each hand, one per nearby anchor.
//! Non-Maximum Suppression (NMS) filters these duplicates out, leaving a single detection per
//! object.
//!
//! Two variants are implemented, selected with [`SuppressionMode`]: classic suppression, which
//! removes any overlapping detections with lower confidence ([`SuppressionMode::Remove`]), and
//! Non-Maximum Averaging ([`SuppressionMode::Average`]), which replaces each group of overlapping
//! detections with their confidence-weighted average. Averaging reduces jitter between frames and
//! is the default.

use crate::{image::Rect, iter::zip_exact, num::TotalF32};

use super::{Detection, Keypoint};

/// A non-maximum suppression algorithm.
pub struct NonMaxSuppression {
    iou_thresh: f32,
    group: Vec<Detection>,
    out_buf: Vec<Detection>,
    mode: SuppressionMode,
}

impl NonMaxSuppression {
    /// The default intersection-over-union threshold used to determine if two detections overlap.
    pub const DEFAULT_IOU_THRESH: f32 = 0.3;

    /// Creates a new non-maximum suppressor using [`SuppressionMode::Average`].
    pub fn new() -> Self {
        Self {
            iou_thresh: Self::DEFAULT_IOU_THRESH,
            group: Vec::new(),
            out_buf: Vec::new(),
            mode: SuppressionMode::Average,
        }
    }

    /// Sets the intersection-over-union threshold to consider two detections as overlapping.
    pub fn set_iou_thresh(&mut self, iou_thresh: f32) {
        self.iou_thresh = iou_thresh;
    }

    /// Sets the suppression mode.
    pub fn set_mode(&mut self, mode: SuppressionMode) {
        self.mode = mode;
    }

    /// Performs non-maximum suppression on `detections`, in place.
    ///
    /// Afterwards, `detections` is sorted by descending confidence.
    pub fn process(&mut self, detections: &mut Vec<Detection>) {
        self.out_buf.clear();

        // Sort by ascending confidence, process highest confidence first by starting at the back.
        detections.sort_unstable_by_key(|det| TotalF32(det.confidence));

        while let Some(seed) = detections.pop() {
            let seed_rect = seed.bounding_rect();
            let iou_thresh = self.iou_thresh;
            let overlaps = |other: &Detection| seed_rect.iou(&other.bounding_rect()) >= iou_thresh;

            match self.mode {
                SuppressionMode::Remove => {
                    detections.retain(|other| !overlaps(other));
                    self.out_buf.push(seed);
                }
                SuppressionMode::Average => {
                    self.group.clear();
                    let mut i = 0;
                    while i < detections.len() {
                        if overlaps(&detections[i]) {
                            self.group.push(detections.remove(i));
                        } else {
                            i += 1;
                        }
                    }

                    if self.group.is_empty() {
                        self.out_buf.push(seed);
                    } else {
                        self.group.push(seed);
                        self.out_buf.push(weighted_average(&self.group));
                    }
                }
            }
        }

        self.group.clear();
        detections.append(&mut self.out_buf);
    }
}

/// Averages rectangle, angle and keypoints of `group`, weighted by confidence.
///
/// The result keeps the confidence of the last (highest scoring) detection.
fn weighted_average(group: &[Detection]) -> Detection {
    let best = &group[group.len() - 1];
    let mut acc = Detection::with_keypoints(
        best.confidence(),
        Rect::from_center(0.0, 0.0, 0.0, 0.0),
        vec![Keypoint::new(0.0, 0.0); best.keypoints().len()],
    );

    let [mut x, mut y, mut w, mut h, mut angle] = [0.0; 5];
    let mut divisor = 0.0;
    for det in group {
        let factor = det.confidence;
        divisor += factor;
        for (acc, kp) in zip_exact(acc.keypoints.iter_mut(), &det.keypoints) {
            acc.x += kp.x * factor;
            acc.y += kp.y * factor;
        }
        let rect = det.bounding_rect();
        x += rect.x_center() * factor;
        y += rect.y_center() * factor;
        w += rect.width() * factor;
        h += rect.height() * factor;
        angle += det.angle * factor;
    }

    for kp in &mut acc.keypoints {
        kp.x /= divisor;
        kp.y /= divisor;
    }
    acc.set_bounding_rect(Rect::from_center(
        x / divisor,
        y / divisor,
        w / divisor,
        h / divisor,
    ));
    acc.set_angle(angle / divisor);
    acc
}

impl Default for NonMaxSuppression {
    fn default() -> Self {
        Self::new()
    }
}

/// Describes how [`NonMaxSuppression`] should deal with overlapping detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressionMode {
    /// Remove overlapping detections, only retain the detection with highest confidence score.
    Remove,

    /// Compute a confidence-weighted average of overlapping detections.
    Average,
}
