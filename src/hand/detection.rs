//! Palm detection.

use std::path::Path;

use anyhow::bail;
use nalgebra::{Rotation2, Vector2};
use once_cell::sync::Lazy;

use crate::detection::{
    ssd::{Anchor, Anchors, LayerInfo},
    Detection, Detections, Network,
};
use crate::image::{Rect, Resolution, RotatedRect};
use crate::nn::{Cnn, Outputs};
use crate::num::sigmoid;

/// A keypoint of a palm [`Detection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keypoint {
    Wrist = 0,
    IndexFingerMcp = 1,
    MiddleFingerMcp = 2,
    RingFingerMcp = 3,
    PinkyMcp = 4,
    ThumbCmc = 5,
    ThumbMcp = 6,
}

const NUM_KEYPOINTS: usize = 7;

/// Number of values per anchor in the box output: 4 box parameters, then 7 `[x, y]` keypoints.
const BOX_PARAMS: usize = 4 + NUM_KEYPOINTS * 2;

/// Scale factor from the palm box to the region of interest that contains the whole hand.
const PALM_TO_HAND_SCALE: f32 = 2.6;

static ANCHORS: Lazy<Anchors> =
    Lazy::new(|| Anchors::calculate(&[LayerInfo::new(2, 24, 24), LayerInfo::new(6, 12, 12)]));

/// The "lite" palm detection network, loaded from `palm_detection_lite.onnx`.
#[derive(Clone)]
pub struct LiteNetwork {
    cnn: Cnn,
}

impl LiteNetwork {
    pub fn load(models_dir: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            cnn: super::load_cnn(models_dir, "palm_detection_lite.onnx")?,
        })
    }
}

impl Network for LiteNetwork {
    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn extract(
        &self,
        outputs: &Outputs,
        threshold: f32,
        detections: &mut Detections,
    ) -> anyhow::Result<()> {
        extract_outputs(self.cnn.input_resolution(), outputs, threshold, detections)
    }
}

/// The full-range palm detection network, loaded from `palm_detection_full.onnx`.
///
/// Somewhat slower than [`LiteNetwork`], but picks up hands further away from the camera.
#[derive(Clone)]
pub struct FullNetwork {
    cnn: Cnn,
}

impl FullNetwork {
    pub fn load(models_dir: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            cnn: super::load_cnn(models_dir, "palm_detection_full.onnx")?,
        })
    }
}

impl Network for FullNetwork {
    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn extract(
        &self,
        outputs: &Outputs,
        threshold: f32,
        detections: &mut Detections,
    ) -> anyhow::Result<()> {
        extract_outputs(self.cnn.input_resolution(), outputs, threshold, detections)
    }
}

fn extract_outputs(
    input_res: Resolution,
    outputs: &Outputs,
    thresh: f32,
    detections: &mut Detections,
) -> anyhow::Result<()> {
    if outputs.len() != 2 {
        bail!("palm detector has {} outputs, expected 2", outputs.len());
    }

    let num_anchors = ANCHORS.anchor_count();
    let boxes = &outputs[0];
    let confidences = &outputs[1];

    if boxes.shape() != [1, num_anchors, BOX_PARAMS] || confidences.shape() != [1, num_anchors, 1]
    {
        bail!(
            "unexpected palm detector output shapes {:?} and {:?} (expected {} anchors)",
            boxes.shape(),
            confidences.shape(),
            num_anchors,
        );
    }

    for (index, view) in confidences.index([0]).iter().enumerate() {
        let conf = sigmoid(view.as_slice()[0]);
        if conf < thresh {
            continue;
        }

        let box_params = boxes.index([0, index]);
        detections.push(extract_detection(
            &ANCHORS[index],
            input_res,
            box_params.as_slice(),
            conf,
        ));
    }

    Ok(())
}

fn extract_detection(
    anchor: &Anchor,
    input_res: Resolution,
    box_params: &[f32],
    confidence: f32,
) -> Detection {
    let input_w = input_res.width() as f32;
    let input_h = input_res.height() as f32;
    let (ax, ay) = (anchor.x_center() * input_w, anchor.y_center() * input_h);

    let rect = Rect::from_center(
        box_params[0] + ax,
        box_params[1] + ay,
        box_params[2],
        box_params[3],
    );
    let keypoints = box_params[4..]
        .chunks_exact(2)
        .map(|xy| crate::detection::Keypoint::new(xy[0] + ax, xy[1] + ay))
        .collect();

    let mut det = Detection::with_keypoints(confidence, rect, keypoints);
    det.set_angle(palm_angle(&det));
    det
}

/// Computes the clockwise palm rotation from the wrist and middle finger keypoints.
///
/// An angle of 0 means that the fingers point straight up.
fn palm_angle(det: &Detection) -> f32 {
    let finger = det.keypoints()[Keypoint::MiddleFingerMcp as usize];
    let wrist = det.keypoints()[Keypoint::Wrist as usize];

    let rel = Vector2::new(wrist.x() - finger.x(), wrist.y() - finger.y());
    Rotation2::rotation_between(&Vector2::y(), &rel).angle()
}

/// Computes the region of interest enclosing the whole hand from a palm detection.
///
/// The palm box is rotated by the detection angle, shifted towards the fingers by half its
/// height, made square, and enlarged so that the fingers fit inside.
pub fn hand_roi(det: &Detection) -> RotatedRect {
    let palm = det.rotated_rect();
    let rect = palm.rect();
    let [cx, cy] = palm.transform_out(rect.width() * 0.5, 0.0);
    let size = rect.width().max(rect.height()) * PALM_TO_HAND_SCALE;
    RotatedRect::new(Rect::from_center(cx, cy, size, size), palm.rotation_radians())
}

#[cfg(test)]
mod tests {
    use std::f32::consts::TAU;

    use approx::assert_abs_diff_eq;

    use crate::nn::tensor::Tensor;

    use super::*;

    const INPUT: Resolution = Resolution::new(192, 192);

    /// Box parameters for an upright palm centered on its anchor, with the wrist 20 pixels
    /// below and the middle finger 20 pixels above the anchor.
    fn upright_palm() -> [f32; BOX_PARAMS] {
        let mut params = [0.0; BOX_PARAMS];
        params[2] = 40.0;
        params[3] = 40.0;
        // wrist
        params[4] = 0.0;
        params[5] = 20.0;
        // middle finger MCP
        params[8] = 0.0;
        params[9] = -20.0;
        params
    }

    #[test]
    fn decodes_box_relative_to_anchor() {
        let anchor = &ANCHORS[0];
        let det = extract_detection(anchor, INPUT, &upright_palm(), 0.9);
        assert_eq!(det.confidence(), 0.9);
        assert_eq!(det.keypoints().len(), NUM_KEYPOINTS);

        let rect = det.bounding_rect();
        assert_abs_diff_eq!(rect.x_center(), anchor.x_center() * 192.0);
        assert_abs_diff_eq!(rect.y_center(), anchor.y_center() * 192.0);
        assert_eq!(rect.width(), 40.0);
        assert_abs_diff_eq!(det.angle(), 0.0);
    }

    #[test]
    fn palm_angle_follows_fingers() {
        // Fingers pointing right: the hand is rotated clockwise by 90°.
        let mut params = upright_palm();
        params[4..6].copy_from_slice(&[-20.0, 0.0]);
        params[8..10].copy_from_slice(&[20.0, 0.0]);
        let det = extract_detection(&ANCHORS[0], INPUT, &params, 0.9);
        assert_abs_diff_eq!(det.angle(), TAU / 4.0, epsilon = 1e-5);
    }

    #[test]
    fn hand_roi_extends_towards_fingers() {
        let det = Detection::new(1.0, Rect::from_center(100.0, 100.0, 20.0, 10.0));
        let roi = hand_roi(&det);
        assert_abs_diff_eq!(roi.center().x, 100.0, epsilon = 1e-4);
        assert_abs_diff_eq!(roi.center().y, 95.0, epsilon = 1e-4);
        assert_abs_diff_eq!(roi.rect().width(), 52.0, epsilon = 1e-4);
        assert_abs_diff_eq!(roi.rect().height(), 52.0, epsilon = 1e-4);

        // Rotated by 90° clockwise, "up" points to the right in the image.
        let mut det = det;
        det.set_angle(TAU / 4.0);
        let roi = hand_roi(&det);
        assert_abs_diff_eq!(roi.center().x, 105.0, epsilon = 1e-4);
        assert_abs_diff_eq!(roi.center().y, 100.0, epsilon = 1e-4);
        assert_abs_diff_eq!(roi.rotation_radians(), TAU / 4.0);
    }

    #[test]
    fn extracts_confident_anchors() {
        let n = ANCHORS.anchor_count();
        let palm = upright_palm();
        let boxes = Tensor::from_fn([1, n, BOX_PARAMS], |[_, _, i]| palm[i]);
        let scores = Tensor::from_fn([1, n, 1], |[_, anchor, _]| {
            if anchor == 7 {
                5.0
            } else {
                -5.0
            }
        });
        let outputs = [boxes, scores].into_iter().collect::<Outputs>();

        let mut detections = Detections::new();
        extract_outputs(INPUT, &outputs, 0.5, &mut detections).unwrap();
        assert_eq!(detections.len(), 1);
        let det = detections.iter().next().unwrap();
        assert_abs_diff_eq!(det.confidence(), sigmoid(5.0));
        assert_abs_diff_eq!(det.bounding_rect().x_center(), ANCHORS[7].x_center() * 192.0);
    }

    #[test]
    fn rejects_wrong_output_shape() {
        let outputs = [Tensor::from([0.0; 18]), Tensor::from([0.0])]
            .into_iter()
            .collect::<Outputs>();
        let mut detections = Detections::new();
        assert!(extract_outputs(INPUT, &outputs, 0.5, &mut detections).is_err());
    }
}
