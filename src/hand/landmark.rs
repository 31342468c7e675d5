//! Hand landmark prediction.

use std::path::Path;

use anyhow::bail;
use nalgebra::{Rotation2, Vector2};

use crate::image::{draw, AsImageViewMut, Color, ImageViewMut};
use crate::iter::zip_exact;
use crate::landmark::{Estimate, Landmarks, Network};
use crate::nn::{Cnn, Outputs};

/// Number of landmarks estimated per hand.
pub const NUM_LANDMARKS: usize = 21;

/// Landmark results estimated by [`LiteNetwork`] and [`FullNetwork`].
#[derive(Debug, Clone)]
pub struct LandmarkResult {
    landmarks: Landmarks,
    presence: f32,
    raw_handedness: f32,
}

impl Default for LandmarkResult {
    fn default() -> Self {
        LandmarkResult {
            landmarks: Landmarks::new(NUM_LANDMARKS),
            presence: 0.0,
            raw_handedness: 0.0,
        }
    }
}

impl LandmarkResult {
    /// Returns the estimated landmarks.
    pub fn landmarks(&self) -> &Landmarks {
        &self.landmarks
    }

    /// Returns the 3D landmark positions in the input image's coordinate system.
    pub fn landmark_positions(&self) -> impl Iterator<Item = [f32; 3]> + '_ {
        self.landmarks.positions().iter().copied()
    }

    /// Returns a landmark's position in the input image's coordinate system.
    pub fn landmark_position(&self, index: LandmarkIdx) -> [f32; 3] {
        self.landmarks.positions()[index as usize]
    }

    /// Computes the clockwise rotation of the palm compared to an upright position.
    ///
    /// A rotation of 0° means that fingers are pointed upwards.
    pub fn rotation_radians(&self) -> f32 {
        let [fx, fy, _] = self.landmark_position(LandmarkIdx::MiddleFingerMcp);
        let [wx, wy, _] = self.landmark_position(LandmarkIdx::Wrist);

        let rel = Vector2::new(wx - fx, wy - fy);
        Rotation2::rotation_between(&Vector2::y(), &rel).angle()
    }

    /// Returns the probability that a hand is present in the input image.
    pub fn presence(&self) -> f32 {
        self.presence
    }

    /// Returns the estimated handedness of the person's hand.
    ///
    /// The network was trained on mirrored selfie images, so this is only correct when the camera
    /// image was flipped horizontally before being passed in. In either case the hand *looks*
    /// like the opposite hand in the image the network saw. The returned value should only be
    /// relied on when the `presence` is over some threshold.
    pub fn handedness(&self) -> Handedness {
        if self.raw_handedness > 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }

    /// Draws the hand skeleton onto `target`: white connections, and landmarks in `color`.
    pub fn draw<I: AsImageViewMut>(&self, target: &mut I, color: Color) {
        self.draw_impl(&mut target.as_view_mut(), color);
    }

    fn draw_impl(&self, target: &mut ImageViewMut<'_>, color: Color) {
        for &(a, b) in CONNECTIVITY {
            let [ax, ay, _] = self.landmark_position(a);
            let [bx, by, _] = self.landmark_position(b);
            draw::line(target, ax as i32, ay as i32, bx as i32, by as i32).stroke_width(2);
        }
        for [x, y, _] in self.landmark_positions() {
            draw::circle(target, x as i32, y as i32, 3)
                .color(color)
                .filled();
        }
    }

    pub(crate) fn from_parts(landmarks: Landmarks, presence: f32, raw_handedness: f32) -> Self {
        Self {
            landmarks,
            presence,
            raw_handedness,
        }
    }
}

impl Estimate for LandmarkResult {
    #[inline]
    fn landmarks_mut(&mut self) -> &mut Landmarks {
        &mut self.landmarks
    }

    #[inline]
    fn confidence(&self) -> f32 {
        self.presence
    }

    fn angle_radians(&self) -> Option<f32> {
        Some(self.rotation_radians())
    }
}

/// Which hand a set of landmarks belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// Returns the opposite hand.
    ///
    /// Used to correct the estimate when the network input is not mirrored.
    pub fn flip(self) -> Self {
        match self {
            Handedness::Left => Handedness::Right,
            Handedness::Right => Handedness::Left,
        }
    }
}

/// Names for the hand pose landmarks.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Pairs of landmarks connected by a bone.
pub const CONNECTIVITY: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Surround the palm:
        (Wrist, ThumbCmc),
        (ThumbCmc, IndexFingerMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (PinkyMcp, Wrist),
        // Thumb:
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index:
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle:
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring:
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky:
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

/// A lightweight but fairly inaccurate landmark estimation network.
///
/// Loaded from `hand_landmark_lite.onnx`.
#[derive(Clone)]
pub struct LiteNetwork {
    cnn: Cnn,
}

impl LiteNetwork {
    pub fn load(models_dir: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            cnn: super::load_cnn(models_dir, "hand_landmark_lite.onnx")?,
        })
    }
}

impl Network for LiteNetwork {
    type Output = LandmarkResult;

    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn extract(&self, outputs: &Outputs, estimate: &mut Self::Output) -> anyhow::Result<()> {
        extract(outputs, estimate)
    }
}

/// A somewhat more accurate landmark estimation network that takes about 25-30% longer to infer
/// than [`LiteNetwork`] (on CPU).
///
/// Loaded from `hand_landmark_full.onnx`.
#[derive(Clone)]
pub struct FullNetwork {
    cnn: Cnn,
}

impl FullNetwork {
    pub fn load(models_dir: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            cnn: super::load_cnn(models_dir, "hand_landmark_full.onnx")?,
        })
    }
}

impl Network for FullNetwork {
    type Output = LandmarkResult;

    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn extract(&self, outputs: &Outputs, estimate: &mut Self::Output) -> anyhow::Result<()> {
        extract(outputs, estimate)
    }
}

fn extract(outputs: &Outputs, estimate: &mut LandmarkResult) -> anyhow::Result<()> {
    if outputs.len() != 4 {
        bail!("hand landmark network has {} outputs, expected 4", outputs.len());
    }

    let screen_landmarks = &outputs[0];
    let presence_flag = &outputs[1];
    let handedness = &outputs[2];
    let metric_landmarks = &outputs[3];

    let coords = NUM_LANDMARKS * 3;
    if screen_landmarks.shape() != [1, coords]
        || presence_flag.shape() != [1, 1]
        || handedness.shape() != [1, 1]
        || metric_landmarks.shape() != [1, coords]
    {
        bail!(
            "unexpected hand landmark output shapes: {:?}, {:?}, {:?}, {:?}",
            screen_landmarks.shape(),
            presence_flag.shape(),
            handedness.shape(),
            metric_landmarks.shape(),
        );
    }

    estimate.presence = presence_flag.index([0, 0]).as_singular();
    estimate.raw_handedness = handedness.index([0, 0]).as_singular();
    for (xyz, out) in zip_exact(
        screen_landmarks.index([0]).as_slice().chunks_exact(3),
        estimate.landmarks.positions_mut(),
    ) {
        out.copy_from_slice(xyz);
    }

    Ok(())
}
