//! Per-frame keypoint vectors.

use ndarray::Array1;

use crate::hand::landmark::Handedness;
use crate::hand::tracking::Hand;
use crate::image::Resolution;

/// Number of landmarks per hand.
pub const NUM_LANDMARKS: usize = crate::hand::landmark::NUM_LANDMARKS;

/// Number of values stored per hand (X, Y and Z of every landmark).
pub const VALUES_PER_HAND: usize = NUM_LANDMARKS * 3;

/// Length of a keypoint vector: the left hand slot followed by the right hand slot.
pub const KEYPOINT_LEN: usize = VALUES_PER_HAND * 2;

/// The normalized landmark coordinates of both hands in a single frame.
///
/// Hands are slotted by how they look in the frame ([`Hand::image_handedness`]), not by whose
/// hand they are. In the usual mirrored preview the operator's right hand looks like a left hand,
/// so it fills the left slot, and the left hand fills the right slot.
///
/// Coordinates are divided by the image size: X and Z by the width, Y by the height. Slots
/// without a hand are filled with zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct Keypoints {
    values: [f64; KEYPOINT_LEN],
    left: bool,
    right: bool,
}

impl Keypoints {
    /// Creates a keypoint vector without any hands.
    pub fn empty() -> Self {
        Self {
            values: [0.0; KEYPOINT_LEN],
            left: false,
            right: false,
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Returns whether at least one hand contributed to this vector.
    pub fn has_hands(&self) -> bool {
        self.left || self.right
    }

    pub fn has_hand(&self, handedness: Handedness) -> bool {
        match handedness {
            Handedness::Left => self.left,
            Handedness::Right => self.right,
        }
    }

    /// Returns the values of one slot.
    pub fn hand(&self, handedness: Handedness) -> &[f64] {
        let offset = slot_offset(handedness);
        &self.values[offset..offset + VALUES_PER_HAND]
    }

    pub fn to_array(&self) -> Array1<f64> {
        Array1::from(self.values.to_vec())
    }
}

impl Default for Keypoints {
    fn default() -> Self {
        Self::empty()
    }
}

fn slot_offset(handedness: Handedness) -> usize {
    match handedness {
        Handedness::Left => 0,
        Handedness::Right => VALUES_PER_HAND,
    }
}

/// Builds the keypoint vector of a frame of size `resolution` from the hands tracked in it.
///
/// If several hands fall into the same slot, the one with the highest presence is used.
pub fn extract_keypoints<'a, I>(hands: I, resolution: Resolution) -> Keypoints
where
    I: IntoIterator<Item = &'a Hand>,
{
    let mut best: [Option<&Hand>; 2] = [None, None];
    for hand in hands {
        let slot = &mut best[slot_offset(hand.image_handedness()) / VALUES_PER_HAND];
        if slot.map_or(true, |other| hand.presence() > other.presence()) {
            *slot = Some(hand);
        }
    }

    let width = f64::from(resolution.width());
    let height = f64::from(resolution.height());

    let mut keypoints = Keypoints::empty();
    for hand in best.into_iter().flatten() {
        let offset = slot_offset(hand.image_handedness());
        let out = &mut keypoints.values[offset..offset + VALUES_PER_HAND];
        for (dest, &[x, y, z]) in out.chunks_exact_mut(3).zip(hand.landmarks().positions()) {
            dest[0] = f64::from(x) / width;
            dest[1] = f64::from(y) / height;
            dest[2] = f64::from(z) / width;
        }
        match hand.image_handedness() {
            Handedness::Left => keypoints.left = true,
            Handedness::Right => keypoints.right = true,
        }
    }

    log::trace!(
        "extracted keypoints (left: {}, right: {})",
        keypoints.left,
        keypoints.right
    );
    keypoints
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::landmark::Landmarks;

    use super::*;

    const RES: Resolution = Resolution::new(200, 100);

    fn hand(handedness: Handedness, presence: f32, value: f32) -> Hand {
        let mut landmarks = Landmarks::new(NUM_LANDMARKS);
        landmarks.map_positions(|_| [value, value, value]);
        landmarks.positions_mut()[0] = [20.0, 10.0, -4.0];
        Hand::new(handedness, presence, landmarks)
    }

    #[test]
    fn lengths() {
        assert_eq!(VALUES_PER_HAND, 63);
        assert_eq!(KEYPOINT_LEN, 126);
        assert_eq!(Keypoints::empty().as_slice().len(), KEYPOINT_LEN);
        assert_eq!(Keypoints::empty().to_array().len(), KEYPOINT_LEN);
    }

    #[test]
    fn no_hands_is_all_zero() {
        let kp = extract_keypoints(&[], RES);
        assert!(!kp.has_hands());
        assert!(kp.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn mirrored_right_hand_fills_left_slot() {
        // In a mirrored frame the operator's right hand looks like a left hand.
        let hands = [hand(Handedness::Right, 0.9, 50.0)];
        assert_eq!(hands[0].image_handedness(), Handedness::Left);

        let kp = extract_keypoints(&hands, RES);
        assert!(kp.has_hands());
        assert!(kp.has_hand(Handedness::Left));
        assert!(!kp.has_hand(Handedness::Right));
        assert!(kp.hand(Handedness::Right).iter().all(|&v| v == 0.0));

        let slot = kp.hand(Handedness::Left);
        assert_relative_eq!(slot[0], 0.1);
        assert_relative_eq!(slot[1], 0.1);
        assert_relative_eq!(slot[2], -0.02);
        assert_relative_eq!(slot[3], 0.25);
        assert_relative_eq!(slot[4], 0.5);
        assert_relative_eq!(slot[5], 0.25);
        assert_relative_eq!(kp.as_slice()[0], 0.1);
    }

    #[test]
    fn both_hands() {
        let hands = [
            hand(Handedness::Right, 0.9, 50.0),
            hand(Handedness::Left, 0.8, 100.0),
        ];
        let kp = extract_keypoints(&hands, RES);
        assert_relative_eq!(kp.hand(Handedness::Left)[3], 0.25);
        assert_relative_eq!(kp.hand(Handedness::Right)[3], 0.5);
        assert_relative_eq!(kp.as_slice()[VALUES_PER_HAND + 3], 0.5);
    }

    #[test]
    fn most_present_hand_wins_slot() {
        let hands = [
            hand(Handedness::Left, 0.7, 50.0),
            hand(Handedness::Left, 0.95, 100.0),
            hand(Handedness::Left, 0.8, 150.0),
        ];
        let kp = extract_keypoints(&hands, RES);
        assert_relative_eq!(kp.hand(Handedness::Right)[3], 0.5);
        assert!(!kp.has_hand(Handedness::Left));
    }
}
