//! Multi-hand tracking.

use std::time::{Duration, Instant};

use itertools::Itertools;

use crate::detection::{self, Detector};
use crate::image::{AsImageView, AsImageViewMut, Color, ImageView, Rect, RotatedRect};
use crate::landmark::{self, LandmarkTracker, Landmarks, TrackingResult};
use crate::timer::Timer;

use super::detection::hand_roi;
use super::landmark::{Handedness, LandmarkResult};

/// Tracks up to [`HandTracker::MAX_HANDS`] hands across subsequent frames.
///
/// Palm detection is comparatively expensive and only yields a rough region of interest, so the
/// tracker runs it only while fewer than the maximum number of hands are tracked, and then only
/// once per redetect interval. Each detected hand gets its own [`LandmarkTracker`] that follows
/// it from frame to frame until the landmark network reports that the hand is gone.
pub struct HandTracker {
    detector: Detector,
    make_tracker: Box<dyn Fn() -> LandmarkTracker<LandmarkResult> + Send>,
    tracked: Vec<TrackedHand>,
    hands: Vec<Hand>,
    next_hand_id: HandId,
    next_det: Option<Instant>,
    loss_thresh: f32,
    input_mirrored: bool,
    t_track: Timer,
}

impl HandTracker {
    pub const MAX_HANDS: usize = 2;

    /// Palm detection runs at most this often while some, but not all, hands are tracked.
    const REDETECT_INTERVAL: Duration = Duration::from_millis(300);

    /// Two tracking regions overlapping at least this much are assumed to show the same hand.
    const IOU_THRESH: f32 = 0.3;

    pub fn new<D, L>(detector: D, landmarker: L) -> Self
    where
        D: detection::Network,
        L: landmark::Network<Output = LandmarkResult> + Clone,
    {
        Self {
            detector: Detector::new(detector),
            make_tracker: Box::new(move || LandmarkTracker::new(landmarker.clone())),
            tracked: Vec::new(),
            hands: Vec::new(),
            next_hand_id: HandId(0),
            next_det: None,
            loss_thresh: LandmarkTracker::<LandmarkResult>::DEFAULT_LOSS_THRESHOLD,
            input_mirrored: true,
            t_track: Timer::new("track"),
        }
    }

    /// Sets the minimum palm detection confidence needed to start tracking a hand.
    pub fn set_detection_threshold(&mut self, thresh: f32) {
        self.detector.set_threshold(thresh);
    }

    /// Sets the hand presence value below which a tracked hand is considered lost.
    ///
    /// Applies to hands that start being tracked after this call.
    pub fn set_loss_threshold(&mut self, thresh: f32) {
        self.loss_thresh = thresh;
    }

    /// Sets whether the images passed to [`HandTracker::track`] are mirrored (selfie view).
    ///
    /// The landmark network expects mirrored images when determining handedness. When this is
    /// set to `false`, [`Hand::handedness`] is flipped. Defaults to `true`.
    pub fn set_input_mirrored(&mut self, mirrored: bool) {
        self.input_mirrored = mirrored;
    }

    /// Returns profiling timers for detection and tracking.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        self.detector.timers().chain([&self.t_track])
    }

    /// Returns the hands found by the last call to [`HandTracker::track`].
    pub fn hands(&self) -> &[Hand] {
        &self.hands
    }

    /// Updates all tracked hands with `image`, and detects new ones if needed.
    ///
    /// The palm detector runs when no hand is tracked, and otherwise at most once per
    /// redetection interval until [`HandTracker::MAX_HANDS`] hands are tracked. `now` is the
    /// capture time of `image`.
    pub fn track<V: AsImageView>(&mut self, image: &V, now: Instant) -> anyhow::Result<()> {
        self.track_impl(image.as_view(), now)
    }

    fn track_impl(&mut self, image: ImageView<'_>, now: Instant) -> anyhow::Result<()> {
        self.hands.clear();

        let guard = self.t_track.start();
        let mut kept = Vec::with_capacity(self.tracked.len());
        for mut hand in std::mem::take(&mut self.tracked) {
            match hand.tracker.track(&image)? {
                Some(res) => {
                    self.hands.push(Hand::from_tracking(&res, self.input_mirrored));
                    kept.push(hand);
                }
                None => log::debug!("lost track of {:?}", hand.id),
            }
        }
        self.tracked = kept;
        drop(guard);

        let due = self.next_det.map_or(true, |t| now >= t);
        if self.tracked.len() < Self::MAX_HANDS && (self.tracked.is_empty() || due) {
            self.next_det = Some(now + Self::REDETECT_INTERVAL);

            let detections = self.detector.detect(&image)?;
            log::trace!("{} palm detections", detections.len());
            for det in detections {
                if self.tracked.len() >= Self::MAX_HANDS {
                    break;
                }

                let roi = hand_roi(det);
                let overlaps = self
                    .tracked
                    .iter()
                    .filter_map(|hand| hand.tracker.roi())
                    .any(|r| r.bounding_rect().iou(&roi.bounding_rect()) >= Self::IOU_THRESH);
                if overlaps {
                    continue;
                }

                let mut tracker = (self.make_tracker)();
                tracker.set_loss_threshold(self.loss_thresh);
                tracker.set_roi(roi);

                let id = self.next_hand_id;
                match tracker.track(&image)? {
                    Some(res) => {
                        let hand = Hand::from_tracking(&res, self.input_mirrored);
                        log::debug!("tracking new hand {:?} ({:?})", id, hand.handedness());
                        self.next_hand_id.0 += 1;
                        self.hands.push(hand);
                    }
                    None => {
                        log::trace!("palm detection at {:?} rejected by landmarker", roi);
                        continue;
                    }
                }
                self.tracked.push(TrackedHand { id, tracker });
            }
        }

        self.remove_duplicates();
        Ok(())
    }

    /// Drops the less confident hand of every pair of trackers whose regions have started to
    /// overlap since they were created.
    fn remove_duplicates(&mut self) {
        let regions = self
            .tracked
            .iter()
            .zip(&self.hands)
            .map(|(tracked, hand)| {
                let rect = tracked
                    .tracker
                    .roi()
                    .map_or(hand.view_rect.bounding_rect(), |roi| roi.bounding_rect());
                (rect, hand.presence)
            })
            .collect::<Vec<_>>();

        let dups = find_duplicates(&regions, Self::IOU_THRESH);
        if !dups.contains(&true) {
            return;
        }

        for (hand, _) in self.tracked.iter().zip(&dups).filter(|(_, dup)| **dup) {
            log::debug!("{:?} overlaps another hand, dropping it", hand.id);
        }

        let mut index = 0;
        self.tracked.retain(|_| {
            index += 1;
            !dups[index - 1]
        });
        let mut index = 0;
        self.hands.retain(|_| {
            index += 1;
            !dups[index - 1]
        });
    }
}

/// Marks the lower-confidence entry of every overlapping pair of `(region, confidence)` entries.
fn find_duplicates(regions: &[(Rect, f32)], iou_thresh: f32) -> Vec<bool> {
    let mut dups = vec![false; regions.len()];
    for (i, j) in (0..regions.len()).tuple_combinations() {
        if dups[i] || dups[j] {
            continue;
        }

        let ((a, conf_a), (b, conf_b)) = (&regions[i], &regions[j]);
        if a.iou(b) >= iou_thresh {
            dups[if conf_a < conf_b { i } else { j }] = true;
        }
    }
    dups
}

struct TrackedHand {
    id: HandId,
    tracker: LandmarkTracker<LandmarkResult>,
}

/// ID of a tracked hand.
///
/// The assigned [`HandId`]s are unique per [`HandTracker`] assigning them. They are reused between
/// frames for as long as the hand is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandId(u64);

/// Tracking data for a hand in the input image.
#[derive(Debug, Clone)]
pub struct Hand {
    handedness: Handedness,
    presence: f32,
    result: LandmarkResult,
    view_rect: RotatedRect,
}

impl Hand {
    /// Creates a [`Hand`] from landmarks in image coordinates.
    ///
    /// `handedness` is the person's hand, seen in a mirrored image like [`HandTracker`] reports
    /// it by default.
    pub fn new(handedness: Handedness, presence: f32, landmarks: Landmarks) -> Self {
        let view_rect = RotatedRect::bounding(0.0, landmarks.xy())
            .unwrap_or_else(|| Rect::from_center(0.0, 0.0, 0.0, 0.0).into());
        let raw_handedness = match handedness {
            Handedness::Left => 0.0,
            Handedness::Right => 1.0,
        };
        Self {
            handedness,
            presence,
            result: LandmarkResult::from_parts(landmarks, presence, raw_handedness),
            view_rect,
        }
    }

    fn from_tracking(res: &TrackingResult<'_, LandmarkResult>, input_mirrored: bool) -> Self {
        let result = res.estimate().clone();
        let handedness = if input_mirrored {
            result.handedness()
        } else {
            result.handedness().flip()
        };
        Self {
            handedness,
            presence: result.presence(),
            result,
            view_rect: res.view_rect(),
        }
    }

    /// Returns which hand this is, as seen by the person in front of the camera.
    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    /// Returns which hand this looks like in the image it was tracked in.
    ///
    /// The landmark network labels hands as they would be in a mirrored image, so a hand looks
    /// like the opposite of what the network reports. For the default mirrored input this is the
    /// opposite of [`Hand::handedness`]: the person's right hand looks like a left hand.
    pub fn image_handedness(&self) -> Handedness {
        self.result.handedness().flip()
    }

    /// Returns the landmark network's confidence that this hand is present, from 0.0 to 1.0.
    pub fn presence(&self) -> f32 {
        self.presence
    }

    /// Hand landmarks, in image coordinates.
    pub fn landmarks(&self) -> &Landmarks {
        self.result.landmarks()
    }

    /// Returns the image region that was passed to the landmark network.
    pub fn view_rect(&self) -> RotatedRect {
        self.view_rect
    }

    /// Draws the hand skeleton onto `target`.
    pub fn draw<I: AsImageViewMut>(&self, target: &mut I, color: Color) {
        self.result.draw(target, color);
    }
}
