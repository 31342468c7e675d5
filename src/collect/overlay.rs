//! Operator UI drawn on top of the camera frame.

use crate::hand::landmark::Handedness;
use crate::hand::tracking::Hand;
use crate::image::{draw, AsImageViewMut, Color};

use super::session::{Session, Tick};

/// Landmark color of the hand in the left keypoint slot.
const LEFT_HAND: Color = Color::BLUE;
const RIGHT_HAND: Color = Color::GREEN;

/// Draws the UI for the current `tick` of `session` onto `target`.
///
/// `hands` are only drawn while recording, colored by the keypoint slot they are saved in.
pub fn draw<I: AsImageViewMut>(target: &mut I, session: &Session, tick: Tick, hands: &[Hand]) {
    let gesture = session.gesture().unwrap_or_default();
    match tick {
        Tick::AwaitingName => draw_prompt(target, session.input()),
        Tick::Countdown { remaining: 0 } => {}
        Tick::Countdown { remaining } => draw_countdown(target, gesture, remaining),
        Tick::Record { sequence, frame } => {
            draw_recording(target, gesture, sequence, frame, hands)
        }
        Tick::Finished => {}
    }
}

fn draw_prompt<I: AsImageViewMut>(target: &mut I, input: &str) {
    draw::text(target, 50, 50, &format!("Enter gesture name: {}", input))
        .align_left()
        .large()
        .color(Color::CYAN);
    draw::text(target, 50, 80, "Press ENTER to start or ESC to quit.")
        .align_left()
        .color(Color::YELLOW);
}

fn draw_countdown<I: AsImageViewMut>(target: &mut I, gesture: &str, remaining: u32) {
    draw::text(
        target,
        50,
        200,
        &format!("Get ready for '{}'... starting in {}", gesture, remaining),
    )
    .align_left()
    .large()
    .color(Color::GREEN);
}

fn draw_recording<I: AsImageViewMut>(
    target: &mut I,
    gesture: &str,
    sequence: u32,
    frame: u32,
    hands: &[Hand],
) {
    for hand in hands {
        let color = match hand.image_handedness() {
            Handedness::Left => LEFT_HAND,
            Handedness::Right => RIGHT_HAND,
        };
        hand.draw(target, color);
    }

    if hands.is_empty() {
        draw::text(target, 15, 60, "no hands")
            .align_left()
            .color(Color::RED);
    } else {
        draw::text(target, 15, 60, "hands detected")
            .align_left()
            .color(Color::GREEN);
    }

    draw::text(target, 15, 30, &info_text(gesture, sequence, frame))
        .align_left()
        .color(Color::YELLOW);
}

/// Frames are shown counting from 1, so the last one shows the sequence length.
fn info_text(gesture: &str, sequence: u32, frame: u32) -> String {
    format!("Gesture: {} | Seq: {} | Frame: {}", gesture, sequence, frame + 1)
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use crate::collect::session::SessionParams;
    use crate::gui::Key;
    use crate::image::Image;
    use crate::landmark::Landmarks;

    use super::*;

    fn count(image: &Image, color: Color) -> usize {
        let mut n = 0;
        for y in 0..image.height() {
            for x in 0..image.width() {
                if image.get(x, y) == color {
                    n += 1;
                }
            }
        }
        n
    }

    fn hand(handedness: Handedness, x: f32) -> Hand {
        let mut landmarks = Landmarks::new(21);
        for (i, pos) in landmarks.positions_mut().iter_mut().enumerate() {
            *pos = [x + (i % 5) as f32 * 10.0, 120.0 + (i / 5) as f32 * 10.0, 0.0];
        }
        Hand::new(handedness, 1.0, landmarks)
    }

    #[test]
    fn prompt() {
        let mut session = Session::new(SessionParams::default());
        session.handle_key(Key::Char('a'), Instant::now());
        let mut image = Image::new(400, 240);
        draw(&mut image, &session, Tick::AwaitingName, &[]);
        assert!(count(&image, Color::CYAN) > 0);
        assert!(count(&image, Color::YELLOW) > 0);
    }

    #[test]
    fn countdown() {
        let session = Session::new(SessionParams::default());
        let mut image = Image::new(640, 240);
        draw(&mut image, &session, Tick::Countdown { remaining: 2 }, &[]);
        assert!(count(&image, Color::GREEN) > 0);
        assert_eq!(count(&image, Color::CYAN), 0);
    }

    #[test]
    fn recording_without_hands() {
        let session = Session::new(SessionParams::default());
        let mut image = Image::new(400, 240);
        let tick = Tick::Record {
            sequence: 1,
            frame: 2,
        };
        draw(&mut image, &session, tick, &[]);
        assert!(count(&image, Color::RED) > 0);
        assert!(count(&image, Color::YELLOW) > 0);
        assert_eq!(count(&image, Color::GREEN), 0);
    }

    #[test]
    fn countdown_end_draws_nothing() {
        let session = Session::new(SessionParams::default());
        let mut image = Image::new(64, 64);
        draw(&mut image, &session, Tick::Countdown { remaining: 0 }, &[]);
        assert_eq!(count(&image, Color::NULL), 64 * 64);
    }

    #[test]
    fn mirrored_right_hand_uses_left_slot_color() {
        let session = Session::new(SessionParams::default());
        let mut image = Image::new(400, 240);
        let tick = Tick::Record {
            sequence: 0,
            frame: 0,
        };
        draw(&mut image, &session, tick, &[hand(Handedness::Right, 50.0)]);
        // The wrist landmark.
        assert_eq!(image.get(50, 120), LEFT_HAND);
    }

    #[test]
    fn frame_numbers_start_at_one() {
        assert_eq!(info_text("wave", 3, 0), "Gesture: wave | Seq: 3 | Frame: 1");
        assert_eq!(info_text("wave", 3, 29), "Gesture: wave | Seq: 3 | Frame: 30");
    }

    #[test]
    fn recording_draws_hands() {
        let session = Session::new(SessionParams::default());
        let mut image = Image::new(400, 240);
        let tick = Tick::Record {
            sequence: 0,
            frame: 0,
        };
        let hands = [hand(Handedness::Left, 50.0), hand(Handedness::Right, 250.0)];
        draw(&mut image, &session, tick, &hands);
        assert!(count(&image, LEFT_HAND) > 0);
        assert!(count(&image, RIGHT_HAND) > 0);
        assert_eq!(count(&image, Color::RED), 0);
    }

    #[test]
    fn finished_draws_nothing() {
        let session = Session::new(SessionParams::default());
        let mut image = Image::new(64, 64);
        draw(&mut image, &session, Tick::Finished, &[]);
        assert_eq!(count(&image, Color::NULL), 64 * 64);
    }
}
