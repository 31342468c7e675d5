//! Drives a recording session against a temporary dataset directory, the way the capture loop in
//! `main.rs` does, with synthetic hands in place of a webcam.

use std::{
    fs,
    time::{Duration, Instant},
};

use handrec::{
    collect::{
        keypoints::{extract_keypoints, KEYPOINT_LEN},
        session::{Action, Session, SessionParams, Tick},
        store::DataStore,
    },
    gui::Key,
    hand::{landmark::Handedness, tracking::Hand},
    image::Resolution,
    landmark::Landmarks,
};
use ndarray::Array1;
use ndarray_npy::read_npy;

const RES: Resolution = Resolution::new(640, 480);

fn right_hand() -> Hand {
    let mut landmarks = Landmarks::new(21);
    landmarks.map_positions(|_| [320.0, 240.0, 0.0]);
    Hand::new(Handedness::Right, 0.9, landmarks)
}

/// Runs frames until the session waits for a name again. Every third frame has no hands.
fn record_gesture(session: &mut Session, store: &DataStore, mut now: Instant) -> Vec<Action> {
    let hand = [right_hand()];
    let mut actions = Vec::new();
    for frame_index in 0.. {
        now += Duration::from_millis(33);
        match session.tick(now) {
            Tick::Record { sequence, frame } => {
                let hands: &[Hand] = if frame_index % 3 == 0 { &[] } else { &hand };
                let keypoints = extract_keypoints(hands, RES);
                if keypoints.has_hands() {
                    let gesture = session.gesture().unwrap();
                    store.save_frame(gesture, sequence, frame, &keypoints).unwrap();
                }
                actions.extend(session.frame_recorded(now));
            }
            Tick::AwaitingName | Tick::Finished => break,
            Tick::Countdown { .. } => {}
        }
    }
    actions
}

fn start(session: &mut Session, store: &DataStore, name: &str, now: Instant) {
    for c in name.chars() {
        session.handle_key(Key::Char(c), now);
    }
    let actions = session.handle_key(Key::Enter, now);
    assert_eq!(actions, [Action::CreateGesture(name.to_string())]);
    store.create_gesture(name).unwrap();
}

#[test]
fn records_dataset_layout() {
    let tmp = tempfile::tempdir().unwrap();
    let store = DataStore::new(tmp.path().join("data"));
    let mut session = Session::new(SessionParams {
        sequences: 2,
        frames: 4,
        countdown: Duration::from_secs(1),
    });

    let now = Instant::now();
    start(&mut session, &store, "wave", now);
    let actions = record_gesture(&mut session, &store, now);
    assert_eq!(actions, [Action::GestureComplete("wave".into())]);

    let wave = tmp.path().join("data").join("wave");
    assert!(wave.is_dir());
    let mut written = 0;
    for sequence in 0..2 {
        for frame in 0..4 {
            let path = store.frame_path("wave", sequence, frame);
            if path.exists() {
                let array: Array1<f64> = read_npy(&path).unwrap();
                assert_eq!(array.len(), KEYPOINT_LEN);
                // The mirrored right hand fills the left slot, in the center of the frame.
                assert_eq!(array[0], 0.5);
                assert_eq!(array[1], 0.5);
                assert!(array.iter().skip(63).all(|&v| v == 0.0));
                written += 1;
            }
        }
    }
    // Frames without hands are skipped, but still counted.
    assert!(written > 0 && written < 8, "{} frames written", written);

    // Nothing else was created.
    let entries = fs::read_dir(&wave).unwrap().count();
    assert!(entries <= 2);

    assert_eq!(session.handle_key(Key::Escape, now), [Action::Quit]);
    assert!(session.is_finished());
}

#[test]
fn resume_continues_numbering() {
    let tmp = tempfile::tempdir().unwrap();
    let store = DataStore::new(tmp.path());
    fs::create_dir_all(store.sequence_dir("fist", 0)).unwrap();
    fs::create_dir_all(store.sequence_dir("fist", 1)).unwrap();

    let mut session = Session::new(SessionParams {
        sequences: 3,
        frames: 2,
        countdown: Duration::ZERO,
    });
    let now = Instant::now();
    start(&mut session, &store, "fist", now);
    let next = store.next_free_sequence("fist").unwrap();
    assert_eq!(next, 2);
    assert!(session.resume_from(next, now).is_empty());

    let actions = record_gesture(&mut session, &store, now);
    assert_eq!(actions, [Action::GestureComplete("fist".into())]);
    assert!(store.frame_path("fist", 2, 1).exists());
    assert!(!store.sequence_dir("fist", 3).exists());
}
