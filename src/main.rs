use std::time::Instant;

use handrec::{
    collect::{
        keypoints::extract_keypoints,
        overlay,
        session::{Action, Session, SessionParams, Tick},
        store::DataStore,
    },
    config::Config,
    gui,
    hand::{detection, landmark, tracking::HandTracker},
    timer::FpsCounter,
    video::webcam::{Webcam, WebcamOptions},
};

const WINDOW_TITLE: &str = "handrec";

#[handrec::main]
fn main() -> anyhow::Result<()> {
    let config = Config::from_args()?;
    log::debug!("{:?}", config);

    let mut tracker = load_tracker(&config)?;
    let store = DataStore::new(&config.data_dir);
    let mut session = Session::new(SessionParams {
        sequences: config.sequences,
        frames: config.frames,
        countdown: std::time::Duration::from_secs(config.countdown.into()),
    });

    let mut options = WebcamOptions::default().fps(config.fps);
    if let Some(name) = &config.camera {
        options = options.name(name.as_str());
    }
    if let Some(res) = config.resolution() {
        options = options.resolution(res);
    }
    let mut webcam = Webcam::open(options)?;

    let mut fps = FpsCounter::new("capture");
    while !session.is_finished() {
        let mut image = webcam.read()?;
        if !config.no_mirror {
            image.mirror();
        }

        // Keys pressed while the previous frame was shown apply to this one.
        while let Some(key) = gui::poll_key() {
            for action in session.handle_key(key, Instant::now()) {
                perform(action, &mut session, &store, config.resume)?;
            }
        }
        if session.is_finished() {
            break;
        }

        let now = Instant::now();
        let tick = session.tick(now);
        let mut hands = &[][..];
        if let Tick::Record { sequence, frame } = tick {
            tracker.track(&image, now)?;
            hands = tracker.hands();

            let keypoints = extract_keypoints(hands, image.resolution());
            match session.gesture() {
                Some(gesture) if keypoints.has_hands() => {
                    store.save_frame(gesture, sequence, frame, &keypoints)?;
                }
                _ => log::trace!("no hands in frame {} of sequence {}", frame, sequence),
            }
        }

        overlay::draw(&mut image, &session, tick, hands);
        if let Tick::Record { .. } = tick {
            for action in session.frame_recorded(now) {
                perform(action, &mut session, &store, config.resume)?;
            }
        }

        gui::show_image(WINDOW_TITLE, &image);
        fps.tick_with(webcam.timers().chain(tracker.timers()));
    }

    drop(webcam);
    log::info!("finished");
    Ok(())
}

fn load_tracker(config: &Config) -> anyhow::Result<HandTracker> {
    let dir = &config.models;
    let mut tracker = if config.lite {
        HandTracker::new(
            detection::LiteNetwork::load(dir)?,
            landmark::LiteNetwork::load(dir)?,
        )
    } else {
        HandTracker::new(
            detection::FullNetwork::load(dir)?,
            landmark::FullNetwork::load(dir)?,
        )
    };
    tracker.set_detection_threshold(config.min_detection_confidence);
    tracker.set_loss_threshold(config.min_tracking_confidence);
    tracker.set_input_mirrored(!config.no_mirror);
    Ok(tracker)
}

fn perform(
    action: Action,
    session: &mut Session,
    store: &DataStore,
    resume: bool,
) -> anyhow::Result<()> {
    match action {
        Action::CreateGesture(gesture) => {
            let dir = store.create_gesture(&gesture)?;
            log::info!("recording '{}' into {}", gesture, dir.display());
            if resume {
                let next = store.next_free_sequence(&gesture)?;
                for action in session.resume_from(next, Instant::now()) {
                    perform(action, session, store, resume)?;
                }
            }
        }
        Action::GestureComplete(gesture) => {
            log::info!("'{}' is complete, enter the next gesture name", gesture);
        }
        Action::Quit => log::info!("quitting"),
    }
    Ok(())
}
