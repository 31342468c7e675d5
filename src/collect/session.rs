//! The interactive recording state machine.

use std::time::{Duration, Instant};

use crate::gui::Key;

/// Recording parameters shared by all gestures of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionParams {
    /// Number of sequences recorded per gesture.
    pub sequences: u32,
    /// Number of frames per sequence.
    pub frames: u32,
    /// Time to wait before each sequence.
    pub countdown: Duration,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            sequences: 60,
            frames: 30,
            countdown: Duration::from_secs(3),
        }
    }
}

/// The state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The operator is typing the name of the next gesture.
    AwaitingName,
    /// Counting down before a sequence is recorded.
    Countdown { started: Instant },
    /// Recording frame `frame` of the current sequence.
    Recording { frame: u32 },
    /// The operator quit; no further transitions happen.
    Finished,
}

/// Side effects requested by a [`Session`] transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// A gesture name was committed and its directory should be created.
    CreateGesture(String),
    /// All sequences of the gesture were recorded.
    GestureComplete(String),
    /// The operator asked to quit.
    Quit,
}

/// What the capture loop should do with the current frame, as reported by [`Session::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    AwaitingName,
    /// Show the countdown with `remaining` whole seconds left.
    ///
    /// `remaining` is 0 on the frame the countdown runs out. That frame is not recorded, recording
    /// starts with the next one.
    Countdown { remaining: u32 },
    /// Record the frame as `frame` of sequence `sequence`, then call [`Session::frame_recorded`].
    Record { sequence: u32, frame: u32 },
    Finished,
}

/// Guides the operator through naming a gesture and recording its sequences.
///
/// The session does not perform any I/O itself. Time is passed in explicitly, and side effects
/// are returned as [`Action`]s for the caller to perform.
#[derive(Debug, Clone)]
pub struct Session {
    params: SessionParams,
    phase: Phase,
    input: String,
    gesture: Option<String>,
    sequence: u32,
}

impl Session {
    pub fn new(params: SessionParams) -> Self {
        Self {
            params,
            phase: Phase::AwaitingName,
            input: String::new(),
            gesture: None,
            sequence: 0,
        }
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// Returns the gesture being recorded, or the last recorded gesture while awaiting a name.
    pub fn gesture(&self) -> Option<&str> {
        self.gesture.as_deref()
    }

    /// Returns the index of the sequence being recorded (or about to be).
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Returns the gesture name typed so far.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Applies a key press.
    pub fn handle_key(&mut self, key: Key, now: Instant) -> Vec<Action> {
        match (self.phase, key) {
            (Phase::Finished, _) => Vec::new(),
            (_, Key::Escape | Key::Closed) => self.quit(),
            (Phase::AwaitingName, Key::Char(c)) => {
                if c.is_ascii_alphabetic() {
                    self.input.push(c.to_ascii_lowercase());
                }
                Vec::new()
            }
            (Phase::AwaitingName, Key::Backspace) => {
                self.input.pop();
                Vec::new()
            }
            (Phase::AwaitingName, Key::Enter) => {
                if self.input.is_empty() {
                    return Vec::new();
                }

                let name = std::mem::take(&mut self.input);
                log::info!("gesture '{}' configured, starting collection", name);
                self.gesture = Some(name.clone());
                self.sequence = 0;
                self.phase = Phase::Countdown { started: now };
                vec![Action::CreateGesture(name)]
            }
            (_, Key::Char('q' | 'Q')) => self.quit(),
            _ => Vec::new(),
        }
    }

    /// Continues numbering the current gesture's sequences at `sequence`.
    ///
    /// If `sequence` is past the last sequence, the gesture is complete and the session goes back
    /// to awaiting a name.
    pub fn resume_from(&mut self, sequence: u32, now: Instant) -> Vec<Action> {
        let Some(gesture) = self.gesture.clone() else {
            return Vec::new();
        };
        if !matches!(self.phase, Phase::Countdown { .. }) {
            return Vec::new();
        }

        self.sequence = sequence;
        if sequence >= self.params.sequences {
            log::info!(
                "gesture '{}' already has {} sequences",
                gesture,
                self.params.sequences
            );
            self.phase = Phase::AwaitingName;
            return vec![Action::GestureComplete(gesture)];
        }

        log::info!("resuming '{}' at sequence {}", gesture, sequence);
        self.phase = Phase::Countdown { started: now };
        Vec::new()
    }

    /// Advances time-driven transitions and reports how to treat the current frame.
    pub fn tick(&mut self, now: Instant) -> Tick {
        match self.phase {
            Phase::AwaitingName => Tick::AwaitingName,
            Phase::Countdown { started } => {
                let elapsed = now.saturating_duration_since(started).as_secs();
                let total = self.params.countdown.as_secs();
                if elapsed < total {
                    return Tick::Countdown {
                        remaining: (total - elapsed) as u32,
                    };
                }

                log::info!("recording sequence {}", self.sequence);
                self.phase = Phase::Recording { frame: 0 };
                Tick::Countdown { remaining: 0 }
            }
            Phase::Recording { frame } => Tick::Record {
                sequence: self.sequence,
                frame,
            },
            Phase::Finished => Tick::Finished,
        }
    }

    /// Accounts for a processed recording frame, whether or not any hands were saved.
    pub fn frame_recorded(&mut self, now: Instant) -> Vec<Action> {
        let Phase::Recording { frame } = self.phase else {
            return Vec::new();
        };

        let frame = frame + 1;
        if frame < self.params.frames {
            self.phase = Phase::Recording { frame };
            return Vec::new();
        }

        self.sequence += 1;
        if self.sequence < self.params.sequences {
            self.phase = Phase::Countdown { started: now };
            return Vec::new();
        }

        self.phase = Phase::AwaitingName;
        match &self.gesture {
            Some(gesture) => {
                log::info!("collection for '{}' complete", gesture);
                vec![Action::GestureComplete(gesture.clone())]
            }
            None => Vec::new(),
        }
    }

    fn quit(&mut self) -> Vec<Action> {
        self.phase = Phase::Finished;
        vec![Action::Quit]
    }
}
