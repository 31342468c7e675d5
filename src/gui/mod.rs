//! A minimal window system integration for displaying camera frames and reading keyboard input.
//!
//! Windowing platforms require the event loop to live on the main thread, so [`run`] takes over
//! the main thread and moves the application code to a second thread. Images are sent to the
//! event loop with [`show_image`], and key presses flow back through [`poll_key`].

mod renderer;

use std::{
    collections::{HashMap, VecDeque},
    panic::{catch_unwind, AssertUnwindSafe},
    process,
    rc::Rc,
    sync::Mutex,
};

use once_cell::sync::{Lazy, OnceCell};
use winit::{
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy},
    window::WindowId,
};

use crate::image::{Image, Resolution};

use self::renderer::{Gpu, Renderer, Window};

/// A key press delivered to the application thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// A printable character.
    Char(char),
    Enter,
    Backspace,
    Escape,
    /// The user asked to close one of the windows.
    Closed,
}

impl Key {
    fn from_virtual_keycode(code: VirtualKeyCode) -> Option<Self> {
        match code {
            VirtualKeyCode::Return | VirtualKeyCode::NumpadEnter => Some(Key::Enter),
            VirtualKeyCode::Back => Some(Key::Backspace),
            VirtualKeyCode::Escape => Some(Key::Escape),
            _ => None,
        }
    }
}

/// Queue of key presses that have not yet been consumed by the application.
struct KeyQueue {
    keys: Mutex<VecDeque<Key>>,
}

impl KeyQueue {
    fn new() -> Self {
        Self {
            keys: Mutex::new(VecDeque::new()),
        }
    }

    fn push(&self, key: Key) {
        log::trace!("key press: {:?}", key);
        self.lock().push_back(key);
    }

    fn pop(&self) -> Option<Key> {
        self.lock().pop_front()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Key>> {
        self.keys.lock().unwrap_or_else(|e| e.into_inner())
    }
}

static KEYS: Lazy<KeyQueue> = Lazy::new(KeyQueue::new);

/// Returns the oldest unconsumed key press, if any.
pub fn poll_key() -> Option<Key> {
    KEYS.pop()
}

struct Gui {
    gpu: Rc<Gpu>,
    windows: HashMap<String, Renderer>,
    win_id_to_key: HashMap<WindowId, String>,
}

impl Gui {
    fn new() -> anyhow::Result<Self> {
        Ok(Self {
            gpu: Rc::new(pollster::block_on(Gpu::open())?),
            windows: HashMap::new(),
            win_id_to_key: HashMap::new(),
        })
    }

    fn renderer_mut(&mut self, win: WindowId) -> Option<&mut Renderer> {
        let key = self.win_id_to_key.get(&win)?;
        self.windows.get_mut(key)
    }

    fn show(
        &mut self,
        target: &winit::event_loop::EventLoopWindowTarget<Msg>,
        key: String,
        res: Resolution,
        data: Vec<u8>,
    ) -> anyhow::Result<()> {
        let renderer = match self.windows.entry(key) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                log::debug!("creating window for image '{}' at {}", entry.key(), res);

                let win = Window::open(target, entry.key(), res)?;
                let win_id = win.id();
                let renderer = Renderer::new(win, self.gpu.clone())?;
                self.win_id_to_key.insert(win_id, entry.key().clone());
                entry.insert(renderer)
            }
        };

        renderer.update_texture(res, &data);
        renderer.window().request_redraw();
        Ok(())
    }

    fn run(mut self, event_loop: EventLoop<Msg>) -> ! {
        event_loop.run(move |event, target, flow| {
            *flow = ControlFlow::Wait;
            match event {
                Event::UserEvent(Msg::Image { key, res, data }) => {
                    if let Err(e) = self.show(target, key, res, data) {
                        log::error!("failed to display image: {:#}", e);
                    }
                }
                Event::RedrawRequested(window) => {
                    if let Some(renderer) = self.renderer_mut(window) {
                        renderer.redraw();
                    }
                }
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested => KEYS.push(Key::Closed),
                    WindowEvent::ReceivedCharacter(c) if !c.is_control() => {
                        KEYS.push(Key::Char(c))
                    }
                    WindowEvent::KeyboardInput {
                        input:
                            KeyboardInput {
                                state: ElementState::Pressed,
                                virtual_keycode: Some(code),
                                ..
                            },
                        ..
                    } => {
                        if let Some(key) = Key::from_virtual_keycode(code) {
                            KEYS.push(key);
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        });
    }
}

#[derive(Debug)]
enum Msg {
    Image {
        key: String,
        res: Resolution,
        data: Vec<u8>,
    },
}

/// A connection to the running event loop.
struct Display {
    proxy: Mutex<EventLoopProxy<Msg>>,
}

static DISPLAY: OnceCell<Display> = OnceCell::new();

fn send(msg: Msg) {
    let Some(display) = DISPLAY.get() else {
        log::warn!("GUI is not running, dropping {:?}", msg);
        return;
    };
    let proxy = display.proxy.lock().unwrap_or_else(|e| e.into_inner());
    if proxy.send_event(msg).is_err() {
        log::debug!("GUI event loop has exited");
    }
}

/// Runs the GUI event loop on the calling thread and `cb` on a new thread.
///
/// Exits the process once `cb` returns: with status 0 if it succeeded, and after printing the
/// error with status 1 if it failed.
pub fn run<F>(cb: F) -> !
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    let event_loop = EventLoopBuilder::with_user_event().build();
    let proxy = event_loop.create_proxy();
    let display = Display {
        proxy: Mutex::new(proxy),
    };
    if DISPLAY.set(display).is_err() {
        log::error!("`handrec::run` must only be called once");
        process::exit(1);
    }

    // Library is now initialized; spawn another thread to run the application code.
    std::thread::spawn(move || {
        let result = catch_unwind(AssertUnwindSafe(cb));
        match result {
            Ok(Ok(())) => process::exit(0),
            Ok(Err(e)) => {
                eprintln!("Error: {e:?}");
                process::exit(1);
            }
            Err(_payload) => {
                // Panic handler has printed the panic message and backtrace already, exit with 101
                // to mimick libstd behavior.
                process::exit(101);
            }
        }
    });

    match Gui::new() {
        Ok(gui) => gui.run(event_loop),
        Err(e) => {
            log::error!("failed to initialize GUI: {:#}", e);
            process::exit(1);
        }
    }
}

/// Displays an image in a window.
///
/// Each distinct `key` gets its own window, which is created when an image is first shown for it.
pub fn show_image(key: impl Into<String>, image: &Image) {
    // Image data is RGBA8 internally so that no conversion before GPU upload is needed.
    let data = image.data().to_vec();

    send(Msg::Image {
        key: key.into(),
        res: image.resolution(),
        data,
    });
}
