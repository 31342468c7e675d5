//! V4L2 webcam access.
//!
//! Currently, only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are
//! supported.

use std::env;

use anyhow::bail;
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, Pixelformat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::image::{Image, Resolution};
use crate::num::TotalF32;
use crate::timer::Timer;

/// Indicates whether to prefer a higher resolution or frame rate.
///
/// By default, [`ParamPreference::Resolution`] is used, selecting the maximum resolution at the
/// desired frame rate.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ParamPreference {
    /// Prefer increased resolution over higher frame rates.
    #[default]
    Resolution,
    /// Prefer higher frame rate over higher image resolution.
    Framerate,
}

#[derive(Debug, Default, Clone, Copy)]
struct FramePrefs {
    resolution: Option<Resolution>,
    fps: Option<u32>,
    pref: ParamPreference,
}

/// Format negotiation options.
#[derive(Debug, Default, Clone)]
pub struct WebcamOptions {
    name: Option<String>,
    frame: FramePrefs,
}

impl WebcamOptions {
    /// Sets the name of the webcam device to open.
    ///
    /// If no webcam with the given name can be found, opening the webcam will result in an error.
    #[inline]
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the desired image resolution.
    ///
    /// A lower resolution might be selected if the webcam cannot deliver the desired resolution.
    #[inline]
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.frame.resolution = Some(resolution);
        self
    }

    /// Sets the desired frame rate.
    ///
    /// A lower frame rate might be selected if the webcam cannot deliver the desired frame rate.
    #[inline]
    pub fn fps(mut self, fps: u32) -> Self {
        self.frame.fps = Some(fps);
        self
    }

    /// Selects whether to prefer a higher resolution or frame rate.
    ///
    /// When the camera cannot deliver the desired frame rate or resolution, this parameter controls
    /// which one will be maintained.
    ///
    /// If the camera *can* deliver the desired frame rate and resolution, this parameter controls
    /// which camera parameter will be maximized while keeping the other at its desired
    /// configuration value.
    #[inline]
    pub fn prefer(mut self, pref: ParamPreference) -> Self {
        self.frame.pref = pref;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FrameFormat {
    resolution: Resolution,
    fps: f32,
}

fn negotiate_format(device: &Device, prefs: FramePrefs) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixelformat() == Pixelformat::JPEG || format.pixelformat() == Pixelformat::MJPG {
            pixel_format = Some(format.pixelformat());
            break;
        }
    }

    let Some(pixel_format) = pixel_format else {
        bail!("no supported pixel format found");
    };

    let mut formats = Vec::new();
    let mut intervals = Vec::new();
    match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => {
            for size in sizes {
                let rates =
                    match device.frame_intervals(pixel_format, size.width(), size.height())? {
                        FrameIntervals::Discrete(rates) => rates,
                        FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                            bail!("stepwise or continuous frame rates are not supported")
                        }
                    };
                for rate in rates {
                    let interval = *rate.fract();
                    formats.push(FrameFormat {
                        resolution: Resolution::new(size.width(), size.height()),
                        fps: 1.0 / interval.as_f32(),
                    });
                    intervals.push(interval);
                }
            }
        }
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    }

    match select_format(&formats, prefs) {
        Some(index) => {
            let fmt = formats[index];
            Ok((
                PixFormat::new(
                    fmt.resolution.width(),
                    fmt.resolution.height(),
                    pixel_format,
                ),
                intervals[index],
            ))
        }
        None => bail!("failed to negotiate a webcam format"),
    }
}

/// Picks the index of the best entry in `formats`, dropping the less preferred parameter first
/// when nothing matches.
fn select_format(formats: &[FrameFormat], mut prefs: FramePrefs) -> Option<usize> {
    loop {
        if let Some(fmt) = negotiate_format_step(formats, prefs) {
            return Some(fmt);
        }

        log::debug!("failed to negotiate format with prefs {:?}", prefs);
        match prefs.pref {
            ParamPreference::Resolution => {
                if prefs.fps.take().is_none() && prefs.resolution.take().is_none() {
                    return None;
                }
            }
            ParamPreference::Framerate => {
                if prefs.resolution.take().is_none() && prefs.fps.take().is_none() {
                    return None;
                }
            }
        }
        log::debug!("retrying with new prefs {:?}", prefs);
    }
}

fn negotiate_format_step(formats: &[FrameFormat], prefs: FramePrefs) -> Option<usize> {
    let eligible = formats.iter().enumerate().filter(|(_, fmt)| {
        prefs.resolution.map_or(true, |res| {
            fmt.resolution.width() >= res.width() && fmt.resolution.height() >= res.height()
        }) && prefs.fps.map_or(true, |fps| fmt.fps.round() >= fps as f32)
    });
    let best = match prefs.pref {
        ParamPreference::Resolution => {
            eligible.max_by_key(|(_, fmt)| (fmt.resolution.num_pixels(), TotalF32(fmt.fps)))
        }
        ParamPreference::Framerate => {
            eligible.max_by_key(|(_, fmt)| (TotalF32(fmt.fps), fmt.resolution.num_pixels()))
        }
    };
    best.map(|(index, _)| index)
}

const ENV_VAR_WEBCAM_NAME: &str = "HANDREC_WEBCAM_NAME";

/// A webcam yielding a stream of [`Image`]s.
///
/// The device is released when the [`Webcam`] is dropped.
pub struct Webcam {
    name: String,
    stream: ReadStream,
    resolution: Resolution,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the first supported webcam found.
    ///
    /// If neither [`WebcamOptions::name`] nor the `HANDREC_WEBCAM_NAME` environment variable
    /// select a device, the first device supporting a JPEG-based format is used.
    ///
    /// This function can block for a significant amount of time while the webcam initializes (on
    /// the order of hundreds of milliseconds).
    pub fn open(options: WebcamOptions) -> anyhow::Result<Self> {
        let name_from_env = env::var(ENV_VAR_WEBCAM_NAME).ok();
        if let Some(name) = &name_from_env {
            log::debug!(
                "webcam override: `{}` is set to '{}'",
                ENV_VAR_WEBCAM_NAME,
                name,
            );
        }
        let wanted = options.name.as_deref().or(name_from_env.as_deref());

        for res in linuxvideo::list()? {
            match res {
                Ok(dev) => match Self::open_impl(dev, wanted, options.frame) {
                    Ok(Some(webcam)) => return Ok(webcam),
                    Ok(None) => {}
                    Err(e) => {
                        log::debug!("{}", e);
                    }
                },
                Err(e) => {
                    log::warn!("{}", e);
                }
            }
        }

        match wanted {
            Some(name) => bail!("no supported webcam device named '{}' found", name),
            None => bail!("no supported webcam device found"),
        }
    }

    fn open_impl(
        dev: Device,
        wanted: Option<&str>,
        prefs: FramePrefs,
    ) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        if let Some(name) = wanted {
            if caps.card() != name {
                return Ok(None);
            }
        }

        let cap_flags = caps.device_capabilities();
        let path = dev.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            cap_flags,
        );

        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let (pixfmt, fract) = negotiate_format(&dev, prefs)?;

        let capture = dev.video_capture(pixfmt)?;

        let format = capture.format();
        let resolution = Resolution::new(format.width(), format.height());

        let actual = capture.set_frame_interval(fract)?;

        log::info!(
            "opened {} ({}), {} @ {:.1}Hz",
            caps.card(),
            path.display(),
            resolution,
            1.0 / actual.as_f32(),
        );

        let stream = capture.into_stream(2)?;

        Ok(Some(Self {
            name: caps.card().to_string(),
            stream,
            resolution,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }

    /// Returns the device name of this webcam.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the negotiated frame resolution.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Reads the next frame from the camera.
    ///
    /// If no frame is available, this method will block until one is. Corrupted frames are
    /// replaced by a black image of the same size.
    pub fn read(&mut self) -> anyhow::Result<Image> {
        let dequeue_guard = self.t_dequeue.start();
        let resolution = self.resolution;
        let t_decode = &self.t_decode;
        self.stream
            .dequeue(|buf| {
                drop(dequeue_guard);
                let image = match t_decode.time(|| Image::decode_jpeg(&buf)) {
                    Ok(image) => image,
                    Err(e) => {
                        // Even good webcams produce the occasional corrupted MJPG frame. Skipping
                        // it would double the latency of the next frame.
                        log::error!("webcam decode error: {}", e);
                        Image::new(resolution.width(), resolution.height())
                    }
                };
                Ok(image)
            })
            .map_err(Into::into)
    }

    /// Returns profiling timers for webcam access and decoding.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_dequeue, &self.t_decode].into_iter()
    }
}

impl Drop for Webcam {
    fn drop(&mut self) {
        log::debug!("releasing webcam {}", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(width: u32, height: u32, fps: u32) -> FrameFormat {
        FrameFormat {
            resolution: Resolution::new(width, height),
            fps: fps as f32,
        }
    }

    fn select(formats: &[FrameFormat], prefs: FramePrefs) -> Option<FrameFormat> {
        select_format(formats, prefs).map(|index| formats[index])
    }

    fn formats() -> Vec<FrameFormat> {
        vec![
            fmt(640, 480, 30),
            fmt(640, 480, 60),
            fmt(1280, 720, 30),
            fmt(1920, 1080, 15),
        ]
    }

    fn prefs(resolution: Option<Resolution>, fps: Option<u32>, pref: ParamPreference) -> FramePrefs {
        FramePrefs {
            resolution,
            fps,
            pref,
        }
    }

    #[test]
    fn prefers_resolution() {
        let formats = formats();
        let sel = select(&formats, prefs(None, Some(30), ParamPreference::Resolution));
        assert_eq!(sel, Some(fmt(1280, 720, 30)));

        let sel = select(&formats, prefs(None, None, ParamPreference::Resolution));
        assert_eq!(sel, Some(fmt(1920, 1080, 15)));
    }

    #[test]
    fn prefers_framerate() {
        let formats = formats();
        let sel = select(&formats, prefs(None, None, ParamPreference::Framerate));
        assert_eq!(sel, Some(fmt(640, 480, 60)));

        let sel = select(
            &formats,
            prefs(Some(Resolution::new(1280, 720)), None, ParamPreference::Framerate),
        );
        assert_eq!(sel, Some(fmt(1280, 720, 30)));
    }

    #[test]
    fn relaxes_unsatisfiable_prefs() {
        let formats = formats();

        // Nothing delivers 1080p at 30 FPS: keep the resolution, drop the frame rate.
        let sel = select(
            &formats,
            prefs(
                Some(Resolution::new(1920, 1080)),
                Some(30),
                ParamPreference::Resolution,
            ),
        );
        assert_eq!(sel, Some(fmt(1920, 1080, 15)));

        // Keep the frame rate, drop the resolution.
        let sel = select(
            &formats,
            prefs(
                Some(Resolution::new(1920, 1080)),
                Some(30),
                ParamPreference::Framerate,
            ),
        );
        assert_eq!(sel, Some(fmt(640, 480, 60)));
    }

    #[test]
    fn no_formats() {
        assert_eq!(
            select(&[], prefs(None, Some(30), ParamPreference::Resolution)),
            None
        );
    }
}
