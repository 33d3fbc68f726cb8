//! V4L2 camera source.
//!
//! Captures frames from a local device node (e.g., /dev/video0). The requested
//! width and height are negotiated once at open; frames are normalized to RGB in
//! memory and never written anywhere.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{FrameSource, SourceSettings, SourceStats};
use crate::frame::RawFrame;

pub struct V4l2Source {
    settings: SourceSettings,
    state: Option<DeviceState>,
    format: PixelFormat,
    active_width: u32,
    active_height: u32,
    stats: SourceStats,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(settings: SourceSettings) -> Self {
        Self {
            active_width: settings.width,
            active_height: settings.height,
            settings,
            state: None,
            format: PixelFormat::Rgb24,
            stats: SourceStats::default(),
        }
    }
}

impl FrameSource for V4l2Source {
    fn describe(&self) -> String {
        self.settings.url.clone()
    }

    fn open(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        if self.state.is_some() {
            return Ok(());
        }

        let device = v4l::Device::with_path(&self.settings.url)
            .with_context(|| format!("open v4l2 device {}", self.settings.url))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.settings.width;
        format.height = self.settings.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set RGB3 on {}: {}",
                    self.settings.url,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        self.format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "v4l2 device {} negotiated unsupported pixel format {}",
                self.settings.url,
                format.fourcc
            )
        })?;

        if self.settings.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.settings.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.settings.url,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let state = DeviceStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: opened {} ({}x{}, {:?})",
            self.settings.url,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(())
    }

    fn read_frame(&mut self) -> Result<RawFrame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not open")?;
        let pixels = match state.with_stream_mut(|stream| {
            stream
                .next()
                .map(|(buf, _meta)| buf.to_vec())
                .context("capture v4l2 frame")
        }) {
            Ok(pixels) => pixels,
            Err(err) => {
                self.stats.read_failures += 1;
                return Err(err);
            }
        };

        let rgb = normalize_to_rgb(&pixels, self.active_width, self.active_height, self.format)?;
        self.stats.frames_captured += 1;
        Ok(RawFrame::new(rgb, self.active_width, self.active_height)?
            .with_sequence(self.stats.frames_captured))
    }

    fn close(&mut self) {
        if self.state.take().is_some() {
            log::info!("V4l2Source: closed {}", self.settings.url);
        }
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}
