//! Recorded depth streams.
//!
//! A recording is a directory of 16-bit grayscale PNGs, one per frame, whose
//! sample values are millimetres. Frames play back in file-name order.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use super::{DepthDevice, SensorDriver, SensorError};
use crate::frame::DepthFrame;

/// Driver over one recording directory. Exposes a single device.
pub struct ReplayDriver {
    frames: Vec<PathBuf>,
    frame_interval: Option<Duration>,
}

impl ReplayDriver {
    /// Index the PNG files in `dir`.
    pub fn open(dir: &Path) -> Result<Self, SensorError> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            SensorError::ContextInit(format!("cannot read {}: {}", dir.display(), e))
        })?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("png"))
                    .unwrap_or(false)
            })
            .collect();
        frames.sort();

        tracing::info!(dir = %dir.display(), frames = frames.len(), "Indexed depth recording");
        Ok(Self {
            frames,
            frame_interval: None,
        })
    }

    /// Pace playback to at most one frame per `interval`.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl SensorDriver for ReplayDriver {
    type Device = ReplayDevice;

    fn device_count(&self) -> usize {
        if self.frames.is_empty() {
            0
        } else {
            1
        }
    }

    fn open_device(&mut self, index: usize) -> Result<ReplayDevice, SensorError> {
        if index != 0 {
            return Err(SensorError::DeviceOpen {
                index,
                reason: "a recording exposes only device 0".to_string(),
            });
        }
        Ok(ReplayDevice {
            frames: self.frames.clone(),
            frame_interval: self.frame_interval,
            cursor: 0,
            streaming: false,
            last_frame: None,
        })
    }

    fn shutdown(&mut self) {
        self.frames.clear();
    }
}

/// Playback cursor over a recording.
pub struct ReplayDevice {
    frames: Vec<PathBuf>,
    frame_interval: Option<Duration>,
    cursor: usize,
    streaming: bool,
    last_frame: Option<Instant>,
}

impl ReplayDevice {
    fn decode(path: &Path, frame_number: u64) -> Result<DepthFrame, SensorError> {
        let image = image::open(path)
            .map_err(|e| SensorError::Stream(format!("{}: {}", path.display(), e)))?
            .to_luma16();
        let (width, height) = image.dimensions();
        DepthFrame::from_millimetres(width, height, image.as_raw())
            .map(|frame| frame.with_frame_number(frame_number))
            .ok_or_else(|| SensorError::Stream(format!("{}: malformed frame", path.display())))
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_frame) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
    }
}

impl DepthDevice for ReplayDevice {
    fn start_depth(&mut self) -> Result<(), SensorError> {
        self.streaming = true;
        Ok(())
    }

    fn stop_depth(&mut self) {
        self.streaming = false;
    }

    fn close(&mut self) {
        self.frames.clear();
        self.cursor = 0;
    }

    fn read_frame(&mut self) -> Result<Option<DepthFrame>, SensorError> {
        if !self.streaming {
            return Err(SensorError::Stream("depth stream not started".to_string()));
        }
        let Some(path) = self.frames.get(self.cursor).cloned() else {
            return Ok(None);
        };
        self.pace();
        let frame = Self::decode(&path, self.cursor as u64)?;
        self.cursor += 1;
        Ok(Some(frame))
    }
}
