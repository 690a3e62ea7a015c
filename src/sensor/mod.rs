//! Depth sensor abstraction.
//!
//! The compositor only sees [`DepthSource`]. Concrete hardware sits behind
//! [`SensorDriver`] / [`DepthDevice`]; [`SensorHandle`] owns both and tears
//! them down in dependency order.

mod replay;

use thiserror::Error;

use crate::frame::DepthFrame;

pub use replay::{ReplayDevice, ReplayDriver};

/// Fatal sensor failures. Any of these aborts the session.
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Failed to initialize sensor context: {0}")]
    ContextInit(String),
    #[error("No depth sensor found")]
    NoDevice,
    #[error("Failed to open device {index}: {reason}")]
    DeviceOpen { index: usize, reason: String },
    #[error("Depth stream error: {0}")]
    Stream(String),
}

/// Anything that yields depth frames.
pub trait DepthSource {
    /// Block until the next frame. `Ok(None)` means the stream has ended.
    fn next_frame(&mut self) -> Result<Option<DepthFrame>, SensorError>;
}

/// Sensor library context.
pub trait SensorDriver {
    type Device: DepthDevice;

    /// Number of attached devices.
    fn device_count(&self) -> usize;

    fn open_device(&mut self, index: usize) -> Result<Self::Device, SensorError>;

    /// Release the context. Called once, after every device is closed.
    fn shutdown(&mut self);
}

/// One opened depth device.
pub trait DepthDevice {
    fn start_depth(&mut self) -> Result<(), SensorError>;

    fn stop_depth(&mut self);

    fn close(&mut self);

    /// Block until the next frame. `Ok(None)` means no more frames.
    fn read_frame(&mut self) -> Result<Option<DepthFrame>, SensorError>;
}

/// Owns a driver context and one streaming device.
pub struct SensorHandle<D: SensorDriver> {
    driver: Option<D>,
    device: Option<D::Device>,
    streaming: bool,
}

impl<D: SensorDriver> SensorHandle<D> {
    /// Open device `index` and start its depth stream.
    ///
    /// On failure everything acquired so far is released before returning.
    pub fn open(driver: D, index: usize) -> Result<Self, SensorError> {
        let mut handle = Self {
            driver: Some(driver),
            device: None,
            streaming: false,
        };

        let count = handle.driver.as_ref().map(|d| d.device_count()).unwrap_or(0);
        if count == 0 {
            handle.teardown();
            return Err(SensorError::NoDevice);
        }

        let opened = match handle.driver.as_mut() {
            Some(driver) => driver.open_device(index),
            None => Err(SensorError::NoDevice),
        };
        let mut device = match opened {
            Ok(device) => device,
            Err(e) => {
                handle.teardown();
                return Err(e);
            }
        };

        if let Err(e) = device.start_depth() {
            handle.device = Some(device);
            handle.teardown();
            return Err(e);
        }
        handle.device = Some(device);
        handle.streaming = true;

        tracing::info!(index, devices = count, "Depth stream started");
        Ok(handle)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Stop the stream, close the device, shut the context down. Safe to
    /// call repeatedly and after partial initialization.
    pub fn teardown(&mut self) {
        if self.streaming {
            if let Some(device) = self.device.as_mut() {
                device.stop_depth();
            }
            self.streaming = false;
        }
        if let Some(mut device) = self.device.take() {
            device.close();
        }
        if let Some(mut driver) = self.driver.take() {
            driver.shutdown();
            tracing::info!("Sensor released");
        }
    }
}

impl<D: SensorDriver> DepthSource for SensorHandle<D> {
    fn next_frame(&mut self) -> Result<Option<DepthFrame>, SensorError> {
        if !self.streaming {
            return Ok(None);
        }
        match self.device.as_mut() {
            Some(device) => device.read_frame(),
            None => Ok(None),
        }
    }
}

impl<D: SensorDriver> Drop for SensorHandle<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Fixed list of frames, for tests and offline runs.
pub struct FrameQueue {
    frames: std::collections::VecDeque<DepthFrame>,
}

impl FrameQueue {
    pub fn new(frames: impl IntoIterator<Item = DepthFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl DepthSource for FrameQueue {
    fn next_frame(&mut self) -> Result<Option<DepthFrame>, SensorError> {
        Ok(self.frames.pop_front())
    }
}
