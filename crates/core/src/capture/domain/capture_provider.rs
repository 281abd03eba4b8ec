use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::frame::Frame;

/// Which tracks a capture session must open.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub video: bool,
    pub audio: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("permission to use the capture device was denied: {0}")]
    PermissionDenied(String),
    #[error("no capture device available: {0}")]
    NoDevice(String),
    #[error("capture device is busy: {0}")]
    DeviceBusy(String),
    #[error("capture stream interrupted: {0}")]
    Interrupted(String),
}

/// Result of asking the stream for its next picture.
#[derive(Debug)]
pub enum FrameRead {
    Frame(Frame),
    /// The stream is open but has no decoded picture yet.
    Pending,
}

/// Grants live capture streams from a device or source.
pub trait CaptureProvider: Send {
    fn acquire(
        &mut self,
        constraints: CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// An open capture stream. Owned by exactly one sampling loop.
pub trait CaptureStream: Send {
    /// Current `(width, height)` of the video track. Zero until the first
    /// picture has been decoded on some sources.
    fn dimensions(&self) -> (u32, u32);

    /// Reads the next picture. Errors mean the stream was lost and are
    /// reported as [`CaptureError::Interrupted`].
    fn read_frame(&mut self) -> Result<FrameRead, CaptureError>;

    /// Stops every track and releases the device.
    fn release(&mut self);
}
