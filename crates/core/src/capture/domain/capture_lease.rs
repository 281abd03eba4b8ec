use crate::capture::domain::capture_provider::{CaptureError, CaptureStream, FrameRead};

/// Exclusive hold on an open capture stream.
///
/// The stream is released exactly once: by an explicit [`CaptureLease::release`]
/// or, failing that, when the lease is dropped (including during unwinding).
pub struct CaptureLease {
    stream: Option<Box<dyn CaptureStream>>,
}

impl CaptureLease {
    pub fn new(stream: Box<dyn CaptureStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    pub fn is_released(&self) -> bool {
        self.stream.is_none()
    }

    /// `(0, 0)` once released.
    pub fn dimensions(&self) -> (u32, u32) {
        self.stream.as_ref().map_or((0, 0), |s| s.dimensions())
    }

    pub fn read_frame(&mut self) -> Result<FrameRead, CaptureError> {
        match self.stream.as_mut() {
            Some(stream) => stream.read_frame(),
            None => Err(CaptureError::Interrupted("stream already released".into())),
        }
    }

    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
            log::debug!("Capture stream released");
        }
    }
}

impl Drop for CaptureLease {
    fn drop(&mut self) {
        self.release();
    }
}
