use std::path::{Path, PathBuf};

use crate::capture::domain::capture_provider::{
    CaptureConstraints, CaptureError, CaptureProvider, CaptureStream, FrameRead,
};
use crate::shared::frame::Frame;

/// Serves a still image as a camera that never changes.
///
/// Lets a single photo be checked against the proctoring policy with the
/// same monitor that watches live devices. Images have no audio track, so
/// audio must not be requested.
pub struct ImageCaptureProvider {
    path: PathBuf,
}

impl ImageCaptureProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CaptureProvider for ImageCaptureProvider {
    fn acquire(
        &mut self,
        constraints: CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        if constraints.audio {
            return Err(CaptureError::NoDevice(format!(
                "{}: still images have no audio track",
                self.path.display()
            )));
        }

        let img = image::open(&self.path)
            .map_err(|e| classify_image_error(&self.path, e))?
            .to_rgb8();
        let (width, height) = img.dimensions();

        Ok(Box::new(StillImageStream {
            pixels: Some(img.into_raw()),
            width,
            height,
            frame_index: 0,
        }))
    }
}

struct StillImageStream {
    pixels: Option<Vec<u8>>,
    width: u32,
    height: u32,
    frame_index: usize,
}

impl CaptureStream for StillImageStream {
    fn dimensions(&self) -> (u32, u32) {
        match self.pixels {
            Some(_) => (self.width, self.height),
            None => (0, 0),
        }
    }

    fn read_frame(&mut self) -> Result<FrameRead, CaptureError> {
        let pixels = self
            .pixels
            .as_ref()
            .ok_or_else(|| CaptureError::Interrupted("image stream released".into()))?;
        let frame = Frame::new(pixels.clone(), self.width, self.height, 3, self.frame_index);
        self.frame_index += 1;
        Ok(FrameRead::Frame(frame))
    }

    fn release(&mut self) {
        self.pixels = None;
    }
}

fn classify_image_error(path: &Path, err: image::ImageError) -> CaptureError {
    let detail = format!("{}: {err}", path.display());
    match err {
        image::ImageError::IoError(ref io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
            CaptureError::PermissionDenied(detail)
        }
        _ => CaptureError::NoDevice(detail),
    }
}
