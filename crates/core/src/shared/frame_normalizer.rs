use thiserror::Error;

use crate::shared::constants::{DEFAULT_SAMPLE_HEIGHT, DEFAULT_SAMPLE_WIDTH};
use crate::shared::frame::Frame;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("target size must be non-zero, got {width}x{height}")]
    InvalidTarget { width: u32, height: u32 },
    #[error("frame has no pixels ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error("expected an RGB frame, got {0} channels")]
    UnsupportedChannels(u8),
    #[error("frame buffer does not match its dimensions")]
    BufferMismatch,
}

/// Resamples captured frames to the fixed size the detectors consume.
///
/// Output keeps integer (`u8`) pixel values; each detector applies its own
/// float scaling on top of this.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameNormalizer {
    width: u32,
    height: u32,
}

impl FrameNormalizer {
    pub fn new(width: u32, height: u32) -> Result<Self, NormalizeError> {
        if width == 0 || height == 0 {
            return Err(NormalizeError::InvalidTarget { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bilinear resize to the target size. The frame index is preserved.
    pub fn normalize(&self, frame: &Frame) -> Result<Frame, NormalizeError> {
        if !frame.has_valid_dimensions() {
            return Err(NormalizeError::EmptyFrame {
                width: frame.width(),
                height: frame.height(),
            });
        }
        if frame.channels() != 3 {
            return Err(NormalizeError::UnsupportedChannels(frame.channels()));
        }

        let img = image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or(NormalizeError::BufferMismatch)?;

        let resized = if img.width() == self.width && img.height() == self.height {
            img
        } else {
            image::imageops::resize(
                &img,
                self.width,
                self.height,
                image::imageops::FilterType::Triangle,
            )
        };

        Ok(Frame::new(
            resized.into_raw(),
            self.width,
            self.height,
            3,
            frame.index(),
        ))
    }
}

impl Default for FrameNormalizer {
    fn default() -> Self {
        Self {
            width: DEFAULT_SAMPLE_WIDTH,
            height: DEFAULT_SAMPLE_HEIGHT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn solid_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(
            vec![value; (width * height * 3) as usize],
            width,
            height,
            3,
            7,
        )
    }

    #[rstest]
    #[case::landscape(640, 480)]
    #[case::portrait(480, 640)]
    #[case::tiny(2, 2)]
    #[case::already_target(224, 224)]
    fn test_normalize_produces_target_size(#[case] w: u32, #[case] h: u32) {
        let normalizer = FrameNormalizer::default();
        let out = normalizer.normalize(&solid_frame(w, h, 40)).unwrap();
        assert_eq!(out.width(), 224);
        assert_eq!(out.height(), 224);
        assert_eq!(out.channels(), 3);
        assert_eq!(out.data().len(), 224 * 224 * 3);
    }

    #[test]
    fn test_normalize_preserves_solid_color_and_index() {
        let normalizer = FrameNormalizer::new(32, 32).unwrap();
        let out = normalizer.normalize(&solid_frame(100, 60, 200)).unwrap();
        assert!(out.data().iter().all(|&v| v == 200));
        assert_eq!(out.index(), 7);
    }

    #[test]
    fn test_empty_frame_is_rejected() {
        let normalizer = FrameNormalizer::default();
        let empty = Frame::new(Vec::new(), 0, 0, 3, 0);
        assert_eq!(
            normalizer.normalize(&empty),
            Err(NormalizeError::EmptyFrame {
                width: 0,
                height: 0
            })
        );
    }

    #[test]
    fn test_non_rgb_frame_is_rejected() {
        let normalizer = FrameNormalizer::default();
        let rgba = Frame::new(vec![0u8; 16], 2, 2, 4, 0);
        assert_eq!(
            normalizer.normalize(&rgba),
            Err(NormalizeError::UnsupportedChannels(4))
        );
    }

    #[test]
    fn test_zero_target_is_rejected() {
        assert!(FrameNormalizer::new(0, 224).is_err());
        assert!(FrameNormalizer::new(224, 0).is_err());
    }
}
