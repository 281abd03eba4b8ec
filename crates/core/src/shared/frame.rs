use ndarray::ArrayView3;

/// One snapshot of the capture stream: contiguous RGB bytes in row-major order.
///
/// Frames are immutable once built. A sampling iteration owns its frame and
/// drops it when the iteration completes.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Position of this frame in the capture stream.
    pub fn index(&self) -> usize {
        self.index
    }

    /// A stream can hand out a frame before its first picture is decoded.
    /// Such frames carry no pixels and must not reach a detector.
    pub fn has_valid_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
