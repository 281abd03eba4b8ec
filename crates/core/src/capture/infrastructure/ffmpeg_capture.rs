use crate::capture::domain::capture_provider::{
    CaptureConstraints, CaptureError, CaptureProvider, CaptureStream, FrameRead,
};
use crate::shared::frame::Frame;

/// Opens capture devices (or recorded files) through ffmpeg-next.
///
/// `source` is whatever the platform input expects: `/dev/video0` with
/// `v4l2`, `"0:0"` with `avfoundation`, `video=Camera` with `dshow`, or a
/// plain file path with no input format.
pub struct FfmpegCaptureProvider {
    source: String,
    input_format: Option<String>,
}

impl FfmpegCaptureProvider {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            input_format: None,
        }
    }

    pub fn with_input_format(mut self, format: impl Into<String>) -> Self {
        self.input_format = Some(format.into());
        self
    }

    fn open_input(&self) -> Result<ffmpeg_next::format::context::Input, CaptureError> {
        ffmpeg_next::init().map_err(|e| CaptureError::NoDevice(format!("ffmpeg init: {e}")))?;

        let Some(format_name) = self.input_format.as_deref() else {
            return ffmpeg_next::format::input(&self.source)
                .map_err(|e| classify_open_error(&self.source, e));
        };

        ffmpeg_next::device::register_all();
        let unavailable =
            || CaptureError::NoDevice(format!("input format '{format_name}' is not available"));
        let c_name = std::ffi::CString::new(format_name).map_err(|_| unavailable())?;
        let raw = unsafe { ffmpeg_next::ffi::av_find_input_format(c_name.as_ptr()) };
        if raw.is_null() {
            return Err(unavailable());
        }
        let format = unsafe { ffmpeg_next::format::Input::wrap(raw as *mut _) };

        ffmpeg_next::format::open_with(
            &self.source,
            &ffmpeg_next::format::Format::Input(format),
            ffmpeg_next::Dictionary::new(),
        )
        .map(|ctx| ctx.input())
        .map_err(|e| classify_open_error(&self.source, e))
    }
}

impl CaptureProvider for FfmpegCaptureProvider {
    fn acquire(
        &mut self,
        constraints: CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        if !constraints.video {
            return Err(CaptureError::NoDevice(
                "monitoring requires a video track".into(),
            ));
        }

        let ictx = self.open_input()?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| CaptureError::NoDevice(format!("{}: no video track", self.source)))?;
        let video_stream_index = stream.index();

        if constraints.audio && ictx.streams().best(ffmpeg_next::media::Type::Audio).is_none() {
            return Err(CaptureError::NoDevice(format!(
                "{}: no audio track",
                self.source
            )));
        }

        let decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .and_then(|ctx| ctx.decoder().video())
            .map_err(|e| CaptureError::NoDevice(format!("{}: {e}", self.source)))?;

        log::info!(
            "Capture opened: {} ({}x{}, audio: {})",
            self.source,
            decoder.width(),
            decoder.height(),
            constraints.audio
        );

        Ok(Box::new(FfmpegCaptureStream {
            ictx: Some(ictx),
            decoder,
            scaler: None,
            video_stream_index,
            frame_index: 0,
            decoded_size: None,
            source: self.source.clone(),
        }))
    }
}

struct RgbScaler {
    context: ffmpeg_next::software::scaling::Context,
    format: ffmpeg_next::format::Pixel,
    width: u32,
    height: u32,
}

/// Live decoding session. Each `read_frame` pulls packets until one
/// picture decodes and converts it to RGB24.
struct FfmpegCaptureStream {
    ictx: Option<ffmpeg_next::format::context::Input>,
    decoder: ffmpeg_next::decoder::Video,
    scaler: Option<RgbScaler>,
    video_stream_index: usize,
    frame_index: usize,
    /// Size of the last decoded picture, which wins over codec parameters.
    decoded_size: Option<(u32, u32)>,
    source: String,
}

// Safety: FfmpegCaptureStream is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegCaptureStream {}

impl FfmpegCaptureStream {
    fn receive(&mut self) -> Result<Option<FrameRead>, CaptureError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let width = decoded.width();
        let height = decoded.height();
        if width == 0 || height == 0 {
            return Ok(Some(FrameRead::Pending));
        }
        self.decoded_size = Some((width, height));

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        let converted = self
            .scaler_for(decoded.format(), width, height)?
            .run(&decoded, &mut rgb_frame);
        converted.map_err(|e| CaptureError::Interrupted(format!("{}: {e}", self.source)))?;

        let pixels = extract_rgb_pixels(&rgb_frame, width, height);
        let frame = Frame::new(pixels, width, height, 3, self.frame_index);
        self.frame_index += 1;
        Ok(Some(FrameRead::Frame(frame)))
    }

    fn scaler_for(
        &mut self,
        format: ffmpeg_next::format::Pixel,
        width: u32,
        height: u32,
    ) -> Result<&mut ffmpeg_next::software::scaling::Context, CaptureError> {
        let reusable = self
            .scaler
            .take()
            .filter(|s| s.format == format && s.width == width && s.height == height);

        let scaler = match reusable {
            Some(scaler) => scaler,
            None => RgbScaler {
                context: ffmpeg_next::software::scaling::Context::get(
                    format,
                    width,
                    height,
                    ffmpeg_next::format::Pixel::RGB24,
                    width,
                    height,
                    ffmpeg_next::software::scaling::Flags::BILINEAR,
                )
                .map_err(|e| CaptureError::Interrupted(format!("{}: {e}", self.source)))?,
                format,
                width,
                height,
            },
        };

        Ok(&mut self.scaler.insert(scaler).context)
    }
}

impl CaptureStream for FfmpegCaptureStream {
    fn dimensions(&self) -> (u32, u32) {
        if self.ictx.is_none() {
            return (0, 0);
        }
        self.decoded_size
            .unwrap_or((self.decoder.width(), self.decoder.height()))
    }

    fn read_frame(&mut self) -> Result<FrameRead, CaptureError> {
        loop {
            if let Some(read) = self.receive()? {
                return Ok(read);
            }

            let ictx = self
                .ictx
                .as_mut()
                .ok_or_else(|| CaptureError::Interrupted("stream released".into()))?;

            let packet = match ictx.packets().next() {
                Some((stream, packet)) if stream.index() == self.video_stream_index => packet,
                Some(_) => continue,
                None => {
                    return Err(CaptureError::Interrupted(format!(
                        "{}: end of stream",
                        self.source
                    )))
                }
            };

            // Corrupt packets are dropped; the next keyframe recovers.
            if let Err(e) = self.decoder.send_packet(&packet) {
                log::debug!("Dropping undecodable packet from {}: {e}", self.source);
            }
        }
    }

    fn release(&mut self) {
        if self.ictx.take().is_some() {
            self.scaler = None;
            log::info!("Capture closed: {}", self.source);
        }
    }
}

fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

/// Maps the errno behind an open failure onto the capture taxonomy.
fn classify_open_error(source: &str, err: ffmpeg_next::Error) -> CaptureError {
    use ffmpeg_next::error::{EACCES, EBUSY, EPERM};

    let detail = format!("{source}: {err}");
    match err {
        ffmpeg_next::Error::Other { errno } if errno == EACCES || errno == EPERM => {
            CaptureError::PermissionDenied(detail)
        }
        ffmpeg_next::Error::Other { errno } if errno == EBUSY => CaptureError::DeviceBusy(detail),
        _ => CaptureError::NoDevice(detail),
    }
}
