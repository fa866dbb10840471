use std::path::Path;
use std::time::Instant;

use crate::shared::frame::Frame;
use crate::video::domain::video_source::{ReadyState, VideoSource};

/// Plays a recorded session file as if it were a live camera feed.
///
/// Playback is paced by the wall clock (scaled by `playback_rate`) from the
/// first `current_frame` call, so a sampler polling at a fixed cadence sees
/// the frames a live viewer would, skipping the ones in between.
pub struct FfmpegVideoSource {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    video_stream_index: usize,
    width: u32,
    height: u32,
    fps: f64,
    playback_rate: f64,
    clock: Option<Instant>,
    current: Option<Frame>,
    decoded: usize,
    flushing: bool,
    ended: bool,
}

// Safety: FfmpegVideoSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegVideoSource {}

/// Used when the container reports no frame rate.
const FALLBACK_FPS: f64 = 30.0;

impl FfmpegVideoSource {
    /// Opens the file and decodes the first frame.
    pub fn open(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let ictx = ffmpeg_next::format::input(path)?;
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;

        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 && rate.numerator() > 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            FALLBACK_FPS
        };

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        let mut source = Self {
            ictx,
            decoder,
            scaler,
            video_stream_index,
            width,
            height,
            fps,
            playback_rate: 1.0,
            clock: None,
            current: None,
            decoded: 0,
            flushing: false,
            ended: false,
        };

        match source.decode_next()? {
            Some(frame) => {
                source.current = Some(frame);
                source.decoded = 1;
            }
            None => return Err("Video contains no frames".into()),
        }

        log::info!(
            "Opened {} ({}x{} @ {:.1} fps)",
            path.display(),
            width,
            height,
            fps
        );
        Ok(source)
    }

    /// Plays faster (> 1.0) or slower (< 1.0) than real time.
    pub fn with_playback_rate(mut self, rate: f64) -> Self {
        self.playback_rate = if rate > 0.0 { rate } else { 1.0 };
        self
    }

    fn frame_time_ms(&self, index: usize) -> u64 {
        (index as f64 * 1000.0 / self.fps) as u64
    }

    fn position_ms(&mut self) -> u64 {
        let start = *self.clock.get_or_insert_with(Instant::now);
        (start.elapsed().as_secs_f64() * 1000.0 * self.playback_rate) as u64
    }

    fn decode_next(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        loop {
            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
            if self.flushing {
                return Ok(None);
            }

            let next = self
                .ictx
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));
            match next {
                Some((index, packet)) => {
                    if index != self.video_stream_index {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        log::debug!("Dropping undecodable packet: {e}");
                    }
                }
                None => {
                    let _ = self.decoder.send_eof();
                    self.flushing = true;
                }
            }
        }
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler.run(&decoded, &mut rgb_frame)?;

        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        let timestamp = self.frame_time_ms(self.decoded);
        Ok(Some(
            Frame::new(pixels, self.width, self.height, 3, self.decoded).with_timestamp(timestamp),
        ))
    }
}

impl VideoSource for FfmpegVideoSource {
    fn ready_state(&self) -> ReadyState {
        match (&self.current, self.flushing) {
            (None, _) => ReadyState::HaveMetadata,
            (Some(_), true) => ReadyState::HaveCurrentData,
            (Some(_), false) => ReadyState::HaveEnoughData,
        }
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width, self.height))
    }

    fn current_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
        let target = self.position_ms();
        while !self.ended && self.frame_time_ms(self.decoded) <= target {
            match self.decode_next()? {
                Some(frame) => {
                    self.current = Some(frame);
                    self.decoded += 1;
                }
                None => self.ended = true,
            }
        }
        self.current
            .clone()
            .ok_or_else(|| "FfmpegVideoSource: no frame decoded".into())
    }

    fn has_ended(&self) -> bool {
        self.ended
    }

    fn close(&mut self) {
        self.current = None;
        self.ended = true;
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// dropping any per-row stride padding.
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
