use crate::shared::frame::Frame;
use crate::video::domain::video_source::{is_decodable, VideoSource};

/// Result of asking the source for a frame on one tick.
#[derive(Debug)]
pub enum Sample {
    Frame(Frame),
    /// Source not decodable yet. Normal during startup.
    NotReady,
    /// Finite source has played out.
    Ended,
}

/// Pulls the current frame from a [`VideoSource`] and numbers it.
pub struct FrameSampler {
    source: Box<dyn VideoSource>,
    sampled: usize,
}

impl FrameSampler {
    pub fn new(source: Box<dyn VideoSource>) -> Self {
        Self { source, sampled: 0 }
    }

    pub fn is_ready(&self) -> bool {
        is_decodable(self.source.as_ref())
    }

    pub fn has_ended(&self) -> bool {
        self.source.has_ended()
    }

    pub fn sample(&mut self) -> Result<Sample, Box<dyn std::error::Error>> {
        if self.source.has_ended() {
            return Ok(Sample::Ended);
        }
        if !self.is_ready() {
            return Ok(Sample::NotReady);
        }
        let frame = self.source.current_frame()?;
        if frame.is_empty() {
            return Ok(Sample::NotReady);
        }
        let frame = frame.with_index(self.sampled);
        self.sampled += 1;
        Ok(Sample::Frame(frame))
    }

    pub fn close(&mut self) {
        self.source.close();
    }
}
