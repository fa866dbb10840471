use crate::shared::frame::Frame;

/// How much of the source is decoded, mirroring a media element's ready
/// state. Frames are only readable from `HaveCurrentData` upwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// A live, read-only video feed.
///
/// The monitor never controls acquisition; it only asks for the frame at
/// the current playback position.
pub trait VideoSource: Send {
    fn ready_state(&self) -> ReadyState;

    /// `None` until the source knows its frame size.
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// The frame at the current playback position.
    fn current_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>>;

    /// True once a finite source has played to its end.
    fn has_ended(&self) -> bool {
        false
    }

    /// Releases decoder resources. Default: no-op.
    fn close(&mut self) {}
}

/// Whether a frame can be read right now.
pub fn is_decodable(source: &dyn VideoSource) -> bool {
    let has_size = matches!(source.dimensions(), Some((w, h)) if w > 0 && h > 0);
    has_size && source.ready_state() >= ReadyState::HaveCurrentData
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    struct StubSource {
        state: ReadyState,
        dims: Option<(u32, u32)>,
    }

    impl VideoSource for StubSource {
        fn ready_state(&self) -> ReadyState {
            self.state
        }

        fn dimensions(&self) -> Option<(u32, u32)> {
            self.dims
        }

        fn current_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
            Err("stub".into())
        }
    }

    #[rstest]
    #[case::nothing(ReadyState::HaveNothing, Some((640, 480)), false)]
    #[case::metadata_only(ReadyState::HaveMetadata, Some((640, 480)), false)]
    #[case::current_data(ReadyState::HaveCurrentData, Some((640, 480)), true)]
    #[case::enough_data(ReadyState::HaveEnoughData, Some((640, 480)), true)]
    #[case::unknown_size(ReadyState::HaveEnoughData, None, false)]
    #[case::zero_width(ReadyState::HaveEnoughData, Some((0, 480)), false)]
    fn test_is_decodable(
        #[case] state: ReadyState,
        #[case] dims: Option<(u32, u32)>,
        #[case] expected: bool,
    ) {
        let source = StubSource { state, dims };
        assert_eq!(is_decodable(&source), expected);
    }

    #[test]
    fn test_default_source_never_ends() {
        let source = StubSource {
            state: ReadyState::HaveEnoughData,
            dims: Some((1, 1)),
        };
        assert!(!source.has_ended());
    }
}
