//! Real-time proctoring monitor.
//!
//! Samples a live video source, runs face detection on each sampled frame,
//! smooths the per-frame result into a stable "looking away" signal, and
//! turns rising edges of the no-face, multiple-faces and looking-away
//! conditions into discrete violation events.

pub mod detection {
    pub mod domain {
        pub mod detection;
        pub mod face_detector;
    }
    pub mod infrastructure;
}

pub mod monitoring {
    pub mod domain {
        pub mod gaze_estimator;
        pub mod monitor_listener;
        pub mod monitor_snapshot;
        pub mod violation_tracker;
    }
    pub mod infrastructure;
    pub mod monitor_config;
    pub mod monitor_controller;
    pub mod monitor_session;
}

pub mod shared {
    pub mod constants;
    pub mod frame;
    pub mod rolling_history;
}

pub mod video {
    pub mod domain {
        pub mod frame_sampler;
        pub mod video_source;
    }
    pub mod infrastructure {
        pub mod ffmpeg_video_source;
    }
}
