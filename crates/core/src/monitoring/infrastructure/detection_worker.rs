use crossbeam_channel::{Sender, TrySendError};

use crate::detection::domain::detection::Detection;
use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
use crate::shared::frame::Frame;

/// One frame to run through the detector.
pub struct DetectRequest {
    /// Monitoring run the frame was sampled in.
    pub generation: u64,
    pub tick: u64,
    pub frame: Frame,
}

pub struct DetectOutcome {
    pub generation: u64,
    pub tick: u64,
    pub timestamp_ms: u64,
    pub result: Result<Vec<Detection>, DetectionError>,
}

/// Runs inference off the monitor thread, one frame at a time.
///
/// At most one request is in flight. `submit` refuses while the previous
/// frame is still being processed, so a slow model drops ticks instead of
/// queueing them. The thread exits, dropping the detector, once the worker
/// is dropped and any in-flight inference has returned.
pub struct DetectionWorker {
    requests: Sender<DetectRequest>,
    in_flight: bool,
}

impl DetectionWorker {
    pub fn spawn(mut detector: Box<dyn FaceDetector>, outcomes: Sender<DetectOutcome>) -> Self {
        let (requests, request_rx) = crossbeam_channel::bounded::<DetectRequest>(1);

        std::thread::spawn(move || {
            for request in request_rx {
                let result = detector.detect(&request.frame);
                let outcome = DetectOutcome {
                    generation: request.generation,
                    tick: request.tick,
                    timestamp_ms: request.frame.timestamp_ms(),
                    result,
                };
                if outcomes.send(outcome).is_err() {
                    break;
                }
            }
            log::debug!("Detection worker exiting");
        });

        Self {
            requests,
            in_flight: false,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    /// Hands a frame to the worker. Returns `false` if it was not accepted.
    pub fn submit(&mut self, request: DetectRequest) -> bool {
        if self.in_flight {
            return false;
        }
        match self.requests.try_send(request) {
            Ok(()) => {
                self.in_flight = true;
                true
            }
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => {
                log::error!("Detection worker is gone");
                false
            }
        }
    }

    /// Marks the outstanding request as answered.
    pub fn complete(&mut self) {
        self.in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::detection::domain::detection::{BoundingBox, FaceKeypoints, Point};

    struct CountingDetector {
        delay: Duration,
    }

    impl FaceDetector for CountingDetector {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
            std::thread::sleep(self.delay);
            if frame.index() == 99 {
                return Err(DetectionError::Inference("bad frame".into()));
            }
            let kp = FaceKeypoints::new(
                Point::new(10.0, 10.0),
                Point::new(20.0, 10.0),
                Point::new(15.0, 15.0),
            );
            Ok(vec![Detection::new(BoundingBox::new(0.0, 0.0, 30.0, 30.0), kp, 0.9)])
        }
    }

    fn request(generation: u64, tick: u64, index: usize) -> DetectRequest {
        DetectRequest {
            generation,
            tick,
            frame: Frame::new(vec![0; 12], 2, 2, 3, index).with_timestamp(tick * 1000),
        }
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_outcome_carries_request_identity() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut worker = DetectionWorker::spawn(
            Box::new(CountingDetector {
                delay: Duration::ZERO,
            }),
            tx,
        );
        assert!(worker.submit(request(3, 7, 0)));

        let outcome = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(outcome.generation, 3);
        assert_eq!(outcome.tick, 7);
        assert_eq!(outcome.timestamp_ms, 7000);
        assert_eq!(outcome.result.unwrap().len(), 1);
    }

    #[test]
    fn test_second_submit_refused_while_in_flight() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut worker = DetectionWorker::spawn(
            Box::new(CountingDetector {
                delay: Duration::from_millis(50),
            }),
            tx,
        );
        assert!(worker.submit(request(1, 0, 0)));
        assert!(worker.is_busy());
        assert!(!worker.submit(request(1, 1, 1)));

        rx.recv_timeout(WAIT).unwrap();
        worker.complete();
        assert!(!worker.is_busy());
        assert!(worker.submit(request(1, 2, 2)));
        assert_eq!(rx.recv_timeout(WAIT).unwrap().tick, 2);
    }

    #[test]
    fn test_detection_error_is_forwarded() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut worker = DetectionWorker::spawn(
            Box::new(CountingDetector {
                delay: Duration::ZERO,
            }),
            tx,
        );
        worker.submit(request(1, 0, 99));
        assert!(rx.recv_timeout(WAIT).unwrap().result.is_err());
    }
}
