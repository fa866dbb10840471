use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::infrastructure::model_resolver::{self, ModelSource, ProgressFn};
use crate::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;

/// The detector could not be brought up. Not retried automatically.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitializationError {
    #[error("failed to fetch face model: {0}")]
    Model(String),
    #[error("failed to start inference runtime: {0}")]
    Runtime(String),
}

/// Builds the detector. Runs once, on the loader's background thread.
pub type DetectorFactory =
    Box<dyn FnOnce() -> Result<Box<dyn FaceDetector>, InitializationError> + Send>;

#[derive(Clone, Debug, PartialEq)]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    Failed(InitializationError),
}

/// Loads a detector in the background, at most once.
///
/// `initialize` is idempotent: the first call consumes the factory and
/// spawns the load, and every later call (concurrent or not) is a no-op.
/// Consumers select on `settled`, check `state`, then `take_detector`.
pub struct DetectorLoader {
    factory: Mutex<Option<DetectorFactory>>,
    slot: Arc<Mutex<SlotInner>>,
    settled_tx: Sender<()>,
    settled_rx: Receiver<()>,
}

struct SlotInner {
    state: LoadState,
    detector: Option<Box<dyn FaceDetector>>,
}

impl DetectorLoader {
    pub fn new(factory: DetectorFactory) -> Self {
        let (settled_tx, settled_rx) = crossbeam_channel::bounded(1);
        Self {
            factory: Mutex::new(Some(factory)),
            slot: Arc::new(Mutex::new(SlotInner {
                state: LoadState::Idle,
                detector: None,
            })),
            settled_tx,
            settled_rx,
        }
    }

    /// Loader for an already-constructed detector; `initialize` completes
    /// on the background thread without doing any work.
    pub fn from_detector(detector: Box<dyn FaceDetector>) -> Self {
        Self::new(Box::new(move || Ok(detector)))
    }

    /// Starts loading unless a load is in flight or finished.
    ///
    /// Returns `true` only for the call that started the load.
    pub fn initialize(&self) -> bool {
        let Some(factory) = lock(&self.factory).take() else {
            return false;
        };

        lock(&self.slot).state = LoadState::Loading;
        log::info!("Initializing face detector");

        let slot = self.slot.clone();
        let settled = self.settled_tx.clone();
        thread::spawn(move || {
            let result = factory();
            let mut inner = lock(&slot);
            match result {
                Ok(detector) => {
                    log::info!("Face detector ready");
                    inner.detector = Some(detector);
                    inner.state = LoadState::Ready;
                }
                Err(e) => {
                    log::error!("Face detector initialization failed: {e}");
                    inner.state = LoadState::Failed(e);
                }
            }
            drop(inner);
            let _ = settled.try_send(());
        });
        true
    }

    pub fn state(&self) -> LoadState {
        lock(&self.slot).state.clone()
    }

    /// Receives one message when the load finishes, whether it succeeded
    /// or failed. The state is already updated when the message arrives.
    pub fn settled(&self) -> Receiver<()> {
        self.settled_rx.clone()
    }

    /// Hands the loaded detector to its single consumer.
    pub fn take_detector(&self) -> Option<Box<dyn FaceDetector>> {
        lock(&self.slot).detector.take()
    }
}

/// Factory that resolves the YOLO face model and opens an ONNX session.
pub fn yolo_factory(
    source: ModelSource,
    confidence: f64,
    progress: Option<ProgressFn>,
) -> DetectorFactory {
    Box::new(move || {
        let model_path = model_resolver::resolve(&source, progress)
            .map_err(|e| InitializationError::Model(e.to_string()))?;
        let detector = OnnxYoloDetector::new(&model_path, confidence)
            .map_err(|e| InitializationError::Runtime(e.to_string()))?;
        Ok(Box::new(detector) as Box<dyn FaceDetector>)
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
