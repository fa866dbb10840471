use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{never, select, tick, Receiver, Sender};

use crate::detection::infrastructure::detector_loader::{DetectorLoader, LoadState};
use crate::monitoring::domain::monitor_listener::MonitorListener;
use crate::monitoring::domain::monitor_snapshot::{LifecycleState, MonitorSnapshot};
use crate::monitoring::infrastructure::detection_worker::{
    DetectOutcome, DetectRequest, DetectionWorker,
};
use crate::monitoring::monitor_config::MonitorConfig;
use crate::monitoring::monitor_session::MonitorSession;
use crate::video::domain::frame_sampler::{FrameSampler, Sample};
use crate::video::domain::video_source::VideoSource;

enum Command {
    Start,
    Stop,
    ResetViolations,
    Shutdown,
}

/// Latest published snapshot plus a signal for waiters.
struct SharedSnapshot {
    current: Mutex<MonitorSnapshot>,
    changed: Condvar,
}

impl SharedSnapshot {
    fn publish(&self, snapshot: MonitorSnapshot) {
        *lock(&self.current) = snapshot;
        self.changed.notify_all();
    }
}

/// Control surface for a running monitor.
///
/// Every call is a message to the monitor thread, which owns all monitor
/// state. Dropping the handle shuts the monitor down.
pub struct MonitorHandle {
    commands: Sender<Command>,
    shared: Arc<SharedSnapshot>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Spawns the monitor thread. Nothing is sampled or loaded until
    /// [`start`](Self::start).
    pub fn spawn(
        source: Box<dyn VideoSource>,
        loader: DetectorLoader,
        listener: Box<dyn MonitorListener>,
        config: MonitorConfig,
    ) -> Self {
        let (commands, command_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(SharedSnapshot {
            current: Mutex::new(MonitorSnapshot::default()),
            changed: Condvar::new(),
        });

        let monitor = MonitorLoop {
            session: MonitorSession::new(config.gaze.clone(), listener),
            sampler: FrameSampler::new(source),
            loader,
            worker: None,
            worker_lost: false,
            active: false,
            generation: 0,
            config,
            shared: shared.clone(),
        };
        let thread = std::thread::spawn(move || monitor.run(command_rx));

        Self {
            commands,
            shared,
            thread: Some(thread),
        }
    }

    /// Activates monitoring. The first call also starts loading the
    /// detector; sampling begins once both detector and source are ready.
    pub fn start(&self) {
        self.send(Command::Start);
    }

    /// Stops sampling. Count and histories are kept for a later `start`.
    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// Zeroes the violation count and clears the suspicious-activity flag.
    pub fn reset_violations(&self) {
        self.send(Command::ResetViolations);
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        lock(&self.shared.current).clone()
    }

    /// Blocks until a published snapshot satisfies `pred` or `timeout`
    /// elapses. Returns the matching snapshot.
    pub fn wait_for<F>(&self, pred: F, timeout: Duration) -> Option<MonitorSnapshot>
    where
        F: Fn(&MonitorSnapshot) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut current = lock(&self.shared.current);
        loop {
            if pred(&current) {
                return Some(current.clone());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            current = self
                .shared
                .changed
                .wait_timeout(current, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    /// Stops the loop and releases the detector. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.send(Command::Shutdown);
        if thread.join().is_err() {
            log::error!("Monitor thread panicked");
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            log::debug!("Monitor thread already stopped");
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// What woke the monitor thread.
enum Wake {
    Command(Command),
    SampleTick,
    ReadinessPoll,
    DetectorSettled,
    Outcome(DetectOutcome),
    WorkerLost,
}

struct MonitorLoop {
    session: MonitorSession,
    sampler: FrameSampler,
    loader: DetectorLoader,
    worker: Option<DetectionWorker>,
    /// The detector died with its worker thread; there is nothing to restart.
    worker_lost: bool,
    /// Set by start, cleared by stop.
    active: bool,
    /// Bumped whenever sampling starts or stops; stale outcomes are dropped.
    generation: u64,
    config: MonitorConfig,
    shared: Arc<SharedSnapshot>,
}

impl MonitorLoop {
    fn run(mut self, commands: Receiver<Command>) {
        let readiness = tick(self.config.readiness_poll());
        let settled = self.loader.settled();
        let mut sampling: Receiver<Instant> = never();
        let mut sampling_active = false;
        let mut outcomes: Receiver<DetectOutcome> = never();

        loop {
            let wake = select! {
                recv(commands) -> cmd => Wake::Command(cmd.unwrap_or(Command::Shutdown)),
                recv(sampling) -> _ => Wake::SampleTick,
                recv(readiness) -> _ => Wake::ReadinessPoll,
                recv(settled) -> _ => Wake::DetectorSettled,
                recv(outcomes) -> outcome => match outcome {
                    Ok(outcome) => Wake::Outcome(outcome),
                    Err(_) => Wake::WorkerLost,
                },
            };
            let poll = matches!(
                wake,
                Wake::ReadinessPoll | Wake::DetectorSettled | Wake::Command(Command::Start)
            );

            match wake {
                Wake::Command(Command::Shutdown) => break,
                Wake::Command(Command::Start) => self.start(),
                Wake::Command(Command::Stop) => self.stop(),
                Wake::Command(Command::ResetViolations) => self.session.reset_violations(),
                Wake::SampleTick => self.on_sample_tick(),
                Wake::ReadinessPoll | Wake::DetectorSettled => {}
                Wake::Outcome(outcome) => self.on_outcome(outcome),
                Wake::WorkerLost => {
                    log::error!("Detection worker terminated unexpectedly");
                    self.worker = None;
                    self.worker_lost = true;
                    outcomes = never();
                    self.session
                        .set_error(Some("detection worker terminated".to_string()));
                    self.stop();
                }
            }

            if self.active && self.worker.is_none() {
                if let Some(rx) = self.attach_detector() {
                    outcomes = rx;
                }
            }
            if poll {
                self.check_readiness();
            }

            let monitoring = self.session.lifecycle() == LifecycleState::Monitoring;
            if monitoring != sampling_active {
                sampling = if monitoring {
                    tick(self.config.sample_interval())
                } else {
                    never()
                };
                sampling_active = monitoring;
            }

            let snapshot = self.session.publish();
            self.shared.publish(snapshot);
        }

        self.teardown();
    }

    fn start(&mut self) {
        if self.active {
            return;
        }
        if self.worker_lost {
            log::warn!("Ignoring start: the detection worker is gone");
            return;
        }
        self.active = true;
        log::info!("Monitoring requested");
        self.loader.initialize();
        if self.worker.is_none() {
            self.session.set_lifecycle(LifecycleState::Initializing);
        }
    }

    fn stop(&mut self) {
        if !self.active && self.session.lifecycle() != LifecycleState::Monitoring {
            return;
        }
        self.active = false;
        self.generation += 1;
        self.session.set_lifecycle(LifecycleState::Stopped);
    }

    /// Moves the loaded detector onto a worker thread and returns the
    /// channel its outcomes arrive on. `None` until the loader has one.
    fn attach_detector(&mut self) -> Option<Receiver<DetectOutcome>> {
        match self.loader.state() {
            LoadState::Ready => {
                let detector = self.loader.take_detector()?;
                let (outcome_tx, outcome_rx) = crossbeam_channel::bounded(1);
                self.worker = Some(DetectionWorker::spawn(detector, outcome_tx));
                self.session.set_error(None);
                Some(outcome_rx)
            }
            LoadState::Failed(e) => {
                self.session.set_error(Some(e.to_string()));
                None
            }
            LoadState::Idle | LoadState::Loading => None,
        }
    }

    /// Begins sampling once active, detector ready, and source decodable.
    fn check_readiness(&mut self) {
        if !self.active || self.session.lifecycle() == LifecycleState::Monitoring {
            return;
        }
        if self.worker.is_none() {
            self.session.set_lifecycle(LifecycleState::Initializing);
            return;
        }
        if self.sampler.has_ended() {
            log::info!("Source has ended");
            self.stop();
            return;
        }
        if !self.sampler.is_ready() {
            log::debug!("Waiting for video source");
            self.session.set_lifecycle(LifecycleState::Ready);
            return;
        }
        self.generation += 1;
        self.session.set_lifecycle(LifecycleState::Monitoring);
    }

    fn on_sample_tick(&mut self) {
        if self.session.lifecycle() != LifecycleState::Monitoring {
            return;
        }
        let Some(busy) = self.worker.as_ref().map(DetectionWorker::is_busy) else {
            return;
        };
        self.session.record_tick();
        let current_tick = self.session.snapshot().ticks;

        if busy {
            log::debug!("Tick {current_tick}: detection still in flight, skipping");
            self.session.record_skip();
            return;
        }

        match self.sampler.sample() {
            Ok(Sample::Frame(frame)) => {
                let request = DetectRequest {
                    generation: self.generation,
                    tick: current_tick,
                    frame,
                };
                let accepted = self
                    .worker
                    .as_mut()
                    .is_some_and(|worker| worker.submit(request));
                if !accepted {
                    self.session.record_skip();
                }
            }
            Ok(Sample::NotReady) => {
                log::trace!("Tick {current_tick}: source not decodable");
                self.session.record_skip();
            }
            Ok(Sample::Ended) => {
                log::info!("Source has ended");
                self.session.record_skip();
                self.stop();
            }
            Err(e) => {
                log::warn!("Tick {current_tick}: failed to read frame: {e}");
                self.session.record_skip();
            }
        }
    }

    fn on_outcome(&mut self, outcome: DetectOutcome) {
        if let Some(worker) = self.worker.as_mut() {
            worker.complete();
        }
        let current = outcome.generation == self.generation
            && self.session.lifecycle() == LifecycleState::Monitoring;
        if !current {
            log::debug!("Discarding result for tick {}", outcome.tick);
            return;
        }
        match outcome.result {
            Ok(detections) => {
                self.session
                    .apply_detections(&detections, outcome.tick, outcome.timestamp_ms)
            }
            Err(e) => self.session.record_detection_error(outcome.tick, &e),
        }
    }

    fn teardown(&mut self) {
        self.active = false;
        self.generation += 1;
        self.worker = None;
        self.sampler.close();
        if self.session.lifecycle() == LifecycleState::Monitoring {
            self.session.set_lifecycle(LifecycleState::Stopped);
        }
        let snapshot = self.session.publish();
        self.shared.publish(snapshot);
        log::info!("Monitor shut down");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
