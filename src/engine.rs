//! Typing engine
//!
//! Owns one typing session at a time: builds the queue, runs the typing loop
//! on a background thread, and reports status and progress to observers.
//!
//! The loop and the caller share only atomics, the queue and the emitter.
//! Every wait inside the loop is a bounded sleep of at most
//! [`POLL_INTERVAL`], so a stop request is seen within one interval.

use crate::config::SessionConfig;
use crate::delay::{CharContext, DelayModel};
use crate::emitter::InputEmitter;
use crate::queue::{self, TypingQueue};
use chrono::{Local, NaiveTime, TimeDelta};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Granularity of every wait inside the typing loop
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Length of one countdown tick
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Receives human-readable status messages
pub type StatusObserver = Arc<dyn Fn(&str) + Send + Sync>;
/// Receives `(emitted, total)` character counts
pub type ProgressObserver = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Lifecycle state of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Idle = 0,
    Running = 1,
    Paused = 2,
    Stopping = 3,
    Completed = 4,
    Stopped = 5,
    Failed = 6,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Stopping => "Stopping",
            Self::Completed => "Completed",
            Self::Stopped => "Stopped",
            Self::Failed => "Failed",
        }
    }

    /// A typing loop exists for this state
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Stopping)
    }

    /// Completed, Stopped or Failed
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Paused,
            3 => Self::Stopping,
            4 => Self::Completed,
            5 => Self::Stopped,
            6 => Self::Failed,
            _ => Self::Idle,
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Completed,
    Stopped,
    Failed(String),
}

impl Outcome {
    fn state(&self) -> EngineState {
        match self {
            Self::Completed => EngineState::Completed,
            Self::Stopped => EngineState::Stopped,
            Self::Failed(_) => EngineState::Failed,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Completed => "Completed".to_string(),
            Self::Stopped => "Stopped".to_string(),
            Self::Failed(detail) => format!("Error: {}", detail),
        }
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the caller and the typing loop
struct Shared {
    state: AtomicU8,
    emitted: AtomicUsize,
    total: AtomicUsize,
    queue: Mutex<TypingQueue>,
    emitter: Mutex<Box<dyn InputEmitter>>,
    status: RwLock<Option<StatusObserver>>,
    progress: RwLock<Option<ProgressObserver>>,
}

impl Shared {
    fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Atomically move from one of `from` to `to`. Returns the previous state.
    fn transition(&self, from: &[EngineState], to: EngineState) -> Result<EngineState, EngineState> {
        self.state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
                from.contains(&EngineState::from_u8(raw)).then_some(to as u8)
            })
            .map(EngineState::from_u8)
            .map_err(EngineState::from_u8)
    }

    fn stop_requested(&self) -> bool {
        self.state() == EngineState::Stopping
    }

    fn notify_status(&self, message: &str) {
        // Clone the observer out so it can replace itself without deadlocking
        let observer = self
            .status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(observer) = observer {
            observer(message);
        }
    }

    fn notify_progress(&self, emitted: usize, total: usize) {
        let observer = self
            .progress
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(observer) = observer {
            observer(emitted, total);
        }
    }

    /// Sleep up to `duration` in poll-sized slices.
    ///
    /// Returns `false` as soon as a stop is requested.
    fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.stop_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(POLL_INTERVAL));
        }
    }
}

/// Cloneable control handle for a [`TypingEngine`].
///
/// Lets other threads (signal handlers, key listeners) stop or pause the
/// running session without owning the engine.
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<Shared>,
}

impl EngineHandle {
    /// Request a graceful stop. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        if let Ok(previous) = self
            .shared
            .transition(&[EngineState::Running, EngineState::Paused], EngineState::Stopping)
        {
            log::debug!("Stop requested while {}", previous.as_str());
        }
    }

    /// Flip between Running and Paused. No-op in any other state.
    pub fn toggle_pause(&self) {
        if self
            .shared
            .transition(&[EngineState::Running], EngineState::Paused)
            .is_ok()
        {
            log::debug!("Typing paused");
            self.shared.notify_status("Paused");
        } else if self
            .shared
            .transition(&[EngineState::Paused], EngineState::Running)
            .is_ok()
        {
            log::debug!("Typing resumed");
            self.shared.notify_status("Resumed");
        }
    }

    /// Typing is in progress, paused or not, and no stop is pending
    pub fn is_running(&self) -> bool {
        matches!(self.state(), EngineState::Running | EngineState::Paused)
    }

    pub fn is_paused(&self) -> bool {
        self.state() == EngineState::Paused
    }

    /// A typing loop is alive (includes Stopping)
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    /// `(emitted, total)` characters for the current pass
    pub fn progress(&self) -> (usize, usize) {
        (
            self.shared.emitted.load(Ordering::SeqCst),
            self.shared.total.load(Ordering::SeqCst),
        )
    }
}

/// Everything the loop needs, fixed at `start`
struct SessionPlan {
    text: String,
    model: DelayModel,
    granularity: queue::Granularity,
    interval_secs: f64,
    scheduled_start: Option<NaiveTime>,
    countdown_secs: u32,
}

impl SessionPlan {
    fn from_config(config: &SessionConfig) -> Self {
        Self {
            text: config.text.clone(),
            model: DelayModel::new(config.speed, config.jitter, config.context_rules),
            granularity: config.granularity,
            interval_secs: config.interval_secs,
            scheduled_start: config.scheduled_start,
            countdown_secs: config.countdown_secs,
        }
    }

    fn repeats(&self) -> bool {
        self.interval_secs > 0.0
    }

    fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs)
    }
}

/// Runs cleanup on every exit path of the loop, including a panic.
struct SessionGuard<'a> {
    shared: &'a Shared,
    outcome: Option<Outcome>,
}

impl<'a> SessionGuard<'a> {
    fn new(shared: &'a Shared) -> Self {
        Self {
            shared,
            outcome: None,
        }
    }

    fn finish(mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| Outcome::Failed("typing loop panicked".to_string()));

        lock(&self.shared.queue).clear();
        lock(&self.shared.emitter).end_session();
        self.shared.set_state(outcome.state());

        match &outcome {
            Outcome::Failed(detail) => log::warn!("Typing session failed: {}", detail),
            other => log::info!("Typing session finished: {}", other.message()),
        }
        self.shared.notify_status(&outcome.message());
    }
}

/// The typing engine.
///
/// ```no_run
/// use auto_typer::config::SessionConfig;
/// use auto_typer::emitter::RecordingEmitter;
/// use auto_typer::engine::TypingEngine;
///
/// let mut engine = TypingEngine::new(RecordingEmitter::new());
/// engine.configure(SessionConfig::new("Hello!").with_speed(80));
/// engine.set_status_observer(Some(|status: &str| println!("{status}")));
/// engine.start();
/// engine.wait();
/// ```
pub struct TypingEngine {
    handle: EngineHandle,
    config: SessionConfig,
    thread: Option<JoinHandle<()>>,
}

impl TypingEngine {
    pub fn new(emitter: impl InputEmitter + 'static) -> Self {
        Self::with_boxed_emitter(Box::new(emitter))
    }

    pub fn with_boxed_emitter(emitter: Box<dyn InputEmitter>) -> Self {
        let shared = Shared {
            state: AtomicU8::new(EngineState::Idle as u8),
            emitted: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            queue: Mutex::new(TypingQueue::new()),
            emitter: Mutex::new(emitter),
            status: RwLock::new(None),
            progress: RwLock::new(None),
        };
        Self {
            handle: EngineHandle {
                shared: Arc::new(shared),
            },
            config: SessionConfig::default(),
            thread: None,
        }
    }

    /// Store the configuration for the next `start`, clamping out-of-range values.
    pub fn configure(&mut self, config: SessionConfig) {
        self.config = config.sanitized();
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Swap the input emitter. Refused (returns `false`) while a session is active.
    pub fn set_emitter(&mut self, emitter: impl InputEmitter + 'static) -> bool {
        if self.handle.is_active() {
            log::warn!("Cannot replace the input emitter during a session");
            return false;
        }
        let emitter: Box<dyn InputEmitter> = Box::new(emitter);
        *lock(&self.handle.shared.emitter) = emitter;
        true
    }

    pub fn set_status_observer<F>(&self, observer: Option<F>)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let observer = observer.map(|f| Arc::new(f) as StatusObserver);
        *self
            .handle
            .shared
            .status
            .write()
            .unwrap_or_else(PoisonError::into_inner) = observer;
    }

    pub fn set_progress_observer<F>(&self, observer: Option<F>)
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        let observer = observer.map(|f| Arc::new(f) as ProgressObserver);
        *self
            .handle
            .shared
            .progress
            .write()
            .unwrap_or_else(PoisonError::into_inner) = observer;
    }

    /// Start typing on a background thread.
    ///
    /// Does nothing if the text is empty or a session is still active.
    pub fn start(&mut self) {
        if self.config.text.is_empty() {
            log::debug!("Ignoring start: no text configured");
            return;
        }
        if self.handle.is_active() {
            log::debug!("Ignoring start: session already {}", self.state().as_str());
            return;
        }
        self.reap();

        let plan = SessionPlan::from_config(&self.config);
        let shared = &self.handle.shared;
        *lock(&shared.queue) = queue::build(&plan.text, plan.granularity);
        shared.emitted.store(0, Ordering::SeqCst);
        shared
            .total
            .store(queue::total_chars(&plan.text), Ordering::SeqCst);
        shared.set_state(EngineState::Running);

        log::info!(
            "Starting typing session: {} chars at {} wpm",
            queue::total_chars(&plan.text),
            plan.model.wpm()
        );

        let shared = Arc::clone(shared);
        self.thread = Some(thread::spawn(move || run_session(&shared, &plan)));
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn toggle_pause(&self) {
        self.handle.toggle_pause();
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.handle.is_paused()
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }

    pub fn state(&self) -> EngineState {
        self.handle.state()
    }

    pub fn progress(&self) -> (usize, usize) {
        self.handle.progress()
    }

    /// A control handle usable from other threads
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Block until the typing loop has exited and return the final state.
    pub fn wait(&mut self) -> EngineState {
        self.reap();
        self.state()
    }

    fn reap(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Typing thread panicked");
            }
        }
    }
}

impl Drop for TypingEngine {
    fn drop(&mut self) {
        self.handle.stop();
        self.reap();
    }
}

fn run_session(shared: &Shared, plan: &SessionPlan) {
    let guard = SessionGuard::new(shared);
    let began = lock(&shared.emitter).begin_session();
    let outcome = match began {
        Ok(()) => drive(shared, plan),
        Err(e) => Outcome::Failed(e.to_string()),
    };
    guard.finish(outcome);
}

fn drive(shared: &Shared, plan: &SessionPlan) -> Outcome {
    if let Some(at) = plan.scheduled_start {
        if !wait_until(shared, at) {
            return Outcome::Stopped;
        }
    }
    if !countdown(shared, plan.countdown_secs) {
        return Outcome::Stopped;
    }
    shared.notify_status("Typing...");

    let total = shared.total.load(Ordering::SeqCst);
    let mut pass = 1usize;
    loop {
        shared.notify_progress(0, total);

        if let Some(outcome) = type_pass(shared, plan, total) {
            return outcome;
        }
        if !plan.repeats() {
            return Outcome::Completed;
        }

        log::debug!("Pass {} done, waiting {}s", pass, plan.interval_secs);
        shared.notify_status(&format!("Waiting {} seconds...", plan.interval_secs));
        if !shared.sleep(plan.interval()) {
            return Outcome::Stopped;
        }

        *lock(&shared.queue) = queue::build(&plan.text, plan.granularity);
        shared.emitted.store(0, Ordering::SeqCst);
        shared.notify_status("Typing...");
        pass += 1;
    }
}

/// Type the queue until it is empty. `Some` means the session ends here.
fn type_pass(shared: &Shared, plan: &SessionPlan, total: usize) -> Option<Outcome> {
    loop {
        // A drained pass is done, whatever pause or stop arrived meanwhile
        if lock(&shared.queue).is_empty() {
            return None;
        }
        match shared.state() {
            EngineState::Paused => {
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            EngineState::Running => {}
            _ => return Some(Outcome::Stopped),
        }

        let Some(unit) = lock(&shared.queue).pop_front() else {
            return None;
        };

        if let Err(e) = lock(&shared.emitter).emit(&unit.text) {
            return Some(Outcome::Failed(e.to_string()));
        }

        let emitted = shared.emitted.fetch_add(unit.char_len(), Ordering::SeqCst) + unit.char_len();
        shared.notify_progress(emitted, total);

        let delay = plan
            .model
            .delay(CharContext::new(unit.last_char(), unit.next));
        if !shared.sleep(delay) {
            // A stop that lands after the final unit still counts as done
            let drained = lock(&shared.queue).is_empty();
            return Some(if drained && !plan.repeats() {
                Outcome::Completed
            } else {
                Outcome::Stopped
            });
        }
    }
}

fn countdown(shared: &Shared, secs: u32) -> bool {
    for remaining in (1..=secs).rev() {
        if shared.stop_requested() {
            return false;
        }
        shared.notify_status(&format!("Starting in {} seconds...", remaining));
        if !shared.sleep(COUNTDOWN_TICK) {
            return false;
        }
    }
    !shared.stop_requested()
}

/// Next local wall-clock instant at `at`, today or tomorrow.
fn next_occurrence(now: chrono::DateTime<Local>, at: NaiveTime) -> chrono::NaiveDateTime {
    let today = now.date_naive().and_time(at);
    if today > now.naive_local() {
        today
    } else {
        today + TimeDelta::days(1)
    }
}

fn wait_until(shared: &Shared, at: NaiveTime) -> bool {
    let target = next_occurrence(Local::now(), at);
    shared.notify_status(&format!("Waiting until {}...", at.format("%H:%M:%S")));
    log::info!("Typing scheduled for {}", target);

    while Local::now().naive_local() < target {
        if !shared.sleep(POLL_INTERVAL) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::RecordingEmitter;
    use chrono::TimeZone;

    fn quick(text: &str) -> SessionConfig {
        SessionConfig::new(text)
            .with_speed(1000)
            .with_countdown(0)
    }

    #[test]
    fn state_round_trips_through_u8() {
        for state in [
            EngineState::Idle,
            EngineState::Running,
            EngineState::Paused,
            EngineState::Stopping,
            EngineState::Completed,
            EngineState::Stopped,
            EngineState::Failed,
        ] {
            assert_eq!(EngineState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn terminal_and_active_are_disjoint() {
        assert!(EngineState::Stopping.is_active());
        assert!(!EngineState::Stopping.is_terminal());
        assert!(EngineState::Failed.is_terminal());
        assert!(!EngineState::Idle.is_active());
        assert!(!EngineState::Idle.is_terminal());
    }

    #[test]
    fn outcome_messages() {
        assert_eq!(Outcome::Completed.message(), "Completed");
        assert_eq!(Outcome::Stopped.message(), "Stopped");
        assert_eq!(Outcome::Failed("boom".into()).message(), "Error: boom");
    }

    #[test]
    fn empty_text_does_not_start() {
        let mut engine = TypingEngine::new(RecordingEmitter::new());
        engine.configure(SessionConfig::new(""));
        engine.start();
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(!engine.is_running());
        assert!(engine.thread.is_none());
    }

    #[test]
    fn toggle_pause_ignored_when_idle() {
        let engine = TypingEngine::new(RecordingEmitter::new());
        engine.toggle_pause();
        assert_eq!(engine.state(), EngineState::Idle);
        engine.stop();
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn runs_to_completion() {
        let recorder = RecordingEmitter::new();
        let mut engine = TypingEngine::new(recorder.clone());
        engine.configure(quick("abc"));
        engine.start();
        assert_eq!(engine.wait(), EngineState::Completed);
        assert_eq!(recorder.text(), "abc");
        assert_eq!(engine.progress(), (3, 3));
    }

    #[test]
    fn queue_is_flushed_after_stop() {
        let mut engine = TypingEngine::new(RecordingEmitter::new());
        engine.configure(quick("a long enough piece of text").with_speed(1));
        engine.start();
        engine.stop();
        assert_eq!(engine.wait(), EngineState::Stopped);
        assert!(lock(&engine.handle.shared.queue).is_empty());
    }

    #[test]
    fn next_occurrence_rolls_to_tomorrow() {
        let now = Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let later = NaiveTime::from_hms_opt(13, 0, 0).unwrap();
        let earlier = NaiveTime::from_hms_opt(11, 0, 0).unwrap();

        let t = next_occurrence(now, later);
        assert_eq!(t.date(), now.date_naive());

        let t = next_occurrence(now, earlier);
        assert_eq!(t.date(), now.date_naive() + TimeDelta::days(1));

        let t = next_occurrence(now, NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        assert_eq!(t.date(), now.date_naive() + TimeDelta::days(1));
    }
}
