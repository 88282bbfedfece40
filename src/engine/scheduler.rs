//! Dual-trigger replay scheduler.
//!
//! Two independent timer loops run while the scheduler is `Running`:
//!
//! * **Probabilistic loop** — wakes every `check_interval_ms`, rolls a
//!   uniform value in `[0, 1)`, and fires a replay when the roll lands
//!   below `trigger_probability` and the archive holds more than
//!   [`MIN_TRIGGER_SEGMENTS`] segments.
//! * **Guarantee loop** — bounds the silence between replays regardless of
//!   probability: first fire after a random 1–30 s, then every random
//!   1–60 s, rescheduling unconditionally even when a round finds nothing
//!   to play.
//!
//! Both loops are tokio tasks whose handles are aborted on `stop()` or
//! restart, so a stale timer can never fire after cancellation.  A replay
//! already dispatched when `stop()` lands is allowed to finish; its
//! completion only emits a notification and never touches scheduler state.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;

use crate::audio::archive::SharedArchive;
use crate::audio::chain::{render_replay, ChainParams};
use crate::audio::output::OutputSink;
use crate::audio::selector::select_fragment;
use crate::config::{ReplayConfig, TriggerConfig};

use super::events::{emit, EngineEvent, EventSender};

/// Probabilistic fires are suppressed until the archive holds more than
/// this many segments — there is nothing interesting to mishear in under a
/// second of audio.
pub const MIN_TRIGGER_SEGMENTS: usize = 10;

/// Bounds of the guarantee loop's first delay after start.
const GUARANTEE_FIRST_MAX: Duration = Duration::from_secs(30);
/// Bounds of every subsequent guarantee delay.
const GUARANTEE_NEXT_MAX: Duration = Duration::from_secs(60);
/// Lower bound shared by both guarantee delays.
const GUARANTEE_MIN: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// SchedulerShared
// ---------------------------------------------------------------------------

/// State shared between the scheduler handle and its timer tasks.
struct SchedulerShared {
    archive: SharedArchive,
    /// Latest trigger parameters; loops re-read this every tick
    /// (last-write-wins).
    trigger: Mutex<TriggerConfig>,
    replay: ReplayConfig,
    sample_rate: u32,
    sink: Arc<dyn OutputSink>,
    events: EventSender,
}

// ---------------------------------------------------------------------------
// ReplayScheduler
// ---------------------------------------------------------------------------

/// Owns the two timer loops and the shared state they consult.
///
/// Must be used from within a tokio runtime — `start` spawns tasks.
pub struct ReplayScheduler {
    shared: Arc<SchedulerShared>,
    probabilistic: Option<JoinHandle<()>>,
    guarantee: Option<JoinHandle<()>>,
}

impl ReplayScheduler {
    pub fn new(
        archive: SharedArchive,
        trigger: TriggerConfig,
        replay: ReplayConfig,
        sample_rate: u32,
        sink: Arc<dyn OutputSink>,
        events: EventSender,
    ) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                archive,
                trigger: Mutex::new(trigger.sanitized()),
                replay: replay.sanitized(),
                sample_rate,
                sink,
                events,
            }),
            probabilistic: None,
            guarantee: None,
        }
    }

    /// Returns `true` while the timer loops are spawned.
    pub fn is_running(&self) -> bool {
        self.probabilistic.is_some() || self.guarantee.is_some()
    }

    /// Start (or restart) both loops.
    ///
    /// Idempotent: any previously spawned loops are fully cancelled first,
    /// so repeated starts never leave duplicate timers behind.
    pub fn start(&mut self) {
        self.stop();
        self.spawn_probabilistic();
        self.spawn_guarantee();
        log::debug!("scheduler: both trigger loops running");
    }

    /// Cancel both loops.  No timer fires after this returns.
    pub fn stop(&mut self) {
        if let Some(handle) = self.probabilistic.take() {
            handle.abort();
        }
        if let Some(handle) = self.guarantee.take() {
            handle.abort();
        }
    }

    /// Replace the trigger parameters (sanitized, last-write-wins).
    ///
    /// When the scheduler is running, the probabilistic loop is cancelled
    /// and respawned so the new period takes effect immediately — the old
    /// pending fire never lands, and no tick is doubled.
    pub fn set_trigger(&mut self, trigger: TriggerConfig) {
        let trigger = trigger.sanitized();
        *self.shared.trigger.lock().unwrap() = trigger;

        if self.probabilistic.is_some() {
            if let Some(handle) = self.probabilistic.take() {
                handle.abort();
            }
            self.spawn_probabilistic();
        }

        emit(&self.shared.events, EngineEvent::ConfigUpdated { trigger });
        log::info!(
            "scheduler: trigger updated (interval {} ms, probability {})",
            trigger.check_interval_ms,
            trigger.trigger_probability
        );
    }

    /// Current (sanitized) trigger parameters.
    pub fn trigger(&self) -> TriggerConfig {
        *self.shared.trigger.lock().unwrap()
    }

    fn spawn_probabilistic(&mut self) {
        let shared = Arc::clone(&self.shared);
        self.probabilistic = Some(tokio::spawn(probabilistic_loop(shared)));
    }

    fn spawn_guarantee(&mut self) {
        let shared = Arc::clone(&self.shared);
        self.guarantee = Some(tokio::spawn(guarantee_loop(shared)));
    }
}

impl Drop for ReplayScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
impl ReplayScheduler {
    /// Spawn only the probabilistic loop, for timer-precise tests.
    pub fn start_probabilistic_only(&mut self) {
        if let Some(handle) = self.probabilistic.take() {
            handle.abort();
        }
        self.spawn_probabilistic();
    }

    /// Spawn only the guarantee loop, for timer-precise tests.
    pub fn start_guarantee_only(&mut self) {
        if let Some(handle) = self.guarantee.take() {
            handle.abort();
        }
        self.spawn_guarantee();
    }
}

// ---------------------------------------------------------------------------
// Timer loops
// ---------------------------------------------------------------------------

async fn probabilistic_loop(shared: Arc<SchedulerShared>) {
    let mut rng = StdRng::from_entropy();

    loop {
        let interval = {
            let trigger = shared.trigger.lock().unwrap();
            Duration::from_millis(trigger.check_interval_ms)
        };
        tokio::time::sleep(interval).await;

        let probability = shared.trigger.lock().unwrap().trigger_probability;
        let roll: f64 = rng.gen();
        if roll >= probability {
            continue;
        }

        let filled = shared.archive.lock().unwrap().len();
        if filled <= MIN_TRIGGER_SEGMENTS {
            log::debug!("scheduler: roll hit but archive too small ({filled} segments)");
            continue;
        }

        fire_replay(&shared, &mut rng);
    }
}

async fn guarantee_loop(shared: Arc<SchedulerShared>) {
    let mut rng = StdRng::from_entropy();
    let mut delay = draw_guarantee_delay(&mut rng, GUARANTEE_FIRST_MAX);

    loop {
        tokio::time::sleep(delay).await;
        // The next delay is drawn before the attempt, so nothing that goes
        // wrong below can stop future guarantees.
        delay = draw_guarantee_delay(&mut rng, GUARANTEE_NEXT_MAX);

        let filled = shared.archive.lock().unwrap().len();
        if filled == 0 {
            continue;
        }

        fire_replay(&shared, &mut rng);
    }
}

/// Uniform delay in `[GUARANTEE_MIN, max]`.
fn draw_guarantee_delay(rng: &mut StdRng, max: Duration) -> Duration {
    Duration::from_millis(rng.gen_range(GUARANTEE_MIN.as_millis() as u64..=max.as_millis() as u64))
}

// ---------------------------------------------------------------------------
// Replay invocation
// ---------------------------------------------------------------------------

/// Select, render and dispatch one replay.
///
/// Everything here is non-blocking apart from the sink's brief stream
/// setup; completion is awaited on a detached task so concurrent replays
/// stay independent and a scheduler stop never cuts a dispatched replay
/// short.
fn fire_replay(shared: &SchedulerShared, rng: &mut StdRng) {
    let fragment = {
        let archive = shared.archive.lock().unwrap();
        select_fragment(
            &archive,
            Instant::now(),
            shared.sample_rate,
            &shared.replay,
            rng,
        )
    };

    // Empty archive here means a stop/clear raced this fire; skip quietly.
    let Some(fragment) = fragment else {
        return;
    };

    let params = ChainParams::draw(rng, &shared.replay);
    let frames = render_replay(&fragment.samples, shared.sample_rate, &params);

    match shared.sink.play(frames, shared.sample_rate) {
        Ok(done) => {
            if fragment.degraded {
                log::info!("scheduler: degraded selection (archive younger than exclusion window)");
            }
            emit(
                &shared.events,
                EngineEvent::ReplayBegan {
                    fragment_samples: fragment.samples.len(),
                    start_index: fragment.start_index,
                    degraded: fragment.degraded,
                    cutoff_hz: params.cutoff_hz,
                    pan: params.pan,
                },
            );
            emit(&shared.events, EngineEvent::VisualCue);

            let events = shared.events.clone();
            tokio::spawn(async move {
                // Resolves on completion or when the sink drops its sender —
                // either way the chain's resources are already released.
                let _ = done.await;
                emit(&events, EngineEvent::ReplayEnded);
            });
        }
        Err(e) => {
            log::warn!("scheduler: replay construction failed: {e}");
            emit(
                &shared.events,
                EngineEvent::ReplayFailed {
                    message: e.to_string(),
                },
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
