//! Per-machine runtime: the driver, session, ring buffer, and observer list
//! a sampling loop task drives.

use crate::ring::{RingBuffer, DEFAULT_CAPACITY};
use crate::sample::{rate_of_rise, Sample};
use roast_common::{ServerMessage, SessionStateMachine};
use roast_fieldbus::RoasterDriver;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A live observer attached to a machine, identified so a faulted sender
/// can be removed without disturbing the others.
pub(crate) struct Observer {
    pub id: u64,
    pub tx: mpsc::UnboundedSender<ServerMessage>,
}

/// Everything a machine's sampling loop and command handlers share,
/// guarded by one lock (see design notes: the instance map needs no lock
/// broader than what protects the map itself).
pub(crate) struct InstanceState {
    pub driver: Box<dyn RoasterDriver>,
    pub session: SessionStateMachine,
    pub ring: RingBuffer<Sample>,
    pub observers: Vec<Observer>,
    pub next_observer_id: u64,
    pub prev_et: Option<f64>,
    pub prev_bt: Option<f64>,
    pub prev_ts_ms: Option<f64>,
    pub consecutive_errors: u32,
    pub clock_start: Instant,
}

impl InstanceState {
    pub fn new(driver: Box<dyn RoasterDriver>, machine_name: String, ring_capacity: usize) -> Self {
        Self {
            driver,
            session: SessionStateMachine::new(machine_name),
            ring: RingBuffer::new(ring_capacity),
            observers: Vec::new(),
            next_observer_id: 0,
            prev_et: None,
            prev_bt: None,
            prev_ts_ms: None,
            consecutive_errors: 0,
            clock_start: Instant::now(),
        }
    }

    /// Reset clock, previous-value tracking, and the ring buffer, for
    /// commands that start a fresh observation window.
    pub fn reset_clock(&mut self) {
        self.clock_start = Instant::now();
        self.prev_et = None;
        self.prev_bt = None;
        self.prev_ts_ms = None;
        self.ring.clear();
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.clock_start.elapsed().as_secs_f64() * 1000.0
    }

    /// Send `message` to every observer, dropping any whose receiver has
    /// gone away. Per-observer delivery order is preserved; the drop pass
    /// happens after every observer has been tried.
    pub fn broadcast(&mut self, message: ServerMessage) {
        let mut dead = Vec::new();
        for observer in &self.observers {
            if observer.tx.send(message.clone()).is_err() {
                dead.push(observer.id);
            }
        }
        if !dead.is_empty() {
            self.observers.retain(|o| !dead.contains(&o.id));
        }
    }

    /// Like [`Self::broadcast`], but skips the observer identified by
    /// `exclude`, for callers that already replied to that observer
    /// directly and only need to fan the message out to the rest.
    pub fn broadcast_except(&mut self, exclude: u64, message: ServerMessage) {
        let mut dead = Vec::new();
        for observer in &self.observers {
            if observer.id == exclude {
                continue;
            }
            if observer.tx.send(message.clone()).is_err() {
                dead.push(observer.id);
            }
        }
        if !dead.is_empty() {
            self.observers.retain(|o| !dead.contains(&o.id));
        }
    }

    pub fn add_observer(&mut self, tx: mpsc::UnboundedSender<ServerMessage>) -> u64 {
        let id = self.next_observer_id;
        self.next_observer_id += 1;
        self.observers.push(Observer { id, tx });
        id
    }

    pub fn remove_observer(&mut self, id: u64) {
        self.observers.retain(|o| o.id != id);
    }
}

/// Outcome of one sampling-loop tick, used by the loop driver to decide
/// whether to continue.
pub(crate) enum TickOutcome {
    /// Reading succeeded; continue on the normal interval.
    Continue,
    /// A connection-class error occurred but the error budget isn't
    /// exhausted yet.
    Recoverable,
    /// The error budget is exhausted; the loop should exit.
    Terminal,
}

/// Run one sampling tick against `state`, updating ring buffer, session,
/// RoR tracking, and fanning the result out to observers.
pub(crate) async fn sample_once(state: &mut InstanceState, machine_id: &str, max_consecutive_errors: u32) -> TickOutcome {
    let temps = match state.driver.read_temperatures().await {
        Ok(t) => t,
        Err(e) => {
            state.consecutive_errors += 1;
            warn!(%machine_id, error = %e, consecutive_errors = state.consecutive_errors, "sampling read failed");
            if state.consecutive_errors >= max_consecutive_errors {
                state.broadcast(ServerMessage::Error {
                    code: "DRIVER_READ_FAILED".to_string(),
                    message: e.to_string(),
                    recoverable: false,
                });
                return TickOutcome::Terminal;
            }
            state.broadcast(ServerMessage::Error {
                code: "DRIVER_READ_FAILED".to_string(),
                message: e.to_string(),
                recoverable: true,
            });
            return TickOutcome::Recoverable;
        }
    };

    let extra = state.driver.read_extra_channels().await.unwrap_or_default();

    let now_ms = state.elapsed_ms();
    let et_ror = state
        .prev_et
        .zip(state.prev_ts_ms)
        .map_or(0.0, |(prev_et, prev_ts)| rate_of_rise(prev_et, temps.et, now_ms - prev_ts));
    let bt_ror = state
        .prev_bt
        .zip(state.prev_ts_ms)
        .map_or(0.0, |(prev_bt, prev_ts)| rate_of_rise(prev_bt, temps.bt, now_ms - prev_ts));

    state.prev_et = Some(temps.et);
    state.prev_bt = Some(temps.bt);
    state.prev_ts_ms = Some(now_ms);
    state.consecutive_errors = 0;

    let sample = Sample {
        timestamp_ms: now_ms,
        et: temps.et,
        bt: temps.bt,
        et_ror,
        bt_ror,
        extra: extra.clone(),
    };
    state.ring.push(sample.clone());
    state.session.add_reading(now_ms, temps.et, temps.bt);

    state.broadcast(ServerMessage::Temperature {
        timestamp_ms: sample.timestamp_ms,
        et: sample.et,
        bt: sample.bt,
        et_ror: sample.et_ror,
        bt_ror: sample.bt_ror,
        extra: sample.extra,
    });

    debug!(%machine_id, et = temps.et, bt = temps.bt, "sample recorded");
    TickOutcome::Continue
}
