//! Roast session lifecycle: tracks a single roast from monitoring through
//! recording to a finished profile.
//!
//! State machine: IDLE → MONITORING → RECORDING → FINISHED, with MONITORING
//! reachable again from IDLE or FINISHED.

use crate::error::{RoastError, RoastResult};
use crate::profile::{ControlSample, RoastEvent, RoastProfile, TemperaturePoint};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Roast session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created but not started.
    #[default]
    Idle,
    /// Reading temperatures without recording.
    Monitoring,
    /// Actively recording a roast.
    Recording,
    /// Roast complete; a profile is available.
    Finished,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Monitoring => write!(f, "monitoring"),
            Self::Recording => write!(f, "recording"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

impl SessionState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::{Finished, Idle, Monitoring, Recording};

        matches!(
            (self, target),
            (Idle, Monitoring)
                | (Finished, Monitoring)
                | (Monitoring, Recording)
                | (Monitoring, Idle)
                | (Recording, Finished)
        )
    }
}

/// Manages the lifecycle of a single roast: state transitions plus the
/// temperature, event, and control data accumulated while recording.
///
/// Combines a [`SessionState`] transition machine (with transition-history
/// tracking, in the style of a runtime state machine) with the data
/// accumulation behavior of a recorded roast.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    current: SessionState,
    previous: Option<SessionState>,
    transition_count: u64,
    machine_name: String,
    data: Vec<TemperaturePoint>,
    events: Vec<RoastEvent>,
    controls: HashMap<String, Vec<ControlSample>>,
}

impl SessionStateMachine {
    /// Create a new session for the named machine, starting in `IDLE`.
    #[must_use]
    pub fn new(machine_name: impl Into<String>) -> Self {
        Self {
            current: SessionState::Idle,
            previous: None,
            transition_count: 0,
            machine_name: machine_name.into(),
            data: Vec::new(),
            events: Vec::new(),
            controls: HashMap::new(),
        }
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.current
    }

    /// Previous state, if a transition has occurred.
    #[must_use]
    pub fn previous_state(&self) -> Option<SessionState> {
        self.previous
    }

    /// Total number of transitions this session has undergone.
    #[must_use]
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Number of recorded temperature points.
    #[must_use]
    pub fn data_points(&self) -> usize {
        self.data.len()
    }

    fn transition(&mut self, target: SessionState) -> RoastResult<()> {
        if !self.current.can_transition_to(target) {
            return Err(RoastError::StateViolation {
                from: self.current.to_string(),
                to: target.to_string(),
            });
        }
        self.previous = Some(self.current);
        self.current = target;
        self.transition_count += 1;
        Ok(())
    }

    /// Begin monitoring (reading temperatures without recording).
    pub fn start_monitoring(&mut self) -> RoastResult<()> {
        self.transition(SessionState::Monitoring)
    }

    /// Begin recording a roast. Clears any data from a previous recording.
    pub fn start_recording(&mut self) -> RoastResult<()> {
        self.transition(SessionState::Recording)?;
        self.data.clear();
        self.events.clear();
        self.controls.clear();
        Ok(())
    }

    /// Stop monitoring and return to idle.
    pub fn stop_monitoring(&mut self) -> RoastResult<()> {
        self.transition(SessionState::Idle)
    }

    /// Stop recording and finalize the roast.
    pub fn stop_recording(&mut self) -> RoastResult<()> {
        self.transition(SessionState::Finished)
    }

    /// Add a temperature reading. Only stored while `RECORDING`; readings
    /// taken while `MONITORING` are accepted silently and discarded, since
    /// that state exists for live display only.
    pub fn add_reading(&mut self, timestamp_ms: f64, et: f64, bt: f64) {
        if self.current == SessionState::Recording {
            self.data.push(TemperaturePoint {
                timestamp_ms,
                et,
                bt,
            });
        }
    }

    /// Record a control value change. Accepted in `MONITORING` or
    /// `RECORDING` so pre-heat adjustments are captured.
    pub fn add_control_change(&mut self, timestamp_ms: f64, channel: &str, value: f64) {
        if matches!(self.current, SessionState::Monitoring | SessionState::Recording) {
            self.controls
                .entry(channel.to_string())
                .or_default()
                .push((timestamp_ms, value));
        }
    }

    /// Record a roast event (`CHARGE`, `DRY`, `FCs`, `DROP`, etc). Valid only
    /// while `RECORDING`.
    pub fn add_event(
        &mut self,
        event_type: impl Into<String>,
        timestamp_ms: f64,
        auto_detected: bool,
    ) -> RoastResult<()> {
        if self.current != SessionState::Recording {
            return Err(RoastError::StateViolation {
                from: self.current.to_string(),
                to: "recording-event".to_string(),
            });
        }
        self.events.push(RoastEvent {
            event_type: event_type.into(),
            timestamp_ms,
            auto_detected,
        });
        Ok(())
    }

    /// Export the recorded session as a [`RoastProfile`].
    ///
    /// # Errors
    ///
    /// Returns an error if no data has been recorded.
    pub fn to_profile(&self, name: impl Into<String>) -> RoastResult<RoastProfile> {
        if self.data.is_empty() {
            return Err(RoastError::StateViolation {
                from: "no-data".to_string(),
                to: "profile".to_string(),
            });
        }
        Ok(RoastProfile {
            id: None,
            name: name.into(),
            machine: self.machine_name.clone(),
            created_at: chrono::Utc::now(),
            bean_name: String::new(),
            bean_weight_g: 0.0,
            bean_moisture_pct: 0.0,
            temperatures: self.data.clone(),
            extra_channels: HashMap::new(),
            events: self.events.clone(),
            controls: self.controls.clone(),
        })
    }

    /// Reset the session back to a fresh `IDLE` state, discarding all
    /// accumulated data. Unlike the other transitions this is unconditional:
    /// it is valid from any state, mirroring the effect of replacing the
    /// session object wholesale, while still recording the transition in
    /// the history the way every other state change does.
    pub fn reset(&mut self) {
        self.previous = Some(self.current);
        self.current = SessionState::Idle;
        self.transition_count += 1;
        self.data.clear();
        self.events.clear();
        self.controls.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_happy_path() {
        let mut session = SessionStateMachine::new("Stratto 2.0");
        assert_eq!(session.state(), SessionState::Idle);

        session.start_monitoring().unwrap();
        assert_eq!(session.state(), SessionState::Monitoring);

        session.add_reading(0.0, 20.0, 20.0);
        assert_eq!(session.data_points(), 0, "readings outside RECORDING are dropped");

        session.start_recording().unwrap();
        session.add_reading(0.0, 180.0, 90.0);
        session.add_reading(1000.0, 182.0, 95.0);
        session.add_event("CHARGE", 0.0, false).unwrap();
        assert_eq!(session.data_points(), 2);

        session.stop_recording().unwrap();
        assert_eq!(session.state(), SessionState::Finished);

        let profile = session.to_profile("Test Roast").unwrap();
        assert_eq!(profile.temperatures.len(), 2);
        assert_eq!(profile.events.len(), 1);
    }

    #[test]
    fn invalid_transition_rejected() {
        let mut session = SessionStateMachine::new("");
        let err = session.start_recording().unwrap_err();
        assert!(matches!(err, RoastError::StateViolation { .. }));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn to_profile_without_data_fails() {
        let mut session = SessionStateMachine::new("");
        session.start_monitoring().unwrap();
        session.start_recording().unwrap();
        assert!(session.to_profile("Empty").is_err());
    }

    #[test]
    fn reset_clears_data_from_any_state() {
        let mut session = SessionStateMachine::new("");
        session.start_monitoring().unwrap();
        session.start_recording().unwrap();
        session.add_reading(0.0, 180.0, 90.0);
        let transitions_before = session.transition_count();

        session.reset();

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.data_points(), 0);
        assert_eq!(session.transition_count(), transitions_before + 1);
    }

    #[test]
    fn control_changes_recorded_while_monitoring() {
        let mut session = SessionStateMachine::new("");
        session.start_monitoring().unwrap();
        session.add_control_change(0.0, "burner", 50.0);
        session.start_recording().unwrap();
        assert!(
            session.controls.is_empty(),
            "start_recording clears pre-heat control history along with data"
        );
        session.add_control_change(100.0, "burner", 60.0);
        assert_eq!(session.controls["burner"], vec![(100.0, 60.0)]);
    }
}
