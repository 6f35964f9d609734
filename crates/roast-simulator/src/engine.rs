//! First-order thermal simulation producing BT/ET curves from burner,
//! airflow, and drum control inputs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const MAX_BURNER_HEAT: f64 = 8.0; // °C/s at 100% burner
const AIRFLOW_COOLING: f64 = 0.03; // cooling coefficient per % airflow
const ET_TO_BT_TRANSFER: f64 = 0.015; // heat transfer rate ET → BT per second
const AMBIENT_LOSS: f64 = 0.002; // heat loss to ambient per second
const NOISE_STDDEV: f64 = 0.3; // °C noise standard deviation
const MAX_TEMP: f64 = 350.0;
const MIN_TEMP: f64 = 0.0;

/// Current state of the thermal simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalState {
    /// Bean temperature, Celsius.
    pub bt: f64,
    /// Environment temperature, Celsius.
    pub et: f64,
    /// Burner control input, 0-100.
    pub burner: f64,
    /// Airflow control input, 0-100.
    pub airflow: f64,
    /// Drum control input, 0-100.
    pub drum: f64,
    /// Ambient temperature, Celsius.
    pub ambient: f64,
}

impl Default for ThermalState {
    fn default() -> Self {
        Self {
            bt: 25.0,
            et: 25.0,
            burner: 0.0,
            airflow: 50.0,
            drum: 50.0,
            ambient: 25.0,
        }
    }
}

/// Simulates a roaster's thermal behavior. Call [`ThermalEngine::step`] at
/// regular intervals to advance the simulation.
pub struct ThermalEngine {
    state: ThermalState,
    rng: StdRng,
}

impl ThermalEngine {
    /// Create a new engine with an optional RNG seed for deterministic
    /// testing.
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            state: ThermalState::default(),
            rng: seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64),
        }
    }

    /// Current thermal state.
    #[must_use]
    pub fn state(&self) -> ThermalState {
        self.state
    }

    /// Update a control input by channel name, recognizing the same alias
    /// groups a real roaster's control sliders use.
    pub fn set_control(&mut self, channel: &str, value: f64) {
        match channel.to_lowercase().as_str() {
            "burner" | "gas" | "gas1" | "gas2" | "heater" | "power" | "slider1" => {
                self.state.burner = value;
            }
            "air" | "airflow" | "fan" | "cooling" | "cooling_air" | "slider2" => {
                self.state.airflow = value;
            }
            "drum" | "slider4" => {
                self.state.drum = value;
            }
            _ => {}
        }
    }

    /// Advance the simulation by `dt` seconds and return the updated state.
    pub fn step(&mut self, dt: f64) -> ThermalState {
        let s = &mut self.state;

        let burner_frac = s.burner.clamp(0.0, 100.0) / 100.0;
        let heat_input = MAX_BURNER_HEAT * burner_frac * dt;

        let airflow_frac = s.airflow.clamp(0.0, 100.0) / 100.0;
        let cooling = AIRFLOW_COOLING * airflow_frac * (s.et - s.ambient) * dt;

        let ambient_loss = AMBIENT_LOSS * (s.et - s.ambient) * dt;

        s.et += heat_input - cooling - ambient_loss;

        let bt_transfer = ET_TO_BT_TRANSFER * (s.et - s.bt) * dt;
        s.bt += bt_transfer;

        s.et += gaussian_noise(&mut self.rng, NOISE_STDDEV);
        s.bt += gaussian_noise(&mut self.rng, NOISE_STDDEV);

        s.et = s.et.clamp(MIN_TEMP, MAX_TEMP);
        s.bt = s.bt.clamp(MIN_TEMP, MAX_TEMP);

        *s
    }
}

/// Zero-mean Gaussian noise via Box-Muller, scaled by `stddev`.
fn gaussian_noise(rng: &mut StdRng, stddev: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    let z0 = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
    z0 * stddev
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_engine_is_deterministic() {
        let mut a = ThermalEngine::new(Some(42));
        let mut b = ThermalEngine::new(Some(42));
        a.set_control("burner", 80.0);
        b.set_control("burner", 80.0);
        for _ in 0..10 {
            assert_eq!(a.step(1.0), b.step(1.0));
        }
    }

    #[test]
    fn burner_raises_et_over_time() {
        let mut engine = ThermalEngine::new(Some(1));
        engine.set_control("burner", 100.0);
        engine.set_control("air", 0.0);
        let start = engine.state().et;
        for _ in 0..30 {
            engine.step(1.0);
        }
        assert!(engine.state().et > start, "burner at 100% should raise ET");
    }

    #[test]
    fn control_aliases_map_to_same_field() {
        let mut engine = ThermalEngine::new(Some(1));
        engine.set_control("slider1", 42.0);
        assert_eq!(engine.state().burner, 42.0);
        engine.set_control("cooling_air", 17.0);
        assert_eq!(engine.state().airflow, 17.0);
        engine.set_control("slider4", 63.0);
        assert_eq!(engine.state().drum, 63.0);
    }

    #[test]
    fn temperatures_stay_within_valid_range() {
        let mut engine = ThermalEngine::new(Some(7));
        engine.set_control("burner", 100.0);
        for _ in 0..10_000 {
            let state = engine.step(1.0);
            assert!(state.et >= MIN_TEMP && state.et <= MAX_TEMP);
            assert!(state.bt >= MIN_TEMP && state.bt <= MAX_TEMP);
        }
    }
}
