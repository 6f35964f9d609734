#![doc = "Machine lifecycle manager for the roast gateway: per-machine runtime state, the sampling loop, session command dispatch, and observer fan-out."]

pub mod instance;
pub mod manager;
pub mod ring;
pub mod sample;

pub use manager::MachineManager;
pub use ring::{RingBuffer, DEFAULT_CAPACITY};
pub use sample::{rate_of_rise, Sample};
