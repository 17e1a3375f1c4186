//! IMU motion-state monitor.
//!
//! Turns a raw stream of pre-fused orientation samples (quaternion, linear
//! acceleration, angular velocity) into a stable classified motion state
//! (still / tilting / aggressive) with no flicker and no accumulated drift.
//!
//! The computation core ([`processor::SampleProcessor`]) is synchronous and
//! runtime-free; [`parser`] and [`server`] wrap it with the text-dump
//! ingestion, WebSocket fan-out, and HTTP control surface for live use.

pub mod calibration;
pub mod conditioning;
pub mod parser;
pub mod processor;
pub mod quat;
pub mod server;
pub mod state_machine;
pub mod types;

pub use processor::{PipelineEvent, ProcessorConfig, SampleProcessor, SettingsUpdate};
pub use quat::{EulerAngles, Quaternion};
pub use state_machine::MotionState;
pub use types::{ImuSample, ProcessedSample, Vec3};
