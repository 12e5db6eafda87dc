//! Module Exports
//!
//! This file exports the device-side controllers of the car.
//!
//! - `command`: current intent, command timeout and change-only application.
//! - `motors`: H-bridge pin driver for the differential drive.
//! - `ranging`: front distance sensor with out-of-range sentinel.

pub mod command;
pub mod motors;
pub mod ranging;

pub use command::{CommandState, Intent, UnknownIntent};
pub use motors::{self_test, Actuator, MotorDriver, MotorError};
pub use ranging::{is_out_of_range, DistanceSensor, RangingSensor, OUT_OF_RANGE_CM};
