//! Utility re-exports and helper macros for the IoT car node.
//!
//! This module re-exports the control loop and the pieces it is built from:
//!
//! - `config`: runtime configuration and topic naming
//! - `connection`: broker transport seam, connection manager and message dispatcher
//! - `controllers`: motor, ranging sensor and command state machine
//! - `control_loop`: the fixed-cadence driver that sequences all of the above
//!
//! The `mk_static!` macro simplifies static initialization in no-std contexts.

pub mod config;
pub mod connection;
pub mod control_loop;
pub mod controllers;

pub use config::{CarConfig, Topics};
pub use control_loop::{ControlLoop, Peripherals};
pub use embassy_time::*;

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `static_cell::StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}
