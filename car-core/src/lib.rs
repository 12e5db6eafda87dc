//! Core control loop, drivers and broker connection handling for the IoT car
//! node on no-std embedded platforms.
//!
//! For a host-side simulation, see the `car-app/mock-car` binary.
#![no_std]

extern crate alloc;

pub mod utils;
