#![no_std]
#![cfg_attr(test, allow(clippy::all))]

//! Stepper motor pulse generation.
//!
//! [`stepper`] is the single-motor engine: a host-queued mode (timed pulse
//! trains dequeued from a per-motor move list) and a real-time mode (a
//! closed control loop driven by an external sensor), bridged by a
//! deceleration-ramp mode controller. [`legacy_pipeline`] is an unrelated
//! peer: a bitmask-addressed multi-motor executor for pre-planned,
//! coordinated multi-axis step streams.

pub mod legacy_pipeline;
pub mod stepper;
