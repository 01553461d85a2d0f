//! Stepper motor pulse generation: host-queued moves and a real-time,
//! sensor-driven velocity loop, bridged by a glitch-free mode controller.
//!
//! - [`queue`]/[`pool`] — the per-motor move FIFO and its backing slab.
//! - [`engine`] — host-queued mode: `queue_step`, the step timer callback,
//!   `load_next`, position tracking.
//! - [`realtime`] — the real-time control loop and its independent step
//!   timer.
//! - [`mode`] — `set_realtime_mode`/`set_host_mode` and the slowdown ramp
//!   that bridges the two.
//! - [`registry`] — `oid` lookup plus the resources motors share: the
//!   move pool and the real-time loop's filter carrier.
//! - [`gpio`] — the `StepLine`/`DirLine`/`Sensor` traits that isolate this
//!   crate from any particular board support package.
//!
//! `Stepper<S, D, STEP_DELAY>`'s state (data only; behaviour lives in the
//! sibling modules above) is in [`state`]; shared plain-data types
//! (`Move`, `TimerResult`, `Mode`, ...) are in [`types`]; integer helpers
//! (`isqrt`, wraparound-safe tick comparison) are in [`math`]; fatal
//! conditions are [`error::Fault`].
//!
//! ### Position sign-bit trick
//!
//! `position` is biased by `2^30` so its zero point sits mid-range, and a
//! direction flip is applied as `position := -position + count`. The sign
//! bit of the *unbiased* accumulator therefore doubles as a direction
//! flag: a mid-move reader (`get_position`) can recover the committed net
//! step count without a separate direction accumulator or a branch on
//! which mode last wrote it. This is load-bearing, not a micro-
//! optimization — see [`engine`]'s module documentation and invariant 4.

mod engine;
mod error;
mod gpio;
mod math;
mod mode;
mod pool;
mod queue;
mod realtime;
mod registry;
mod state;
mod types;

pub use error::Fault;
pub use gpio::{Ads1x1x, DirLine, Sensor, StepLine};
pub use pool::MovePool;
pub use queue::MoveQueue;
pub use registry::StepperRegistry;
pub use state::{RtState, Stepper};
pub use types::{
    Mode, Move, PendingTransition, RtArm, RtLog, RtModeConfig, StepperConfig, TimerResult, CLOCK_HZ, POSITION_BIAS,
};
