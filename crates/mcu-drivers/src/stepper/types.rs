//! Shared plain-data types for the stepper core.

/// Bias applied to [`position`](super::engine) so its zero point sits
/// mid-range; the top bit of the biased value doubles as a direction
/// polarity flag (see the module documentation on position encoding).
pub const POSITION_BIAS: i32 = 0x4000_0000;

/// A linearly-accelerating pulse burst, as queued by `queue_step`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Move {
    pub interval: u32,
    pub add: i16,
    pub count: u16,
    pub dir_toggle: bool,
}

/// The outcome of a timer callback: either the motor has nothing more to
/// do, or it must be called again at the given absolute tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerResult {
    Done,
    RescheduleAt(u32),
}

/// `config_stepper` parameters.
#[derive(Debug, Clone, Copy)]
pub struct StepperConfig {
    pub min_stop_interval: u32,
    pub invert_step: bool,
}

/// `config_stepper_rt_mode` parameters.
#[derive(Debug, Clone, Copy)]
pub struct RtModeConfig {
    pub control_freq: u32,
    pub input_cycle: u16,
    pub input_factor: i32,
    pub max_freq: u32,
    pub max_acc: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Host,
    RealTime,
}

/// The MCU timer tick rate that `interval`/`next_step_time`/`current_period`
/// are all counted against. Real boards derive this from their timer
/// peripheral's prescaler; fixed here as a build-time constant the same way
/// a board's clock tree is fixed once selected.
pub const CLOCK_HZ: u32 = 16_000_000;

/// A real-time-mode transition armed by `set_realtime_mode`/`set_host_mode`
/// but not yet reconciled by the cooperative mode-toggle task. Only one can
/// be outstanding per motor at a time (§7, `RealtimeModeAlreadyArmed`).
#[derive(Debug, Clone, Copy)]
pub enum PendingTransition {
    EnterRealtime { min_pos: i32, max_pos: i32 },
    BeginSlowdown { freq_limiter: u32 },
}

/// The pair of timer arms a fresh real-time-mode entry schedules: the
/// control loop and the independent step timer run on staggered initial
/// deadlines so the first control tick has a chance to compute a period
/// before the stepper looks for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtArm {
    pub control_at: u32,
    pub step_at: u32,
}

/// The `stepper_rt_log pos=%i error=%i` payload (§6), produced once per
/// `input_cycle` control periods alongside the sense step: `pos` is the
/// real-time step counter, `error` the filtered sensor value that drove
/// this tick's target speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtLog {
    pub pos: i32,
    pub error: i32,
}
