//! # Low-Latency Stepper Motor Control
//!
//! Pipelined, bitmask-addressed multi-motor pulse executor. This is the
//! output stage consumed by a multi-axis coordinated planner (`motion`);
//! it is a different concern from [`crate::stepper`], which implements a
//! single-motor host-queued/real-time engine with its own move queue and
//! acceleration ramps.
//!
//! This module provides a hard real-time stepper motor controller optimized for
//! extremely low latency (<10µs) and high throughput (>100,000 steps/sec).
//!
//! ## Pipelined Architecture for Lower Latency
//!
//! To achieve the lowest possible latency, this controller uses a pipelined
//! execution model. The `StepperController` maintains a `next_command` that is
//! fetched from the SPSC queue *ahead of time*.
//!
//! When the timer interrupt fires:
//! 1.  **(Immediate)** The `next_command` is executed instantly. This involves only
//!     fast GPIO register writes for direction and step pins.
//! 2.  **(After Step)** The `interval_ticks` from the *just-executed* command is used
//!     to schedule the *next* timer interrupt.
//! 3.  **(Deferred)** The controller then dequeues the *following* command and prepares
//!     it, storing it in `next_command` for the next interrupt cycle.
//!
//! This ensures that the time between the interrupt trigger and the step pulse is
//! minimal and deterministic, as queue operations and conditional logic are not
//! on the critical path.
//!
//! ## Safety
//!
//! - **Lock-Free:** Communication remains lock-free via the `heapless::spsc::Queue`.
//! - **No Heap Allocations:** The module remains fully `#[no_std]` compliant.
//! - **Atomic GPIO:** The `AtomicGpioPort` trait is designed to map directly to
//!   hardware features like the `BSRR` register on STM32 MCUs, allowing for
//!   single-instruction, atomic set/clear operations on multiple pins. This avoids
//!   read-modify-write operations on the GPIO port, which would be non-atomic
//!   and slower.
//!
//! ## Performance
//!
//! - **Interrupt Path:** The critical path within the interrupt is reduced to a few
//!   GPIO writes and a timer register write. This is expected to execute in well
//!   under 50 CPU cycles on a modern Cortex-M MCU.
//! - **Jitter:** Minimized to near-zero by the pipelined design and atomic GPIO operations.
//!
//! ## Example
//!
//! ```rust,no_run
//! // This is a conceptual example.
//! # use mcu_drivers::legacy_pipeline::{StepperController, StepCommand, StepperProducer, AtomicGpioPort, Timer};
//! # use heapless::spsc::Queue;
//! # use core::cell::RefCell;
//! # use critical_section::Mutex;
//!
//! // In a real application, these would be GPIO Port Peripheral Access Crates
//! static FAKE_GPIO_PORT: Mutex<RefCell<u32>> = Mutex::new(RefCell::new(0));
//! static FAKE_TIMER: Mutex<RefCell<u16>> = Mutex::new(RefCell::new(0));
//!
//! static mut COMMAND_QUEUE: Queue<StepCommand, 256> = Queue::new();
//!
//! // Initialize controller and queue
//! let (producer, consumer) = unsafe { COMMAND_QUEUE.split() };
//! let mut controller = StepperController::<4>::new(consumer);
//!
//! // Main application thread (Producer)
//! fn main_thread(mut producer: StepperProducer) {
//!     // Enqueue some moves
//!     producer.enqueue(StepCommand::new(1, 1, 1000)).ok();
//!     producer.enqueue(StepCommand::new(1, 1, 900)).ok();
//!     producer.enqueue(StepCommand::new(1, 1, 800)).ok();
//!
//!     // Prime the controller's pipeline with the first command
//!     // and start the timer.
//!     controller.start(&FAKE_GPIO_PORT, &FAKE_TIMER);
//! }
//!
//!
//! // Timer interrupt handler (Consumer)
//! // #[interrupt]
//! fn TIM2() {
//!     controller.on_timer_interrupt(&FAKE_GPIO_PORT, &FAKE_GPIO_PORT, &FAKE_TIMER);
//! }
//! ```

use core::cell::RefCell;
use critical_section::Mutex;
use heapless::spsc::{Consumer, Producer, Queue};

/// A single step command to be executed by the `StepperController`.
///
/// This struct is designed to be small (4 bytes) to maximize the number of
/// commands that can be stored in the queue.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct StepCommand {
    /// A bitmask indicating which stepper motors should step.
    pub stepper_mask: u8,
    /// A bitmask for the direction of each corresponding stepper.
    pub direction_mask: u8,
    /// The number of timer ticks to wait *after* this step before the next step.
    pub interval_ticks: u16,
}

impl StepCommand {
    /// A convenience constructor for `StepCommand`.
    pub const fn new(stepper_mask: u8, direction_mask: u8, interval_ticks: u16) -> Self {
        Self {
            stepper_mask,
            direction_mask,
            interval_ticks,
        }
    }
}

/// A handle for enqueuing step commands.
pub type StepperProducer = Producer<'static, StepCommand, 256>;

/// The main stepper controller, optimized for low-latency, pipelined execution.
pub struct StepperController<const N: usize> {
    command_consumer: Consumer<'static, StepCommand, 256>,
    positions: [i32; N],
    /// Caches the current direction of all motors to avoid redundant GPIO writes.
    current_directions: u8,
    /// The next command to be executed, fetched ahead-of-time.
    next_command: Option<StepCommand>,
}

impl<const N: usize> StepperController<N> {
    /// Creates a new `StepperController`.
    pub fn new(command_consumer: Consumer<'static, StepCommand, 256>) -> Self {
        assert!(N <= 8, "This controller supports a maximum of 8 steppers.");
        Self {
            command_consumer,
            positions: [0; N],
            current_directions: 0,
            next_command: None,
        }
    }

    /// Primes the pipeline by loading the first command and starts the timer.
    ///
    /// This should be called after enqueuing the initial set of moves and
    /// before the first interrupt is expected.
    pub fn start<STEP_PORT, DIR_PORT, TIMER>(
        &mut self,
        dir_port: &Mutex<RefCell<DIR_PORT>>,
        timer: &Mutex<RefCell<TIMER>>,
    ) where
        DIR_PORT: AtomicGpioPort,
        TIMER: Timer,
    {
        critical_section::with(|cs| {
            self.prepare_next_command_internal(dir_port, cs);
            if let Some(cmd) = self.next_command {
                let timer = &mut *timer.borrow(cs).borrow_mut();
                // Schedule the very first step. A small initial delay can be useful.
                timer.schedule_next(cmd.interval_ticks.max(100));
            }
        });
    }

    /// The core interrupt handler, designed for minimum latency.
    ///
    /// **This method must be called from a hardware timer's interrupt handler.**
    #[inline(always)]
    pub fn on_timer_interrupt<STEP_PORT, DIR_PORT, TIMER>(
        &mut self,
        step_port: &Mutex<RefCell<STEP_PORT>>,
        dir_port: &Mutex<RefCell<DIR_PORT>>,
        timer: &Mutex<RefCell<TIMER>>,
    ) where
        STEP_PORT: AtomicGpioPort,
        DIR_PORT: AtomicGpioPort,
        TIMER: Timer,
    {
        critical_section::with(|cs| {
            // --- CRITICAL PATH START ---
            // These operations must be as fast as possible.
            if let Some(cmd_to_execute) = self.next_command.take() {
                let step_port = &mut *step_port.borrow(cs).borrow_mut();
                let timer = &mut *timer.borrow(cs).borrow_mut();

                // 1. (Immediate) Generate Step Pulse using atomic BSRR-style write.
                step_port.set_and_clear_atomic(cmd_to_execute.stepper_mask, cmd_to_execute.stepper_mask);

                // 2. (Immediate) Schedule the next interrupt.
                // Use the interval from the command we *just* executed.
                if cmd_to_execute.interval_ticks > 0 {
                    timer.schedule_next(cmd_to_execute.interval_ticks);
                } else {
                    timer.trigger_now();
                }

                // --- CRITICAL PATH END ---

                // 3. (Deferred) Update internal state.
                self.update_positions(cmd_to_execute.stepper_mask, cmd_to_execute.direction_mask);

                // 4. (Deferred) Prepare the *next* command for the *next* interrupt.
                self.prepare_next_command_internal(dir_port, cs);

                // If the pipeline is now empty, the timer won't be rescheduled.
                if self.next_command.is_none() {
                    timer.stop();
                }
            } else {
                // Pipeline was empty, which shouldn't happen if managed correctly.
                // Stop the timer to be safe.
                let timer = &mut *timer.borrow(cs).borrow_mut();
                timer.stop();
            }
        });
    }

    /// Internal helper to dequeue and prepare the next command.
    /// This sets direction pins ahead of the step pulse.
    fn prepare_next_command_internal<'cs, DIR_PORT>(
        &mut self,
        dir_port: &Mutex<RefCell<DIR_PORT>>,
        cs: critical_section::CriticalSection<'cs>,
    ) where
        DIR_PORT: AtomicGpioPort,
    {
        if let Some(cmd) = self.command_consumer.dequeue() {
            // Set direction pins *now* in preparation for the *next* step pulse.
            let direction_changes = self.current_directions ^ cmd.direction_mask;
            if direction_changes != 0 {
                let dir_port = &mut *dir_port.borrow(cs).borrow_mut();
                // Assumes direction pins for all steppers are on the same port.
                // A more complex implementation might take an array of pin objects.
                dir_port.write(cmd.direction_mask);
                self.current_directions = cmd.direction_mask;
            }
            self.next_command = Some(cmd);
        } else {
            self.next_command = None;
        }
    }

    #[inline]
    fn update_positions(&mut self, stepper_mask: u8, direction_mask: u8) {
        for i in 0..N {
            if (stepper_mask >> i) & 1 != 0 {
                if (direction_mask >> i) & 1 != 0 {
                    self.positions[i] = self.positions[i].wrapping_add(1);
                } else {
                    self.positions[i] = self.positions[i].wrapping_sub(1);
                }
            }
        }
    }

    pub fn get_position(&self, stepper_index: usize) -> Option<i32> {
        self.positions.get(stepper_index).copied()
    }
}

// --- Hardware Abstraction Traits ---

/// A trait representing a GPIO port that supports atomic bit set/reset.
/// This is designed to map to features like STM32's BSRR register for
/// single-instruction, interrupt-safe GPIO manipulation.
pub trait AtomicGpioPort {
    /// Atomically sets some pins and clears others on the port.
    fn set_and_clear_atomic(&mut self, set_mask: u8, clear_mask: u8);
    /// Writes a full mask to the port.
    fn write(&mut self, mask: u8);
}

pub trait Timer {
    fn schedule_next(&mut self, ticks: u16);
    fn trigger_now(&mut self);
    fn stop(&mut self);
}

// --- Tests ---
