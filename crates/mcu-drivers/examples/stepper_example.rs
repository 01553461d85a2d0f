#![no_std]
#![no_main]

use core::cell::RefCell;
use critical_section::Mutex;
use defmt_rtt as _;
use heapless::spsc::Queue;
use mcu_drivers::legacy_pipeline::{AtomicGpioPort, StepCommand, StepperController, Timer};
use panic_probe as _;

// Mock hardware for the example
struct MockPort(pub &'static str);
impl AtomicGpioPort for MockPort {
    fn set_and_clear_atomic(&mut self, set_mask: u8, clear_mask: u8) {
        defmt::info!("{}: SET {:08b} CLEAR {:08b}", self.0, set_mask, clear_mask);
    }
    fn write(&mut self, mask: u8) {
        defmt::info!("{}: WRITE pins {:08b}", self.0, mask);
    }
}

struct MockTimer;
impl Timer for MockTimer {
    fn schedule_next(&mut self, ticks: u16) {
        defmt::info!("TIMER: Scheduled next interrupt in {} ticks.", ticks);
    }
    fn trigger_now(&mut self) {
        defmt::info!("TIMER: Triggering next interrupt now.");
    }
    fn stop(&mut self) {
        defmt::info!("TIMER: Stopped.");
    }
}

// Static resources needed for the firmware
static STEP_PORT: Mutex<RefCell<MockPort>> = Mutex::new(RefCell::new(MockPort("STEP")));
static DIR_PORT: Mutex<RefCell<MockPort>> = Mutex::new(RefCell::new(MockPort("DIR")));
static TIMER: Mutex<RefCell<MockTimer>> = Mutex::new(RefCell::new(MockTimer));
static mut COMMAND_QUEUE: Queue<StepCommand, 256> = Queue::new();

#[cortex_m_rt::entry]
fn main() -> ! {
    defmt::info!("--- Stepper Control Example ---");

    let (mut producer, consumer) = unsafe { COMMAND_QUEUE.split() };
    let mut controller = StepperController::<4>::new(consumer);

    defmt::info!("Enqueuing a sequence of 5 steps for motor 0...");
    for i in 0..5u16 {
        let cmd = StepCommand::new(1 << 0, 1 << 0, 1000 + i * 100);
        producer.enqueue(cmd).expect("Failed to enqueue command");
    }
    defmt::info!("Enqueuing a sequence of 3 steps for motor 1 (backwards)...");
    for _ in 0..3 {
        let cmd = StepCommand::new(1 << 1, 0, 800);
        producer.enqueue(cmd).expect("Failed to enqueue command");
    }

    defmt::info!("\n--- Priming pipeline and starting timer ---");
    controller.start(&DIR_PORT, &TIMER);

    defmt::info!("\n--- Simulating Timer Interrupts ---");
    // In a real application, a hardware interrupt would call `on_timer_interrupt`.
    // Here, we simulate 8 interrupts: one per queued command plus one that
    // drains the pipeline and stops the timer.
    for step in 0..9 {
        defmt::info!("\n--- Interrupt Fired (Step {}) ---", step);
        controller.on_timer_interrupt(&STEP_PORT, &DIR_PORT, &TIMER);
    }

    defmt::info!("\n--- Final Stepper Positions ---");
    defmt::info!("Motor 0: {}", controller.get_position(0).unwrap_or_default());
    defmt::info!("Motor 1: {}", controller.get_position(1).unwrap_or_default());
    defmt::info!("Motor 2: {}", controller.get_position(2).unwrap_or_default());

    loop {
        cortex_m::asm::wfi();
    }
}
