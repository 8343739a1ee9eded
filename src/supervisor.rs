//! The tick loop that drives the FSM (spec.md §5, §2 item 8).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::info;

use crate::backend::Backend;
use crate::clock::{Clock, SystemClock};
use crate::device::Device;
use crate::fsm::Fsm;
use crate::input::InputAssembler;
use crate::notifier::Notifier;

/// Tick cadence (spec.md §5: "≈50-100ms").
pub const TICK_INTERVAL: Duration = Duration::from_millis(75);

/// Register `SIGINT`/`SIGTERM` handlers that flip a shared flag, observed
/// by the supervisor loop between ticks rather than interrupting it
/// (spec.md §5: cancellation is cooperative, not preemptive).
pub fn install_shutdown_flag() -> std::io::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&flag))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&flag))?;
    Ok(flag)
}

/// Drive `fsm` to completion: one tick per loop iteration, sleeping
/// `tick_interval` between ticks, until the FSM reaches `Shutdown` on its
/// own or `shutdown` is raised by a signal.
pub fn run(
    mut fsm: Fsm,
    mut device: Box<dyn Device>,
    backend: Box<dyn Backend>,
    notifier: Box<dyn Notifier>,
    mut assembler: InputAssembler,
    shutdown: Arc<AtomicBool>,
    tick_interval: Duration,
) {
    let clock = SystemClock;
    let equipment_id = fsm.equipment_id();
    let requires_training = fsm.requires_training();
    let requires_payment = fsm.requires_payment();

    loop {
        let input = assembler.tick(device.as_mut(), backend.as_ref(), equipment_id, requires_training, requires_payment);

        if shutdown.load(Ordering::SeqCst) {
            info!("shutdown signal received, forcing transition to Shutdown");
            fsm.force_shutdown(input, clock.now(), device.as_mut(), backend.as_ref(), notifier.as_ref());
            break;
        }

        fsm.tick(input, clock.now(), device.as_mut(), backend.as_ref(), notifier.as_ref());

        if fsm.is_terminal() {
            info!("fsm reached Shutdown on its own");
            break;
        }

        thread::sleep(tick_interval);
    }

    device.cleanup();
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
