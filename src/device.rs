//! Physical I/O: card reader, relay, RGB status light, buzzer (spec.md §5).
//!
//! Flashing and beeping are fire-and-forget background effects: starting one
//! must not block the tick loop, and a later `set_display_color`/`stop_buzzer`
//! call must be able to cut it short. Each is implemented as a detached
//! thread coordinated through an `Arc<AtomicBool>` cancellation flag, the
//! same shape the teacher uses for its terminal-restore cleanup thread
//! (`examples/groblegark-coop/crates/cli/src/attach.rs`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{error, warn};

use crate::error::DeviceError;
use crate::profile::Rgb;

/// Physical interface the FSM drives every tick (spec.md §5).
pub trait Device {
    /// Read the currently-presented card id, if any. `None` means no card
    /// is on the reader.
    fn read_card_id(&mut self) -> Result<Option<i64>, DeviceError>;

    /// Edge-latched button read: returns `true` at most once per physical
    /// press, regardless of how long the button stays down (spec.md §4.3).
    fn take_button_pressed(&mut self) -> bool;

    fn set_power(&mut self, on: bool) -> Result<(), DeviceError>;

    /// Set a steady display color, canceling any in-progress flash.
    fn set_display_color(&mut self, color: Rgb) -> Result<(), DeviceError>;

    /// Flash between `color` and off at `rate` Hz until superseded by
    /// another display call.
    fn flash_display(&mut self, color: Rgb, rate: u32) -> Result<(), DeviceError>;

    fn sleep_display(&mut self) -> Result<(), DeviceError>;

    fn beep_once(&mut self) -> Result<(), DeviceError>;

    /// Start a repeating buzzer pattern until `stop_buzzer` is called.
    fn start_beeping(&mut self, rate: u32) -> Result<(), DeviceError>;

    fn stop_buzzer(&mut self) -> Result<(), DeviceError>;

    /// Release hardware handles on shutdown.
    fn cleanup(&mut self);
}

/// Raspberry Pi GPIO relay + RGB LED + buzzer, with a PC/SC smartcard
/// reader for the card input.
///
/// Pin assignments are passed in at construction time from configuration
/// (spec.md §6) rather than hardcoded, since the physical wiring varies
/// per deployment.
pub struct RaspberryPiDevice {
    pcsc_ctx: pcsc::Context,
    reader_name: std::ffi::CString,
    power_pin: rppal::gpio::OutputPin,
    red_pin: Arc<Mutex<rppal::gpio::OutputPin>>,
    green_pin: Arc<Mutex<rppal::gpio::OutputPin>>,
    blue_pin: Arc<Mutex<rppal::gpio::OutputPin>>,
    buzzer_pin: Arc<Mutex<rppal::gpio::OutputPin>>,
    button_pin: rppal::gpio::InputPin,
    button_was_down: bool,
    flash_cancel: Option<Arc<AtomicBool>>,
    buzz_cancel: Option<Arc<AtomicBool>>,
}

/// GPIO BCM pin numbers, read from the `[gpio]` section of the config file.
pub struct GpioPins {
    pub power: u8,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub buzzer: u8,
    pub button: u8,
}

impl RaspberryPiDevice {
    pub fn new(pins: GpioPins) -> Result<Self, DeviceError> {
        let pcsc_ctx = pcsc::Context::establish(pcsc::Scope::User)
            .map_err(|e| DeviceError::new("pcsc_establish", e.to_string()))?;
        let readers_buf_len = pcsc_ctx
            .list_readers_len()
            .map_err(|e| DeviceError::new("pcsc_list_readers", e.to_string()))?;
        let mut buf = vec![0u8; readers_buf_len];
        let reader_name = pcsc_ctx
            .list_readers(&mut buf)
            .map_err(|e| DeviceError::new("pcsc_list_readers", e.to_string()))?
            .next()
            .ok_or_else(|| DeviceError::new("pcsc_list_readers", "no smartcard reader attached"))?
            .to_owned();

        let gpio = rppal::gpio::Gpio::new().map_err(|e| DeviceError::new("gpio_init", e.to_string()))?;
        let power_pin = gpio
            .get(pins.power)
            .map_err(|e| DeviceError::new("gpio_power", e.to_string()))?
            .into_output();
        let red_pin = gpio
            .get(pins.red)
            .map_err(|e| DeviceError::new("gpio_red", e.to_string()))?
            .into_output();
        let green_pin = gpio
            .get(pins.green)
            .map_err(|e| DeviceError::new("gpio_green", e.to_string()))?
            .into_output();
        let blue_pin = gpio
            .get(pins.blue)
            .map_err(|e| DeviceError::new("gpio_blue", e.to_string()))?
            .into_output();
        let buzzer_pin = gpio
            .get(pins.buzzer)
            .map_err(|e| DeviceError::new("gpio_buzzer", e.to_string()))?
            .into_output();
        let button_pin = gpio
            .get(pins.button)
            .map_err(|e| DeviceError::new("gpio_button", e.to_string()))?
            .into_input_pullup();

        Ok(Self {
            pcsc_ctx,
            reader_name,
            power_pin,
            red_pin: Arc::new(Mutex::new(red_pin)),
            green_pin: Arc::new(Mutex::new(green_pin)),
            blue_pin: Arc::new(Mutex::new(blue_pin)),
            buzzer_pin: Arc::new(Mutex::new(buzzer_pin)),
            button_pin,
            button_was_down: false,
            flash_cancel: None,
            buzz_cancel: None,
        })
    }

    fn cancel_flash(&mut self) {
        if let Some(flag) = self.flash_cancel.take() {
            flag.store(true, Ordering::SeqCst);
        }
    }

    fn cancel_buzz(&mut self) {
        if let Some(flag) = self.buzz_cancel.take() {
            flag.store(true, Ordering::SeqCst);
        }
    }

    fn write_color(&self, color: Rgb) {
        write_channel(&self.red_pin, color.0);
        write_channel(&self.green_pin, color.1);
        write_channel(&self.blue_pin, color.2);
    }
}

/// `rppal`'s digital outputs have no native PWM brightness step in this
/// driver; treat any nonzero channel as "on" (spec.md §5 deliberately scopes
/// out dimming — see Non-goals).
fn write_channel(pin: &Mutex<rppal::gpio::OutputPin>, channel: u8) {
    let mut pin = lock(pin);
    if channel > 0 {
        pin.set_high();
    } else {
        pin.set_low();
    }
}

/// A background flash/beep thread panicking while holding the lock must not
/// poison the pin for the rest of the process; recover the guard instead.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Device for RaspberryPiDevice {
    fn read_card_id(&mut self) -> Result<Option<i64>, DeviceError> {
        let mut reader_states =
            [pcsc::ReaderState::new(self.reader_name.as_c_str(), pcsc::State::UNAWARE)];
        match self.pcsc_ctx.get_status_change(Duration::from_millis(50), &mut reader_states) {
            Ok(()) => {}
            Err(pcsc::Error::Timeout) => return Ok(None),
            Err(e) => return Err(DeviceError::new("pcsc_status", e.to_string())),
        }
        let state = reader_states[0].event_state();
        if !state.contains(pcsc::State::PRESENT) {
            return Ok(None);
        }
        let card = match self.pcsc_ctx.connect(
            self.reader_name.as_c_str(),
            pcsc::ShareMode::Shared,
            pcsc::Protocols::ANY,
        ) {
            Ok(card) => card,
            Err(pcsc::Error::NoSmartcard) => return Ok(None),
            Err(e) => return Err(DeviceError::new("pcsc_connect", e.to_string())),
        };
        let apdu = [0xFFu8, 0xCA, 0x00, 0x00, 0x00];
        let mut resp_buf = [0u8; 32];
        let uid = card
            .transmit(&apdu, &mut resp_buf)
            .map_err(|e| DeviceError::new("pcsc_transmit", e.to_string()))?;
        Ok(Some(uid_to_i64(uid)))
    }

    fn take_button_pressed(&mut self) -> bool {
        let is_down = self.button_pin.is_low();
        let edge = is_down && !self.button_was_down;
        self.button_was_down = is_down;
        edge
    }

    fn set_power(&mut self, on: bool) -> Result<(), DeviceError> {
        if on {
            self.power_pin.set_high();
        } else {
            self.power_pin.set_low();
        }
        Ok(())
    }

    fn set_display_color(&mut self, color: Rgb) -> Result<(), DeviceError> {
        self.cancel_flash();
        self.write_color(color);
        Ok(())
    }

    fn flash_display(&mut self, color: Rgb, rate: u32) -> Result<(), DeviceError> {
        self.cancel_flash();
        let cancel = Arc::new(AtomicBool::new(false));
        self.flash_cancel = Some(Arc::clone(&cancel));
        let period = Duration::from_millis(1000 / rate.max(1) as u64);
        let (red, green, blue) = (Arc::clone(&self.red_pin), Arc::clone(&self.green_pin), Arc::clone(&self.blue_pin));
        thread::spawn(move || {
            let mut on = false;
            while !cancel.load(Ordering::SeqCst) {
                on = !on;
                let shown = if on { color } else { Rgb(0, 0, 0) };
                write_channel(&red, shown.0);
                write_channel(&green, shown.1);
                write_channel(&blue, shown.2);
                thread::sleep(period / 2);
            }
        });
        Ok(())
    }

    fn sleep_display(&mut self) -> Result<(), DeviceError> {
        self.cancel_flash();
        self.write_color(Rgb(0, 0, 0));
        Ok(())
    }

    fn beep_once(&mut self) -> Result<(), DeviceError> {
        lock(&self.buzzer_pin).set_high();
        thread::sleep(Duration::from_millis(120));
        lock(&self.buzzer_pin).set_low();
        Ok(())
    }

    fn start_beeping(&mut self, rate: u32) -> Result<(), DeviceError> {
        self.cancel_buzz();
        let cancel = Arc::new(AtomicBool::new(false));
        self.buzz_cancel = Some(Arc::clone(&cancel));
        let period = Duration::from_millis(1000 / rate.max(1) as u64);
        let buzzer = Arc::clone(&self.buzzer_pin);
        thread::spawn(move || {
            let mut on = false;
            while !cancel.load(Ordering::SeqCst) {
                on = !on;
                if on {
                    lock(&buzzer).set_high();
                } else {
                    lock(&buzzer).set_low();
                }
                thread::sleep(period / 2);
            }
            lock(&buzzer).set_low();
        });
        Ok(())
    }

    fn stop_buzzer(&mut self) -> Result<(), DeviceError> {
        self.cancel_buzz();
        lock(&self.buzzer_pin).set_low();
        Ok(())
    }

    fn cleanup(&mut self) {
        self.cancel_flash();
        self.cancel_buzz();
        if let Err(e) = self.set_power(false) {
            error!(error = %e, "failed to power off equipment during cleanup");
        }
        self.write_color(Rgb(0, 0, 0));
        lock(&self.buzzer_pin).set_low();
        warn!("device cleanup complete");
    }
}

fn uid_to_i64(uid: &[u8]) -> i64 {
    let mut bytes = [0u8; 8];
    let n = uid.len().min(8);
    bytes[..n].copy_from_slice(&uid[..n]);
    i64::from_be_bytes(bytes)
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
