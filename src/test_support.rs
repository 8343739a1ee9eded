//! Shared test fakes, built the way the teacher's `StoreBuilder` composes
//! fixtures (`examples/groblegark-coop/crates/cli/src/test_support.rs`):
//! a plain struct with builder methods, interior mutability for the call
//! log, and a default that needs no setup for the common case.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use crate::backend::{Backend, CardDetails, RetryPolicy, UserInfo};
use crate::card::CardType;
use crate::device::Device;
use crate::error::{BackendError, DeviceError, NotifierError, ProfileError};
use crate::notifier::Notifier;
use crate::profile::EquipmentProfile;
use std::time::Duration;

/// A `RetryPolicy` with no delay, for tests that deliberately fail a
/// backend call before succeeding.
pub struct NoDelay;

impl RetryPolicy for NoDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

#[derive(Default)]
pub struct FakeBackend {
    card_details: RefCell<HashMap<i64, VecDeque<Result<CardDetails, BackendError>>>>,
    profile: RefCell<Option<Result<EquipmentProfile, ProfileError>>>,
    users: RefCell<HashMap<i64, UserInfo>>,
    pub access_attempts: RefCell<Vec<(i64, i64, bool)>>,
    pub access_completions: RefCell<Vec<(i64, i64)>>,
    pub started: RefCell<Vec<i64>>,
    pub shutdowns: RefCell<Vec<(i64, i64)>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a single response for `get_card_details(card_id, ...)`.
    /// Multiple calls queue multiple responses, consumed in order — used
    /// to script a fail-then-succeed sequence.
    pub fn queue_card_details(&self, card_id: i64, response: Result<CardDetails, BackendError>) -> &Self {
        self.card_details.borrow_mut().entry(card_id).or_default().push_back(response);
        self
    }

    pub fn with_profile(self, profile: EquipmentProfile) -> Self {
        *self.profile.borrow_mut() = Some(Ok(profile));
        self
    }

    pub fn with_user(self, card_id: i64, user: UserInfo) -> Self {
        self.users.borrow_mut().insert(card_id, user);
        self
    }
}

impl Backend for FakeBackend {
    fn check_reg(&self, _mac_address: &str) -> Result<i64, BackendError> {
        Ok(1)
    }

    fn register(&self, _mac_address: &str) -> Result<(), BackendError> {
        Ok(())
    }

    fn get_profile(&self, _mac_address: &str) -> Result<EquipmentProfile, ProfileError> {
        self.profile
            .borrow()
            .clone()
            .unwrap_or_else(|| Err(ProfileError::Malformed("no profile queued".into())))
    }

    fn get_card_details(
        &self,
        card_id: i64,
        _equipment_id: i64,
        _requires_training: bool,
        _requires_payment: bool,
    ) -> Result<CardDetails, BackendError> {
        self.card_details
            .borrow_mut()
            .get_mut(&card_id)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| {
                Ok(CardDetails { user_is_authorized: false, card_type: CardType::Invalid, user_authority_level: 0 })
            })
    }

    fn get_user(&self, card_id: i64) -> Result<UserInfo, BackendError> {
        self.users
            .borrow()
            .get(&card_id)
            .cloned()
            .ok_or_else(|| BackendError::new("get_user", "unknown card"))
    }

    fn get_equipment_name(&self, _equipment_id: i64) -> Result<String, BackendError> {
        Ok("test-equipment".into())
    }

    fn record_ip(&self, _equipment_id: i64, _ip_address: &str) -> Result<(), BackendError> {
        Ok(())
    }

    fn log_access_attempt(&self, equipment_id: i64, card_id: i64, successful: bool) {
        self.access_attempts.borrow_mut().push((equipment_id, card_id, successful));
    }

    fn log_access_completion(&self, equipment_id: i64, card_id: i64) {
        self.access_completions.borrow_mut().push((equipment_id, card_id));
    }

    fn log_started_status(&self, equipment_id: i64) {
        self.started.borrow_mut().push(equipment_id);
    }

    fn log_shutdown_status(&self, equipment_id: i64, card_id: i64) {
        self.shutdowns.borrow_mut().push((equipment_id, card_id));
    }
}

#[derive(Default)]
pub struct FakeDevice {
    card_queue: VecDeque<Option<i64>>,
    button_queue: VecDeque<bool>,
    pub power_log: Vec<bool>,
    pub display_log: Vec<crate::profile::Rgb>,
    pub flash_log: Vec<(crate::profile::Rgb, u32)>,
    pub beep_count: u32,
    pub beeping_started: u32,
    pub buzzer_stopped: u32,
    pub cleaned_up: bool,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_card(&mut self, id: Option<i64>) -> &mut Self {
        self.card_queue.push_back(id);
        self
    }

    pub fn push_button(&mut self, pressed: bool) -> &mut Self {
        self.button_queue.push_back(pressed);
        self
    }

    pub fn current_power(&self) -> bool {
        *self.power_log.last().unwrap_or(&false)
    }
}

impl Device for FakeDevice {
    fn read_card_id(&mut self) -> Result<Option<i64>, DeviceError> {
        Ok(self.card_queue.pop_front().unwrap_or(None))
    }

    fn take_button_pressed(&mut self) -> bool {
        self.button_queue.pop_front().unwrap_or(false)
    }

    fn set_power(&mut self, on: bool) -> Result<(), DeviceError> {
        self.power_log.push(on);
        Ok(())
    }

    fn set_display_color(&mut self, color: crate::profile::Rgb) -> Result<(), DeviceError> {
        self.display_log.push(color);
        Ok(())
    }

    fn flash_display(&mut self, color: crate::profile::Rgb, rate: u32) -> Result<(), DeviceError> {
        self.flash_log.push((color, rate));
        Ok(())
    }

    fn sleep_display(&mut self) -> Result<(), DeviceError> {
        self.display_log.push(crate::profile::Rgb(0, 0, 0));
        Ok(())
    }

    fn beep_once(&mut self) -> Result<(), DeviceError> {
        self.beep_count += 1;
        Ok(())
    }

    fn start_beeping(&mut self, _rate: u32) -> Result<(), DeviceError> {
        self.beeping_started += 1;
        Ok(())
    }

    fn stop_buzzer(&mut self) -> Result<(), DeviceError> {
        self.buzzer_stopped += 1;
        Ok(())
    }

    fn cleanup(&mut self) {
        self.cleaned_up = true;
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    pub sent: RefCell<Vec<(String, String, String)>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Notifier for FakeNotifier {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifierError> {
        self.sent.borrow_mut().push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}
