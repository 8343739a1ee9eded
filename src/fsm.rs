//! The access-control state machine (spec.md §4.1).
//!
//! States are a tagged variant with no payload; session data lives on
//! [`SessionContext`], owned exclusively by [`Fsm`] (spec.md §9: "state
//! classes that rebind their own class" is replaced with a context record
//! instead of per-state mutable fields).

use std::time::{Duration, Instant};

use tracing::warn;

use crate::backend::Backend;
use crate::card::CardType;
use crate::device::Device;
use crate::error::ProfileError;
use crate::input::FsmInput;
use crate::notifier::Notifier;
use crate::profile::{DisplayPolicy, PolicyCache};
use crate::timer::DeadlineTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmState {
    Setup,
    IdleNoCard,
    IdleUnknownCard,
    IdleUnauthCard,
    IdleAuthCard,
    RunningAuthUser,
    RunningNoCard,
    RunningUnknownCard,
    RunningUnauthCard,
    RunningProxyCard,
    RunningTimeout,
    RunningTrainingCard,
    AccessComplete,
    Shutdown,
}

fn is_running(state: FsmState) -> bool {
    matches!(
        state,
        FsmState::RunningAuthUser
            | FsmState::RunningNoCard
            | FsmState::RunningUnknownCard
            | FsmState::RunningUnauthCard
            | FsmState::RunningProxyCard
            | FsmState::RunningTimeout
            | FsmState::RunningTrainingCard
    )
}

/// Session-scoped fields, all zero when no session is active (spec.md §3).
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionContext {
    pub auth_user_id: i64,
    pub proxy_id: i64,
    pub training_id: i64,
    pub user_authority_level: i64,
    pub timeout_timer: Option<DeadlineTimer>,
    pub grace_timer: Option<DeadlineTimer>,
}

impl SessionContext {
    fn clear(&mut self) {
        self.auth_user_id = 0;
        self.proxy_id = 0;
        self.training_id = 0;
        self.user_authority_level = 0;
    }
}

pub struct Fsm {
    state: FsmState,
    ctx: SessionContext,
    policy: PolicyCache,
    equipment_id: i64,
    last_known_card_id: i64,
}

impl Fsm {
    /// Run `Setup`'s on_enter: connect to the backend, fetch the
    /// equipment profile, derive the policy cache, and land in
    /// `IdleNoCard`. A failure here is fatal (spec.md §4.1.1: "any setup
    /// step fails → Shutdown"); the caller treats `Err` as a direct
    /// transition to `Shutdown` without a live `Fsm` to drive.
    pub fn setup(
        device: &mut dyn Device,
        backend: &dyn Backend,
        mac_address: &str,
        local_ip: &str,
        grace_period: Duration,
        display: DisplayPolicy,
    ) -> Result<Self, ProfileError> {
        let _ = device.set_display_color(display.setup);

        let reg = backend.check_reg(mac_address).map_err(ProfileError::Registration)?;
        if reg == 0 {
            backend.register(mac_address).map_err(ProfileError::Registration)?;
        }

        let profile = backend.get_profile(mac_address)?;

        if let Err(e) = backend.record_ip(profile.equipment_id, local_ip) {
            warn!(error = %e, "record_ip failed during setup, continuing");
        }

        let policy = PolicyCache::from_profile(&profile, display, grace_period);
        let _ = device.beep_once();
        backend.log_started_status(profile.equipment_id);

        Ok(Self {
            state: FsmState::IdleNoCard,
            ctx: SessionContext::default(),
            policy,
            equipment_id: profile.equipment_id,
            last_known_card_id: 0,
        })
    }

    pub fn state(&self) -> FsmState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        // spec.md §9 redesign flag (b): detect terminal state by variant
        // tag, never by name/string comparison.
        matches!(self.state, FsmState::Shutdown)
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn equipment_id(&self) -> i64 {
        self.equipment_id
    }

    pub fn requires_training(&self) -> bool {
        self.policy.requires_training
    }

    pub fn requires_payment(&self) -> bool {
        self.policy.requires_payment
    }

    fn timeout_expired(&self, now: Instant) -> bool {
        self.ctx.timeout_timer.is_some_and(|t| t.timeout_expired(now, self.policy.timeout_delta()))
    }

    fn grace_expired(&self, now: Instant) -> bool {
        self.ctx.grace_timer.is_some_and(|t| t.grace_expired(now, self.policy.grace_period))
    }

    /// Run one tick: evaluate the current state's on_tick conditions
    /// against `input` and transition at most once (spec.md §4.1).
    pub fn tick(
        &mut self,
        input: FsmInput,
        now: Instant,
        device: &mut dyn Device,
        backend: &dyn Backend,
        notifier: &dyn Notifier,
    ) {
        if input.card_id > 0 {
            self.last_known_card_id = input.card_id;
        }

        let next = match self.state {
            FsmState::IdleNoCard => (input.card_id > 0).then_some(FsmState::IdleUnknownCard),
            FsmState::IdleUnauthCard => (input.card_id <= 0).then_some(FsmState::IdleNoCard),
            FsmState::RunningAuthUser => {
                if input.card_id <= 0 {
                    Some(FsmState::RunningNoCard)
                } else if self.timeout_expired(now) {
                    Some(FsmState::RunningTimeout)
                } else {
                    None
                }
            }
            FsmState::RunningNoCard => {
                if input.card_id > 0 && input.card_type != CardType::Invalid {
                    Some(FsmState::RunningUnknownCard)
                } else if self.grace_expired(now) || input.button_pressed {
                    Some(FsmState::AccessComplete)
                } else {
                    None
                }
            }
            FsmState::RunningUnauthCard => {
                if input.card_id > 0 && input.card_id == self.ctx.auth_user_id {
                    Some(FsmState::RunningUnknownCard)
                } else if self.grace_expired(now) || input.button_pressed {
                    Some(FsmState::AccessComplete)
                } else {
                    None
                }
            }
            FsmState::RunningTimeout => {
                if input.button_pressed {
                    Some(FsmState::RunningUnknownCard)
                } else if input.card_id <= 0 {
                    Some(FsmState::AccessComplete)
                } else if self.grace_expired(now) {
                    Some(FsmState::IdleAuthCard)
                } else {
                    None
                }
            }
            FsmState::RunningProxyCard => {
                if input.card_id <= 0 {
                    Some(FsmState::RunningNoCard)
                } else if self.timeout_expired(now) {
                    Some(FsmState::RunningTimeout)
                } else {
                    None
                }
            }
            FsmState::RunningTrainingCard => {
                if input.card_id <= 0 {
                    Some(FsmState::RunningNoCard)
                } else if self.timeout_expired(now) {
                    Some(FsmState::RunningTimeout)
                } else {
                    None
                }
            }
            FsmState::IdleAuthCard => (input.card_id <= 0).then_some(FsmState::IdleNoCard),
            // No on_enter side effects for this state (spec.md §4.1.2);
            // classification happens on the tick that follows entry, not
            // synchronously at entry.
            FsmState::RunningUnknownCard => Some(self.classify_running(input)),
            FsmState::IdleUnknownCard | FsmState::AccessComplete | FsmState::Setup | FsmState::Shutdown => None,
        };

        if let Some(next) = next {
            self.enter(next, input, now, device, backend, notifier);
        }
    }

    /// Force an immediate transition to `Shutdown`, used by the
    /// supervisor on `SIGINT`/`SIGTERM` regardless of current state
    /// (spec.md §5).
    pub fn force_shutdown(
        &mut self,
        input: FsmInput,
        now: Instant,
        device: &mut dyn Device,
        backend: &dyn Backend,
        notifier: &dyn Notifier,
    ) {
        self.enter(FsmState::Shutdown, input, now, device, backend, notifier);
    }

    fn classify_idle(input: FsmInput) -> FsmState {
        if input.card_type == CardType::ShutdownCard {
            FsmState::Shutdown
        } else if input.user_is_authorized && input.card_type == CardType::UserCard {
            FsmState::RunningAuthUser
        } else {
            FsmState::IdleUnauthCard
        }
    }

    fn classify_running(&self, input: FsmInput) -> FsmState {
        // Table order is ambiguous about whether the grace-expiry row or
        // the catch-all row fires first when the card is absent; checking
        // absence first is the only reading consistent with
        // `RunningTimeout`'s `button_pressed`-triggered re-entry, where
        // the card may already be gone by the time classification runs.
        if input.card_id <= 0 {
            return FsmState::AccessComplete;
        }
        if input.card_type == CardType::ProxyCard && self.policy.allow_proxy && self.ctx.training_id <= 0 {
            return FsmState::RunningProxyCard;
        }
        if input.card_type == CardType::UserCard && input.card_id == self.ctx.auth_user_id {
            return FsmState::RunningAuthUser;
        }
        if input.card_type == CardType::UserCard
            && input.user_authority_level >= 3
            && self.ctx.proxy_id <= 0
            && (self.ctx.training_id <= 0 || self.ctx.training_id == input.card_id)
            && !input.user_is_authorized
        {
            return FsmState::RunningTrainingCard;
        }
        FsmState::RunningUnauthCard
    }

    /// Resolves spec.md §9 open question (a): when `RunningTimeout`
    /// expires into `IdleAuthCard` with no proxy, trainee, or present
    /// card, there is no well-defined notification target. Rather than
    /// guessing, that case only logs a warning and sends nothing.
    fn send_grace_timeout_notification(&self, input: FsmInput, backend: &dyn Backend, notifier: &dyn Notifier) {
        if self.ctx.proxy_id > 0 {
            self.notify_user(self.ctx.auth_user_id, "a proxy card was left in the reader", backend, notifier);
        } else if self.ctx.training_id > 0 {
            self.notify_user(self.ctx.auth_user_id, "a training card was left in the reader", backend, notifier);
            self.notify_user(self.ctx.training_id, "your training card was left in the reader", backend, notifier);
        } else if input.card_id > 0 {
            self.notify_user(input.card_id, "your card was left in the reader", backend, notifier);
        } else {
            warn!(
                equipment_id = self.equipment_id,
                "grace timeout with no proxy, trainee, or present card; skipping notification"
            );
        }
    }

    fn notify_user(&self, card_id: i64, message: &str, backend: &dyn Backend, notifier: &dyn Notifier) {
        match backend.get_user(card_id) {
            Ok(user) => {
                if let Err(e) = notifier.send(&user.email, "Equipment access notice", message) {
                    warn!(error = %e, card_id, "failed to send access notice");
                }
            }
            Err(e) => warn!(error = %e, card_id, "could not look up user for notification"),
        }
    }

    fn enter(
        &mut self,
        next: FsmState,
        input: FsmInput,
        now: Instant,
        device: &mut dyn Device,
        backend: &dyn Backend,
        notifier: &dyn Notifier,
    ) {
        if is_running(self.state) && !is_running(next) {
            let _ = device.stop_buzzer();
        }
        self.state = next;

        match next {
            FsmState::Setup => {}

            FsmState::IdleNoCard => {
                let _ = device.sleep_display();
            }

            FsmState::IdleUnknownCard => {
                let classified = Self::classify_idle(input);
                self.enter(classified, input, now, device, backend, notifier);
                return;
            }

            FsmState::IdleUnauthCard => {
                let _ = device.beep_once();
                let _ = device.set_power(false);
                let _ = device.set_display_color(self.policy.display.unauth);
                backend.log_access_attempt(self.equipment_id, input.card_id, false);
            }

            FsmState::RunningAuthUser => {
                self.ctx.proxy_id = 0;
                self.ctx.training_id = 0;
                let _ = device.set_power(true);
                let _ = device.set_display_color(self.policy.display.auth);
                let _ = device.beep_once();
                if input.card_id != self.ctx.auth_user_id {
                    backend.log_access_attempt(self.equipment_id, input.card_id, true);
                }
                self.ctx.auth_user_id = input.card_id;
                self.ctx.user_authority_level = input.user_authority_level;
                self.ctx.timeout_timer = Some(DeadlineTimer::start(now));
            }

            FsmState::RunningNoCard => {
                self.ctx.grace_timer = Some(DeadlineTimer::start(now));
                let _ = device.flash_display(self.policy.display.no_card_grace, self.policy.display.flash_rate);
                let _ = device.start_beeping(self.policy.display.flash_rate);
            }

            // spec.md §4.1.2: "no on_enter side effects beyond the tick
            // transition that follows" — classification happens in tick()'s
            // on_tick dispatch on the following tick, not here.
            FsmState::RunningUnknownCard => {}

            FsmState::RunningUnauthCard => {
                self.ctx.grace_timer = Some(DeadlineTimer::start(now));
                let _ = device.flash_display(self.policy.display.unauth_card_grace, self.policy.display.flash_rate);
                let _ = device.start_beeping(self.policy.display.flash_rate);
            }

            FsmState::RunningTimeout => {
                self.ctx.grace_timer = Some(DeadlineTimer::start(now));
                let _ = device.flash_display(self.policy.display.grace_timeout, self.policy.display.flash_rate);
                let _ = device.start_beeping(self.policy.display.flash_rate);
            }

            FsmState::RunningProxyCard => {
                self.ctx.timeout_timer = Some(DeadlineTimer::start(now));
                self.ctx.training_id = 0;
                if input.card_id != self.ctx.proxy_id {
                    backend.log_access_attempt(self.equipment_id, input.card_id, true);
                }
                self.ctx.proxy_id = input.card_id;
                let _ = device.set_power(true);
                let _ = device.set_display_color(self.policy.display.proxy);
                let _ = device.beep_once();
            }

            FsmState::RunningTrainingCard => {
                self.ctx.timeout_timer = Some(DeadlineTimer::start(now));
                self.ctx.proxy_id = 0;
                if input.card_id != self.ctx.training_id {
                    backend.log_access_attempt(self.equipment_id, input.card_id, true);
                }
                self.ctx.training_id = input.card_id;
                let _ = device.set_power(true);
                let _ = device.set_display_color(self.policy.display.training);
                let _ = device.beep_once();
            }

            FsmState::IdleAuthCard => {
                let _ = device.set_power(false);
                backend.log_access_completion(self.equipment_id, self.ctx.auth_user_id);
                self.send_grace_timeout_notification(input, backend, notifier);
                let _ = device.set_display_color(self.policy.display.timeout);
                self.ctx.clear();
            }

            FsmState::AccessComplete => {
                backend.log_access_completion(self.equipment_id, self.ctx.auth_user_id);
                let _ = device.set_power(false);
                self.ctx.clear();
                self.enter(FsmState::IdleNoCard, input, now, device, backend, notifier);
                return;
            }

            FsmState::Shutdown => {
                let _ = device.set_power(false);
                let sentinel = if self.last_known_card_id > 0 { self.last_known_card_id } else { 1 };
                backend.log_shutdown_status(self.equipment_id, sentinel);
            }
        }
    }
}

#[cfg(test)]
impl Fsm {
    /// Construct an `Fsm` directly from a policy, skipping `setup()`'s
    /// backend round trips.
    pub(crate) fn new_for_test(policy: PolicyCache, equipment_id: i64) -> Self {
        Self { state: FsmState::IdleNoCard, ctx: SessionContext::default(), policy, equipment_id, last_known_card_id: 0 }
    }
}

#[cfg(test)]
#[path = "fsm_tests.rs"]
mod tests;
