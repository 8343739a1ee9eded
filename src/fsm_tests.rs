use super::*;
use crate::backend::UserInfo;
use crate::card::CardType;
use crate::clock::{Clock, ManualClock};
use crate::profile::{DisplayPolicy, EquipmentProfile};
use crate::test_support::{FakeBackend, FakeDevice, FakeNotifier};

const EQUIPMENT_ID: i64 = 42;

fn scenario_profile(timeout_minutes: i64) -> EquipmentProfile {
    EquipmentProfile {
        equipment_id: EQUIPMENT_ID,
        equipment_type_id: 1,
        equipment_type: "laser".into(),
        location_id: 1,
        location: "shop".into(),
        timeout_minutes,
        allow_proxy: true,
        requires_training: true,
        requires_payment: false,
    }
}

fn make_fsm(timeout_minutes: i64) -> Fsm {
    let policy =
        PolicyCache::from_profile(&scenario_profile(timeout_minutes), DisplayPolicy::default(), Duration::from_secs(2));
    Fsm::new_for_test(policy, EQUIPMENT_ID)
}

fn input(card_id: i64, card_type: CardType, authorized: bool, level: i64, button: bool) -> FsmInput {
    FsmInput { card_id, card_type, user_is_authorized: authorized, user_authority_level: level, button_pressed: button }
}

fn no_card(button: bool) -> FsmInput {
    input(0, CardType::Invalid, false, 0, button)
}

#[test]
fn authorized_user_full_cycle() {
    let mut fsm = make_fsm(30);
    let mut device = FakeDevice::new();
    let backend = FakeBackend::new();
    let notifier = FakeNotifier::new();
    let clock = ManualClock::new();

    fsm.tick(input(101, CardType::UserCard, true, 1, false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningAuthUser);
    assert!(device.current_power());
    assert_eq!(*backend.access_attempts.borrow(), vec![(EQUIPMENT_ID, 101, true)]);

    fsm.tick(no_card(false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningNoCard);

    clock.advance(Duration::from_millis(2100));
    fsm.tick(no_card(false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::IdleNoCard);
    assert!(!device.current_power());
    assert_eq!(*backend.access_completions.borrow(), vec![(EQUIPMENT_ID, 101)]);
}

#[test]
fn unauthorized_card_never_powers_on() {
    let mut fsm = make_fsm(30);
    let mut device = FakeDevice::new();
    let backend = FakeBackend::new();
    let notifier = FakeNotifier::new();
    let clock = ManualClock::new();

    fsm.tick(input(200, CardType::UserCard, false, 1, false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::IdleUnauthCard);
    assert!(!device.current_power());
    assert_eq!(*backend.access_attempts.borrow(), vec![(EQUIPMENT_ID, 200, false)]);

    fsm.tick(no_card(false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::IdleNoCard);
    assert!(backend.access_completions.borrow().is_empty());
}

#[test]
fn proxy_session_extends_power_without_new_completion() {
    let mut fsm = make_fsm(30);
    let mut device = FakeDevice::new();
    let backend = FakeBackend::new();
    let notifier = FakeNotifier::new();
    let clock = ManualClock::new();

    fsm.tick(input(101, CardType::UserCard, true, 1, false), clock.now(), &mut device, &backend, &notifier);
    fsm.tick(no_card(false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningNoCard);

    fsm.tick(input(300, CardType::ProxyCard, false, 0, false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningUnknownCard, "classification happens on the following tick");
    fsm.tick(input(300, CardType::ProxyCard, false, 0, false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningProxyCard);
    assert!(device.current_power());
    assert_eq!(*backend.access_attempts.borrow(), vec![(EQUIPMENT_ID, 101, true), (EQUIPMENT_ID, 300, true)]);

    fsm.tick(no_card(false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningNoCard);

    clock.advance(Duration::from_millis(2100));
    fsm.tick(no_card(false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::IdleNoCard);
    assert_eq!(*backend.access_completions.borrow(), vec![(EQUIPMENT_ID, 101)]);
}

#[test]
fn training_card_activated_by_admin_session() {
    let mut fsm = make_fsm(30);
    let mut device = FakeDevice::new();
    let backend = FakeBackend::new();
    let notifier = FakeNotifier::new();
    let clock = ManualClock::new();

    fsm.tick(input(900, CardType::UserCard, true, 3, false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningAuthUser);

    fsm.tick(no_card(false), clock.now(), &mut device, &backend, &notifier);

    fsm.tick(input(401, CardType::UserCard, false, 1, false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningUnknownCard, "classification happens on the following tick");
    fsm.tick(input(401, CardType::UserCard, false, 1, false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningTrainingCard);
    assert_eq!(*backend.access_attempts.borrow(), vec![(EQUIPMENT_ID, 900, true), (EQUIPMENT_ID, 401, true)]);

    fsm.tick(no_card(false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningNoCard);

    clock.advance(Duration::from_millis(2100));
    fsm.tick(no_card(false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::IdleNoCard);
    assert_eq!(*backend.access_completions.borrow(), vec![(EQUIPMENT_ID, 900)]);
}

#[test]
fn timeout_with_card_in_place_notifies_holder() {
    let mut fsm = make_fsm(30);
    let mut device = FakeDevice::new();
    let backend = FakeBackend::new().with_user(101, UserInfo { name: "Jo Holder".into(), email: "jo@example.org".into() });
    let notifier = FakeNotifier::new();
    let clock = ManualClock::new();

    fsm.tick(input(101, CardType::UserCard, true, 1, false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningAuthUser);

    clock.advance(Duration::from_secs(31 * 60));
    fsm.tick(input(101, CardType::UserCard, true, 1, false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningTimeout);

    fsm.tick(input(101, CardType::UserCard, true, 1, false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningTimeout);

    clock.advance(Duration::from_millis(2100));
    fsm.tick(input(101, CardType::UserCard, true, 1, false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::IdleAuthCard);
    assert!(!device.current_power());
    assert_eq!(*backend.access_completions.borrow(), vec![(EQUIPMENT_ID, 101)]);
    assert_eq!(notifier.sent.borrow().len(), 1);
    assert_eq!(notifier.sent.borrow()[0].0, "jo@example.org");

    fsm.tick(no_card(false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::IdleNoCard);
}

#[test]
fn shutdown_card_always_wins_from_idle() {
    let mut fsm = make_fsm(30);
    let mut device = FakeDevice::new();
    let backend = FakeBackend::new();
    let notifier = FakeNotifier::new();
    let clock = ManualClock::new();

    fsm.tick(input(999, CardType::ShutdownCard, false, 0, false), clock.now(), &mut device, &backend, &notifier);
    assert!(fsm.is_terminal());
    assert_eq!(*backend.shutdowns.borrow(), vec![(EQUIPMENT_ID, 999)]);
    assert!(!device.current_power());
}

#[test]
fn timeout_minutes_zero_disables_timeout_forever() {
    let mut fsm = make_fsm(0);
    let mut device = FakeDevice::new();
    let backend = FakeBackend::new();
    let notifier = FakeNotifier::new();
    let clock = ManualClock::new();

    fsm.tick(input(101, CardType::UserCard, true, 1, false), clock.now(), &mut device, &backend, &notifier);
    clock.advance(Duration::from_secs(999_999));
    fsm.tick(input(101, CardType::UserCard, true, 1, false), clock.now(), &mut device, &backend, &notifier);

    assert_eq!(fsm.state(), FsmState::RunningAuthUser);
}

#[test]
fn grace_timer_resets_on_every_reentry_to_running_no_card() {
    let mut fsm = make_fsm(30);
    let mut device = FakeDevice::new();
    let backend = FakeBackend::new();
    let notifier = FakeNotifier::new();
    let clock = ManualClock::new();

    fsm.tick(input(101, CardType::UserCard, true, 1, false), clock.now(), &mut device, &backend, &notifier);
    fsm.tick(no_card(false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningNoCard);

    clock.advance(Duration::from_millis(1900));
    fsm.tick(input(300, CardType::ProxyCard, false, 0, false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningUnknownCard, "classification happens on the following tick");
    fsm.tick(input(300, CardType::ProxyCard, false, 0, false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningProxyCard);

    fsm.tick(no_card(false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningNoCard);

    clock.advance(Duration::from_millis(500));
    fsm.tick(no_card(false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningNoCard, "freshly reset grace timer should not have expired yet");
}

#[test]
fn running_unknown_card_waits_a_tick_before_classifying() {
    let mut fsm = make_fsm(30);
    let mut device = FakeDevice::new();
    let backend = FakeBackend::new();
    let notifier = FakeNotifier::new();
    let clock = ManualClock::new();

    fsm.tick(input(101, CardType::UserCard, true, 1, false), clock.now(), &mut device, &backend, &notifier);
    fsm.tick(no_card(false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningNoCard);

    fsm.tick(input(101, CardType::UserCard, true, 1, false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningUnknownCard);
    assert_eq!(backend.access_attempts.borrow().len(), 1, "no on_enter side effects until the following tick");

    fsm.tick(input(101, CardType::UserCard, true, 1, false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::RunningAuthUser);
    assert_eq!(backend.access_attempts.borrow().len(), 1, "same card returning is not a new access attempt");
}

#[test]
fn power_is_never_on_outside_running_auth_proxy_or_training() {
    let mut fsm = make_fsm(30);
    let mut device = FakeDevice::new();
    let backend = FakeBackend::new();
    let notifier = FakeNotifier::new();
    let clock = ManualClock::new();

    fsm.tick(input(200, CardType::UserCard, false, 1, false), clock.now(), &mut device, &backend, &notifier);
    assert_eq!(fsm.state(), FsmState::IdleUnauthCard);
    assert!(device.power_log.iter().all(|&on| !on));
}
