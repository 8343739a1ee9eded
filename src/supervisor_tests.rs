use super::*;
use crate::backend::CardDetails;
use crate::card::CardType;
use crate::profile::{DisplayPolicy, EquipmentProfile, PolicyCache};
use crate::test_support::{FakeBackend, FakeDevice, FakeNotifier, NoDelay};
use std::sync::atomic::AtomicBool;

fn profile() -> EquipmentProfile {
    EquipmentProfile {
        equipment_id: 7,
        equipment_type_id: 1,
        equipment_type: "laser".into(),
        location_id: 1,
        location: "shop".into(),
        timeout_minutes: 30,
        allow_proxy: true,
        requires_training: true,
        requires_payment: false,
    }
}

fn fsm() -> Fsm {
    let policy = PolicyCache::from_profile(&profile(), DisplayPolicy::default(), Duration::from_secs(2));
    Fsm::new_for_test(policy, 7)
}

#[test]
fn preset_shutdown_flag_forces_shutdown_on_first_tick() {
    let mut device = FakeDevice::new();
    device.push_card(None).push_button(false);
    let backend = FakeBackend::new();
    let notifier = FakeNotifier::new();
    let assembler = InputAssembler::new(Box::new(NoDelay));
    let shutdown = Arc::new(AtomicBool::new(true));

    run(fsm(), Box::new(device), Box::new(backend), Box::new(notifier), assembler, shutdown, Duration::ZERO);
}

#[test]
fn shutdown_card_stops_the_loop_without_external_signal() {
    let mut device = FakeDevice::new();
    device.push_card(Some(999)).push_button(false);
    let backend = FakeBackend::new();
    backend.queue_card_details(
        999,
        Ok(CardDetails { user_is_authorized: false, card_type: CardType::ShutdownCard, user_authority_level: 0 }),
    );
    let notifier = FakeNotifier::new();
    let assembler = InputAssembler::new(Box::new(NoDelay));
    let shutdown = Arc::new(AtomicBool::new(false));

    run(fsm(), Box::new(device), Box::new(backend), Box::new(notifier), assembler, shutdown, Duration::ZERO);
}
