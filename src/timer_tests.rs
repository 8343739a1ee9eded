use super::*;
use crate::clock::{Clock, ManualClock};

#[test]
fn not_expired_before_delta() {
    let clock = ManualClock::new();
    let timer = DeadlineTimer::start(clock.now());
    clock.advance(Duration::from_secs(1));
    assert!(!timer.timeout_expired(clock.now(), Duration::from_secs(2)));
}

#[test]
fn expired_after_delta() {
    let clock = ManualClock::new();
    let timer = DeadlineTimer::start(clock.now());
    clock.advance(Duration::from_secs(3));
    assert!(timer.timeout_expired(clock.now(), Duration::from_secs(2)));
}

#[test]
fn zero_delta_never_expires_timeout() {
    let clock = ManualClock::new();
    let timer = DeadlineTimer::start(clock.now());
    clock.advance(Duration::from_secs(10_000));
    assert!(!timer.timeout_expired(clock.now(), Duration::ZERO));
}

#[test]
fn zero_delta_does_expire_grace() {
    let clock = ManualClock::new();
    let timer = DeadlineTimer::start(clock.now());
    clock.advance(Duration::from_millis(1));
    assert!(
        timer.grace_expired(clock.now(), Duration::ZERO),
        "grace has no zero-disables carve-out, unlike timeout"
    );
}

#[test]
fn grace_not_expired_before_delta() {
    let clock = ManualClock::new();
    let timer = DeadlineTimer::start(clock.now());
    clock.advance(Duration::from_secs(1));
    assert!(!timer.grace_expired(clock.now(), Duration::from_secs(2)));
}

#[test]
fn grace_expired_after_delta() {
    let clock = ManualClock::new();
    let timer = DeadlineTimer::start(clock.now());
    clock.advance(Duration::from_secs(3));
    assert!(timer.grace_expired(clock.now(), Duration::from_secs(2)));
}

#[test]
fn restarting_resets_the_deadline() {
    let clock = ManualClock::new();
    let mut timer = DeadlineTimer::start(clock.now());
    clock.advance(Duration::from_secs(3));
    assert!(timer.timeout_expired(clock.now(), Duration::from_secs(2)));
    timer = DeadlineTimer::start(clock.now());
    assert!(!timer.timeout_expired(clock.now(), Duration::from_secs(2)));
}
