//! Equipment profile and the display/timing policy derived from it at setup.

use std::time::Duration;

/// The equipment profile fetched once from the backend at `Setup` and held
/// immutable for the lifetime of the process (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub struct EquipmentProfile {
    pub equipment_id: i64,
    pub equipment_type_id: i64,
    pub equipment_type: String,
    pub location_id: i64,
    pub location: String,
    /// 0 means "never times out".
    pub timeout_minutes: i64,
    pub allow_proxy: bool,
    pub requires_training: bool,
    pub requires_payment: bool,
}

/// An RGB color, stored as three bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Parse the `"RR GG BB"` space-separated hex format used throughout
    /// the configuration file (spec.md §6).
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split_whitespace();
        let r = u8::from_str_radix(parts.next()?, 16).ok()?;
        let g = u8::from_str_radix(parts.next()?, 16).ok()?;
        let b = u8::from_str_radix(parts.next()?, 16).ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self(r, g, b))
    }
}

/// Named situation -> display color mapping (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayPolicy {
    pub setup: Rgb,
    pub auth: Rgb,
    pub unauth: Rgb,
    pub no_card_grace: Rgb,
    pub unauth_card_grace: Rgb,
    pub grace_timeout: Rgb,
    pub proxy: Rgb,
    pub training: Rgb,
    pub timeout: Rgb,
    /// Number of flash cycles per second of grace period, used to compute
    /// the flash/beep cycle count the device driver is given.
    pub flash_rate: u32,
}

impl Default for DisplayPolicy {
    /// Defaults lifted from `original_source/portal_fsm.py`'s inline
    /// fallback colors.
    fn default() -> Self {
        Self {
            setup: Rgb(0xFF, 0xFF, 0xFF),
            auth: Rgb(0x00, 0xFF, 0x00),
            unauth: Rgb(0xFF, 0x00, 0x00),
            no_card_grace: Rgb(0xFF, 0xFF, 0x00),
            unauth_card_grace: Rgb(0xFF, 0x80, 0x00),
            grace_timeout: Rgb(0xDF, 0x20, 0x00),
            proxy: Rgb(0xDF, 0x20, 0x00),
            training: Rgb(0x80, 0x00, 0x80),
            timeout: Rgb(0xFF, 0x00, 0x00),
            flash_rate: 3,
        }
    }
}

/// Fields derived once at `Setup` and consulted by the FSM on every tick:
/// the equipment profile plus display colors and the grace-period duration
/// (spec.md §2 item 6).
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyCache {
    pub requires_training: bool,
    pub requires_payment: bool,
    pub allow_proxy: bool,
    pub timeout_minutes: i64,
    pub display: DisplayPolicy,
    pub grace_period: Duration,
}

impl PolicyCache {
    pub fn from_profile(profile: &EquipmentProfile, display: DisplayPolicy, grace_period: Duration) -> Self {
        Self {
            requires_training: profile.requires_training,
            requires_payment: profile.requires_payment,
            allow_proxy: profile.allow_proxy,
            timeout_minutes: profile.timeout_minutes,
            display,
            grace_period,
        }
    }

    pub fn timeout_delta(&self) -> Duration {
        if self.timeout_minutes <= 0 {
            Duration::ZERO
        } else {
            Duration::from_secs((self.timeout_minutes as u64) * 60)
        }
    }
}

#[cfg(test)]
#[path = "profile_tests.rs"]
mod tests;
