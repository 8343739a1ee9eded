//! Backend HTTP API client (spec.md §6).
//!
//! A single endpoint accepts a `mode` query parameter; every call here
//! corresponds to one `mode` value. List-shaped endpoints return a JSON
//! array with a single object at index 0 — confirmed by
//! `original_source/Database.py`, which indexes `response.json()[0]`
//! throughout.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, error};

use crate::card::CardType;
use crate::error::{BackendError, ProfileError};
use crate::profile::EquipmentProfile;

/// Per-card authorization + classification, looked up fresh on every new
/// card read (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardDetails {
    pub user_is_authorized: bool,
    pub card_type: CardType,
    pub user_authority_level: i64,
}

/// Cardholder identity, used only for notification templating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub name: String,
    pub email: String,
}

/// The capability set the FSM (via the input assembler) consumes from the
/// backend (spec.md §9).
///
/// The four `log_*` calls are infallible from the caller's perspective:
/// non-200 responses are recorded and dropped (spec.md §7), never
/// propagated, so a failure in the logging path cannot stall the FSM.
pub trait Backend {
    fn check_reg(&self, mac_address: &str) -> Result<i64, BackendError>;
    fn register(&self, mac_address: &str) -> Result<(), BackendError>;
    fn get_profile(&self, mac_address: &str) -> Result<EquipmentProfile, ProfileError>;
    fn get_card_details(
        &self,
        card_id: i64,
        equipment_id: i64,
        requires_training: bool,
        requires_payment: bool,
    ) -> Result<CardDetails, BackendError>;
    fn get_user(&self, card_id: i64) -> Result<UserInfo, BackendError>;
    fn get_equipment_name(&self, equipment_id: i64) -> Result<String, BackendError>;
    fn record_ip(&self, equipment_id: i64, ip_address: &str) -> Result<(), BackendError>;
    fn log_access_attempt(&self, equipment_id: i64, card_id: i64, successful: bool);
    fn log_access_completion(&self, equipment_id: i64, card_id: i64);
    fn log_started_status(&self, equipment_id: i64);
    fn log_shutdown_status(&self, equipment_id: i64, card_id: i64);
}

/// Authorization rule from spec.md §4.2.
///
/// A missing `user_active` yields `false` regardless of policy.
pub fn authorize(
    requires_training: bool,
    requires_payment: bool,
    user_active: Option<i64>,
    user_auth: bool,
    user_balance: f64,
) -> bool {
    if user_active != Some(1) {
        return false;
    }
    match (requires_training, requires_payment) {
        (true, true) => user_auth && user_balance > 0.0,
        (true, false) => user_auth,
        (false, true) => user_balance > 0.0,
        (false, false) => true,
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    id: i64,
    type_id: i64,
    name: (String, String),
    location_id: i64,
    timeout: i64,
    allow_proxy: i64,
    requires_training: i64,
    charge_policy: i64,
}

#[derive(Debug, Deserialize)]
struct CardDetailsResponse {
    user_role: Option<i64>,
    card_type: Option<i64>,
    user_balance: f64,
    user_auth: i64,
    user_active: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    name: String,
    email: String,
}

#[derive(Debug, Deserialize)]
struct NameResponse {
    name: String,
}

/// `reqwest::blocking`-backed implementation of [`Backend`].
pub struct HttpBackend {
    client: reqwest::blocking::Client,
    api_url: String,
    bearer_token: String,
}

impl HttpBackend {
    pub fn new(website: &str, bearer_token: &str) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            api_url: format!("{}/api/box.php", website.trim_end_matches('/')),
            bearer_token: bearer_token.to_string(),
        }
    }

    fn get(&self, mode: &'static str, params: &[(&str, String)]) -> Result<reqwest::blocking::Response, BackendError> {
        self.client
            .get(&self.api_url)
            .bearer_auth(&self.bearer_token)
            .query(&[("mode", mode)])
            .query(params)
            .send()
            .map_err(|e| BackendError::new(mode, e.to_string()))
    }

    fn put(&self, mode: &'static str, params: &[(&str, String)]) -> Result<reqwest::blocking::Response, BackendError> {
        self.client
            .put(&self.api_url)
            .bearer_auth(&self.bearer_token)
            .query(&[("mode", mode)])
            .query(params)
            .send()
            .map_err(|e| BackendError::new(mode, e.to_string()))
    }

    fn post(&self, mode: &'static str, params: &[(&str, String)]) -> Result<reqwest::blocking::Response, BackendError> {
        self.client
            .post(&self.api_url)
            .bearer_auth(&self.bearer_token)
            .query(&[("mode", mode)])
            .query(params)
            .send()
            .map_err(|e| BackendError::new(mode, e.to_string()))
    }

    fn log_post(&self, mode: &'static str, params: &[(&str, String)]) {
        match self.post(mode, params) {
            Ok(resp) if !resp.status().is_success() => {
                error!(mode, status = %resp.status(), "backend logging call returned non-200");
            }
            Err(e) => error!(mode, error = %e, "backend logging call failed"),
            Ok(_) => {}
        }
    }
}

impl Backend for HttpBackend {
    fn check_reg(&self, mac_address: &str) -> Result<i64, BackendError> {
        let resp = self.get("check_reg", &[("mac_adr", mac_address.to_string())])?;
        if !resp.status().is_success() {
            return Err(BackendError::new("check_reg", format!("status {}", resp.status())));
        }
        resp.json::<i64>().map_err(|e| BackendError::new("check_reg", e.to_string()))
    }

    fn register(&self, mac_address: &str) -> Result<(), BackendError> {
        let resp = self.put("register", &[("mac_adr", mac_address.to_string())])?;
        if !resp.status().is_success() {
            return Err(BackendError::new("register", format!("status {}", resp.status())));
        }
        Ok(())
    }

    fn get_profile(&self, mac_address: &str) -> Result<EquipmentProfile, ProfileError> {
        let resp = self
            .get("get_profile", &[("mac_adr", mac_address.to_string())])
            .map_err(ProfileError::Fetch)?;
        if !resp.status().is_success() {
            return Err(ProfileError::Fetch(BackendError::new(
                "get_profile",
                format!("status {}", resp.status()),
            )));
        }
        let mut body: Vec<ProfileResponse> =
            resp.json().map_err(|e| ProfileError::Malformed(e.to_string()))?;
        if body.is_empty() {
            return Err(ProfileError::Malformed("empty profile array".into()));
        }
        let p = body.remove(0);
        debug!(equipment_id = p.id, "fetched equipment profile");
        Ok(EquipmentProfile {
            equipment_id: p.id,
            equipment_type_id: p.type_id,
            equipment_type: p.name.0,
            location_id: p.location_id,
            location: p.name.1,
            timeout_minutes: p.timeout,
            allow_proxy: p.allow_proxy != 0,
            requires_training: p.requires_training != 0,
            // Non-goal resolution (spec.md §9 open question c): any
            // non-zero charge_policy means payment is required.
            requires_payment: p.charge_policy != 0,
        })
    }

    fn get_card_details(
        &self,
        card_id: i64,
        equipment_id: i64,
        requires_training: bool,
        requires_payment: bool,
    ) -> Result<CardDetails, BackendError> {
        let resp = self.get(
            "get_card_details",
            &[("card_id", card_id.to_string()), ("equipment_id", equipment_id.to_string())],
        )?;
        if !resp.status().is_success() {
            return Err(BackendError::new("get_card_details", format!("status {}", resp.status())));
        }
        let mut body: Vec<CardDetailsResponse> =
            resp.json().map_err(|e| BackendError::new("get_card_details", e.to_string()))?;
        if body.is_empty() {
            return Err(BackendError::new("get_card_details", "empty response array"));
        }
        let d = body.remove(0);
        let authorized = authorize(
            requires_training,
            requires_payment,
            d.user_active,
            d.user_auth != 0,
            d.user_balance,
        );
        Ok(CardDetails {
            user_is_authorized: authorized,
            card_type: CardType::from_backend_code(d.card_type),
            user_authority_level: d.user_role.unwrap_or(0),
        })
    }

    fn get_user(&self, card_id: i64) -> Result<UserInfo, BackendError> {
        let resp = self.get("get_user", &[("card_id", card_id.to_string())])?;
        if !resp.status().is_success() {
            return Err(BackendError::new("get_user", format!("status {}", resp.status())));
        }
        let mut body: Vec<UserResponse> =
            resp.json().map_err(|e| BackendError::new("get_user", e.to_string()))?;
        if body.is_empty() {
            return Err(BackendError::new("get_user", "empty response array"));
        }
        let u = body.remove(0);
        Ok(UserInfo { name: u.name, email: u.email })
    }

    fn get_equipment_name(&self, equipment_id: i64) -> Result<String, BackendError> {
        let resp = self.get("get_equipment_name", &[("equipment_id", equipment_id.to_string())])?;
        if !resp.status().is_success() {
            return Err(BackendError::new("get_equipment_name", format!("status {}", resp.status())));
        }
        let mut body: Vec<NameResponse> =
            resp.json().map_err(|e| BackendError::new("get_equipment_name", e.to_string()))?;
        if body.is_empty() {
            return Err(BackendError::new("get_equipment_name", "empty response array"));
        }
        Ok(body.remove(0).name)
    }

    fn record_ip(&self, equipment_id: i64, ip_address: &str) -> Result<(), BackendError> {
        let resp = self.post(
            "record_ip",
            &[("equipment_id", equipment_id.to_string()), ("ip_address", ip_address.to_string())],
        )?;
        if !resp.status().is_success() {
            return Err(BackendError::new("record_ip", format!("status {}", resp.status())));
        }
        Ok(())
    }

    fn log_access_attempt(&self, equipment_id: i64, card_id: i64, successful: bool) {
        self.log_post(
            "log_access_attempt",
            &[
                ("equipment_id", equipment_id.to_string()),
                ("card_id", card_id.to_string()),
                ("successful", (successful as u8).to_string()),
            ],
        );
    }

    fn log_access_completion(&self, equipment_id: i64, card_id: i64) {
        self.log_post(
            "log_access_completion",
            &[("equipment_id", equipment_id.to_string()), ("card_id", card_id.to_string())],
        );
    }

    fn log_started_status(&self, equipment_id: i64) {
        self.log_post("log_started_status", &[("equipment_id", equipment_id.to_string())]);
    }

    fn log_shutdown_status(&self, equipment_id: i64, card_id: i64) {
        self.log_post(
            "log_shutdown_status",
            &[("equipment_id", equipment_id.to_string()), ("card_id", card_id.to_string())],
        );
    }
}

/// How long the input assembler waits between retries of a failed
/// `get_card_details` call (spec.md §4.3, §9 design note on "unbounded
/// retry").
pub trait RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration;
}

/// Fixed backoff, used in production.
pub struct FixedBackoff(pub Duration);

impl RetryPolicy for FixedBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self(Duration::from_secs(2))
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
