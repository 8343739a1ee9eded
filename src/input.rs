//! Input assembler: turns raw device/backend state into one FSM input
//! tuple per tick (spec.md §4.3).

use std::thread;

use tracing::warn;

use crate::backend::{Backend, RetryPolicy};
use crate::card::CardType;
use crate::device::Device;

/// The tuple the FSM consumes on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FsmInput {
    pub card_id: i64,
    pub card_type: CardType,
    pub user_is_authorized: bool,
    pub user_authority_level: i64,
    pub button_pressed: bool,
}

/// Tracks the previous tick's card id so a steady card only triggers one
/// `get_card_details` lookup, not one per tick.
pub struct InputAssembler {
    last_card_id: i64,
    last_tuple: FsmInput,
    retry: Box<dyn RetryPolicy>,
}

impl InputAssembler {
    pub fn new(retry: Box<dyn RetryPolicy>) -> Self {
        Self { last_card_id: 0, last_tuple: FsmInput::default(), retry }
    }

    /// Produce this tick's input.
    ///
    /// A new card id triggers a `get_card_details` lookup that retries
    /// indefinitely on failure (spec.md §9: unbounded retry is
    /// deliberate — the machine must not grant access on missing data).
    pub fn tick(
        &mut self,
        device: &mut dyn Device,
        backend: &dyn Backend,
        equipment_id: i64,
        requires_training: bool,
        requires_payment: bool,
    ) -> FsmInput {
        let button_pressed = device.take_button_pressed();
        let card_id = match device.read_card_id() {
            Ok(Some(id)) if id > 0 => id,
            Ok(_) => 0,
            Err(e) => {
                warn!(error = %e, "card reader read failed, treating as no card present");
                0
            }
        };

        if card_id <= 0 {
            self.last_card_id = 0;
            self.last_tuple = FsmInput {
                card_id: 0,
                card_type: CardType::Invalid,
                user_is_authorized: false,
                user_authority_level: 0,
                button_pressed,
            };
            return self.last_tuple;
        }

        if card_id == self.last_card_id {
            self.last_tuple.button_pressed = button_pressed;
            return self.last_tuple;
        }

        let mut attempt = 0u32;
        let details = loop {
            match backend.get_card_details(card_id, equipment_id, requires_training, requires_payment) {
                Ok(details) => break details,
                Err(e) => {
                    attempt += 1;
                    warn!(error = %e, attempt, "get_card_details failed, retrying");
                    thread::sleep(self.retry.delay(attempt));
                }
            }
        };

        self.last_card_id = card_id;
        self.last_tuple = FsmInput {
            card_id,
            card_type: details.card_type,
            user_is_authorized: details.user_is_authorized,
            user_authority_level: details.user_authority_level,
            button_pressed,
        };
        self.last_tuple
    }
}

#[cfg(test)]
#[path = "input_tests.rs"]
mod tests;
