//! Per-LED blink rates shared between the listener and the workers.
//!
//! One atomic slot per LED: the listener is the only writer, each worker
//! reads its own slot once per cycle. A worker may act on a rate that is one
//! cycle stale, never on a torn value.

use std::sync::atomic::{AtomicI32, Ordering};

use crate::led::{Led, Target};
use crate::protocol::{Action, Command, DISABLED};

/// A rate slot that changed while applying a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateChange {
    pub led: Led,
    pub old: i32,
    pub new: i32,
}

/// Blink rate per real LED. [`DISABLED`] marks LEDs without a worker.
#[derive(Debug)]
pub struct RateTable {
    rates: [AtomicI32; 3],
}

impl RateTable {
    /// A table with every LED disabled.
    pub const fn new() -> Self {
        Self {
            rates: [
                AtomicI32::new(DISABLED),
                AtomicI32::new(DISABLED),
                AtomicI32::new(DISABLED),
            ],
        }
    }

    /// A table with `enabled` LEDs idle (rate 0) and the rest disabled.
    pub fn with_enabled(enabled: &[Led]) -> Self {
        let table = Self::new();
        for &led in enabled {
            table.set(led, 0);
        }
        table
    }

    pub fn get(&self, led: Led) -> i32 {
        self.rates[led.index()].load(Ordering::Acquire)
    }

    pub fn set(&self, led: Led, rate: i32) {
        self.rates[led.index()].store(rate, Ordering::Release);
    }

    pub fn is_disabled(&self, led: Led) -> bool {
        self.get(led) == DISABLED
    }

    /// Apply a decoded command and report every slot that changed.
    ///
    /// Single-LED commands are applied unconditionally: `Set` overwrites a
    /// disabled slot, and `Increment`/`Decrement` are not clamped to the
    /// protocol's rate range. `All` resets every non-disabled LED to 0.
    pub fn apply(&self, command: &Command) -> Vec<RateChange> {
        match command.target {
            Target::Led(led) => {
                let slot = &self.rates[led.index()];
                let (old, new) = match command.action {
                    Action::Set(rate) => {
                        let rate = i32::from(rate);
                        (slot.swap(rate, Ordering::AcqRel), rate)
                    }
                    Action::Increment => {
                        let old = slot.fetch_add(1, Ordering::AcqRel);
                        (old, old.wrapping_add(1))
                    }
                    Action::Decrement => {
                        let old = slot.fetch_sub(1, Ordering::AcqRel);
                        (old, old.wrapping_sub(1))
                    }
                };
                if old == new {
                    Vec::new()
                } else {
                    vec![RateChange { led, old, new }]
                }
            }
            Target::All => Led::ALL
                .into_iter()
                .filter_map(|led| {
                    let old = self.rates[led.index()]
                        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| {
                            (r != DISABLED && r != 0).then_some(0)
                        })
                        .ok()?;
                    Some(RateChange { led, old, new: 0 })
                })
                .collect(),
        }
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self::new()
    }
}
