//! Guarded access to the console LED register.
//!
//! One [`DeviceSession`] is shared by every blink worker and the shutdown
//! handler. The handle is either closed or valid; every open, read-modify-write
//! and close happens under one mutex, and the mutex is never held across a
//! sleep.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::device::{Console, LedRegister, Result};
use crate::led::Led;

/// When the register handle is released between blink cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReopenPolicy {
    /// Close after every cycle so the next open targets whichever virtual
    /// terminal is active by then.
    #[default]
    PerCycle,
    /// Keep the first handle until shutdown or a register error.
    Persistent,
}

impl ReopenPolicy {
    pub fn from_no_reopen(no_reopen: bool) -> Self {
        if no_reopen {
            ReopenPolicy::Persistent
        } else {
            ReopenPolicy::PerCycle
        }
    }
}

impl fmt::Display for ReopenPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReopenPolicy::PerCycle => f.write_str("reopen every cycle"),
            ReopenPolicy::Persistent => f.write_str("keep open"),
        }
    }
}

/// Shared, lock-guarded handle on a console's LED register.
pub struct DeviceSession<C: Console> {
    console: C,
    policy: ReopenPolicy,
    register: Mutex<Option<C::Register>>,
}

impl<C: Console> DeviceSession<C> {
    /// A closed session. Nothing is opened until [`ensure_open`](Self::ensure_open).
    pub fn new(console: C, policy: ReopenPolicy) -> Self {
        Self {
            console,
            policy,
            register: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<C::Register>> {
        self.register.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Open the register if the session is closed.
    ///
    /// On failure the session stays closed and the lock is released before
    /// the error reaches the caller.
    pub fn ensure_open(&self) -> Result<()> {
        let mut register = self.lock();
        if register.is_none() {
            *register = Some(self.console.open()?);
            log::debug!("[device] opened {}", self.console.describe());
        }
        Ok(())
    }

    /// Switch one LED on or off with a read-modify-write of the register.
    ///
    /// A closed session is a no-op. A register error closes the session, so
    /// the next [`ensure_open`](Self::ensure_open) starts over with a fresh
    /// handle.
    pub fn set_led(&self, led: Led, on: bool) -> Result<()> {
        let mut guard = self.lock();
        let Some(register) = guard.as_ref() else {
            return Ok(());
        };
        let result = register
            .get_leds()
            .and_then(|value| register.set_leds(led.apply(value, on)));
        if result.is_err() {
            *guard = None;
        }
        result
    }

    /// End-of-cycle hook: closes the handle unless the policy keeps it.
    pub fn end_cycle(&self) {
        if self.policy == ReopenPolicy::PerCycle {
            self.close();
        }
    }

    /// Release the handle. Idempotent; returns whether a handle was open.
    pub fn close(&self) -> bool {
        let closed = self.lock().take().is_some();
        if closed {
            log::debug!("[device] closed {}", self.console.describe());
        }
        closed
    }

    /// Switch off `leds` and close the session, all under one lock hold.
    ///
    /// Does nothing when the session is already closed. Register errors are
    /// logged and the remaining LEDs are still attempted. Returns whether an
    /// open handle was found.
    pub fn clear_and_close(&self, leds: &[Led]) -> bool {
        let mut guard = self.lock();
        let Some(register) = guard.take() else {
            return false;
        };
        for &led in leds {
            let result = register
                .get_leds()
                .and_then(|value| register.set_leds(led.apply(value, false)));
            if let Err(e) = result {
                log::warn!("[device] could not clear {led} LED: {e}");
            }
        }
        drop(register);
        log::debug!("[device] closed {}", self.console.describe());
        true
    }
}
