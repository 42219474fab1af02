//! Blink workers, one thread per enabled LED.
//!
//! Each cycle reads the LED's rate once. Rate N > 0 opens the session if
//! needed, blinks N times, pauses, then hands the session to its
//! [`ReopenPolicy`](crate::session::ReopenPolicy).
//!
//! Any rate `<= 0` idles for [`Timing::idle`] without touching the console.
//! A negative rate (reached by decrementing past 0) counts as 0, not as an
//! active rate with zero blinks: the worker never runs an empty
//! open/pause/close cycle for it.

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::cancel::CancelToken;
use crate::config::Timing;
use crate::device::{self, Console};
use crate::led::Led;
use crate::rates::RateTable;
use crate::session::DeviceSession;

/// What one call to [`BlinkWorker::run_cycle`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Rate was not positive; slept the idle interval.
    Idle,
    /// Completed this many on/off pairs and the pause.
    Blinked(u32),
    /// The cancel token fired; the worker must stop.
    Cancelled,
}

pub struct BlinkWorker<C: Console> {
    led: Led,
    rates: Arc<RateTable>,
    session: Arc<DeviceSession<C>>,
    timing: Timing,
    cancel: CancelToken,
}

impl<C: Console> BlinkWorker<C> {
    pub fn new(
        led: Led,
        rates: Arc<RateTable>,
        session: Arc<DeviceSession<C>>,
        timing: Timing,
        cancel: CancelToken,
    ) -> Self {
        Self {
            led,
            rates,
            session,
            timing,
            cancel,
        }
    }

    pub fn led(&self) -> Led {
        self.led
    }

    /// Run one cycle.
    ///
    /// The only error is a failure to open the console, which the caller
    /// treats as fatal. Register errors during the cycle are logged and
    /// leave the session closed for the next cycle to reopen.
    pub fn run_cycle(&self) -> device::Result<CycleOutcome> {
        let rate = self.rates.get(self.led);
        if rate <= 0 {
            if self.cancel.sleep(self.timing.idle) {
                return Ok(CycleOutcome::Cancelled);
            }
            return Ok(CycleOutcome::Idle);
        }

        self.session.ensure_open()?;

        let mut blinks = 0;
        for _ in 0..rate {
            if self.cancel.is_cancelled() {
                return Ok(CycleOutcome::Cancelled);
            }
            self.switch(true);
            let cancelled = self.cancel.sleep(self.timing.on());
            self.switch(false);
            if cancelled {
                return Ok(CycleOutcome::Cancelled);
            }
            blinks += 1;
            if self.cancel.sleep(self.timing.off()) {
                return Ok(CycleOutcome::Cancelled);
            }
        }
        if self.cancel.sleep(self.timing.pause()) {
            return Ok(CycleOutcome::Cancelled);
        }
        self.session.end_cycle();
        Ok(CycleOutcome::Blinked(blinks))
    }

    fn switch(&self, on: bool) {
        if let Err(e) = self.session.set_led(self.led, on) {
            log::warn!("[worker {}] {e}; console will be reopened", self.led);
        }
    }

    /// Run cycles until cancelled.
    ///
    /// A console open failure terminates the process on the spot: the
    /// session lock is already released, and the shutdown handler is not run.
    pub fn run(self) {
        log::debug!("[worker {}] started", self.led);
        loop {
            match self.run_cycle() {
                Ok(CycleOutcome::Cancelled) => {
                    log::debug!("[worker {}] stopped", self.led);
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    log::error!("[worker {}] {e}", self.led);
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Start `worker` on its own named thread (`blink-caps`, ...).
pub fn spawn<C: Console + 'static>(worker: BlinkWorker<C>) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("blink-{}", worker.led()))
        .spawn(move || worker.run())
}
