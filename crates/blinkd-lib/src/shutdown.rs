//! Orderly daemon shutdown, shared by the signal handler and the main thread.
//!
//! [`ShutdownHandler::cleanup`] cancels the workers, waits up to the grace
//! period for them, switches off every LED that may have been lit, closes
//! the console and wakes the listener so its socket is dropped. A second
//! call blocks until the first one has finished and then does nothing.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::device::Console;
use crate::led::Led;
use crate::rates::RateTable;
use crate::session::DeviceSession;

const JOIN_POLL: Duration = Duration::from_millis(5);
const WAKE_TIMEOUT: Duration = Duration::from_millis(250);

pub struct ShutdownHandler<C: Console> {
    session: Arc<DeviceSession<C>>,
    rates: Arc<RateTable>,
    enabled: Vec<Led>,
    cancel: CancelToken,
    grace: Duration,
    workers: Mutex<Vec<JoinHandle<()>>>,
    wake: Mutex<Option<SocketAddr>>,
    done: Mutex<bool>,
    exit_code: Mutex<Option<i32>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C: Console> ShutdownHandler<C> {
    pub fn new(
        session: Arc<DeviceSession<C>>,
        rates: Arc<RateTable>,
        enabled: Vec<Led>,
        cancel: CancelToken,
        grace: Duration,
    ) -> Self {
        Self {
            session,
            rates,
            enabled,
            cancel,
            grace,
            workers: Mutex::new(Vec::new()),
            wake: Mutex::new(None),
            done: Mutex::new(false),
            exit_code: Mutex::new(None),
        }
    }

    pub fn register_worker(&self, handle: JoinHandle<()>) {
        lock(&self.workers).push(handle);
    }

    /// Remember where the listener accepts so cleanup can unblock it.
    pub fn register_listener(&self, local: SocketAddr) {
        *lock(&self.wake) = Some(wake_address(local));
    }

    /// LEDs to switch off: those enabled at startup plus any a command enabled later.
    pub fn leds_to_clear(&self) -> Vec<Led> {
        Led::ALL
            .into_iter()
            .filter(|&led| self.enabled.contains(&led) || !self.rates.is_disabled(led))
            .collect()
    }

    /// Run the shutdown sequence. Returns `false` if it had already run.
    pub fn cleanup(&self) -> bool {
        let mut done = lock(&self.done);
        if *done {
            return false;
        }
        log::info!("[shutdown] stopping");
        self.cancel.cancel();
        self.join_workers();

        let leds = self.leds_to_clear();
        if self.session.clear_and_close(&leds) {
            log::debug!("[shutdown] cleared {} LED(s)", leds.len());
        }

        if let Some(addr) = lock(&self.wake).take() {
            // Any connection attempt wakes the blocking accept.
            let _ = TcpStream::connect_timeout(&addr, WAKE_TIMEOUT);
        }
        *done = true;
        true
    }

    /// Run [`cleanup`](Self::cleanup) and terminate the process.
    ///
    /// The first caller's `code` is the exit status of every caller, so a
    /// signal arriving during an error shutdown cannot turn it into 0.
    pub fn shutdown(&self, code: i32) -> ! {
        let code = self.claim_exit_code(code);
        self.cleanup();
        log::info!("[shutdown] exiting with status {code}");
        std::process::exit(code)
    }

    fn claim_exit_code(&self, code: i32) -> i32 {
        *lock(&self.exit_code).get_or_insert(code)
    }

    fn join_workers(&self) {
        let handles: Vec<JoinHandle<()>> = lock(&self.workers).drain(..).collect();
        // A grace too large for an Instant means no deadline.
        let deadline = Instant::now().checked_add(self.grace);
        while deadline.is_none_or(|d| Instant::now() < d)
            && handles.iter().any(|h| !h.is_finished())
        {
            std::thread::sleep(JOIN_POLL);
        }
        for handle in handles {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                let name = handle.thread().name().unwrap_or("worker").to_string();
                log::warn!("[shutdown] {name} did not stop within {:?}", self.grace);
            }
        }
    }
}

/// The address a local client must connect to in order to reach `local`.
fn wake_address(local: SocketAddr) -> SocketAddr {
    let ip = match local.ip() {
        IpAddr::V4(v4) if v4.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(v6) if v6.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, local.port())
}
