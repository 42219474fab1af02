//! Daemon assembly: rate table, console session, workers, listener.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::config::DaemonConfig;
use crate::device::Console;
use crate::error::Result;
use crate::listener::Listener;
use crate::rates::RateTable;
use crate::session::DeviceSession;
use crate::shutdown::ShutdownHandler;
use crate::worker::{self, BlinkWorker};

/// A running daemon. Workers are already blinking once [`Daemon::start`]
/// returns; commands are processed by [`Daemon::serve`].
pub struct Daemon<C: Console + 'static> {
    rates: Arc<RateTable>,
    listener: Listener,
    local_addr: SocketAddr,
    shutdown: Arc<ShutdownHandler<C>>,
}

impl<C: Console + 'static> Daemon<C> {
    /// Bind the control socket and spawn one worker per enabled LED.
    ///
    /// The socket is bound before any worker starts, so a bind failure
    /// leaves the console untouched.
    pub fn start(config: DaemonConfig, console: C) -> Result<Self> {
        let rates = Arc::new(RateTable::with_enabled(&config.enabled));
        let cancel = CancelToken::new();

        let listener = Listener::bind(config.listen, Arc::clone(&rates), cancel.clone())?;
        let local_addr = listener.local_addr()?;

        log::info!(
            "[daemon] console {} ({}), LEDs: {}",
            console.describe(),
            config.reopen,
            config
                .enabled
                .iter()
                .map(|led| led.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let session = Arc::new(DeviceSession::new(console, config.reopen));
        let shutdown = Arc::new(ShutdownHandler::new(
            Arc::clone(&session),
            Arc::clone(&rates),
            config.enabled.clone(),
            cancel.clone(),
            config.grace,
        ));
        shutdown.register_listener(local_addr);

        for &led in &config.enabled {
            let w = BlinkWorker::new(
                led,
                Arc::clone(&rates),
                Arc::clone(&session),
                config.timing,
                cancel.clone(),
            );
            shutdown.register_worker(worker::spawn(w)?);
        }

        Ok(Self {
            rates,
            listener,
            local_addr,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn rates(&self) -> &Arc<RateTable> {
        &self.rates
    }

    pub fn shutdown_handler(&self) -> Arc<ShutdownHandler<C>> {
        Arc::clone(&self.shutdown)
    }

    /// Process commands until shutdown. Blocks the calling thread.
    pub fn serve(&self) -> Result<()> {
        self.listener.serve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timing;
    use crate::device::mock::MockConsole;
    use crate::led::Led;
    use crate::protocol::DISABLED;
    use crate::session::ReopenPolicy;
    use crate::BlinkdError;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config(enabled: Vec<Led>) -> DaemonConfig {
        DaemonConfig {
            enabled,
            timing: Timing {
                tick: Duration::from_millis(1),
                idle: Duration::from_millis(5),
                ..Timing::default()
            },
            reopen: ReopenPolicy::PerCycle,
            listen: "127.0.0.1:0".parse().unwrap(),
            device: PathBuf::from("/dev/null"),
            grace: Duration::from_millis(500),
        }
    }

    #[test]
    fn start_initialises_rates() {
        let d = Daemon::start(config(vec![Led::Caps, Led::Scroll]), MockConsole::new()).unwrap();
        assert_eq!(d.rates().get(Led::Caps), 0);
        assert_eq!(d.rates().get(Led::Num), DISABLED);
        assert_eq!(d.rates().get(Led::Scroll), 0);
        assert_ne!(d.local_addr().port(), 0);
        assert!(d.shutdown_handler().cleanup());
    }

    #[test]
    fn idle_daemon_never_opens_console() {
        let console = MockConsole::new();
        let d = Daemon::start(config(vec![Led::Caps]), console.clone()).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        d.shutdown_handler().cleanup();
        assert!(console.events().is_empty());
    }

    #[test]
    fn bind_failure_spawns_no_workers() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut cfg = config(vec![Led::Caps]);
        cfg.listen = taken.local_addr().unwrap();
        cfg.timing.idle = Duration::ZERO;
        let console = MockConsole::new();
        let err = Daemon::start(cfg, console.clone()).err().unwrap();
        assert!(matches!(err, BlinkdError::Bind { .. }));
        assert!(console.events().is_empty());
    }
}
