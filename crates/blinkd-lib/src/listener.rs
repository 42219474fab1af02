//! Control channel: serial TCP accept loop, one command byte per connection.
//!
//! Connections are handled one at a time with no read timeout, so a client
//! that connects and stays silent holds up every later command until it
//! disconnects. Nothing is ever written back.

use std::io::{self, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::error::{BlinkdError, Result};
use crate::protocol::{self, Command, DISABLED, RATE_CEILING};
use crate::rates::{RateChange, RateTable};

pub struct Listener {
    socket: TcpListener,
    rates: Arc<RateTable>,
    cancel: CancelToken,
}

impl Listener {
    /// Bind and listen on `addr`. Failure here is fatal for the daemon.
    pub fn bind(addr: SocketAddr, rates: Arc<RateTable>, cancel: CancelToken) -> Result<Self> {
        let socket = TcpListener::bind(addr).map_err(|source| BlinkdError::Bind { addr, source })?;
        Ok(Self {
            socket,
            rates,
            cancel,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Accept and process connections until the cancel token fires.
    ///
    /// Returns `Err` only for accept failures other than interruptions.
    pub fn serve(&self) -> Result<()> {
        log::info!("[listener] listening on {}", self.local_addr()?);
        loop {
            let accepted = self.socket.accept();
            if self.cancel.is_cancelled() {
                log::debug!("[listener] stopped");
                return Ok(());
            }
            match accepted {
                Ok((stream, peer)) => self.handle_connection(stream, peer),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                            | io::ErrorKind::ConnectionAborted
                    ) =>
                {
                    log::debug!("[listener] accept: {e}");
                }
                Err(e) => {
                    log::error!("[listener] accept failed: {e}");
                    return Err(BlinkdError::Io(e));
                }
            }
        }
    }

    /// Read at most one byte from `stream`, apply it, drop the connection.
    pub fn handle_connection(&self, mut stream: TcpStream, peer: SocketAddr) {
        match read_command_byte(&mut stream) {
            Ok(Some(byte)) => {
                dispatch(&self.rates, byte);
            }
            Ok(None) => {
                log::warn!("[listener] {peer} closed the connection without sending a command");
            }
            Err(e) => {
                log::warn!("[listener] read from {peer} failed: {e}");
            }
        }
    }
}

/// Read a single byte. `Ok(None)` means the peer closed without sending one.
pub fn read_command_byte(reader: &mut impl Read) -> io::Result<Option<u8>> {
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Decode `byte` and apply it to `rates`, logging anything suspicious.
///
/// Suspicious commands are applied anyway: a reserved bit, a rate
/// pushed past [`RATE_CEILING`] or below [`DISABLED`], or a `Set` that
/// revives an LED that has no worker.
pub fn dispatch(rates: &RateTable, byte: u8) -> Vec<RateChange> {
    let command = Command::decode(byte);
    if protocol::has_reserved_bits(byte) {
        log::warn!("[listener] received inappropriate blink rate 0x{byte:02x}, applying as {command}");
    } else {
        log::info!("[listener] received 0x{byte:02x}: {command}");
    }

    let changes = rates.apply(&command);
    for change in &changes {
        let RateChange { led, old, new } = *change;
        log::debug!("[listener] {led} rate {old} -> {new}");
        if old == DISABLED {
            log::warn!("[listener] {led} LED was disabled at startup; no worker will blink it");
        }
        if new > RATE_CEILING {
            log::warn!("[listener] {led} rate {new} exceeds the maximum of {RATE_CEILING}");
        }
        if new < DISABLED {
            log::warn!("[listener] {led} rate {new} is below the disabled marker");
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::led::Led;
    use std::io::{Cursor, Write};

    #[test]
    fn read_one_byte() {
        let mut r = Cursor::new(vec![0x42]);
        assert_eq!(read_command_byte(&mut r).unwrap(), Some(0x42));
    }

    #[test]
    fn read_only_first_byte() {
        let mut r = Cursor::new(vec![0x01, 0x02, 0x03]);
        assert_eq!(read_command_byte(&mut r).unwrap(), Some(0x01));
        assert_eq!(r.position(), 1);
    }

    #[test]
    fn read_empty_stream() {
        let mut r = Cursor::new(Vec::<u8>::new());
        assert_eq!(read_command_byte(&mut r).unwrap(), None);
    }

    struct Flaky {
        interrupts: usize,
    }

    impl Read for Flaky {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.interrupts > 0 {
                self.interrupts -= 1;
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            buf[0] = 0x07;
            Ok(1)
        }
    }

    #[test]
    fn read_retries_interrupted() {
        let mut r = Flaky { interrupts: 2 };
        assert_eq!(read_command_byte(&mut r).unwrap(), Some(0x07));
    }

    #[test]
    fn read_propagates_other_errors() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::ConnectionReset))
            }
        }
        assert!(read_command_byte(&mut Broken).is_err());
    }

    #[test]
    fn dispatch_sets_single_led() {
        let rates = RateTable::with_enabled(&[Led::Caps]);
        dispatch(&rates, 0b00_0_00010);
        assert_eq!(rates.get(Led::Caps), 2);
    }

    #[test]
    fn dispatch_all_resets_enabled_only() {
        let rates = RateTable::with_enabled(&[Led::Caps]);
        rates.set(Led::Caps, 3);
        dispatch(&rates, 0b11_0_00000);
        assert_eq!(rates.get(Led::Caps), 0);
        assert_eq!(rates.get(Led::Num), DISABLED);
    }

    #[test]
    fn dispatch_applies_reserved_bit_commands() {
        let rates = RateTable::with_enabled(&[Led::Num]);
        let changes = dispatch(&rates, 0b01_1_00101);
        assert_eq!(rates.get(Led::Num), 5);
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn dispatch_increment_past_ceiling() {
        let rates = RateTable::with_enabled(&[Led::Scroll]);
        rates.set(Led::Scroll, RATE_CEILING);
        dispatch(&rates, 0b10_0_11110);
        assert_eq!(rates.get(Led::Scroll), RATE_CEILING + 1);
    }

    #[test]
    fn dispatch_set_enables_disabled_led() {
        let rates = RateTable::with_enabled(&[Led::Caps]);
        let changes = dispatch(&rates, 0b10_0_00001);
        assert_eq!(rates.get(Led::Scroll), 1);
        assert_eq!(changes[0].old, DISABLED);
    }

    fn listener() -> Listener {
        Listener::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(RateTable::with_enabled(&[Led::Caps])),
            CancelToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn bind_conflict_is_bind_error() {
        let first = listener();
        let addr = first.local_addr().unwrap();
        let err = Listener::bind(addr, Arc::new(RateTable::new()), CancelToken::new())
            .err()
            .expect("second bind on the same port should fail");
        assert!(matches!(err, BlinkdError::Bind { .. }));
    }

    #[test]
    fn handle_connection_applies_byte() {
        let l = listener();
        let addr = l.local_addr().unwrap();
        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(&[0b00_0_00100]).unwrap();
        drop(client);
        let (stream, peer) = l.socket.accept().unwrap();
        l.handle_connection(stream, peer);
        assert_eq!(l.rates.get(Led::Caps), 4);
    }

    #[test]
    fn handle_connection_survives_empty_client() {
        let l = listener();
        let addr = l.local_addr().unwrap();
        drop(TcpStream::connect(addr).unwrap());
        let (stream, peer) = l.socket.accept().unwrap();
        l.handle_connection(stream, peer);
        assert_eq!(l.rates.get(Led::Caps), 0);
    }

    #[test]
    fn serve_returns_after_cancel() {
        let l = Arc::new(listener());
        let addr = l.local_addr().unwrap();
        let server = {
            let l = Arc::clone(&l);
            std::thread::spawn(move || l.serve())
        };
        l.cancel.cancel();
        // Wake the blocking accept.
        drop(TcpStream::connect(addr).unwrap());
        server.join().unwrap().unwrap();
    }
}
