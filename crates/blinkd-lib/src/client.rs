//! One-shot client: build a command byte and deliver it to a daemon.

use std::fmt;
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::str::FromStr;

use crate::error::{BlinkdError, Result};
use crate::led::{Led, Target};
use crate::protocol::{Action, Command, RATE_CEILING};

/// The `--rate` argument: a number, `+` or `-`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateRequest {
    Absolute(i64),
    Increment,
    Decrement,
}

impl Default for RateRequest {
    fn default() -> Self {
        RateRequest::Absolute(0)
    }
}

impl FromStr for RateRequest {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "+" => Ok(RateRequest::Increment),
            "-" => Ok(RateRequest::Decrement),
            n => n
                .parse::<i64>()
                .map(RateRequest::Absolute)
                .map_err(|_| format!("invalid rate '{s}': expected a number, '+' or '-'")),
        }
    }
}

impl fmt::Display for RateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateRequest::Absolute(n) => write!(f, "{n}"),
            RateRequest::Increment => f.write_str("+"),
            RateRequest::Decrement => f.write_str("-"),
        }
    }
}

impl RateRequest {
    /// Bring an absolute rate into `0..=RATE_CEILING`.
    ///
    /// Every non-zero value outside the range, negative ones included,
    /// becomes [`RATE_CEILING`]. Returns the request unchanged and `false`
    /// when nothing had to be adjusted.
    pub fn clamped(self) -> (RateRequest, bool) {
        match self {
            RateRequest::Absolute(n) if !(0..=i64::from(RATE_CEILING)).contains(&n) => {
                (RateRequest::Absolute(i64::from(RATE_CEILING)), true)
            }
            other => (other, false),
        }
    }

    fn is_zero(self) -> bool {
        self == RateRequest::Absolute(0)
    }
}

/// The message printed when `--rate` is out of range.
pub fn out_of_range_message() -> String {
    format!("Use value from 0 to {RATE_CEILING} for --rate.")
}

/// Build the command for an (already clamped) rate request.
///
/// Without an LED the only meaningful request is rate 0, which resets
/// every LED; anything else is rejected.
pub fn build_command(led: Option<Led>, rate: RateRequest) -> Result<Command> {
    let target = match led {
        Some(led) => Target::Led(led),
        None if rate.is_zero() => Target::All,
        None => {
            return Err(BlinkdError::Command(format!(
                "rate {rate} needs an LED (--capslockled, --numlockled or --scrolllockled)"
            )));
        }
    };
    let action = match rate {
        RateRequest::Increment => Action::Increment,
        RateRequest::Decrement => Action::Decrement,
        RateRequest::Absolute(n) => {
            let n = u8::try_from(n)
                .ok()
                .filter(|&n| i32::from(n) <= RATE_CEILING)
                .ok_or_else(|| BlinkdError::Command(out_of_range_message()))?;
            Action::Set(n)
        }
    };
    Ok(Command::new(target, action))
}

/// Connect, write the command byte, close. Nothing is read back.
pub fn send_command(addr: impl ToSocketAddrs, command: &Command) -> Result<()> {
    let byte = command.encode().map_err(BlinkdError::Command)?;
    let mut stream = TcpStream::connect(addr)?;
    stream.write_all(&[byte])?;
    stream.flush()?;
    log::debug!("sent 0x{byte:02x} ({command})");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    #[test]
    fn parse_rate_requests() {
        assert_eq!("+".parse::<RateRequest>().unwrap(), RateRequest::Increment);
        assert_eq!("-".parse::<RateRequest>().unwrap(), RateRequest::Decrement);
        assert_eq!("7".parse::<RateRequest>().unwrap(), RateRequest::Absolute(7));
        assert_eq!("-3".parse::<RateRequest>().unwrap(), RateRequest::Absolute(-3));
        assert!("fast".parse::<RateRequest>().is_err());
    }

    #[test]
    fn clamp_out_of_range() {
        assert_eq!(RateRequest::Absolute(5).clamped(), (RateRequest::Absolute(5), false));
        assert_eq!(RateRequest::Absolute(29).clamped(), (RateRequest::Absolute(29), false));
        assert_eq!(RateRequest::Absolute(30).clamped(), (RateRequest::Absolute(29), true));
        assert_eq!(RateRequest::Absolute(-1).clamped(), (RateRequest::Absolute(29), true));
        assert_eq!(RateRequest::Increment.clamped(), (RateRequest::Increment, false));
    }

    #[test]
    fn build_single_led() {
        let c = build_command(Some(Led::Num), RateRequest::Absolute(3)).unwrap();
        assert_eq!(c.encode().unwrap(), 0b01_0_00011);
        let c = build_command(Some(Led::Scroll), RateRequest::Increment).unwrap();
        assert_eq!(c.encode().unwrap(), 0b10_0_11110);
        let c = build_command(Some(Led::Caps), RateRequest::Decrement).unwrap();
        assert_eq!(c.encode().unwrap(), 0b00_0_11111);
    }

    #[test]
    fn build_without_led_is_reset() {
        let c = build_command(None, RateRequest::default()).unwrap();
        assert_eq!(c.encode().unwrap(), 0b11_0_00000);
    }

    #[test]
    fn build_without_led_rejects_nonzero() {
        assert!(build_command(None, RateRequest::Absolute(2)).is_err());
        assert!(build_command(None, RateRequest::Increment).is_err());
        assert!(build_command(None, RateRequest::Decrement).is_err());
    }

    #[test]
    fn build_rejects_unclamped() {
        let err = build_command(Some(Led::Caps), RateRequest::Absolute(40)).unwrap_err();
        assert!(err.to_string().contains("0 to 29"));
    }

    #[test]
    fn send_writes_one_byte() {
        let server = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        let command = Command::set(Led::Caps, 2);
        send_command(addr, &command).unwrap();

        let (mut stream, _) = server.accept().unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).unwrap();
        assert_eq!(received, vec![0b00_0_00010]);
    }

    #[test]
    fn send_to_closed_port_fails() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let err = send_command(addr, &Command::set(Led::Caps, 1)).unwrap_err();
        assert!(matches!(err, BlinkdError::Io(_)));
    }
}
