//! Daemon configuration: TOML file in the platform config directory.
//!
//! [`Config`] is what users edit and what CLI flags override. It is turned
//! once into an immutable [`DaemonConfig`] that the workers and the listener
//! share.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::DEFAULT_CONSOLE;
use crate::led::Led;
use crate::protocol::DEFAULT_PORT;
use crate::session::ReopenPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Blink the Caps-Lock LED.
    #[serde(default)]
    pub caps: bool,

    /// Blink the Num-Lock LED.
    #[serde(default)]
    pub num: bool,

    /// Blink the Scroll-Lock LED.
    #[serde(default)]
    pub scroll: bool,

    /// TCP port of the control channel.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address to listen on. Default: all interfaces.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Ticks an LED stays lit per blink.
    #[serde(default = "default_on_time")]
    pub on_time: u32,

    /// Ticks an LED stays dark between blinks.
    #[serde(default = "default_off_time")]
    pub off_time: u32,

    /// Ticks of pause after the blinks of one cycle.
    #[serde(default = "default_pause_time")]
    pub pause_time: u32,

    /// Keep the console open instead of reopening it every cycle.
    #[serde(default)]
    pub no_reopen: bool,

    /// Console device whose LED register is driven.
    #[serde(default = "default_device")]
    pub device: String,

    /// Length of one tick in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Poll interval of an idle worker in milliseconds.
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,

    /// How long shutdown waits for workers before clearing the LEDs itself.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    "0.0.0.0".into()
}
fn default_on_time() -> u32 {
    2
}
fn default_off_time() -> u32 {
    2
}
fn default_pause_time() -> u32 {
    6
}
fn default_device() -> String {
    DEFAULT_CONSOLE.into()
}
fn default_tick_ms() -> u64 {
    100
}
fn default_idle_ms() -> u64 {
    1000
}
fn default_grace_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Config {
            caps: false,
            num: false,
            scroll: false,
            port: default_port(),
            bind: default_bind(),
            on_time: default_on_time(),
            off_time: default_off_time(),
            pause_time: default_pause_time(),
            no_reopen: false,
            device: default_device(),
            tick_ms: default_tick_ms(),
            idle_ms: default_idle_ms(),
            grace_ms: default_grace_ms(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Port 0 would bind an ephemeral port no client knows about.
    ZeroPort,
    /// The `bind` field is not an IP address.
    InvalidBind(String),
    /// `tick_ms` is 0.
    ZeroTick,
    /// `device` is empty or whitespace-only.
    EmptyDevice,
    /// `tick_ms` times the named tick count does not fit in a `Duration`.
    TimingOverflow(&'static str),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ZeroPort => write!(f, "port must not be 0"),
            ValidationError::InvalidBind(e) => write!(f, "Invalid bind address: {e}"),
            ValidationError::ZeroTick => write!(f, "tick_ms must be at least 1"),
            ValidationError::EmptyDevice => write!(f, "device path cannot be empty"),
            ValidationError::TimingOverflow(field) => {
                write!(f, "tick_ms * {field} is too large")
            }
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("blinkd"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// LEDs that get a worker. None selected means all three.
    pub fn enabled_leds(&self) -> Vec<Led> {
        let selected: Vec<Led> = [
            (Led::Caps, self.caps),
            (Led::Num, self.num),
            (Led::Scroll, self.scroll),
        ]
        .into_iter()
        .filter_map(|(led, on)| on.then_some(led))
        .collect();
        if selected.is_empty() {
            Led::ALL.to_vec()
        } else {
            selected
        }
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.port == 0 {
            errors.push(ValidationError::ZeroPort);
        }
        if let Err(e) = self.bind.trim().parse::<IpAddr>() {
            errors.push(ValidationError::InvalidBind(format!("{:?}: {e}", self.bind)));
        }
        if self.tick_ms == 0 {
            errors.push(ValidationError::ZeroTick);
        }
        let tick = Duration::from_millis(self.tick_ms);
        for (field, ticks) in [
            ("on_time", self.on_time),
            ("off_time", self.off_time),
            ("pause_time", self.pause_time),
        ] {
            if tick.checked_mul(ticks).is_none() {
                errors.push(ValidationError::TimingOverflow(field));
            }
        }
        if self.device.trim().is_empty() {
            errors.push(ValidationError::EmptyDevice);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and freeze into the daemon's runtime configuration.
    pub fn to_daemon_config(&self) -> crate::error::Result<DaemonConfig> {
        self.validate().map_err(|errors| {
            let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
            crate::BlinkdError::Config(joined.join("; "))
        })?;
        let ip: IpAddr = self
            .bind
            .trim()
            .parse()
            .map_err(|e| crate::BlinkdError::Config(format!("Invalid bind address: {e}")))?;
        Ok(DaemonConfig {
            enabled: self.enabled_leds(),
            timing: Timing {
                tick: Duration::from_millis(self.tick_ms),
                on_ticks: self.on_time,
                off_ticks: self.off_time,
                pause_ticks: self.pause_time,
                idle: Duration::from_millis(self.idle_ms),
            },
            reopen: ReopenPolicy::from_no_reopen(self.no_reopen),
            listen: SocketAddr::new(ip, self.port),
            device: PathBuf::from(self.device.trim()),
            grace: Duration::from_millis(self.grace_ms),
        })
    }
}

/// Blink timing, identical for every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Unit of `on_ticks`, `off_ticks` and `pause_ticks`.
    pub tick: Duration,
    pub on_ticks: u32,
    pub off_ticks: u32,
    pub pause_ticks: u32,
    /// Sleep of a worker whose rate is 0.
    pub idle: Duration,
}

impl Timing {
    pub fn on(&self) -> Duration {
        self.ticks(self.on_ticks)
    }

    pub fn off(&self) -> Duration {
        self.ticks(self.off_ticks)
    }

    pub fn pause(&self) -> Duration {
        self.ticks(self.pause_ticks)
    }

    /// `n` ticks, saturating at [`Duration::MAX`].
    fn ticks(&self, n: u32) -> Duration {
        self.tick.checked_mul(n).unwrap_or(Duration::MAX)
    }
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            tick: Duration::from_millis(default_tick_ms()),
            on_ticks: default_on_time(),
            off_ticks: default_off_time(),
            pause_ticks: default_pause_time(),
            idle: Duration::from_millis(default_idle_ms()),
        }
    }
}

/// Runtime configuration, built once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    /// LEDs that get a worker, idle at start.
    pub enabled: Vec<Led>,
    pub timing: Timing,
    pub reopen: ReopenPolicy,
    pub listen: SocketAddr,
    pub device: PathBuf,
    /// How long shutdown waits for workers to stop.
    pub grace: Duration,
}
