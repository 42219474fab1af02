//! Console LED register access: trait, Linux backend, test mock.

use std::fmt;
use std::path::{Path, PathBuf};

// ── Error type ──

/// Console LED register errors.
#[derive(Debug)]
pub enum DeviceError {
    /// The console device could not be opened.
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Reading the LED register (`KDGETLED`) failed.
    Read(std::io::Error),
    /// Writing the LED register (`KDSETLED`) failed.
    Write(std::io::Error),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Open { path, source } => {
                write!(f, "Failed to open {}: {source}", path.display())
            }
            DeviceError::Read(e) => write!(f, "KDGETLED failed: {e}"),
            DeviceError::Write(e) => write!(f, "KDSETLED failed: {e}"),
        }
    }
}

impl std::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeviceError::Open { source, .. } => Some(source),
            DeviceError::Read(e) | DeviceError::Write(e) => Some(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;

// ── Traits ──

/// Something that can hand out a handle to the keyboard LED register.
///
/// The register belongs to whichever virtual terminal is active when the
/// handle is opened, so callers reopen to follow terminal switches.
pub trait Console: Send + Sync {
    type Register: LedRegister;

    fn open(&self) -> Result<Self::Register>;

    /// Human-readable location, for log lines.
    fn describe(&self) -> String;
}

/// An open handle to the LED register. Dropping it closes the handle.
pub trait LedRegister: Send {
    /// Current LED register value.
    fn get_leds(&self) -> Result<u8>;
    /// Replace the LED register value.
    fn set_leds(&self, value: u8) -> Result<()>;
}

/// Default console device.
pub const DEFAULT_CONSOLE: &str = "/dev/console";

// ── Linux backend ──

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use std::fs::File;
    use std::os::unix::io::AsRawFd;

    // From linux/kd.h
    const KDGETLED: u32 = 0x4B31;
    const KDSETLED: u32 = 0x4B32;

    /// A Linux virtual console (`/dev/console`, `/dev/tty0`, ...).
    #[derive(Debug, Clone)]
    pub struct VirtualConsole {
        path: PathBuf,
    }

    impl VirtualConsole {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }
    }

    /// Read-only file handle on the console; the LED ioctls need no write access.
    pub struct ConsoleRegister {
        file: File,
    }

    impl Console for VirtualConsole {
        type Register = ConsoleRegister;

        fn open(&self) -> Result<ConsoleRegister> {
            let file = File::options()
                .read(true)
                .open(&self.path)
                .map_err(|source| DeviceError::Open {
                    path: self.path.clone(),
                    source,
                })?;
            Ok(ConsoleRegister { file })
        }

        fn describe(&self) -> String {
            self.path.display().to_string()
        }
    }

    impl LedRegister for ConsoleRegister {
        fn get_leds(&self) -> Result<u8> {
            let mut value: libc::c_char = 0;
            // SAFETY: KDGETLED writes a single char through the pointer, which
            // points to a live local for the duration of the call.
            let ret = unsafe {
                libc::ioctl(
                    self.file.as_raw_fd(),
                    KDGETLED as _,
                    &mut value as *mut libc::c_char,
                )
            };
            if ret < 0 {
                return Err(DeviceError::Read(std::io::Error::last_os_error()));
            }
            Ok(value as u8)
        }

        fn set_leds(&self, value: u8) -> Result<()> {
            // SAFETY: KDSETLED takes the LED bits by value; no memory is passed.
            let ret = unsafe {
                libc::ioctl(
                    self.file.as_raw_fd(),
                    KDSETLED as _,
                    libc::c_ulong::from(value),
                )
            };
            if ret < 0 {
                return Err(DeviceError::Write(std::io::Error::last_os_error()));
            }
            Ok(())
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux_impl::{ConsoleRegister, VirtualConsole};

// ── Stub console for unsupported platforms ──

/// Placeholder console that always fails to open.
/// Enables compilation and `cargo test` on hosts without `KDSETLED`.
#[cfg(not(target_os = "linux"))]
#[derive(Debug, Clone)]
pub struct StubConsole {
    path: PathBuf,
}

#[cfg(not(target_os = "linux"))]
impl StubConsole {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Register type of [`StubConsole`]; never constructed.
#[cfg(not(target_os = "linux"))]
pub enum StubRegister {}

#[cfg(not(target_os = "linux"))]
impl Console for StubConsole {
    type Register = StubRegister;

    fn open(&self) -> Result<StubRegister> {
        Err(DeviceError::Open {
            path: self.path.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "console LEDs are only supported on Linux",
            ),
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(not(target_os = "linux"))]
impl LedRegister for StubRegister {
    fn get_leds(&self) -> Result<u8> {
        match *self {}
    }
    fn set_leds(&self, _value: u8) -> Result<()> {
        match *self {}
    }
}

/// Concrete console type for the current platform.
#[cfg(target_os = "linux")]
pub type PlatformConsole = VirtualConsole;
#[cfg(not(target_os = "linux"))]
pub type PlatformConsole = StubConsole;

/// The platform console at `path`. Nothing is opened until first use.
pub fn platform_console(path: &Path) -> PlatformConsole {
    PlatformConsole::new(path)
}

// ── Mock backend ──

/// In-memory console for tests: records every register access.
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    use crate::led::Led;

    /// One recorded console operation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Event {
        Open,
        Get,
        Set(u8),
        Close,
    }

    #[derive(Debug, Default)]
    struct State {
        leds: u8,
        events: Vec<Event>,
        fail_open: bool,
        fail_next_get: bool,
        fail_next_set: bool,
        open_handles: usize,
    }

    /// Mock console. Clones share state, so a test can keep one clone and
    /// hand another to the daemon.
    #[derive(Debug, Clone, Default)]
    pub struct MockConsole {
        state: Arc<Mutex<State>>,
    }

    impl MockConsole {
        pub fn new() -> Self {
            Self::default()
        }

        fn state(&self) -> MutexGuard<'_, State> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Current register value.
        pub fn leds(&self) -> u8 {
            self.state().leds
        }

        /// Preset the register value (e.g. Num-Lock already lit by the user).
        pub fn set_initial_leds(&self, value: u8) {
            self.state().leds = value;
        }

        /// All recorded events, oldest first.
        pub fn events(&self) -> Vec<Event> {
            self.state().events.clone()
        }

        /// Number of handles currently open.
        pub fn open_handles(&self) -> usize {
            self.state().open_handles
        }

        /// Make every subsequent `open` fail (or succeed again).
        pub fn set_fail_open(&self, fail: bool) {
            self.state().fail_open = fail;
        }

        /// Make the next register read fail once.
        pub fn fail_next_get(&self) {
            self.state().fail_next_get = true;
        }

        /// Make the next register write fail once.
        pub fn fail_next_set(&self) {
            self.state().fail_next_set = true;
        }

        /// Number of writes that switched `led` from off to on.
        pub fn times_lit(&self, led: Led) -> usize {
            count_rises(&self.events(), led)
        }
    }

    /// Count off→on transitions of `led` across the `Set` events in `events`.
    pub fn count_rises(events: &[Event], led: Led) -> usize {
        let mut lit = false;
        let mut rises = 0;
        for event in events {
            if let Event::Set(value) = event {
                let now = value & led.bit() != 0;
                if now && !lit {
                    rises += 1;
                }
                lit = now;
            }
        }
        rises
    }

    /// Split a recorded event stream into complete open→close sessions.
    pub fn sessions(events: &[Event]) -> Vec<Vec<Event>> {
        let mut out = Vec::new();
        let mut current: Option<Vec<Event>> = None;
        for &event in events {
            match event {
                Event::Open => current = Some(Vec::new()),
                Event::Close => {
                    if let Some(session) = current.take() {
                        out.push(session);
                    }
                }
                other => {
                    if let Some(session) = current.as_mut() {
                        session.push(other);
                    }
                }
            }
        }
        out
    }

    /// Open handle on a [`MockConsole`]. Records `Close` when dropped.
    pub struct MockRegister {
        state: Arc<Mutex<State>>,
    }

    impl MockRegister {
        fn state(&self) -> MutexGuard<'_, State> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl Console for MockConsole {
        type Register = MockRegister;

        fn open(&self) -> Result<MockRegister> {
            let mut state = self.state();
            if state.fail_open {
                return Err(DeviceError::Open {
                    path: PathBuf::from("mock://console"),
                    source: std::io::Error::new(
                        std::io::ErrorKind::PermissionDenied,
                        "mock: open failure injected",
                    ),
                });
            }
            state.events.push(Event::Open);
            state.open_handles += 1;
            Ok(MockRegister {
                state: Arc::clone(&self.state),
            })
        }

        fn describe(&self) -> String {
            "mock://console".into()
        }
    }

    impl LedRegister for MockRegister {
        fn get_leds(&self) -> Result<u8> {
            let mut state = self.state();
            if std::mem::take(&mut state.fail_next_get) {
                return Err(DeviceError::Read(std::io::Error::other(
                    "mock: KDGETLED failure injected",
                )));
            }
            state.events.push(Event::Get);
            Ok(state.leds)
        }

        fn set_leds(&self, value: u8) -> Result<()> {
            let mut state = self.state();
            if std::mem::take(&mut state.fail_next_set) {
                return Err(DeviceError::Write(std::io::Error::other(
                    "mock: KDSETLED failure injected",
                )));
            }
            state.events.push(Event::Set(value));
            state.leds = value;
            Ok(())
        }
    }

    impl Drop for MockRegister {
        fn drop(&mut self) {
            let mut state = self.state();
            state.events.push(Event::Close);
            state.open_handles = state.open_handles.saturating_sub(1);
        }
    }
}
