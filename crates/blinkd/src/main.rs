//! blinkd: blinks the console keyboard LEDs at rates set over TCP.
//!
//! Runs in the foreground. SIGINT, SIGTERM and SIGHUP switch the LEDs off
//! and exit.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;

use blinkd_lib::config::Config;
use blinkd_lib::daemon::Daemon;
use blinkd_lib::device::platform_console;
use blinkd_lib::error::Result;
use blinkd_lib::led::Led;

#[derive(Parser)]
#[command(
    name = "blinkd",
    version,
    about = "Blink the keyboard LEDs of the Linux console on request from the network"
)]
struct Args {
    /// Blink the Caps-Lock LED
    #[arg(short = 'c', long = "capslockled")]
    caps: bool,

    /// Blink the Num-Lock LED
    #[arg(short = 'n', long = "numlockled")]
    num: bool,

    /// Blink the Scroll-Lock LED
    #[arg(short = 's', long = "scrolllockled")]
    scroll: bool,

    /// Ticks an LED stays lit
    #[arg(short = 'o', long, value_name = "TICKS")]
    on_time: Option<u32>,

    /// Ticks an LED stays dark between blinks
    #[arg(short = 'f', long, value_name = "TICKS")]
    off_time: Option<u32>,

    /// Ticks of pause after each series of blinks
    #[arg(short = 'p', long, value_name = "TICKS")]
    pause: Option<u32>,

    /// Keep the console open instead of reopening it every cycle
    #[arg(short = 'r', long)]
    no_reopen: bool,

    /// TCP port to listen on
    #[arg(short = 't', long, value_name = "PORT")]
    tcp_port: Option<u16>,

    /// Address to listen on
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Console device to drive
    #[arg(long, value_name = "PATH")]
    device: Option<PathBuf>,

    /// Config file (default: platform config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Append log output to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Overlay the command line on `config`.
    ///
    /// LED flags given on the command line replace the file's selection.
    fn apply(&self, config: &mut Config) {
        if self.caps || self.num || self.scroll {
            config.caps = self.caps;
            config.num = self.num;
            config.scroll = self.scroll;
        }
        if let Some(v) = self.on_time {
            config.on_time = v;
        }
        if let Some(v) = self.off_time {
            config.off_time = v;
        }
        if let Some(v) = self.pause {
            config.pause_time = v;
        }
        if self.no_reopen {
            config.no_reopen = true;
        }
        if let Some(v) = self.tcp_port {
            config.port = v;
        }
        if let Some(v) = &self.bind {
            config.bind = v.clone();
        }
        if let Some(v) = &self.device {
            config.device = v.display().to_string();
        }
    }
}

#[derive(Serialize)]
struct ConfigOutput {
    config_file: Option<String>,
    config_file_exists: bool,
    enabled_leds: Vec<Led>,
    settings: Config,
}

fn init_logger(verbose: bool, log_file: Option<&Path>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_target(false);
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }

    if let Some(path) = log_file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!(
                    "Warning: cannot open log file {}: {e}; logging to stderr",
                    path.display()
                );
            }
        }
    }

    builder.init();
}

fn load_config(args: &Args) -> (Config, Option<PathBuf>) {
    let (mut config, warnings) = match &args.config {
        Some(p) => Config::load_from(p),
        None => Config::load_with_warnings(),
    };
    let path = args.config.clone().or_else(Config::path);
    for w in &warnings {
        log::warn!("[config] {w}");
    }
    args.apply(&mut config);
    (config, path)
}

fn print_config(config: Config, path: Option<PathBuf>) -> Result<()> {
    let output = ConfigOutput {
        config_file_exists: path.as_ref().is_some_and(|p| p.exists()),
        config_file: path.map(|p| p.display().to_string()),
        enabled_leds: config.enabled_leds(),
        settings: config,
    };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| blinkd_lib::BlinkdError::Config(e.to_string()))?;
    println!("{json}");
    Ok(())
}

fn run(config: Config) -> Result<()> {
    let daemon_config = config.to_daemon_config()?;
    let console = platform_console(&daemon_config.device);
    let daemon = Daemon::start(daemon_config, console)?;
    let handler = daemon.shutdown_handler();

    {
        let handler = Arc::clone(&handler);
        if let Err(e) = ctrlc::set_handler(move || {
            handler.shutdown(0);
        }) {
            log::warn!("could not install signal handler: {e}");
        }
    }

    match daemon.serve() {
        Ok(()) => handler.shutdown(0),
        Err(e) => {
            log::error!("{e}");
            handler.shutdown(1)
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logger(args.verbose, args.log_file.as_deref());

    let (config, path) = load_config(&args);
    let result = if args.print_config {
        print_config(config, path)
    } else {
        run(config)
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("blinkd").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn cli_overrides_file() {
        let mut config = Config {
            port: 4000,
            on_time: 9,
            ..Config::default()
        };
        parse(&["-t", "5000", "-o", "1", "-f", "3", "-p", "4", "-r"]).apply(&mut config);
        assert_eq!(config.port, 5000);
        assert_eq!((config.on_time, config.off_time, config.pause_time), (1, 3, 4));
        assert!(config.no_reopen);
    }

    #[test]
    fn led_flags_replace_file_selection() {
        let mut config = Config {
            caps: true,
            ..Config::default()
        };
        parse(&["-n"]).apply(&mut config);
        assert_eq!(config.enabled_leds(), vec![Led::Num]);
    }

    #[test]
    fn no_led_flags_keep_file_selection() {
        let mut config = Config {
            scroll: true,
            ..Config::default()
        };
        parse(&[]).apply(&mut config);
        assert_eq!(config.enabled_leds(), vec![Led::Scroll]);
    }

    #[test]
    fn device_and_bind_override() {
        let mut config = Config::default();
        parse(&["--device", "/dev/tty3", "--bind", "127.0.0.1"]).apply(&mut config);
        assert_eq!(config.device, "/dev/tty3");
        assert_eq!(config.bind, "127.0.0.1");
    }

    #[test]
    fn verbose_short_and_long() {
        assert!(parse(&["-v"]).verbose);
        assert!(parse(&["--verbose"]).verbose);
    }
}
