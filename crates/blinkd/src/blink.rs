//! blink: tell a blinkd daemon how often to blink an LED.

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use blinkd_lib::client::{self, RateRequest};
use blinkd_lib::led::Led;
use blinkd_lib::protocol::DEFAULT_PORT;

#[derive(Parser)]
#[command(
    name = "blink",
    version,
    about = "Set the blink rate of a keyboard LED on a host running blinkd",
    after_help = "Without an LED option every LED is reset to rate 0."
)]
struct Args {
    /// Caps-Lock LED
    #[arg(short = 'c', long = "capslockled", group = "led")]
    caps: bool,

    /// Num-Lock LED
    #[arg(short = 'n', long = "numlockled", group = "led")]
    num: bool,

    /// Scroll-Lock LED
    #[arg(short = 's', long = "scrolllockled", group = "led")]
    scroll: bool,

    /// Host running blinkd
    #[arg(short, long, value_name = "HOST", default_value = "localhost")]
    machine: String,

    /// Blinks per cycle (0 to 29), or + / - to step the current rate
    #[arg(
        short,
        long,
        value_name = "N|+|-",
        default_value = "0",
        allow_hyphen_values = true
    )]
    rate: RateRequest,

    /// TCP port of blinkd
    #[arg(short = 't', long, value_name = "PORT", default_value_t = DEFAULT_PORT)]
    tcp_port: u16,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn led(&self) -> Option<Led> {
        if self.caps {
            Some(Led::Caps)
        } else if self.num {
            Some(Led::Num)
        } else if self.scroll {
            Some(Led::Scroll)
        } else {
            None
        }
    }
}

fn main() {
    let args = Args::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    builder.format_timestamp(None).format_target(false);
    if args.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    let (rate, clamped) = args.rate.clamped();
    if clamped {
        eprintln!("Error.  {}", client::out_of_range_message());
    }

    let command = match client::build_command(args.led(), rate) {
        Ok(c) => c,
        Err(e) => Args::command()
            .error(ErrorKind::ArgumentConflict, e.to_string())
            .exit(),
    };

    if let Err(e) = client::send_command((args.machine.as_str(), args.tcp_port), &command) {
        eprintln!("Error: {}:{}: {e}", args.machine, args.tcp_port);
        std::process::exit(1);
    }
}
