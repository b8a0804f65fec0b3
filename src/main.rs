use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::{Parser, Subcommand};

use ezdl::{
    constants::{DEFAULT_BAUDRATE, DEFAULT_TIMEOUT},
    transport::{DummyProgrammer, SerialConfig, SerialTransport},
    Connected, Flashing, Mcu, Transport,
};

#[derive(Parser)]
#[command(
    name = "ezdl",
    about = "Command-line tool for flashing AT89C5x MCUs with an EZDL programmer"
)]
struct Cli {
    /// Serial port of the programmer, e.g. /dev/ttyUSB0
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    #[arg(short, long, default_value_t = DEFAULT_BAUDRATE)]
    baud: u32,

    /// Per-byte timeout, in seconds
    #[arg(short, long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout: u64,

    /// Talk to an emulated programmer holding this chip (89C51, 89C52, 89C55)
    #[arg(long, value_name = "MCU")]
    dummy: Option<String>,

    /// Verbose output, repeat for wire traces
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Get programmer title and info about the chip in the socket
    Info,
    /// Get programming parameters
    Pgm,
    /// Get checksum of chip memory
    Checksum,
    /// Show the programmer's built-in command list
    Manual,
    /// Set the programmer byte cursor
    SetCursor { position: usize },
    /// Erase code flash
    Erase,
    /// Lock code flash
    Lock,
    /// Erase, download HEX file to code flash and verify
    Write { path: PathBuf },
    /// Read code flash into a HEX file
    Read {
        path: PathBuf,
        /// Bytes to read, defaults to the whole chip
        #[arg(short, long)]
        length: Option<usize>,
    },
    /// Verify code flash against a HEX file
    Verify { path: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let _ = simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    match cli.dummy.as_deref() {
        Some(mcu) => {
            let dummy = DummyProgrammer::new(mcu.parse::<Mcu>()?);
            let flashing = Flashing::with_opener(move |_| Ok(dummy.clone()));
            run(flashing, &cli)
        }
        None => {
            let config = SerialConfig {
                port: cli.port.clone(),
                baud_rate: cli.baud,
                timeout: Duration::from_secs(cli.timeout),
            };
            let flashing = Flashing::with_opener(move |port| {
                SerialTransport::open_with_config(&SerialConfig {
                    port: port.to_string(),
                    ..config.clone()
                })
            });
            run(flashing, &cli)
        }
    }
}

fn run<T: Transport>(mut flashing: Flashing<T>, cli: &Cli) -> Result<()> {
    if let Connected::Established { title } = flashing.connect(&cli.port)? {
        log::info!("Connected to {}: {}", cli.port, title);
    }

    match &cli.command {
        Command::Info => {
            let info = flashing.get_info()?;
            log::info!("{}", info);
        }
        Command::Pgm => {
            let params = flashing.get_pgm_params()?;
            log::info!("PGM: {}", params);
        }
        Command::Checksum => {
            let checksum = flashing.get_checksum()?;
            log::info!("Checksum: 0x{:04x}", checksum);
        }
        Command::Manual => {
            println!("{}", flashing.get_help()?);
        }
        Command::SetCursor { position } => {
            flashing.set_cursor(*position)?;
            log::info!("Byte cursor set to {}", position);
        }
        Command::Erase => flashing.erase()?,
        Command::Lock => flashing.lock()?,
        Command::Write { path } => {
            flashing.write(path)?;
            log::info!("Written and verified {}", path.display());
        }
        Command::Read { path, length } => {
            match length {
                Some(len) => flashing.read_len(path, *len)?,
                None => flashing.read(path)?,
            }
            log::info!("Saved chip memory to {}", path.display());
        }
        Command::Verify { path } => {
            flashing.verify(path)?;
            log::info!("Verified!");
        }
    }

    flashing.disconnect()?;
    Ok(())
}
