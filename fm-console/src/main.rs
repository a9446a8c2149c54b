//! fmctl - drive the FM receiver control core against a simulated receiver
//!
//! ```text
//! fmctl [--config PATH] [--json] [scan | tune <MHz> | seek [up|down] | status]
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fm_protocol::{Frequency, ScanDirection};
use fm_receiver::{FmRadio, ReceiverConfig, ReceiverState, RDS_EVENT_PS, RDS_EVENT_RT};
use fm_sim::{Station, VirtualReceiver, VirtualReceiverConfig};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Drive the FM receiver control core against a simulated receiver
#[derive(Parser)]
#[command(name = "fmctl", version, about)]
struct Cli {
    /// Config file; defaults to config.json in the user config directory
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print state and scan results as JSON
    #[arg(long)]
    json: bool,

    /// What to do once powered up; scans when omitted
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the whole band and list the stations found
    Scan,

    /// Tune to a frequency and print its RDS text
    Tune {
        /// Frequency in MHz, e.g. 97.3
        mhz: f64,
    },

    /// Seek to the next station
    Seek {
        #[arg(default_value = "up", value_enum)]
        direction: Direction,
    },

    /// Print the receiver status
    Status,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Direction {
    Up,
    Down,
}

impl From<Direction> for ScanDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Up => ScanDirection::Up,
            Direction::Down => ScanDirection::Down,
        }
    }
}

fn demo_stations() -> Vec<Station> {
    vec![
        Station::new(Frequency(8790), -62).with_ps("KQED").with_pty(3),
        Station::new(Frequency(8910), -70).with_ps("KALW"),
        Station::new(Frequency(9530), -48)
            .with_ps("WXYZ")
            .with_rt("Hello from the virtual receiver"),
        Station::new(Frequency(10130), -80).with_ps("KBLX").with_tp(),
        Station::new(Frequency(10790), -66).with_ps("KOIT"),
    ]
}

#[derive(Serialize)]
struct ScanReport<'a> {
    channels: &'a [u16],
    frequencies_mhz: Vec<f64>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "fmctl=info,fm_protocol=info,fm_receiver=info,fm_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ReceiverConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ReceiverConfig::load_default().context("loading default config")?,
    };
    let band = config.band();
    tracing::info!(
        region = config.region.name(),
        low = %band.low,
        high = %band.high,
        "starting fmctl"
    );

    let receiver = Arc::new(VirtualReceiver::new(VirtualReceiverConfig {
        band,
        stations: demo_stations(),
        ..VirtualReceiverConfig::default()
    }));
    let radio = FmRadio::new(receiver.clone(), config).context("building radio")?;
    radio.open().context("opening receiver")?;
    radio.power_up(band.low).context("powering up")?;

    match cli.command.unwrap_or(Command::Scan) {
        Command::Scan => {
            let result = radio.auto_scan()?;
            if cli.json {
                let report = ScanReport {
                    channels: result.channels(),
                    frequencies_mhz: result.frequencies.iter().map(|f| f.mhz()).collect(),
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if result.is_empty() {
                println!("no stations");
            } else {
                for (channel, frequency) in result.channels.iter().zip(&result.frequencies) {
                    println!("{:>4}  {}", channel, frequency);
                }
            }
        }
        Command::Tune { mhz } => {
            radio.tune(Frequency::from_mhz(mhz))?;
            radio.set_rds(true)?;
            print_rds(&radio);
            print_state(&radio.snapshot(), cli.json)?;
        }
        Command::Seek { direction } => match radio.seek(direction.into())? {
            Some(frequency) => println!("found {}", frequency),
            None => println!("no new station"),
        },
        Command::Status => print_state(&radio.refresh_status()?, cli.json)?,
    }

    tracing::debug!(summary = %receiver.state_summary(), "virtual receiver");
    radio.power_down()?;
    radio.close();
    Ok(())
}

// Give the RDS decoder a moment, then drain what it produced
fn print_rds(radio: &FmRadio) {
    thread::sleep(Duration::from_millis(50));
    loop {
        match radio.read_rds() {
            RDS_EVENT_PS => println!("PS: {}", radio.get_ps().unwrap_or_default()),
            RDS_EVENT_RT => println!("RT: {}", radio.get_lr_text().unwrap_or_default()),
            _ => break,
        }
    }
}

fn print_state(state: &ReceiverState, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(state)?);
    } else {
        println!(
            "{}  rssi {}  snr {}  {}",
            state.frequency_display(),
            state.rssi,
            state.snr,
            if state.muted { "muted" } else { "audible" }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_scan() {
        let cli = Cli::try_parse_from(["fmctl", "--json"]).unwrap();
        assert!(cli.json);
        assert!(cli.command.is_none());
    }

    #[test]
    fn tune_takes_megahertz() {
        let cli = Cli::try_parse_from(["fmctl", "tune", "97.3"]).unwrap();
        match cli.command {
            Some(Command::Tune { mhz }) => assert_eq!(Frequency::from_mhz(mhz), Frequency(9730)),
            _ => panic!("expected tune"),
        }
    }

    #[test]
    fn seek_defaults_up_and_accepts_down() {
        let cli = Cli::try_parse_from(["fmctl", "seek"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Seek { direction: Direction::Up })));

        let cli = Cli::try_parse_from(["fmctl", "--config", "radio.json", "seek", "down"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("radio.json")));
        assert!(matches!(cli.command, Some(Command::Seek { direction: Direction::Down })));
    }

    #[test]
    fn unknown_direction_is_refused() {
        assert!(Cli::try_parse_from(["fmctl", "seek", "sideways"]).is_err());
    }
}
