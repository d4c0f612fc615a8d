use std::io::Write;

use clap::{Args, Parser, Subcommand};
use ofdmlab_channel::{profile_entry, profile_names, ChannelKind};
use ofdmlab_link::papr::threshold_grid;
use ofdmlab_link::{
    compare_bandwidths, ChannelConfig, CyclicPrefix, LinkConfig, LinkEngine, LinkError,
    LinkParams, PaprStats, TransmissionMetrics, TransmissionResult,
};
use ofdmlab_modem::Modulation;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const CCDF_STOP_DB: f64 = 14.0;

#[derive(Parser, Debug)]
#[command(name = "ofdmlab", about = "OFDM / SC-FDM link-level simulator")]
struct Cli {
    #[command(flatten)]
    link: LinkArgs,
    #[command(flatten)]
    channel: ChannelArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct LinkArgs {
    /// Channel bandwidth in MHz.
    #[arg(long, global = true, default_value_t = 5.0)]
    bandwidth: f64,
    /// Subcarrier spacing in kHz.
    #[arg(long, global = true, default_value_t = 15.0)]
    spacing: f64,
    /// Cyclic prefix type (normal or extended).
    #[arg(long, global = true, default_value = "normal")]
    cp: CyclicPrefix,
    /// QPSK, 16-QAM or 64-QAM.
    #[arg(long, global = true, default_value = "QPSK")]
    modulation: Modulation,
    /// Enable DFT precoding.
    #[arg(long, global = true)]
    sc_fdm: bool,
    /// Explicit FFT size; requires --subcarriers and --cp-length.
    #[arg(long, global = true)]
    fft_size: Option<usize>,
    #[arg(long, global = true)]
    subcarriers: Option<usize>,
    /// Cyclic prefix length in samples.
    #[arg(long, global = true)]
    cp_length: Option<usize>,
}

#[derive(Args, Debug)]
struct ChannelArgs {
    /// awgn or rayleigh.
    #[arg(long, global = true, default_value = "awgn")]
    channel: ChannelKind,
    /// Multipath profile name.
    #[arg(long, global = true, default_value = "Pedestrian A")]
    profile: String,
    #[arg(long, global = true)]
    carrier_ghz: Option<f64>,
    #[arg(long, global = true)]
    velocity_kmh: Option<f64>,
    /// Seed for reproducible runs.
    #[arg(long, global = true)]
    seed: Option<u64>,
    /// Detect multipath subcarriers without zero-forcing them first.
    #[arg(long, global = true)]
    no_equalization: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one random payload through the link.
    Transmit {
        #[arg(long, default_value_t = 10_000)]
        bits: usize,
        #[arg(long, default_value_t = 10.0, allow_negative_numbers = true)]
        snr: f64,
    },
    /// Monte-Carlo BER/SER sweep over SNR.
    Sweep {
        #[arg(long, default_value_t = 10_000)]
        bits: usize,
        /// Comma-separated SNR points in dB.
        #[arg(
            long,
            value_delimiter = ',',
            allow_hyphen_values = true,
            default_value = "-5,0,5,10,15,20"
        )]
        snr: Vec<f64>,
        #[arg(long, default_value_t = 10)]
        iterations: usize,
        /// Sweep QPSK, 16-QAM and 64-QAM in turn.
        #[arg(long)]
        all_modulations: bool,
    },
    /// Pooled PAPR and its CCDF for OFDM and SC-FDM.
    Papr {
        #[arg(long, default_value_t = 10_000)]
        bits: usize,
        #[arg(long, default_value_t = 10)]
        transmissions: usize,
        #[arg(long, default_value_t = 30.0, allow_negative_numbers = true)]
        snr: f64,
        /// CCDF threshold step in dB.
        #[arg(long, default_value_t = 0.25)]
        step: f64,
    },
    /// Compare BER and throughput across channel bandwidths.
    Bandwidths {
        #[arg(long, default_value_t = 10_000)]
        bits: usize,
        #[arg(long, default_value_t = 10.0, allow_negative_numbers = true)]
        snr: f64,
        /// Comma-separated bandwidths in MHz.
        #[arg(long, value_delimiter = ',', default_value = "1.25,2.5,5,10,15,20")]
        list: Vec<f64>,
    },
    /// List the built-in multipath profiles.
    Profiles,
}

#[derive(Serialize)]
struct TransmitReport<'a> {
    config: &'a LinkConfig,
    metrics: TransmissionMetrics,
    result: &'a TransmissionResult,
}

#[derive(Serialize)]
struct PaprReport {
    modulation: Modulation,
    sc_fdm: bool,
    stats: PaprStats,
    thresholds_db: Vec<f64>,
    ccdf: Vec<f64>,
}

#[derive(Serialize)]
struct ProfileReport {
    name: &'static str,
    description: &'static str,
    delays_us: &'static [f64],
    gains_db: &'static [f64],
    frequency_ghz: (f64, f64),
    velocity_kmh: (f64, f64),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let channel = ChannelConfig {
        kind: cli.channel.channel,
        profile: Some(cli.channel.profile.clone()),
        carrier_ghz: cli.channel.carrier_ghz,
        velocity_kmh: cli.channel.velocity_kmh,
        seed: cli.channel.seed,
    };
    let mut progress = |percent: f64, message: &str| debug!(percent, "{message}");

    match &cli.command {
        Command::Profiles => return print_json(&profiles()),
        Command::Bandwidths { bits, snr, list } => {
            let rows = compare_bandwidths(
                &link_params(&cli.link),
                list,
                &channel,
                *bits,
                *snr,
                &mut progress,
            )?;
            return print_json(&rows);
        }
        _ => {}
    }

    let config = link_config(&cli.link)?;
    info!(
        fft_size = config.fft_size(),
        subcarriers = config.active_subcarriers(),
        cp_length = config.cp_length(),
        modulation = %config.modulation(),
        channel = %channel.kind,
        "link configured"
    );
    let mut engine = LinkEngine::new(config, channel)?;
    engine.set_equalization(!cli.channel.no_equalization);

    match cli.command {
        Command::Transmit { bits, snr } => {
            let payload = engine.random_bits(bits);
            let result = engine.transmit(&payload, snr)?;
            info!(ber = result.ber, errors = result.errors, "transmission done");
            print_json(&TransmitReport {
                config: engine.config(),
                metrics: engine.config().transmission_metrics(bits),
                result: &result,
            })
        }
        Command::Sweep {
            bits,
            snr,
            iterations,
            all_modulations,
        } => {
            if all_modulations {
                let results =
                    engine.run_ber_sweep_all_modulations(bits, &snr, iterations, None, &mut progress)?;
                print_json(&results)
            } else {
                let result = engine.run_ber_sweep(bits, &snr, iterations, None, &mut progress)?;
                print_json(&result)
            }
        }
        Command::Papr {
            bits,
            transmissions,
            snr,
            step,
        } => {
            let thresholds = threshold_grid(0.0, CCDF_STOP_DB, step);
            let collections =
                engine.collect_papr_for_all_modulations(bits, transmissions, snr, &mut progress)?;
            let reports: Vec<_> = collections
                .iter()
                .map(|c| PaprReport {
                    modulation: c.modulation,
                    sc_fdm: c.sc_fdm,
                    stats: c.stats,
                    ccdf: c.ccdf(&thresholds),
                    thresholds_db: thresholds.clone(),
                })
                .collect();
            print_json(&reports)
        }
        Command::Profiles | Command::Bandwidths { .. } => Ok(()),
    }
}

fn link_config(args: &LinkArgs) -> Result<LinkConfig, LinkError> {
    let config = match (args.fft_size, args.subcarriers, args.cp_length) {
        (Some(n), Some(nc), Some(cp)) => {
            LinkConfig::custom(n, nc, cp, args.modulation, args.spacing)?
        }
        (None, None, None) => LinkConfig::from_params(&link_params(args))?,
        _ => {
            return Err(LinkError::InvalidConfig(
                "--fft-size, --subcarriers and --cp-length must be given together".to_string(),
            ))
        }
    };
    Ok(config.with_sc_fdm(args.sc_fdm))
}

fn link_params(args: &LinkArgs) -> LinkParams {
    LinkParams {
        bandwidth_mhz: args.bandwidth,
        subcarrier_spacing_khz: args.spacing,
        cyclic_prefix: args.cp,
        modulation: args.modulation,
        sc_fdm: args.sc_fdm,
    }
}

fn profiles() -> Vec<ProfileReport> {
    profile_names()
        .filter_map(profile_entry)
        .map(|(name, entry)| ProfileReport {
            name,
            description: entry.description,
            delays_us: entry.delays_us,
            gains_db: entry.gains_db,
            frequency_ghz: entry.frequency_ghz,
            velocity_kmh: entry.velocity_kmh,
        })
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
