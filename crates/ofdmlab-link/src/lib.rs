//! Link-level simulation: configuration, the transmit/sweep engine and its
//! statistics.

pub mod compare;
pub mod config;
pub mod engine;
pub mod papr;
pub mod progress;
pub mod stats;

use ofdmlab_channel::ChannelError;
use ofdmlab_modem::ModemError;

pub use compare::{compare_bandwidths, BandwidthComparison};
pub use config::{
    lte_bandwidths, ChannelConfig, CyclicPrefix, LinkConfig, LinkParams, TransmissionMetrics,
};
pub use engine::{LinkEngine, PaprCollection, SweepResult, TransmissionResult};
pub use papr::PaprStats;
pub use progress::{NoProgress, ProgressError, ProgressSink};
pub use stats::SampleSummary;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error(transparent)]
    Modem(#[from] ModemError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
