//! Argument parsing for running from the command line

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Raw unsigned 8-bit IQ recording to replay (a synthetic tone is used otherwise)
    #[clap(short, long)]
    pub input: Option<PathBuf>,
    /// Center frequency in MHz
    #[clap(short, long, default_value_t = crate::DEFAULT_FREQ_MHZ)]
    pub frequency: f64,
    /// Frequency of the synthetic tone in MHz
    #[clap(long, default_value_t = 124.45)]
    pub tone: f64,
    /// Exposure added to a cell per sample
    #[clap(long, default_value_t = crate::DEFAULT_INTENSITY)]
    pub intensity: f32,
    /// Bytes per acquisition block
    #[clap(short, long, default_value_t = crate::BLOCK_LENGTH, value_parser = valid_block_length)]
    pub block_length: usize,
    /// Display frames per second
    #[clap(long, default_value_t = 30)]
    #[clap(value_parser = clap::value_parser!(u32).range(1..=240))]
    pub fps: u32,
    /// Blocks written per raw capture
    #[clap(long, default_value_t = 16)]
    pub capture_blocks: usize,
    /// Capture ring buffer capacity in blocks
    #[clap(short, long, default_value_t = 256)]
    pub capacity: usize,
    /// Directory captures and snapshots are written to
    #[clap(short, long, default_value = ".")]
    pub output_dir: PathBuf,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}

fn valid_block_length(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|_| "Invalid integer".to_string())?;
    if n == 0 || n % 2 != 0 {
        return Err("Block length must be a non-zero number of IQ pairs".to_string());
    }
    Ok(n)
}
