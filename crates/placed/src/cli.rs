use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use engine::{CompositeMode, ResolveOrdering};

#[derive(Debug, Parser)]
#[command(name = "placed", about = "Replay tile placement logs into images")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Render a replay as of a cutoff and write a PNG
    Render(RenderArgs),
    /// Print a replay's canvas, palette and chunk table
    Inspect {
        #[arg(long, env = "PLACED_REPLAY")]
        replay: PathBuf,
    },
    /// Build a replay directory from a text log
    Pack(PackArgs),
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    #[arg(long, env = "PLACED_REPLAY")]
    pub replay: PathBuf,
    /// Inclusive cutoff; defaults to the last timestamp in the replay
    #[arg(long, env = "PLACED_CUTOFF_MS")]
    pub cutoff_ms: Option<u32>,
    #[arg(long, env = "PLACED_OUT")]
    pub out: PathBuf,
    #[arg(long, env = "PLACED_BACKEND", value_enum, default_value = "cpu")]
    pub backend: Backend,
    #[arg(long, env = "PLACED_ORDERING", value_enum, default_value = "position")]
    pub ordering: OrderingArg,
    #[arg(long, env = "PLACED_MODE", value_enum, default_value = "two-pass")]
    pub mode: ModeArg,
    /// RRGGBBAA or RRGGBB
    #[arg(long, env = "PLACED_BACKGROUND", value_parser = parse_rgba, default_value = "ffffffff")]
    pub background: [u8; 4],
    /// GPU only: cap on records per submission
    #[arg(long, env = "PLACED_MAX_RECORDS_PER_BATCH")]
    pub max_records_per_batch: Option<usize>,
}

#[derive(Debug, Args)]
pub struct PackArgs {
    /// Lines of `timestamp_ms,x,y,RRGGBBAA`, in log order
    #[arg(long, env = "PLACED_INPUT")]
    pub input: PathBuf,
    #[arg(long, env = "PLACED_REPLAY")]
    pub replay: PathBuf,
    #[arg(long, env = "PLACED_WIDTH")]
    pub width: u16,
    #[arg(long, env = "PLACED_HEIGHT")]
    pub height: u16,
    #[arg(long, env = "PLACED_RECORDS_PER_CHUNK", default_value_t = 1 << 16)]
    pub records_per_chunk: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OrderingArg {
    /// Highest log position wins
    Position,
    /// Newest timestamp wins, log position breaks ties
    Timestamp,
}

impl From<OrderingArg> for ResolveOrdering {
    fn from(ordering: OrderingArg) -> Self {
        match ordering {
            OrderingArg::Position => ResolveOrdering::Position,
            OrderingArg::Timestamp => ResolveOrdering::TimestampThenPosition,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    TwoPass,
    /// Racy on same-timestamp collisions
    SinglePass,
}

impl From<ModeArg> for CompositeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::TwoPass => CompositeMode::TwoPass,
            ModeArg::SinglePass => CompositeMode::BestEffortSinglePass,
        }
    }
}

pub fn parse_rgba(value: &str) -> Result<[u8; 4], String> {
    let digits = value.trim_start_matches('#');
    if !matches!(digits.len(), 6 | 8) || !digits.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return Err(format!("expected RRGGBB or RRGGBBAA hex, got {value:?}"));
    }
    let mut rgba = [0, 0, 0, 255];
    for (channel, pair) in rgba.iter_mut().zip(digits.as_bytes().chunks(2)) {
        let pair = std::str::from_utf8(pair).map_err(|error| error.to_string())?;
        *channel = u8::from_str_radix(pair, 16).map_err(|error| error.to_string())?;
    }
    Ok(rgba)
}
