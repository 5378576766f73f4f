use std::io::BufRead;

use anyhow::{Context, Result, bail};
use model::CanvasSize;
use replay_protocol::{Replay, ReplayWriter};

use crate::cli::{PackArgs, parse_rgba};

pub fn run(args: PackArgs) -> Result<()> {
    let file = std::fs::File::open(&args.input)
        .with_context(|| format!("open {}", args.input.display()))?;
    let canvas = CanvasSize::new(args.width, args.height);
    let replay = pack_lines(std::io::BufReader::new(file), canvas, args.records_per_chunk)?;
    replay.manifest.validate(replay.placements.len() as u64)?;
    replay
        .save(&args.replay)
        .with_context(|| format!("save replay {}", args.replay.display()))?;
    tracing::info!(
        records = replay.manifest.record_count(),
        chunks = replay.manifest.chunks.len(),
        colors = replay.manifest.palette.len(),
        "replay packed"
    );
    Ok(())
}

/// Reads `timestamp_ms,x,y,RRGGBBAA` lines. Blank lines and `#` comments are
/// skipped; record order is kept as given.
pub fn pack_lines(
    reader: impl BufRead,
    canvas: CanvasSize,
    records_per_chunk: u32,
) -> Result<Replay> {
    let mut writer = ReplayWriter::new(canvas, records_per_chunk);
    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.with_context(|| format!("read line {line_number}"))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [timestamp_ms, x, y, color] = fields.as_slice() else {
            bail!("line {line_number}: expected 4 fields, found {}", fields.len());
        };
        let timestamp_ms: u32 = timestamp_ms
            .parse()
            .with_context(|| format!("line {line_number}: timestamp {timestamp_ms:?}"))?;
        let x: u16 = x
            .parse()
            .with_context(|| format!("line {line_number}: x {x:?}"))?;
        let y: u16 = y
            .parse()
            .with_context(|| format!("line {line_number}: y {y:?}"))?;
        let rgba = parse_rgba(color).map_err(|error| anyhow::anyhow!("line {line_number}: {error}"))?;
        writer
            .push_color(x, y, rgba, timestamp_ms)
            .with_context(|| format!("line {line_number}"))?;
    }
    Ok(writer.finish())
}
