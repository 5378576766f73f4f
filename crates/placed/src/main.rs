use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use replay_protocol::Replay;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod pack;
mod render;

use cli::{Cli, Command};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match Cli::parse().command {
        Command::Render(args) => render::run(args),
        Command::Inspect { replay } => inspect(&replay),
        Command::Pack(args) => pack::run(args),
    }
}

fn inspect(dir: &Path) -> Result<()> {
    let replay = Replay::load(dir).with_context(|| format!("load replay {}", dir.display()))?;
    print!("{}", describe(&replay));
    Ok(())
}

fn describe(replay: &Replay) -> String {
    let manifest = &replay.manifest;
    let mut out = format!(
        "canvas: {}x{}\nrecords: {}\ncolors: {}\nlast timestamp: {}\nchunks: {}\n",
        manifest.canvas.width,
        manifest.canvas.height,
        manifest.record_count(),
        manifest.palette.len(),
        manifest
            .last_timestamp_ms()
            .map_or_else(|| String::from("-"), |ms| format!("{ms} ms")),
        manifest.chunks.len(),
    );
    for chunk in &manifest.chunks {
        out.push_str(&format!(
            "  #{:<4} positions {}..{}  up to {} ms\n",
            chunk.id,
            chunk.first_position,
            u64::from(chunk.first_position) + u64::from(chunk.num_records),
            chunk.up_to_ms,
        ));
    }
    out
}
