//! CLI tool to print the events of DRO, VGM and raw OPL dump files.
use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Parser;
use snafu::prelude::*;
use snafu::{report, Whatever};

use fmstream::registers::{DescribeOpl, DescribeOpm};
use fmstream::{file, Event, EventSource};

/// Print FM register write events
#[derive(Debug, Parser)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None
)]
struct Cli {
    /// Input file (.dro, .vgm, .vgz or .opl3raw)
    #[arg(value_name = "FILE")]
    file: PathBuf,
    /// Print statistics instead of every event
    #[arg(short, long)]
    summarize: bool,
}

#[derive(Debug, Default)]
struct Summary {
    opl_writes: u64,
    opl3_writes: u64,
    opm_writes: u64,
    markers: BTreeSet<u32>,
    jumps: u64,
    end: u64,
}

impl Summary {
    fn add(&mut self, event: &Event) {
        match *event {
            Event::OplWrite { register, .. } => {
                self.opl_writes += 1;
                if register & 0x100 != 0 {
                    self.opl3_writes += 1;
                }
            }
            Event::OpmWrite { .. } => self.opm_writes += 1,
            Event::Marker { index, .. } => {
                self.markers.insert(index);
            }
            Event::JumpToMarker { .. } => self.jumps += 1,
            Event::End { time } => self.end = time,
        }
    }
}

fn describe(event: &Event) -> String {
    match *event {
        Event::OplWrite {
            register, value, ..
        } => format!(
            "OPL  {:03x} {:02x}  {}",
            register,
            value,
            DescribeOpl { register, value }
        ),
        Event::OpmWrite {
            register, value, ..
        } => format!(
            "OPM   {:02x} {:02x}  {}",
            register,
            value,
            DescribeOpm { register, value }
        ),
        Event::Marker { index, .. } => format!("MARKER {}", index),
        Event::JumpToMarker { index, .. } => format!("JUMP TO MARKER {}", index),
        Event::End { .. } => "END".to_string(),
    }
}

#[report]
fn main() -> Result<(), Whatever> {
    env_logger::init();
    let cli = Cli::parse();

    let source = file::open(&cli.file)
        .with_whatever_context(|_| format!("Failed to open {}", cli.file.display()))?;
    let time_base = source.time_base();
    let duration = source.duration();
    if let Some(gd3) = source.gd3() {
        for (name, value) in ["Track", "Game", "System", "Author"]
            .iter()
            .zip([&gd3.track_name_en, &gd3.game_name_en, &gd3.system_name_en, &gd3.author_en])
            .filter(|(_, value)| !value.is_empty())
        {
            println!("{}: {}", name, value);
        }
    }

    let mut summary = Summary::default();
    for event in source.into_events() {
        let event = event.whatever_context("Failed to read file")?;
        if cli.summarize {
            summary.add(&event);
        } else {
            let time = event.time();
            println!(
                "{:10.4} {:>10}  {}",
                time as f64 / f64::from(time_base),
                time,
                describe(&event)
            );
        }
    }

    if cli.summarize {
        println!("Time base: {} Hz", time_base);
        if let Some(duration) = duration {
            println!("Declared duration: {} ticks", duration);
        }
        println!(
            "Length: {} ticks ({:.3} s)",
            summary.end,
            summary.end as f64 / f64::from(time_base)
        );
        println!(
            "OPL writes: {} ({} to the secondary bank)",
            summary.opl_writes, summary.opl3_writes
        );
        println!("OPM writes: {}", summary.opm_writes);
        println!("Markers: {:?}", summary.markers);
        println!("Loop jumps: {}", summary.jumps);
    }
    Ok(())
}
