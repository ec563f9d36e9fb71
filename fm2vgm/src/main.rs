//! CLI tool to convert DRO, VGM and raw OPL dump files to VGM files.
use std::path::PathBuf;

use clap::Parser;
use snafu::prelude::*;
use snafu::{report, Whatever};

use fmstream::pipeline::parse_time;
use fmstream::file::{self, FileSource, FileWriter};
use fmstream::{ConvertOptions, EventSource, Gd3, LoopMode};

/// Convert FM register captures to VGM
#[derive(Debug, Parser)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None
)]
struct Cli {
    /// Input file (.dro, .vgm, .vgz or .opl3raw)
    #[arg(value_name = "INPUT")]
    input: PathBuf,
    /// Output file (.vgm or .vgz)
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Drop register writes which do not change the chip state
    #[arg(short, long)]
    optimise: bool,
    /// Trim silence from the start
    #[arg(long)]
    trim_start_silence: bool,
    /// Trim the start up to the given marker
    #[arg(long, value_name = "INDEX")]
    trim_start_to_marker: Option<u32>,
    /// Cut the given amount of time from the start ([[h:]m:]s)
    #[arg(short, long, value_name = "TIME", value_parser = parse_time)]
    start: Option<f64>,
    /// Cut the output to the given duration ([[h:]m:]s)
    #[arg(short, long, value_name = "DURATION", value_parser = parse_time)]
    duration: Option<f64>,
    /// Add a pause at the end ([[h:]m:]s)
    #[arg(short, long, value_name = "PAUSE", value_parser = parse_time)]
    pause: Option<f64>,
    /// Release all notes at the end
    #[arg(short, long)]
    key_off: bool,
    /// Treat repeated markers as a loop
    #[arg(short = 'l', long)]
    detect_loop: bool,
    /// End the output at the loop point, without looping
    #[arg(long)]
    end_on_loop: bool,

    /// Track title
    #[arg(long)]
    title: Option<String>,
    /// Game name
    #[arg(long)]
    game: Option<String>,
    /// System name
    #[arg(long)]
    system: Option<String>,
    /// Track artist
    #[arg(long)]
    artist: Option<String>,
    /// Release date
    #[arg(long, value_name = "DATE")]
    release_date: Option<String>,
    /// Author of the VGM file
    #[arg(long, value_name = "AUTHOR")]
    vgm_author: Option<String>,
    /// Notes
    #[arg(long)]
    notes: Option<String>,
}

impl Cli {
    fn options(&self) -> ConvertOptions {
        let loop_mode = if self.end_on_loop {
            LoopMode::EndOnLoop
        } else if self.detect_loop {
            LoopMode::Detect
        } else {
            LoopMode::Ignore
        };
        ConvertOptions {
            trim_to_marker: self.trim_start_to_marker,
            start: self.start,
            trim_start_silence: self.trim_start_silence,
            duration: self.duration,
            optimise: self.optimise,
            key_off: self.key_off,
            pause: self.pause,
            loop_mode,
        }
    }

    fn gd3(&self) -> Gd3 {
        let field = |value: &Option<String>| value.clone().unwrap_or_default();
        Gd3 {
            track_name_en: field(&self.title),
            game_name_en: field(&self.game),
            system_name_en: field(&self.system),
            author_en: field(&self.artist),
            release_date: field(&self.release_date),
            converter: field(&self.vgm_author),
            notes: field(&self.notes),
            ..Gd3::default()
        }
    }
}

/// Write the transformed events of `source` to `output`,
/// returning the number of events written
fn convert(cli: &Cli, source: FileSource, mut output: FileWriter) -> Result<usize, Whatever> {
    let gd3 = cli.gd3();
    if !gd3.is_empty() {
        output.set_gd3(gd3);
    }

    let src_time_base = source.time_base();
    let events = cli
        .options()
        .apply(source.into_events(), src_time_base, output.time_base());

    let mut count = 0;
    for event in events {
        let event = event.whatever_context("Failed to read input file")?;
        output
            .write(&event)
            .whatever_context("Failed to write output file")?;
        count += 1;
    }
    output
        .close()
        .whatever_context("Failed to write output file")?;
    Ok(count)
}

/// Convert the input file into the output file.
///
/// An incomplete output file is removed.
fn convert_file(cli: &Cli) -> Result<usize, Whatever> {
    let source = file::open(&cli.input)
        .with_whatever_context(|_| format!("Failed to open {}", cli.input.display()))?;
    let output = file::create(&cli.output)
        .with_whatever_context(|_| format!("Failed to create {}", cli.output.display()))?;

    let result = convert(cli, source, output);
    if result.is_err() {
        if let Err(e) = std::fs::remove_file(&cli.output) {
            log::warn!("Failed to remove {}: {}", cli.output.display(), e);
        }
    }
    result
}

#[report]
fn main() -> Result<(), Whatever> {
    env_logger::init();
    let cli = Cli::parse();
    let count = convert_file(&cli)?;
    log::info!("{} events written to {}", count, cli.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use super::{convert_file, Cli};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("fm2vgm-{}-{}", std::process::id(), name))
    }

    /// A raw OPL dump record
    fn record(time: i64, register: u16, value: u16) -> Vec<u8> {
        let mut out = time.to_le_bytes().to_vec();
        out.extend_from_slice(&register.to_le_bytes());
        out.extend_from_slice(&value.to_le_bytes());
        out
    }

    fn cli(input: &PathBuf, output: &PathBuf, args: &[&str]) -> Cli {
        let mut argv = vec![
            "fm2vgm".to_string(),
            input.display().to_string(),
            output.display().to_string(),
        ];
        argv.extend(args.iter().map(|arg| arg.to_string()));
        Cli::parse_from(argv)
    }

    #[test]
    fn converts_raw_dump() {
        let input = temp_path("ok.opl3raw");
        let output = temp_path("ok.vgm");
        let mut data = record(0, 0x20, 0x01);
        data.extend(record(49_716, 0xB0, 0x21));
        std::fs::write(&input, data).unwrap();

        let count = convert_file(&cli(&input, &output, &["--title", "Song"])).unwrap();
        let written = std::fs::read(&output).unwrap();
        std::fs::remove_file(&input).unwrap();
        std::fs::remove_file(&output).unwrap();

        assert_eq!(count, 3);
        assert_eq!(&written[..4], b"Vgm ");
        // one second at 44100 Hz
        assert_eq!(&written[0x18..0x1C], &44_100_u32.to_le_bytes());
    }

    #[test]
    fn failed_conversion_leaves_no_output() {
        let input = temp_path("bad.opl3raw");
        let output = temp_path("bad.vgm");
        let mut data = record(0, 0x20, 0x01);
        data.extend(record(-5, 0x20, 0x02));
        std::fs::write(&input, data).unwrap();

        let result = convert_file(&cli(&input, &output, &[]));
        std::fs::remove_file(&input).unwrap();

        assert!(result.is_err());
        assert!(!output.exists());
    }

    #[test]
    fn unreadable_input_creates_no_output() {
        let output = temp_path("missing.vgm");
        let result = convert_file(&cli(&temp_path("missing.dro"), &output, &[]));
        assert!(result.is_err());
        assert!(!output.exists());
    }
}
