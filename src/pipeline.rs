//! Conversion settings and the standard transform chain.

#[cfg(not(feature = "std"))]
use alloc::{borrow::ToOwned, boxed::Box, string::String};

use snafu::{OptionExt as _, Snafu};

use crate::event::Event;
use crate::time::seconds_to_ticks;
use crate::transform::EventStreamExt;

/// What to do with repeated markers
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum LoopMode {
    /// Keep markers as they are
    #[default]
    Ignore,
    /// Turn the first repeated marker into a loop jump and end the stream there
    Detect,
    /// End the stream at the first repeated marker, without a loop jump
    EndOnLoop,
}

/// The transforms to apply when converting a stream.
///
/// All times are in seconds.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConvertOptions {
    /// Start at the marker with this index
    pub trim_to_marker: Option<u32>,
    /// Cut this much from the start
    pub start: Option<f64>,
    /// Start at the first note
    pub trim_start_silence: bool,
    /// End the stream after this long
    pub duration: Option<f64>,
    /// Drop redundant register writes
    pub optimise: bool,
    /// Release all notes at the end
    pub key_off: bool,
    /// Silence to add at the end
    pub pause: Option<f64>,
    pub loop_mode: LoopMode,
}

impl ConvertOptions {
    /// Chain the configured transforms onto a stream
    /// and rebase its times from `src_time_base` to `dst_time_base`.
    ///
    /// The transforms run in this order:
    /// trim to marker, trim to start time, trim start silence,
    /// set the endpoint, optimise, add key off, add end pause,
    /// detect loop, and finally the time base conversion.
    /// Trims run before optimisation so that the register state
    /// written at the cut is never dropped as redundant.
    pub fn apply<'a, I, E>(
        &self,
        events: I,
        src_time_base: u32,
        dst_time_base: u32,
    ) -> Box<dyn Iterator<Item = Result<Event, E>> + 'a>
    where
        I: Iterator<Item = Result<Event, E>> + 'a,
        E: 'a,
    {
        let ticks = |seconds| seconds_to_ticks(seconds, src_time_base);
        let mut events: Box<dyn Iterator<Item = Result<Event, E>> + 'a> = Box::new(events);

        if let Some(index) = self.trim_to_marker {
            events = Box::new(events.trim_start_to_marker(index));
        }
        if let Some(start) = self.start {
            events = Box::new(events.trim_start_to_time(ticks(start)));
        }
        if self.trim_start_silence {
            events = Box::new(events.trim_start_silence());
        }
        if let Some(duration) = self.duration {
            events = Box::new(events.set_endpoint(ticks(duration)));
        }
        if self.optimise {
            events = Box::new(events.optimise());
        }
        if self.key_off {
            events = Box::new(events.add_key_off());
        }
        if let Some(pause) = self.pause {
            events = Box::new(events.add_end_pause(ticks(pause)));
        }
        match self.loop_mode {
            LoopMode::Ignore => {}
            LoopMode::Detect => events = Box::new(events.detect_loop(false)),
            LoopMode::EndOnLoop => events = Box::new(events.detect_loop(true)),
        }

        Box::new(events.convert_event_times(src_time_base, dst_time_base))
    }
}

/// A time argument could not be parsed
#[derive(Debug, Clone, PartialEq, Snafu)]
pub enum ParseTimeError {
    /// Invalid time "{input}", expected [[hours:]minutes:]seconds
    InvalidTime { input: String },
}

/// Parse a time of the form `[[h:]m:]s[.frac]` into seconds.
///
/// ```
/// # use fmstream::pipeline::parse_time;
/// assert_eq!(parse_time("1:30").unwrap(), 90.);
/// assert_eq!(parse_time("1:02:03.5").unwrap(), 3723.5);
/// assert!(parse_time("1:2:3:4").is_err());
/// ```
pub fn parse_time(input: &str) -> Result<f64, ParseTimeError> {
    let invalid = || InvalidTimeSnafu {
        input: input.to_owned(),
    };
    let is_number = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());

    let mut parts = input.trim().rsplit(':');
    let seconds = parts.next().context(invalid())?;
    let minutes = parts.next();
    let hours = parts.next();
    if parts.next().is_some() {
        return invalid().fail();
    }

    let (whole, fraction) = match seconds.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (seconds, None),
    };
    if !is_number(whole) || !fraction.map_or(true, is_number) {
        return invalid().fail();
    }
    let mut total: f64 = seconds.parse().ok().context(invalid())?;

    for (part, scale) in [(minutes, 60.), (hours, 3600.)] {
        let Some(part) = part else { break };
        if !is_number(part) {
            return invalid().fail();
        }
        let value: u64 = part.parse().ok().context(invalid())?;
        total += value as f64 * scale;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::{parse_time, ConvertOptions, LoopMode};
    use crate::event::Event;

    fn run(options: &ConvertOptions, events: &[Event], src: u32, dst: u32) -> Vec<Event> {
        options
            .apply(events.iter().copied().map(Ok::<_, ()>), src, dst)
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn default_options_only_rebase() {
        let events = [
            Event::opl_write(0, 0x20, 0x01),
            Event::opl_write(500, 0x20, 0x01),
            Event::End { time: 1000 },
        ];
        assert_eq!(
            run(&ConvertOptions::default(), &events, 1000, 44_100),
            vec![
                Event::opl_write(0, 0x20, 0x01),
                Event::opl_write(22_050, 0x20, 0x01),
                Event::End { time: 44_100 },
            ]
        );
    }

    #[test]
    fn transforms_run_in_order() {
        let events = [
            Event::opl_write(0, 0x20, 0x01),
            Event::opl_write(100, 0xB0, 0x21),
            Event::Marker { time: 200, index: 0 },
            Event::opl_write(300, 0x20, 0x01),
            Event::opl_write(400, 0x20, 0x01),
            Event::Marker { time: 600, index: 0 },
            Event::End { time: 2000 },
        ];
        let options = ConvertOptions {
            start: Some(0.05),
            duration: Some(1.),
            optimise: true,
            key_off: true,
            pause: Some(0.5),
            loop_mode: LoopMode::Detect,
            ..ConvertOptions::default()
        };
        assert_eq!(
            run(&options, &events, 1000, 1000),
            vec![
                // replayed state is not optimised away
                Event::opl_write(0, 0x20, 0x01),
                Event::opl_write(50, 0xB0, 0x21),
                Event::Marker { time: 150, index: 0 },
                // the marker reset the optimiser state
                Event::opl_write(250, 0x20, 0x01),
                Event::JumpToMarker { time: 550, index: 0 },
                Event::End { time: 550 },
            ]
        );
    }

    #[test]
    fn end_on_loop_without_jump() {
        let events = [
            Event::Marker { time: 0, index: 3 },
            Event::Marker { time: 10, index: 3 },
            Event::End { time: 20 },
        ];
        let options = ConvertOptions {
            loop_mode: LoopMode::EndOnLoop,
            pause: Some(1.),
            ..ConvertOptions::default()
        };
        assert_eq!(
            run(&options, &events, 1000, 1000),
            vec![Event::Marker { time: 0, index: 3 }, Event::End { time: 10 }]
        );
    }

    #[test]
    fn parses_times() {
        assert_eq!(parse_time("12").unwrap(), 12.);
        assert_eq!(parse_time(" 2.25 ").unwrap(), 2.25);
        assert_eq!(parse_time("1:30").unwrap(), 90.);
        assert_eq!(parse_time("2:00:01").unwrap(), 7201.);
        assert_eq!(parse_time("1:02:03.5").unwrap(), 3723.5);

        for bad in ["", "abc", "1.", ".5", "1:", ":1", "1:2:3:4", "-1", "1.2.3", "1:2.5:3"] {
            assert!(parse_time(bad).is_err(), "{:?} should be rejected", bad);
        }
    }
}
