//! Driving sound chips, real or emulated, from event streams.
//!
//! Chip drivers are not part of this crate.
//! They implement [`Device`] and are fed with [`play`].

use crate::error::Result;
use crate::event::Event;
use crate::registers::{
    OPL_KEY_ON_BIT, OPL_KEY_ON_BLOCK_FNUM_RANGE, OPL_SECONDARY_BANK, OPM_CHANNELS, OPM_KEY_ON,
};
use crate::source::EventSource;
use crate::state::RegisterSnapshot;

/// A consumer of chip register events
pub trait Device {
    /// Apply an event.
    /// Events the device does not support are ignored.
    fn write(&mut self, event: &Event) -> Result<()>;

    /// Put the chip back into its power-on state
    fn reset(&mut self) -> Result<()>;

    /// Let time pass
    fn wait(&mut self, seconds: f64) -> Result<()>;

    /// Send out any buffered writes
    fn flush(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

impl<D> Device for &mut D
where
    D: Device + ?Sized,
{
    fn write(&mut self, event: &Event) -> Result<()> {
        (**self).write(event)
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn wait(&mut self, seconds: f64) -> Result<()> {
        (**self).wait(seconds)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// A device adapter which skips writes that would not change
/// the chip's registers.
///
/// Only register writes reach the inner device.
#[derive(Debug, Default)]
pub struct RegisterCache<D> {
    device: D,
    registers: RegisterSnapshot,
}

impl<D> RegisterCache<D>
where
    D: Device,
{
    /// Wrap a device, starting with no known register values
    pub fn new(device: D) -> Self {
        RegisterCache {
            device,
            registers: RegisterSnapshot::new(),
        }
    }

    /// The last value written to each register
    pub fn registers(&self) -> &RegisterSnapshot {
        &self.registers
    }

    /// Unwrap the inner device
    pub fn into_inner(self) -> D {
        self.device
    }

    /// Release every OPL channel which has been written to,
    /// and every OPM channel once an OPM key on was written.
    pub fn all_notes_off(&mut self) -> Result<()> {
        let mut releases = Vec::new();
        for channel in OPL_KEY_ON_BLOCK_FNUM_RANGE {
            let primary = u16::from(channel);
            for register in [primary, primary | OPL_SECONDARY_BANK] {
                if let Some(value) = self.registers.opl(register) {
                    releases.push(Event::opl_write(0, register, value & !OPL_KEY_ON_BIT));
                }
            }
        }
        if self.registers.opm(OPM_KEY_ON).is_some() {
            releases.extend((0..OPM_CHANNELS).map(|channel| Event::opm_write(0, OPM_KEY_ON, channel)));
        }
        for event in &releases {
            self.write(event)?;
        }
        Ok(())
    }
}

impl<D> Device for RegisterCache<D>
where
    D: Device,
{
    fn write(&mut self, event: &Event) -> Result<()> {
        if !event.is_write() || self.registers.is_redundant(event) {
            return Ok(());
        }
        self.registers.update(event);
        self.device.write(event)
    }

    fn reset(&mut self) -> Result<()> {
        self.registers.clear();
        self.device.reset()
    }

    fn wait(&mut self, seconds: f64) -> Result<()> {
        self.device.wait(seconds)
    }

    fn flush(&mut self) -> Result<()> {
        self.device.flush()
    }

    fn close(&mut self) -> Result<()> {
        self.device.close()
    }
}

/// Play a whole stream on a device.
///
/// The device is reset first.
/// Before each event, the device is told to wait
/// for the time since the previous event.
/// After the last event, it waits out the rest of the
/// declared duration of the source, if any, and is flushed.
pub fn play<S, D>(source: S, mut device: D) -> Result<()>
where
    S: EventSource,
    D: Device,
{
    let time_base = f64::from(source.time_base());
    let duration = source.duration();
    device.reset()?;

    let mut last_time = 0;
    for event in source.into_events() {
        let event = event?;
        let time = event.time();
        if time > last_time {
            device.wait((time - last_time) as f64 / time_base)?;
            last_time = time;
        }
        device.write(&event)?;
    }

    if let Some(duration) = duration.filter(|&duration| duration > last_time) {
        device.wait((duration - last_time) as f64 / time_base)?;
    }
    device.flush()
}

#[cfg(test)]
mod tests {
    use super::{play, Device, RegisterCache};
    use crate::error::Result;
    use crate::event::Event;
    use crate::source::EventSource;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Write(Event),
        Reset,
        Wait(f64),
        Flush,
        Close,
    }

    #[derive(Debug, Default)]
    struct Recorder(Vec<Call>);

    impl Device for Recorder {
        fn write(&mut self, event: &Event) -> Result<()> {
            self.0.push(Call::Write(*event));
            Ok(())
        }

        fn reset(&mut self) -> Result<()> {
            self.0.push(Call::Reset);
            Ok(())
        }

        fn wait(&mut self, seconds: f64) -> Result<()> {
            self.0.push(Call::Wait(seconds));
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            self.0.push(Call::Flush);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.0.push(Call::Close);
            Ok(())
        }
    }

    struct ListSource {
        events: Vec<Event>,
        duration: Option<u64>,
    }

    impl EventSource for ListSource {
        type Events = std::iter::Map<std::vec::IntoIter<Event>, fn(Event) -> Result<Event>>;

        fn time_base(&self) -> u32 {
            100
        }

        fn duration(&self) -> Option<u64> {
            self.duration
        }

        fn into_events(self) -> Self::Events {
            self.events.into_iter().map(Ok as fn(Event) -> Result<Event>)
        }
    }

    #[test]
    fn cache_forwards_changed_writes_only() {
        let mut cache = RegisterCache::new(Recorder::default());
        cache.write(&Event::opl_write(0, 0x20, 0x01)).unwrap();
        cache.write(&Event::opl_write(1, 0x20, 0x01)).unwrap();
        cache.write(&Event::Marker { time: 1, index: 0 }).unwrap();
        cache.write(&Event::opm_write(2, 0x20, 0x01)).unwrap();
        cache.reset().unwrap();
        cache.write(&Event::opl_write(3, 0x20, 0x01)).unwrap();
        cache.close().unwrap();

        assert_eq!(
            cache.into_inner().0,
            vec![
                Call::Write(Event::opl_write(0, 0x20, 0x01)),
                Call::Write(Event::opm_write(2, 0x20, 0x01)),
                Call::Reset,
                Call::Write(Event::opl_write(3, 0x20, 0x01)),
                Call::Close,
            ]
        );
    }

    #[test]
    fn all_notes_off_releases_used_channels() {
        let mut cache = RegisterCache::new(Recorder::default());
        cache.write(&Event::opl_write(0, 0x1B2, 0x31)).unwrap();
        cache.write(&Event::opm_write(0, 0x08, 0x78)).unwrap();
        cache.all_notes_off().unwrap();

        let calls = cache.into_inner().0;
        assert_eq!(calls.len(), 2 + 1 + 8);
        assert_eq!(calls[2], Call::Write(Event::opl_write(0, 0x1B2, 0x11)));
        assert_eq!(calls[3], Call::Write(Event::opm_write(0, 0x08, 0)));
        assert_eq!(calls[10], Call::Write(Event::opm_write(0, 0x08, 7)));
    }

    #[test]
    fn play_waits_between_events() {
        let source = ListSource {
            events: vec![
                Event::opl_write(0, 0x20, 0x01),
                Event::opl_write(50, 0xB0, 0x21),
                Event::End { time: 75 },
            ],
            duration: Some(100),
        };
        let mut recorder = Recorder::default();
        play(source, &mut recorder).unwrap();
        assert_eq!(
            recorder.0,
            vec![
                Call::Reset,
                Call::Write(Event::opl_write(0, 0x20, 0x01)),
                Call::Wait(0.5),
                Call::Write(Event::opl_write(50, 0xB0, 0x21)),
                Call::Wait(0.25),
                Call::Write(Event::End { time: 75 }),
                Call::Wait(0.25),
                Call::Flush,
            ]
        );
    }

    #[test]
    fn play_without_duration() {
        let source = ListSource {
            events: vec![Event::End { time: 10 }],
            duration: None,
        };
        let mut recorder = Recorder::default();
        play(source, RegisterCache::new(&mut recorder)).unwrap();
        assert_eq!(
            recorder.0,
            vec![Call::Reset, Call::Wait(0.1), Call::Flush]
        );
    }
}
