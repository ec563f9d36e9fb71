//! VGM file writer.
//!
//! Events are written as they arrive,
//! after a placeholder header which is filled in on [`VgmWriter::close`].
//! The chip clocks are derived from the events:
//! OPL writes select the YM3812 (OPL2),
//! unless a secondary bank register is written anywhere in the stream,
//! which makes the whole file a YMF262 (OPL3) file.
//! OPM writes select the YM2151.

use std::collections::BTreeMap;
use std::io::{Seek, SeekFrom, Write};

use snafu::{ensure, OptionExt as _, ResultExt};

use crate::error::{DurationOverflowSnafu, OrderingSnafu, Result, WriteFileSnafu};
use crate::event::Event;
use crate::gd3::Gd3;
use crate::registers::OPL_SECONDARY_BANK;
use crate::vgm::{command, VgmHeader, YM2151_CLOCK, YM3812_CLOCK, YMF262_CLOCK};

/// Ticks per second of the events accepted by the writer
pub const TIME_BASE: u32 = crate::vgm::TIME_BASE;

/// Streaming VGM writer over a seekable sink.
///
/// The sink must be positioned at its start.
/// The file is only valid once [`close`](VgmWriter::close) returns.
#[derive(Debug)]
pub struct VgmWriter<W: Write + Seek> {
    sink: W,
    header: VgmHeader,
    gd3: Option<Gd3>,
    /// Absolute offset of the next byte written
    position: u64,
    /// Time covered by the delays written so far
    written_time: u64,
    /// Time of the latest accepted event
    duration: u64,
    /// Offsets of the OPL2 write commands,
    /// to be turned into OPL3 writes if the secondary bank is used
    opl2_writes: Vec<u64>,
    opl3: bool,
    /// Output offset and time of each marker
    markers: BTreeMap<u32, (u64, u64)>,
    /// Output offset and length of the loop
    loop_point: Option<(u64, u64)>,
}

impl<W> VgmWriter<W>
where
    W: Write + Seek,
{
    /// Start a VGM file, reserving space for the header
    pub fn new(mut sink: W) -> Result<Self> {
        let header = VgmHeader::new();
        sink.write_all(&header.encode()).context(WriteFileSnafu)?;
        Ok(VgmWriter {
            sink,
            header,
            gd3: None,
            position: VgmHeader::SIZE as u64,
            written_time: 0,
            duration: 0,
            opl2_writes: Vec::new(),
            opl3: false,
            markers: BTreeMap::new(),
            loop_point: None,
        })
    }

    /// Ticks per second of the events accepted by the writer
    pub fn time_base(&self) -> u32 {
        TIME_BASE
    }

    /// Time of the latest accepted event
    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// Set the metadata to append to the file.
    ///
    /// An empty tag is not written.
    pub fn set_gd3(&mut self, gd3: Gd3) {
        self.gd3 = Some(gd3);
    }

    /// Append an event.
    ///
    /// Events must come in non-decreasing time order,
    /// in samples at 44100 Hz.
    pub fn write(&mut self, event: &Event) -> Result<()> {
        let time = event.time();
        ensure!(
            time >= self.duration,
            OrderingSnafu {
                time,
                previous: self.duration
            }
        );
        self.duration = time;
        self.write_delay(time)?;

        match *event {
            Event::OplWrite {
                register, value, ..
            } => {
                let secondary = register & OPL_SECONDARY_BANK != 0;
                if secondary && !self.opl3 {
                    self.switch_to_opl3()?;
                } else if !self.opl3 && self.header.ym3812_clock == 0 {
                    log::debug!("OPL2 output");
                    self.header.ym3812_clock = YM3812_CLOCK;
                }
                let code = if secondary {
                    command::YMF262_PORT1_WRITE
                } else if self.opl3 {
                    command::YMF262_PORT0_WRITE
                } else {
                    self.opl2_writes.push(self.position);
                    command::YM3812_WRITE
                };
                self.emit(&[code, register as u8, value])?;
            }
            Event::OpmWrite {
                register, value, ..
            } => {
                if self.header.ym2151_clock == 0 {
                    log::debug!("OPM output");
                    self.header.ym2151_clock = YM2151_CLOCK;
                }
                self.emit(&[command::YM2151_WRITE, register, value])?;
            }
            Event::Marker { index, .. } => {
                self.markers.insert(index, (self.position, time));
            }
            Event::JumpToMarker { index, .. } => {
                if self.loop_point.is_some() {
                    log::warn!("Ignoring additional loop jump to marker {}", index);
                } else if let Some(&(offset, start)) = self.markers.get(&index) {
                    log::debug!(
                        "Loop from marker {} at offset {:#x}, {} samples",
                        index,
                        offset,
                        time - start
                    );
                    self.loop_point = Some((offset, time - start));
                } else {
                    log::warn!("Jump to unknown marker {}", index);
                }
            }
            Event::End { .. } => {}
        }
        Ok(())
    }

    /// Finish the file: end the command data,
    /// append the GD3 tag and write the header.
    ///
    /// Returns the sink, positioned at the end of the file.
    pub fn close(mut self) -> Result<W> {
        self.emit(&[command::END_OF_DATA])?;

        if let Some(gd3) = self.gd3.take().filter(|gd3| !gd3.is_empty()) {
            self.header.gd3_offset = (self.position - u64::from(VgmHeader::GD3_OFFSET_BASE)) as u32;
            self.emit(&gd3.to_bytes())?;
        }

        self.header.eof_offset = (self.position - u64::from(VgmHeader::EOF_OFFSET_BASE)) as u32;
        self.header.total_samples = u32::try_from(self.duration).ok().context(
            DurationOverflowSnafu {
                duration: self.duration,
            },
        )?;
        if let Some((offset, samples)) = self.loop_point {
            self.header.loop_offset = (offset - u64::from(VgmHeader::LOOP_OFFSET_BASE)) as u32;
            self.header.loop_samples = samples as u32;
        }

        self.sink
            .seek(SeekFrom::Start(0))
            .context(WriteFileSnafu)?;
        self.sink
            .write_all(&self.header.encode())
            .context(WriteFileSnafu)?;
        self.sink.seek(SeekFrom::End(0)).context(WriteFileSnafu)?;
        self.sink.flush().context(WriteFileSnafu)?;
        Ok(self.sink)
    }

    fn write_delay(&mut self, until: u64) -> Result<()> {
        let mut wait = until - self.written_time;
        while wait > 0 {
            match wait {
                735 => {
                    self.emit(&[command::WAIT_735])?;
                    wait = 0;
                }
                882 => {
                    self.emit(&[command::WAIT_882])?;
                    wait = 0;
                }
                _ => {
                    let samples = wait.min(0xFFFF) as u16;
                    let [lo, hi] = samples.to_le_bytes();
                    self.emit(&[command::WAIT, lo, hi])?;
                    wait -= u64::from(samples);
                }
            }
        }
        self.written_time = until;
        Ok(())
    }

    /// Rewrite all OPL2 writes so far as OPL3 port 0 writes
    fn switch_to_opl3(&mut self) -> Result<()> {
        log::debug!(
            "OPL3 secondary bank in use, rewriting {} OPL2 writes",
            self.opl2_writes.len()
        );
        for &offset in &self.opl2_writes {
            self.sink
                .seek(SeekFrom::Start(offset))
                .context(WriteFileSnafu)?;
            self.sink
                .write_all(&[command::YMF262_PORT0_WRITE])
                .context(WriteFileSnafu)?;
        }
        self.sink
            .seek(SeekFrom::Start(self.position))
            .context(WriteFileSnafu)?;
        self.opl2_writes = Vec::new();
        self.opl3 = true;
        self.header.ym3812_clock = 0;
        self.header.ymf262_clock = YMF262_CLOCK;
        Ok(())
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink.write_all(bytes).context(WriteFileSnafu)?;
        self.position += bytes.len() as u64;
        Ok(())
    }
}
