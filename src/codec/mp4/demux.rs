//! Native MP4 demuxer.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use crate::codec::mp4::{Cursor, Mp4Box, boxes, child, read_descriptor, require};
use crate::codec::nal::{AvcConfig, HevcConfig};
use crate::codec::{
    ContainerInfo, DecoderConfigRecord, Demuxer, ExtractOptions, ExtractionReport, Sample,
    SampleSink, TrackDelivery, TrackInfo, TrackKind, TruncationPolicy,
};
use crate::foundation::error::{RenderError, RenderResult};

/// Byte range and timing of one stored sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SampleEntry {
    offset: u64,
    size: u32,
    dts: u64,
    cts: u64,
    duration: u32,
    is_sync: bool,
}

#[derive(Debug)]
struct TrackTable {
    info: TrackInfo,
    config: Option<DecoderConfigRecord>,
    samples: Vec<SampleEntry>,
}

/// MP4 demuxer over an in-memory file.
pub struct Mp4Demuxer {
    source: Arc<[u8]>,
    info: ContainerInfo,
    tracks: Vec<Arc<TrackTable>>,
    /// Pause before each sample read on the producer thread. Zero except in tests.
    read_delay: Duration,
}

impl std::fmt::Debug for Mp4Demuxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mp4Demuxer")
            .field("bytes", &self.source.len())
            .field("info", &self.info)
            .finish()
    }
}

impl Mp4Demuxer {
    /// Parse the container index. Fails on malformed input or when there are no tracks.
    pub fn parse(source: Arc<[u8]>) -> RenderResult<Self> {
        if source.is_empty() {
            return Err(RenderError::parse("empty input"));
        }
        let moov = require(&source, b"moov")?;
        let mvhd = require(moov.payload, b"mvhd")?;
        let (timescale, duration) = parse_mvhd(mvhd.payload)?;

        let mut tracks = Vec::new();
        for b in boxes(moov.payload) {
            let b = b?;
            if &b.kind == b"trak" {
                tracks.push(Arc::new(parse_trak(b, timescale, source.len() as u64)?));
            }
        }
        if tracks.is_empty() {
            return Err(RenderError::parse("container has no tracks"));
        }

        let info = ContainerInfo {
            duration,
            timescale,
            tracks: tracks.iter().map(|t| t.info.clone()).collect(),
        };
        for t in &info.tracks {
            tracing::debug!(
                track_id = t.id,
                kind = ?t.kind,
                codec = %t.codec,
                samples = t.sample_count,
                "parsed track"
            );
        }
        Ok(Self {
            source,
            info,
            tracks,
            read_delay: Duration::ZERO,
        })
    }

    fn table(&self, track_id: u32) -> RenderResult<&Arc<TrackTable>> {
        self.tracks
            .iter()
            .find(|t| t.info.id == track_id)
            .ok_or_else(|| RenderError::missing_track(format!("no track with id {track_id}")))
    }
}

impl Demuxer for Mp4Demuxer {
    fn info(&self) -> &ContainerInfo {
        &self.info
    }

    fn extract_track_config(&self, track_id: u32) -> RenderResult<Option<DecoderConfigRecord>> {
        Ok(self.table(track_id)?.config.clone())
    }

    fn extract_samples(
        &mut self,
        track_ids: &[u32],
        options: &ExtractOptions,
        sink: &mut SampleSink<'_>,
    ) -> RenderResult<ExtractionReport> {
        let tables = track_ids
            .iter()
            .map(|&id| self.table(id).cloned())
            .collect::<RenderResult<Vec<_>>>()?;

        // storage order across the requested tracks
        let mut order: Vec<(usize, usize)> = tables
            .iter()
            .enumerate()
            .flat_map(|(ti, t)| (0..t.samples.len()).map(move |si| (ti, si)))
            .collect();
        order.sort_by_key(|&(ti, si)| (tables[ti].samples[si].offset, ti, si));

        let mut report = ExtractionReport {
            tracks: tables
                .iter()
                .map(|t| TrackDelivery {
                    track_id: t.info.id,
                    delivered: 0,
                    expected: t.info.sample_count,
                })
                .collect(),
            ..ExtractionReport::default()
        };

        let (tx, rx) = crossbeam_channel::bounded::<Sample>(options.channel_capacity.max(1));
        let source = Arc::clone(&self.source);
        let producer_tables = tables.clone();
        let read_delay = self.read_delay;
        let producer = std::thread::spawn(move || {
            for (ti, si) in order {
                if !read_delay.is_zero() {
                    std::thread::sleep(read_delay);
                }
                let table = &producer_tables[ti];
                let e = table.samples[si];
                let start = e.offset as usize;
                let Some(data) = source.get(start..start.saturating_add(e.size as usize)) else {
                    tracing::warn!(
                        track_id = table.info.id,
                        sample = si,
                        offset = e.offset,
                        size = e.size,
                        "sample lies outside the file, stopping extraction"
                    );
                    return;
                };
                let sample = Sample {
                    track_id: table.info.id,
                    data: data.to_vec(),
                    dts: e.dts,
                    cts: e.cts,
                    duration: e.duration,
                    is_sync: e.is_sync,
                    timescale: table.info.timescale,
                };
                if tx.send(sample).is_err() {
                    return;
                }
            }
        });

        let mut stalled = false;
        let mut failure = None;
        loop {
            match rx.recv_timeout(options.stall_timeout) {
                Ok(sample) => {
                    if let Some(d) = report.tracks.iter_mut().find(|d| d.track_id == sample.track_id)
                    {
                        d.delivered += 1;
                    }
                    match sink(sample) {
                        Ok(ControlFlow::Continue(())) => {}
                        Ok(ControlFlow::Break(())) => {
                            report.stopped = true;
                            break;
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    stalled = true;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        drop(rx);
        if stalled {
            tracing::warn!(
                timeout_ms = options.stall_timeout.as_millis() as u64,
                "sample extraction stalled, giving up on remaining samples"
            );
        } else if producer.join().is_err() {
            return Err(RenderError::parse("sample reader thread panicked"));
        }
        if let Some(e) = failure {
            return Err(e);
        }

        if !report.stopped {
            for d in report.tracks.iter().filter(|d| d.delivered < d.expected) {
                report.truncated = true;
                tracing::warn!(
                    track_id = d.track_id,
                    delivered = d.delivered,
                    expected = d.expected,
                    "track ended before its declared sample count"
                );
            }
        }
        if report.truncated && options.truncation == TruncationPolicy::Error {
            return Err(RenderError::parse("sample extraction ended early"));
        }
        Ok(report)
    }
}

fn parse_mvhd(payload: &[u8]) -> RenderResult<(u32, u64)> {
    let mut c = Cursor::new(payload);
    if c.version()? == 1 {
        c.skip(16)?;
        let timescale = c.u32()?;
        Ok((timescale, c.u64()?))
    } else {
        c.skip(8)?;
        let timescale = c.u32()?;
        Ok((timescale, u64::from(c.u32()?)))
    }
}

fn parse_trak(
    trak: Mp4Box<'_>,
    movie_timescale: u32,
    file_len: u64,
) -> RenderResult<TrackTable> {
    let tkhd = require(trak.payload, b"tkhd")?;
    let mut c = Cursor::new(tkhd.payload);
    let id = if c.version()? == 1 {
        c.skip(16)?;
        c.u32()?
    } else {
        c.skip(8)?;
        c.u32()?
    };
    let (tk_width, tk_height) = match tkhd.payload.len() {
        n if n >= 8 => {
            let mut c = Cursor::new(&tkhd.payload[n - 8..]);
            (c.u32()? >> 16, c.u32()? >> 16)
        }
        _ => (0, 0),
    };

    let mdia = require(trak.payload, b"mdia")?;
    let (timescale, duration) = parse_mvhd(require(mdia.payload, b"mdhd")?.payload)?;
    let hdlr = require(mdia.payload, b"hdlr")?;
    let kind = match hdlr.payload.get(8..12) {
        Some(b"vide") => TrackKind::Video,
        Some(b"soun") => TrackKind::Audio,
        _ => TrackKind::Other,
    };
    let minf = require(mdia.payload, b"minf")?;
    let stbl = require(minf.payload, b"stbl")?;

    let entry = parse_stsd(require(stbl.payload, b"stsd")?.payload)?;
    let mut samples = build_sample_table(stbl.payload, file_len)?;
    let delay = match child(trak.payload, b"edts")? {
        Some(edts) => initial_delay(edts.payload, movie_timescale, timescale)?,
        None => 0,
    };
    if delay > 0 {
        for s in &mut samples {
            s.dts = s.dts.saturating_add(delay);
            s.cts = s.cts.saturating_add(delay);
        }
    }

    let info = TrackInfo {
        id,
        kind,
        codec: entry.codec,
        timescale,
        duration,
        sample_count: samples.len() as u32,
        width: if entry.width > 0 { entry.width } else { tk_width },
        height: if entry.height > 0 {
            entry.height
        } else {
            tk_height
        },
        sample_rate: entry.sample_rate,
        channels: entry.channels,
    };
    Ok(TrackTable {
        info,
        config: entry.config,
        samples,
    })
}

/// Leading empty edits, converted to media ticks. Other edits are not applied.
fn initial_delay(edts: &[u8], movie_timescale: u32, media_timescale: u32) -> RenderResult<u64> {
    let Some(elst) = child(edts, b"elst")? else {
        return Ok(0);
    };
    let mut c = Cursor::new(elst.payload);
    let wide = c.version()? == 1;
    let mut empty = 0u64;
    for _ in 0..entry_count(&mut c, if wide { 20 } else { 12 }, "elst")? {
        let (duration, media_time) = if wide {
            (c.u64()?, c.u64()? as i64)
        } else {
            (u64::from(c.u32()?), i64::from(c.u32()? as i32))
        };
        c.skip(4)?;
        if media_time != -1 {
            break;
        }
        empty = empty.saturating_add(duration);
    }
    if movie_timescale == 0 {
        return Ok(0);
    }
    let movie = u128::from(movie_timescale);
    let ticks = (u128::from(empty) * u128::from(media_timescale) + movie / 2) / movie;
    Ok(u64::try_from(ticks).unwrap_or(u64::MAX))
}

#[derive(Debug, Default)]
struct SampleDescription {
    codec: String,
    width: u32,
    height: u32,
    sample_rate: u32,
    channels: u16,
    config: Option<DecoderConfigRecord>,
}

fn parse_stsd(payload: &[u8]) -> RenderResult<SampleDescription> {
    let mut c = Cursor::new(payload);
    c.version()?;
    let count = c.u32()?;
    let Some(entry) = boxes(c.rest()).next().transpose()? else {
        return Err(RenderError::parse(format!(
            "stsd declares {count} entries but carries none"
        )));
    };
    match &entry.kind {
        b"avc1" | b"avc3" | b"hvc1" | b"hev1" | b"vp09" | b"av01" | b"mp4v" => {
            parse_visual_entry(entry)
        }
        b"mp4a" => parse_audio_entry(entry),
        _ => Ok(SampleDescription {
            codec: entry.kind_str(),
            ..SampleDescription::default()
        }),
    }
}

const VISUAL_ENTRY_LEN: usize = 78;

fn parse_visual_entry(entry: Mp4Box<'_>) -> RenderResult<SampleDescription> {
    let mut c = Cursor::new(entry.payload);
    c.skip(24)?;
    let width = u32::from(c.u16()?);
    let height = u32::from(c.u16()?);
    let children = entry
        .payload
        .get(VISUAL_ENTRY_LEN..)
        .ok_or_else(|| RenderError::parse("truncated visual sample entry"))?;
    let fourcc = entry.kind_str();

    let (codec, config) = if let Some(avcc) = child(children, b"avcC")? {
        let cfg = AvcConfig::parse(avcc.payload)?;
        let codec = cfg.codec_string().replacen("avc1", &fourcc, 1);
        (codec, Some(DecoderConfigRecord(avcc.payload.to_vec())))
    } else if let Some(hvcc) = child(children, b"hvcC")? {
        let cfg = HevcConfig::parse(hvcc.payload)?;
        (
            cfg.codec_string(&fourcc),
            Some(DecoderConfigRecord(hvcc.payload.to_vec())),
        )
    } else {
        (fourcc, None)
    };
    Ok(SampleDescription {
        codec,
        width,
        height,
        config,
        ..SampleDescription::default()
    })
}

fn parse_audio_entry(entry: Mp4Box<'_>) -> RenderResult<SampleDescription> {
    let mut c = Cursor::new(entry.payload);
    c.skip(8)?;
    let version = c.u16()?;
    c.skip(6)?;
    let channels = c.u16()?;
    c.skip(6)?;
    let sample_rate = c.u32()? >> 16;
    // QuickTime sound description extensions
    let extra = match version {
        1 => 16,
        2 => 36,
        _ => 0,
    };
    let children = entry.payload.get(28 + extra..).unwrap_or_default();

    let mut desc = SampleDescription {
        codec: "mp4a".to_string(),
        sample_rate,
        channels,
        ..SampleDescription::default()
    };
    if let Some(esds) = child(children, b"esds")? {
        let (oti, asc) = parse_esds(esds.payload)?;
        desc.codec = match (oti, asc.as_deref()) {
            (0x40, Some(asc)) if !asc.is_empty() => format!("mp4a.40.{}", audio_object_type(asc)),
            (0x40, _) => "mp4a.40.2".to_string(),
            (oti, _) => format!("mp4a.{oti:x}"),
        };
        desc.config = asc.map(DecoderConfigRecord);
    }
    Ok(desc)
}

/// Object type indication and the AudioSpecificConfig from the nested
/// DecoderSpecificInfo descriptor.
fn parse_esds(payload: &[u8]) -> RenderResult<(u8, Option<Vec<u8>>)> {
    let mut c = Cursor::new(payload);
    c.version()?;
    let (tag, _) = read_descriptor(&mut c)?;
    if tag != 0x03 {
        return Err(RenderError::parse("esds without ES descriptor"));
    }
    c.skip(2)?;
    let flags = c.u8()?;
    if flags & 0x80 != 0 {
        c.skip(2)?;
    }
    if flags & 0x40 != 0 {
        let len = usize::from(c.u8()?);
        c.skip(len)?;
    }
    if flags & 0x20 != 0 {
        c.skip(2)?;
    }
    let (tag, _) = read_descriptor(&mut c)?;
    if tag != 0x04 {
        return Err(RenderError::parse("esds without decoder config descriptor"));
    }
    let oti = c.u8()?;
    c.skip(12)?;
    if c.rest().is_empty() {
        return Ok((oti, None));
    }
    let (tag, len) = read_descriptor(&mut c)?;
    if tag != 0x05 {
        return Ok((oti, None));
    }
    Ok((oti, Some(c.take(len)?.to_vec())))
}

fn audio_object_type(asc: &[u8]) -> u8 {
    let aot = asc[0] >> 3;
    if aot == 31 && asc.len() >= 2 {
        32 + (((asc[0] & 0x07) << 3) | (asc[1] >> 5))
    } else {
        aot
    }
}

/// Declared entry count of a table box, checked against the bytes left in it.
fn entry_count(c: &mut Cursor<'_>, entry_len: usize, kind: &str) -> RenderResult<usize> {
    let count = c.u32()? as usize;
    if count.checked_mul(entry_len).is_none_or(|len| len > c.rest().len()) {
        return Err(RenderError::parse(format!(
            "{kind} declares {count} entries but carries {} bytes",
            c.rest().len()
        )));
    }
    Ok(count)
}

fn build_sample_table(stbl: &[u8], file_len: u64) -> RenderResult<Vec<SampleEntry>> {
    let sizes = parse_sizes(stbl, file_len)?;
    let n = sizes.len();

    let stts = require(stbl, b"stts")?;
    let mut durations = Vec::with_capacity(n);
    let mut c = Cursor::new(stts.payload);
    c.version()?;
    for _ in 0..entry_count(&mut c, 8, "stts")? {
        let count = c.u32()? as usize;
        let delta = c.u32()?;
        let room = n - durations.len();
        durations.extend(std::iter::repeat_n(delta, count.min(room)));
    }

    let mut offsets = vec![0i64; n];
    if let Some(ctts) = child(stbl, b"ctts")? {
        let mut c = Cursor::new(ctts.payload);
        c.version()?;
        let mut i = 0usize;
        for _ in 0..entry_count(&mut c, 8, "ctts")? {
            let count = c.u32()? as usize;
            let off = i64::from(c.u32()? as i32);
            let end = i.saturating_add(count).min(n);
            if let Some(slots) = offsets.get_mut(i..end) {
                slots.fill(off);
            }
            i = end;
        }
    }

    let chunk_offsets: Vec<u64> = if let Some(stco) = child(stbl, b"stco")? {
        let mut c = Cursor::new(stco.payload);
        c.version()?;
        (0..entry_count(&mut c, 4, "stco")?)
            .map(|_| c.u32().map(u64::from))
            .collect::<RenderResult<_>>()?
    } else if let Some(co64) = child(stbl, b"co64")? {
        let mut c = Cursor::new(co64.payload);
        c.version()?;
        (0..entry_count(&mut c, 8, "co64")?)
            .map(|_| c.u64())
            .collect::<RenderResult<_>>()?
    } else {
        return Err(RenderError::parse("missing chunk offset box"));
    };

    let stsc = require(stbl, b"stsc")?;
    let mut c = Cursor::new(stsc.payload);
    c.version()?;
    let mut runs = Vec::new();
    for _ in 0..entry_count(&mut c, 12, "stsc")? {
        let first_chunk = c.u32()?;
        let per_chunk = c.u32()?;
        c.skip(4)?;
        runs.push((first_chunk, per_chunk));
    }

    let sync: Option<Vec<u32>> = match child(stbl, b"stss")? {
        Some(stss) => {
            let mut c = Cursor::new(stss.payload);
            c.version()?;
            Some(
                (0..entry_count(&mut c, 4, "stss")?)
                    .map(|_| c.u32())
                    .collect::<RenderResult<_>>()?,
            )
        }
        None => None,
    };

    let mut samples = Vec::with_capacity(n);
    let mut dts = 0u64;
    let mut index = 0usize;
    for (chunk_idx, &chunk_offset) in chunk_offsets.iter().enumerate() {
        let chunk_no = chunk_idx as u32 + 1;
        let per_chunk = runs
            .iter()
            .take_while(|(first, _)| *first <= chunk_no)
            .last()
            .map_or(0, |(_, per)| *per);
        let mut offset = chunk_offset;
        for _ in 0..per_chunk {
            if index >= n {
                break;
            }
            let size = sizes[index];
            let duration = durations.get(index).copied().unwrap_or(0);
            let cts = (dts as i64 + offsets[index]).max(0) as u64;
            let is_sync = sync
                .as_ref()
                .is_none_or(|s| s.binary_search(&(index as u32 + 1)).is_ok());
            samples.push(SampleEntry {
                offset,
                size,
                dts,
                cts,
                duration,
                is_sync,
            });
            offset += u64::from(size);
            dts += u64::from(duration);
            index += 1;
        }
        if index >= n {
            break;
        }
    }
    if samples.len() != n {
        return Err(RenderError::parse(format!(
            "chunk map covers {} of {n} samples",
            samples.len()
        )));
    }
    Ok(samples)
}

fn parse_sizes(stbl: &[u8], file_len: u64) -> RenderResult<Vec<u32>> {
    if let Some(stsz) = child(stbl, b"stsz")? {
        let mut c = Cursor::new(stsz.payload);
        c.version()?;
        let fixed = c.u32()?;
        if fixed != 0 {
            let count = c.u32()?;
            // every sample needs at least one byte of the file
            if u64::from(count) * u64::from(fixed) > file_len {
                return Err(RenderError::parse(format!(
                    "stsz declares {count} samples of {fixed} bytes in a {file_len} byte file"
                )));
            }
            return Ok(vec![fixed; count as usize]);
        }
        let count = entry_count(&mut c, 4, "stsz")?;
        return (0..count).map(|_| c.u32()).collect();
    }
    let stz2 = require(stbl, b"stz2")?;
    let mut c = Cursor::new(stz2.payload);
    c.version()?;
    c.skip(3)?;
    let field = c.u8()?;
    let count = c.u32()? as usize;
    match field {
        4 => {
            let packed = c.take(count.div_ceil(2))?;
            Ok((0..count)
                .map(|i| {
                    let b = packed[i / 2];
                    u32::from(if i % 2 == 0 { b >> 4 } else { b & 0x0F })
                })
                .collect())
        }
        8 => Ok(c.take(count)?.iter().map(|&b| u32::from(b)).collect()),
        16 => {
            let packed = c.take(count.saturating_mul(2))?;
            Ok(packed
                .chunks_exact(2)
                .map(|b| u32::from(u16::from_be_bytes([b[0], b[1]])))
                .collect())
        }
        other => Err(RenderError::parse(format!("invalid stz2 field size {other}"))),
    }
}

#[cfg(test)]
#[path = "../../../tests/unit/codec/demux.rs"]
mod tests;
