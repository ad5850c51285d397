//! Native MP4 muxer: buffers samples, writes `ftyp`, `mdat` and a trailing `moov` on flush.

use crate::codec::mp4::{
    FourCc, put_u16, put_u32, put_u64, write_box, write_descriptor, write_full_box,
};
use crate::codec::{MuxSample, Muxer, TrackConfig, TrackKind};
use crate::foundation::error::{RenderError, RenderResult};

const MOVIE_TIMESCALE: u32 = 1000;
const UNITY_MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

struct MuxTrack {
    id: u32,
    config: TrackConfig,
    entry: FourCc,
    samples: Vec<MuxSample>,
}

impl MuxTrack {
    /// Decode time of the first sample; written as an empty edit when non-zero.
    fn start_dts(&self) -> u64 {
        self.samples.first().map_or(0, |s| s.dts)
    }

    /// Per-sample `stts` deltas: the gap to the next decode time, or the
    /// sample's own duration where that gap is unusable.
    fn deltas(&self) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .samples
            .windows(2)
            .map(|w| {
                w[1].dts
                    .checked_sub(w[0].dts)
                    .and_then(|d| u32::try_from(d).ok())
                    .unwrap_or(w[0].duration)
            })
            .collect();
        if let Some(last) = self.samples.last() {
            out.push(last.duration);
        }
        out
    }

    fn media_duration(&self) -> u64 {
        self.deltas().iter().map(|&d| u64::from(d)).sum()
    }

    fn to_movie(&self, ticks: u64, movie_timescale: u32) -> u64 {
        let timescale = u128::from(self.config.timescale);
        let scaled = (u128::from(ticks) * u128::from(movie_timescale) + timescale / 2) / timescale;
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }

    fn movie_duration(&self, movie_timescale: u32) -> u64 {
        self.to_movie(
            self.start_dts().saturating_add(self.media_duration()),
            movie_timescale,
        )
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// In-memory MP4 writer.
#[derive(Default)]
pub struct Mp4Muxer {
    tracks: Vec<MuxTrack>,
}

impl Mp4Muxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples written so far to `track_id`.
    pub fn sample_count(&self, track_id: u32) -> usize {
        self.tracks
            .iter()
            .find(|t| t.id == track_id)
            .map_or(0, |t| t.samples.len())
    }
}

fn sample_entry_for(config: &TrackConfig) -> RenderResult<FourCc> {
    let fourcc = config.codec.split('.').next().unwrap_or_default();
    let entry: FourCc = match fourcc {
        "avc1" | "avc3" => *b"avc1",
        "hvc1" => *b"hvc1",
        "hev1" => *b"hev1",
        "mp4a" => *b"mp4a",
        other => {
            return Err(RenderError::mux(format!(
                "cannot write sample entry for codec '{other}'"
            )));
        }
    };
    if config.config.is_none() && entry != *b"mp4a" {
        return Err(RenderError::mux(format!(
            "track '{}' needs a decoder configuration record",
            config.codec
        )));
    }
    Ok(entry)
}

impl Muxer for Mp4Muxer {
    fn add_track(&mut self, config: TrackConfig) -> RenderResult<u32> {
        if config.timescale == 0 {
            return Err(RenderError::mux("track timescale must be non-zero"));
        }
        let entry = sample_entry_for(&config)?;
        let id = self.tracks.len() as u32 + 1;
        tracing::debug!(track_id = id, codec = %config.codec, timescale = config.timescale, "added output track");
        self.tracks.push(MuxTrack {
            id,
            config,
            entry,
            samples: Vec::new(),
        });
        Ok(id)
    }

    fn add_sample(&mut self, track_id: u32, sample: MuxSample) -> RenderResult<()> {
        let track = self
            .tracks
            .iter_mut()
            .find(|t| t.id == track_id)
            .ok_or_else(|| RenderError::mux(format!("unknown output track {track_id}")))?;
        track.samples.push(sample);
        Ok(())
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn flush(&mut self) -> RenderResult<Vec<u8>> {
        if self.tracks.is_empty() {
            return Err(RenderError::mux(
                "finalize called before any track was initialized",
            ));
        }

        let mut out = Vec::new();
        write_box(&mut out, b"ftyp", |out| {
            out.extend_from_slice(b"mp42");
            put_u32(out, 0);
            out.extend_from_slice(b"mp42");
            out.extend_from_slice(b"isom");
            out.extend_from_slice(b"avc1");
        });

        let payload: u64 = self
            .tracks
            .iter()
            .flat_map(|t| t.samples.iter())
            .map(|s| s.data.len() as u64)
            .sum();
        let large = payload + 8 > u64::from(u32::MAX);
        if large {
            put_u32(&mut out, 1);
            out.extend_from_slice(b"mdat");
            put_u64(&mut out, payload + 16);
        } else {
            put_u32(&mut out, (payload + 8) as u32);
            out.extend_from_slice(b"mdat");
        }

        let mut offsets: Vec<Vec<u64>> = Vec::with_capacity(self.tracks.len());
        for track in &self.tracks {
            let mut track_offsets = Vec::with_capacity(track.samples.len());
            for s in &track.samples {
                track_offsets.push(out.len() as u64);
                out.extend_from_slice(&s.data);
            }
            offsets.push(track_offsets);
        }

        let moov = self.write_moov(&offsets);
        out.extend_from_slice(&moov);
        tracing::info!(
            bytes = out.len(),
            tracks = self.tracks.len(),
            "finalized mp4"
        );
        Ok(out)
    }
}

impl Mp4Muxer {
    /// `mvhd` timescale. When a track starts late, the least common multiple of
    /// the track timescales makes its empty edit exact; otherwise milliseconds.
    fn movie_timescale(&self) -> u32 {
        if self.tracks.iter().all(|t| t.start_dts() == 0) {
            return MOVIE_TIMESCALE;
        }
        self.tracks
            .iter()
            .try_fold(1u64, |acc, t| {
                let ts = u64::from(t.config.timescale);
                let lcm = acc / gcd(acc, ts) * ts;
                (lcm <= u64::from(u32::MAX)).then_some(lcm)
            })
            .map_or(MOVIE_TIMESCALE, |lcm| lcm as u32)
    }

    fn write_moov(&self, offsets: &[Vec<u64>]) -> Vec<u8> {
        let mut out = Vec::new();
        let movie_timescale = self.movie_timescale();
        let duration = self
            .tracks
            .iter()
            .map(|t| t.movie_duration(movie_timescale))
            .max()
            .unwrap_or(0);
        let wide = duration > u64::from(u32::MAX);
        write_box(&mut out, b"moov", |out| {
            write_full_box(out, b"mvhd", u8::from(wide), 0, |out| {
                put_time(out, wide, 0);
                put_time(out, wide, 0);
                put_u32(out, movie_timescale);
                put_time(out, wide, duration);
                put_u32(out, 0x0001_0000);
                put_u16(out, 0x0100);
                out.extend_from_slice(&[0; 10]);
                for v in UNITY_MATRIX {
                    put_u32(out, v);
                }
                out.extend_from_slice(&[0; 24]);
                put_u32(out, self.tracks.len() as u32 + 1);
            });
            for (track, offs) in self.tracks.iter().zip(offsets) {
                write_trak(out, track, offs, movie_timescale);
            }
        });
        out
    }
}

/// Writes a 64-bit field for version 1 boxes and a 32-bit one otherwise.
fn put_time(out: &mut Vec<u8>, wide: bool, v: u64) {
    if wide {
        put_u64(out, v);
    } else {
        put_u32(out, v as u32);
    }
}

fn write_trak(out: &mut Vec<u8>, track: &MuxTrack, offsets: &[u64], movie_timescale: u32) {
    let cfg = &track.config;
    let is_video = cfg.kind == TrackKind::Video;
    let duration = track.movie_duration(movie_timescale);
    let media_duration = track.media_duration();
    write_box(out, b"trak", |out| {
        let wide = duration > u64::from(u32::MAX);
        write_full_box(out, b"tkhd", u8::from(wide), 3, |out| {
            put_time(out, wide, 0);
            put_time(out, wide, 0);
            put_u32(out, track.id);
            put_u32(out, 0);
            put_time(out, wide, duration);
            out.extend_from_slice(&[0; 8]);
            put_u16(out, 0);
            put_u16(out, 0);
            put_u16(out, if is_video { 0 } else { 0x0100 });
            put_u16(out, 0);
            for v in UNITY_MATRIX {
                put_u32(out, v);
            }
            put_u32(out, if is_video { cfg.width << 16 } else { 0 });
            put_u32(out, if is_video { cfg.height << 16 } else { 0 });
        });
        if track.start_dts() > 0 {
            write_edit_list(out, track, movie_timescale);
        }
        write_box(out, b"mdia", |out| {
            let wide = media_duration > u64::from(u32::MAX);
            write_full_box(out, b"mdhd", u8::from(wide), 0, |out| {
                put_time(out, wide, 0);
                put_time(out, wide, 0);
                put_u32(out, cfg.timescale);
                put_time(out, wide, media_duration);
                // 'und'
                put_u16(out, 0x55C4);
                put_u16(out, 0);
            });
            write_full_box(out, b"hdlr", 0, 0, |out| {
                put_u32(out, 0);
                out.extend_from_slice(if is_video { b"vide" } else { b"soun" });
                out.extend_from_slice(&[0; 12]);
                out.extend_from_slice(if is_video {
                    b"VideoHandler\0"
                } else {
                    b"SoundHandler\0"
                });
            });
            write_box(out, b"minf", |out| {
                if is_video {
                    write_full_box(out, b"vmhd", 0, 1, |out| out.extend_from_slice(&[0; 8]));
                } else {
                    write_full_box(out, b"smhd", 0, 0, |out| put_u32(out, 0));
                }
                write_box(out, b"dinf", |out| {
                    write_full_box(out, b"dref", 0, 0, |out| {
                        put_u32(out, 1);
                        write_full_box(out, b"url ", 0, 1, |_| {});
                    });
                });
                write_stbl(out, track, offsets);
            });
        });
    });
}

/// An empty edit covering the time before the first sample, then the media from its start.
fn write_edit_list(out: &mut Vec<u8>, track: &MuxTrack, movie_timescale: u32) {
    let delay = track.to_movie(track.start_dts(), movie_timescale);
    let body = track.to_movie(track.media_duration(), movie_timescale);
    let wide = delay.max(body) > u64::from(u32::MAX);
    write_box(out, b"edts", |out| {
        write_full_box(out, b"elst", u8::from(wide), 0, |out| {
            put_u32(out, 2);
            put_time(out, wide, delay);
            put_time(out, wide, u64::MAX);
            put_u32(out, 0x0001_0000);
            put_time(out, wide, body);
            put_time(out, wide, 0);
            put_u32(out, 0x0001_0000);
        });
    });
}

fn write_stbl(out: &mut Vec<u8>, track: &MuxTrack, offsets: &[u64]) {
    let samples = &track.samples;
    write_box(out, b"stbl", |out| {
        write_full_box(out, b"stsd", 0, 0, |out| {
            put_u32(out, 1);
            write_sample_entry(out, track);
        });

        let stts = run_lengths(track.deltas().into_iter());
        write_full_box(out, b"stts", 0, 0, |out| {
            put_u32(out, stts.len() as u32);
            for (count, delta) in &stts {
                put_u32(out, *count);
                put_u32(out, *delta);
            }
        });

        let ctts = run_lengths(samples.iter().map(|s| (s.cts as i64 - s.dts as i64) as i32));
        if ctts.iter().any(|(_, off)| *off != 0) {
            let version = u8::from(ctts.iter().any(|(_, off)| *off < 0));
            write_full_box(out, b"ctts", version, 0, |out| {
                put_u32(out, ctts.len() as u32);
                for (count, off) in &ctts {
                    put_u32(out, *count);
                    put_u32(out, *off as u32);
                }
            });
        }

        write_full_box(out, b"stsc", 0, 0, |out| {
            if samples.is_empty() {
                put_u32(out, 0);
            } else {
                put_u32(out, 1);
                put_u32(out, 1);
                put_u32(out, 1);
                put_u32(out, 1);
            }
        });

        write_full_box(out, b"stsz", 0, 0, |out| {
            put_u32(out, 0);
            put_u32(out, samples.len() as u32);
            for s in samples {
                put_u32(out, s.data.len() as u32);
            }
        });

        if offsets.iter().any(|&o| o > u64::from(u32::MAX)) {
            write_full_box(out, b"co64", 0, 0, |out| {
                put_u32(out, offsets.len() as u32);
                for &o in offsets {
                    put_u64(out, o);
                }
            });
        } else {
            write_full_box(out, b"stco", 0, 0, |out| {
                put_u32(out, offsets.len() as u32);
                for &o in offsets {
                    put_u32(out, o as u32);
                }
            });
        }

        if !samples.iter().all(|s| s.is_sync) {
            let sync: Vec<u32> = samples
                .iter()
                .enumerate()
                .filter(|(_, s)| s.is_sync)
                .map(|(i, _)| i as u32 + 1)
                .collect();
            write_full_box(out, b"stss", 0, 0, |out| {
                put_u32(out, sync.len() as u32);
                for n in sync {
                    put_u32(out, n);
                }
            });
        }
    });
}

fn write_sample_entry(out: &mut Vec<u8>, track: &MuxTrack) {
    let cfg = &track.config;
    let record = cfg.config.as_ref().map(|r| r.as_bytes()).unwrap_or_default();
    write_box(out, &track.entry, |out| {
        out.extend_from_slice(&[0; 6]);
        put_u16(out, 1);
        if track.entry == *b"mp4a" {
            out.extend_from_slice(&[0; 8]);
            put_u16(out, cfg.channels.max(1));
            put_u16(out, 16);
            put_u16(out, 0);
            put_u16(out, 0);
            put_u32(out, cfg.sample_rate.min(0xFFFF) << 16);
            write_full_box(out, b"esds", 0, 0, |out| write_es_descriptor(out, track.id, record));
            return;
        }
        out.extend_from_slice(&[0; 16]);
        put_u16(out, cfg.width as u16);
        put_u16(out, cfg.height as u16);
        put_u32(out, 0x0048_0000);
        put_u32(out, 0x0048_0000);
        put_u32(out, 0);
        put_u16(out, 1);
        out.extend_from_slice(&[0; 32]);
        put_u16(out, 0x0018);
        put_u16(out, 0xFFFF);
        let config_box: &FourCc = if track.entry == *b"avc1" {
            b"avcC"
        } else {
            b"hvcC"
        };
        write_box(out, config_box, |out| out.extend_from_slice(record));
    });
}

fn write_es_descriptor(out: &mut Vec<u8>, track_id: u32, asc: &[u8]) {
    let mut dsi = Vec::new();
    if !asc.is_empty() {
        write_descriptor(&mut dsi, 0x05, asc);
    }
    let mut dcd = vec![0x40, 0x15, 0, 0, 0];
    dcd.extend_from_slice(&[0; 8]);
    dcd.extend_from_slice(&dsi);
    let mut dcd_desc = Vec::new();
    write_descriptor(&mut dcd_desc, 0x04, &dcd);

    let mut es = Vec::new();
    es.extend_from_slice(&(track_id as u16).to_be_bytes());
    es.push(0);
    es.extend_from_slice(&dcd_desc);
    write_descriptor(&mut es, 0x06, &[0x02]);
    write_descriptor(out, 0x03, &es);
}

fn run_lengths<T: PartialEq + Copy>(values: impl Iterator<Item = T>) -> Vec<(u32, T)> {
    let mut runs: Vec<(u32, T)> = Vec::new();
    for v in values {
        match runs.last_mut() {
            Some((count, last)) if *last == v => *count += 1,
            _ => runs.push((1, v)),
        }
    }
    runs
}

#[cfg(test)]
#[path = "../../../tests/unit/codec/mux.rs"]
mod tests;
