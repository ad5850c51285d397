//! H.264/HEVC NAL unit helpers: Annex-B scanning, length-prefixed framing and
//! decoder configuration records (`avcC`, `hvcC`).

use crate::foundation::error::{RenderError, RenderResult};

/// Video bitstream family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NalCodec {
    Avc,
    Hevc,
}

impl NalCodec {
    /// Family of an RFC 6381 codec string (`avc1.*`, `avc3.*`, `hvc1.*`, `hev1.*`).
    pub fn from_codec_string(codec: &str) -> Option<Self> {
        let fourcc = codec.split('.').next().unwrap_or_default();
        match fourcc {
            "avc1" | "avc3" => Some(Self::Avc),
            "hvc1" | "hev1" => Some(Self::Hevc),
            _ => None,
        }
    }

    pub fn nal_type(self, nal: &[u8]) -> Option<u8> {
        let first = *nal.first()?;
        Some(match self {
            Self::Avc => first & 0x1F,
            Self::Hevc => (first >> 1) & 0x3F,
        })
    }

    /// Access unit delimiter type.
    pub fn aud_type(self) -> u8 {
        match self {
            Self::Avc => 9,
            Self::Hevc => 35,
        }
    }

    /// IDR (H.264) or IRAP (HEVC) slice.
    pub fn is_key_nal(self, nal: &[u8]) -> bool {
        match (self, self.nal_type(nal)) {
            (Self::Avc, Some(5)) => true,
            (Self::Hevc, Some(t)) => (16..=23).contains(&t),
            _ => false,
        }
    }

    /// Parameter sets kept in the configuration record instead of the samples.
    pub fn is_parameter_set(self, nal: &[u8]) -> bool {
        match (self, self.nal_type(nal)) {
            (Self::Avc, Some(t)) => t == 7 || t == 8,
            (Self::Hevc, Some(t)) => (32..=34).contains(&t),
            _ => false,
        }
    }
}

/// Split an Annex-B byte stream on `00 00 01` / `00 00 00 01` start codes.
pub fn annexb_nals(data: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push((i, i + 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut nals = Vec::with_capacity(starts.len());
    for (n, &(_, payload)) in starts.iter().enumerate() {
        let mut end = starts.get(n + 1).map_or(data.len(), |&(sc, _)| sc);
        // trailing zero belongs to a four-byte start code
        while end > payload && data[end - 1] == 0 {
            end -= 1;
        }
        if end > payload {
            nals.push(&data[payload..end]);
        }
    }
    nals
}

/// Split a length-prefixed sample (`length_size` bytes per big-endian length).
pub fn length_prefixed_nals(data: &[u8], length_size: usize) -> RenderResult<Vec<&[u8]>> {
    if !(1..=4).contains(&length_size) {
        return Err(RenderError::decode(format!(
            "invalid nal length size {length_size}"
        )));
    }
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let header = data
            .get(pos..pos + length_size)
            .ok_or_else(|| RenderError::decode("truncated nal length"))?;
        let len = header.iter().fold(0usize, |acc, &b| (acc << 8) | usize::from(b));
        pos += length_size;
        let nal = data
            .get(pos..pos + len)
            .ok_or_else(|| RenderError::decode("nal length exceeds sample"))?;
        out.push(nal);
        pos += len;
    }
    Ok(out)
}

/// Frame NAL units with 4-byte big-endian lengths.
pub fn to_length_prefixed<'a>(nals: impl IntoIterator<Item = &'a [u8]>) -> Vec<u8> {
    let mut out = Vec::new();
    for nal in nals {
        out.extend_from_slice(&(nal.len() as u32).to_be_bytes());
        out.extend_from_slice(nal);
    }
    out
}

/// Convert a length-prefixed sample into Annex-B with 4-byte start codes.
pub fn length_prefixed_to_annexb(data: &[u8], length_size: usize) -> RenderResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() + 16);
    for nal in length_prefixed_nals(data, length_size)? {
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(nal);
    }
    Ok(out)
}

/// Parameter sets as an Annex-B prefix, to feed decoders that read raw streams.
pub fn parameter_sets_annexb<'a>(sets: impl IntoIterator<Item = &'a [u8]>) -> Vec<u8> {
    let mut out = Vec::new();
    for nal in sets {
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(nal);
    }
    out
}

/// Drop emulation prevention bytes (`00 00 03`).
pub fn unescape_rbsp(nal: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(nal.len());
    let mut zeros = 0;
    for &b in nal {
        if zeros >= 2 && b == 3 {
            zeros = 0;
            continue;
        }
        zeros = if b == 0 { zeros + 1 } else { 0 };
        out.push(b);
    }
    out
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> RenderResult<&'a [u8]> {
        let s = self
            .data
            .get(self.pos..self.pos + n)
            .ok_or_else(|| RenderError::parse("truncated codec configuration record"))?;
        self.pos += n;
        Ok(s)
    }

    fn u8(&mut self) -> RenderResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> RenderResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> RenderResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// `AVCDecoderConfigurationRecord`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AvcConfig {
    pub profile: u8,
    pub compatibility: u8,
    pub level: u8,
    pub length_size: u8,
    pub sps: Vec<Vec<u8>>,
    pub pps: Vec<Vec<u8>>,
}

impl AvcConfig {
    pub fn parse(bytes: &[u8]) -> RenderResult<Self> {
        let mut r = Reader::new(bytes);
        if r.u8()? != 1 {
            return Err(RenderError::parse("unsupported avcC version"));
        }
        let profile = r.u8()?;
        let compatibility = r.u8()?;
        let level = r.u8()?;
        let length_size = (r.u8()? & 0x03) + 1;
        let num_sps = r.u8()? & 0x1F;
        let mut sps = Vec::new();
        for _ in 0..num_sps {
            let len = usize::from(r.u16()?);
            sps.push(r.take(len)?.to_vec());
        }
        let num_pps = r.u8()?;
        let mut pps = Vec::new();
        for _ in 0..num_pps {
            let len = usize::from(r.u16()?);
            pps.push(r.take(len)?.to_vec());
        }
        Ok(Self {
            profile,
            compatibility,
            level,
            length_size,
            sps,
            pps,
        })
    }

    /// Build from raw SPS/PPS NAL units; profile and level come from the first SPS.
    pub fn from_parameter_sets(sps: Vec<Vec<u8>>, pps: Vec<Vec<u8>>) -> RenderResult<Self> {
        let first = sps
            .first()
            .filter(|s| s.len() >= 4)
            .ok_or_else(|| RenderError::encode("stream carries no sps"))?;
        if pps.is_empty() {
            return Err(RenderError::encode("stream carries no pps"));
        }
        Ok(Self {
            profile: first[1],
            compatibility: first[2],
            level: first[3],
            length_size: 4,
            sps,
            pps,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![
            1,
            self.profile,
            self.compatibility,
            self.level,
            0xFC | (self.length_size.clamp(1, 4) - 1),
            0xE0 | (self.sps.len() as u8 & 0x1F),
        ];
        for s in &self.sps {
            out.extend_from_slice(&(s.len() as u16).to_be_bytes());
            out.extend_from_slice(s);
        }
        out.push(self.pps.len() as u8);
        for p in &self.pps {
            out.extend_from_slice(&(p.len() as u16).to_be_bytes());
            out.extend_from_slice(p);
        }
        if matches!(self.profile, 100 | 110 | 122 | 144) {
            // 4:2:0, 8-bit, no sps extensions
            out.extend_from_slice(&[0xFC | 1, 0xF8, 0xF8, 0]);
        }
        out
    }

    /// RFC 6381 codec string, e.g. `avc1.4d0028`.
    pub fn codec_string(&self) -> String {
        format!(
            "avc1.{:02x}{:02x}{:02x}",
            self.profile, self.compatibility, self.level
        )
    }

    pub fn parameter_sets(&self) -> impl Iterator<Item = &[u8]> {
        self.sps.iter().chain(self.pps.iter()).map(Vec::as_slice)
    }
}

/// `HEVCDecoderConfigurationRecord`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HevcConfig {
    pub profile_space: u8,
    pub tier: bool,
    pub profile_idc: u8,
    pub compatibility_flags: u32,
    pub constraint_flags: [u8; 6],
    pub level_idc: u8,
    pub length_size: u8,
    /// `(nal_unit_type, units)` arrays: VPS, SPS, PPS, SEI.
    pub arrays: Vec<(u8, Vec<Vec<u8>>)>,
}

impl HevcConfig {
    pub fn parse(bytes: &[u8]) -> RenderResult<Self> {
        let mut r = Reader::new(bytes);
        if r.u8()? != 1 {
            return Err(RenderError::parse("unsupported hvcC version"));
        }
        let b = r.u8()?;
        let compatibility_flags = r.u32()?;
        let mut constraint_flags = [0u8; 6];
        constraint_flags.copy_from_slice(r.take(6)?);
        let level_idc = r.u8()?;
        // segmentation, parallelism, chroma, bit depths, frame rate
        r.take(8)?;
        let length_size = (r.u8()? & 0x03) + 1;
        let num_arrays = r.u8()?;
        let mut arrays = Vec::new();
        for _ in 0..num_arrays {
            let nal_type = r.u8()? & 0x3F;
            let count = r.u16()?;
            let mut units = Vec::new();
            for _ in 0..count {
                let len = usize::from(r.u16()?);
                units.push(r.take(len)?.to_vec());
            }
            arrays.push((nal_type, units));
        }
        Ok(Self {
            profile_space: b >> 6,
            tier: b & 0x20 != 0,
            profile_idc: b & 0x1F,
            compatibility_flags,
            constraint_flags,
            level_idc,
            length_size,
            arrays,
        })
    }

    /// Build from raw VPS/SPS/PPS NAL units; profile, tier and level come from the SPS.
    pub fn from_parameter_sets(nals: &[&[u8]]) -> RenderResult<Self> {
        let mut arrays: Vec<(u8, Vec<Vec<u8>>)> = Vec::new();
        for nal in nals {
            let Some(t) = NalCodec::Hevc.nal_type(nal) else {
                continue;
            };
            if !(32..=34).contains(&t) {
                continue;
            }
            match arrays.iter_mut().find(|(at, _)| *at == t) {
                Some((_, units)) => units.push(nal.to_vec()),
                None => arrays.push((t, vec![nal.to_vec()])),
            }
        }
        arrays.sort_by_key(|(t, _)| *t);
        let sps = arrays
            .iter()
            .find(|(t, _)| *t == 33)
            .and_then(|(_, u)| u.first())
            .ok_or_else(|| RenderError::encode("stream carries no hevc sps"))?;

        // 2-byte nal header, then one byte of vps id / sub-layer fields
        let rbsp = unescape_rbsp(sps);
        let ptl = rbsp
            .get(3..15)
            .ok_or_else(|| RenderError::encode("hevc sps too short"))?;
        let mut constraint_flags = [0u8; 6];
        constraint_flags.copy_from_slice(&ptl[5..11]);
        Ok(Self {
            profile_space: ptl[0] >> 6,
            tier: ptl[0] & 0x20 != 0,
            profile_idc: ptl[0] & 0x1F,
            compatibility_flags: u32::from_be_bytes([ptl[1], ptl[2], ptl[3], ptl[4]]),
            constraint_flags,
            level_idc: ptl[11],
            length_size: 4,
            arrays,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![
            1,
            (self.profile_space << 6) | (u8::from(self.tier) << 5) | (self.profile_idc & 0x1F),
        ];
        out.extend_from_slice(&self.compatibility_flags.to_be_bytes());
        out.extend_from_slice(&self.constraint_flags);
        out.push(self.level_idc);
        out.extend_from_slice(&[0xF0, 0x00, 0xFC, 0xFC | 1, 0xF8, 0xF8, 0, 0]);
        out.push(0x0C | ((self.length_size.clamp(1, 4) - 1) & 0x03));
        out.push(self.arrays.len() as u8);
        for (t, units) in &self.arrays {
            out.push(0x80 | (t & 0x3F));
            out.extend_from_slice(&(units.len() as u16).to_be_bytes());
            for u in units {
                out.extend_from_slice(&(u.len() as u16).to_be_bytes());
                out.extend_from_slice(u);
            }
        }
        out
    }

    /// RFC 6381 codec string, e.g. `hvc1.1.6.L93.B0`.
    pub fn codec_string(&self, fourcc: &str) -> String {
        let space = match self.profile_space {
            1 => "A",
            2 => "B",
            3 => "C",
            _ => "",
        };
        let mut s = format!(
            "{fourcc}.{space}{}.{:X}.{}{}",
            self.profile_idc,
            self.compatibility_flags.reverse_bits(),
            if self.tier { 'H' } else { 'L' },
            self.level_idc
        );
        let used = self
            .constraint_flags
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |i| i + 1);
        for b in &self.constraint_flags[..used] {
            s.push_str(&format!(".{b:X}"));
        }
        s
    }

    pub fn parameter_sets(&self) -> impl Iterator<Item = &[u8]> {
        self.arrays
            .iter()
            .filter(|(t, _)| (32..=34).contains(t))
            .flat_map(|(_, units)| units.iter().map(Vec::as_slice))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/codec/nal.rs"]
mod tests;
