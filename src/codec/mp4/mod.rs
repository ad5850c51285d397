//! ISO-BMFF (MP4) box reading and writing.

pub(crate) mod demux;
pub(crate) mod mux;

use crate::foundation::error::{RenderError, RenderResult};

pub(crate) type FourCc = [u8; 4];

/// A box located inside a parent payload.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Mp4Box<'a> {
    pub kind: FourCc,
    pub payload: &'a [u8],
}

impl Mp4Box<'_> {
    pub fn kind_str(&self) -> String {
        String::from_utf8_lossy(&self.kind).into_owned()
    }
}

/// Iterate the boxes laid end to end in `data`.
pub(crate) fn boxes(data: &[u8]) -> Boxes<'_> {
    Boxes { data, pos: 0 }
}

pub(crate) struct Boxes<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Boxes<'a> {
    type Item = RenderResult<Mp4Box<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.data[self.pos..];
        if rest.len() < 8 {
            return None;
        }
        let size32 = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        let kind = [rest[4], rest[5], rest[6], rest[7]];
        let (header, size) = match size32 {
            0 => (8, rest.len() as u64),
            1 => {
                let Some(b) = rest.get(8..16) else {
                    self.pos = self.data.len();
                    return Some(Err(RenderError::parse("truncated 64-bit box size")));
                };
                let mut a = [0u8; 8];
                a.copy_from_slice(b);
                (16, u64::from_be_bytes(a))
            }
            n => (8, u64::from(n)),
        };
        if size < header as u64 || size > rest.len() as u64 {
            self.pos = self.data.len();
            return Some(Err(RenderError::parse(format!(
                "box '{}' overruns its parent",
                String::from_utf8_lossy(&kind)
            ))));
        }
        let size = size as usize;
        self.pos += size;
        Some(Ok(Mp4Box {
            kind,
            payload: &rest[header..size],
        }))
    }
}

/// First child of `kind`.
pub(crate) fn child<'a>(data: &'a [u8], kind: &FourCc) -> RenderResult<Option<Mp4Box<'a>>> {
    for b in boxes(data) {
        let b = b?;
        if &b.kind == kind {
            return Ok(Some(b));
        }
    }
    Ok(None)
}

/// Required child of `kind`.
pub(crate) fn require<'a>(data: &'a [u8], kind: &FourCc) -> RenderResult<Mp4Box<'a>> {
    child(data, kind)?.ok_or_else(|| {
        RenderError::parse(format!("missing '{}' box", String::from_utf8_lossy(kind)))
    })
}

/// Big-endian cursor over a box payload.
pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    pub fn take(&mut self, n: usize) -> RenderResult<&'a [u8]> {
        let s = self
            .data
            .get(self.pos..self.pos.saturating_add(n))
            .ok_or_else(|| RenderError::parse("truncated box payload"))?;
        self.pos += n;
        Ok(s)
    }

    pub fn skip(&mut self, n: usize) -> RenderResult<()> {
        self.take(n).map(|_| ())
    }

    pub fn u8(&mut self) -> RenderResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> RenderResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u24(&mut self) -> RenderResult<u32> {
        let b = self.take(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn u32(&mut self) -> RenderResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> RenderResult<u64> {
        let b = self.take(8)?;
        let mut a = [0u8; 8];
        a.copy_from_slice(b);
        Ok(u64::from_be_bytes(a))
    }

    /// Full-box version byte; flags are skipped.
    pub fn version(&mut self) -> RenderResult<u8> {
        let v = self.u8()?;
        self.skip(3)?;
        Ok(v)
    }
}

/// Append a box, patching its size after `body` wrote the payload.
pub(crate) fn write_box(out: &mut Vec<u8>, kind: &FourCc, body: impl FnOnce(&mut Vec<u8>)) {
    let start = out.len();
    out.extend_from_slice(&[0, 0, 0, 0]);
    out.extend_from_slice(kind);
    body(out);
    let size = (out.len() - start) as u32;
    out[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

/// Append a full box with `version` and `flags`.
pub(crate) fn write_full_box(
    out: &mut Vec<u8>,
    kind: &FourCc,
    version: u8,
    flags: u32,
    body: impl FnOnce(&mut Vec<u8>),
) {
    write_box(out, kind, |out| {
        out.push(version);
        out.extend_from_slice(&flags.to_be_bytes()[1..]);
        body(out);
    });
}

pub(crate) fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// Read an MPEG-4 descriptor header (tag plus 7-bit varint length).
pub(crate) fn read_descriptor(c: &mut Cursor<'_>) -> RenderResult<(u8, usize)> {
    let tag = c.u8()?;
    let mut len = 0usize;
    for _ in 0..4 {
        let b = c.u8()?;
        len = (len << 7) | usize::from(b & 0x7F);
        if b & 0x80 == 0 {
            break;
        }
    }
    Ok((tag, len))
}

/// Write an MPEG-4 descriptor with a fixed 4-byte length.
pub(crate) fn write_descriptor(out: &mut Vec<u8>, tag: u8, body: &[u8]) {
    out.push(tag);
    let len = body.len() as u32;
    out.extend_from_slice(&[
        0x80 | ((len >> 21) & 0x7F) as u8,
        0x80 | ((len >> 14) & 0x7F) as u8,
        0x80 | ((len >> 7) & 0x7F) as u8,
        (len & 0x7F) as u8,
    ]);
    out.extend_from_slice(body);
}

#[cfg(test)]
#[path = "../../../tests/unit/codec/mp4.rs"]
mod tests;
