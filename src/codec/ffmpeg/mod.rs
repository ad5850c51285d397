//! Codec backend driving the system `ffmpeg` binary through pipes.
//!
//! Containers are handled by the native MP4 demuxer and muxer; only elementary video
//! streams pass through `ffmpeg`.

pub(crate) mod decode;
pub(crate) mod encode;
pub(crate) mod probe;

use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, TryRecvError};

use crate::codec::mp4::demux::Mp4Demuxer;
use crate::codec::mp4::mux::Mp4Muxer;
use crate::codec::{Decoder, Demuxer, EncodeProbe, Encoder, MediaBackend, Muxer};
use crate::foundation::error::{RenderError, RenderResult};

pub use decode::FfmpegDecoder;
pub use encode::FfmpegEncoder;
pub use probe::FfmpegProbe;

const READ_CHUNK: usize = 64 * 1024;

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// [`MediaBackend`] pairing the native MP4 container code with `ffmpeg` codecs.
#[derive(Debug, Default)]
pub struct FfmpegBackend {
    probe: FfmpegProbe,
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MediaBackend for FfmpegBackend {
    fn open_demuxer(&self, source: Arc<[u8]>) -> RenderResult<Box<dyn Demuxer>> {
        Ok(Box::new(Mp4Demuxer::parse(source)?))
    }

    fn create_decoder(&self) -> RenderResult<Box<dyn Decoder>> {
        Ok(Box::new(FfmpegDecoder::new()))
    }

    fn create_encoder(&self) -> RenderResult<Box<dyn Encoder>> {
        Ok(Box::new(FfmpegEncoder::new()))
    }

    fn create_muxer(&self) -> RenderResult<Box<dyn Muxer>> {
        Ok(Box::new(Mp4Muxer::new()))
    }

    fn probe(&self) -> &dyn EncodeProbe {
        &self.probe
    }
}

/// A running `ffmpeg` with stdin held open, stdout read on a thread and stderr drained.
///
/// Reading stdout concurrently keeps `ffmpeg` from blocking on a full pipe while the
/// caller is still writing input.
pub(crate) struct FfmpegProcess {
    label: &'static str,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout_rx: Receiver<Vec<u8>>,
    stdout_reader: Option<JoinHandle<std::io::Result<()>>>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
}

impl FfmpegProcess {
    pub fn spawn(label: &'static str, args: &[String]) -> RenderResult<Self> {
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-hide_banner")
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        tracing::debug!(label, args = %args.join(" "), "spawning ffmpeg");

        let mut child = cmd.spawn().map_err(|e| {
            RenderError::Other(anyhow::anyhow!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to open ffmpeg stdout (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to open ffmpeg stderr (unexpected)"))?;

        let (tx, stdout_rx) = crossbeam_channel::unbounded();
        let stdout_reader = std::thread::spawn(move || {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                let n = stdout.read(&mut buf)?;
                if n == 0 || tx.send(buf[..n].to_vec()).is_err() {
                    return Ok(());
                }
            }
        });
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        Ok(Self {
            label,
            child,
            stdin: Some(stdin),
            stdout_rx,
            stdout_reader: Some(stdout_reader),
            stderr_drain: Some(stderr_drain),
        })
    }

    pub fn write(&mut self, data: &[u8]) -> RenderResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(anyhow::anyhow!("ffmpeg {} input is already closed", self.label).into());
        };
        stdin
            .write_all(data)
            .map_err(|e| anyhow::anyhow!("failed to write to ffmpeg {} stdin: {e}", self.label))?;
        Ok(())
    }

    /// Append whatever stdout produced so far without blocking.
    pub fn drain_output(&self, out: &mut Vec<u8>) {
        loop {
            match self.stdout_rx.try_recv() {
                Ok(chunk) => out.extend_from_slice(&chunk),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return,
            }
        }
    }

    /// Close stdin, collect the remaining stdout and wait for exit.
    pub fn finish(mut self, out: &mut Vec<u8>) -> RenderResult<()> {
        drop(self.stdin.take());
        for chunk in self.stdout_rx.iter() {
            out.extend_from_slice(&chunk);
        }
        let read_result = match self.stdout_reader.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow::anyhow!("ffmpeg stdout reader thread panicked"))?,
            None => Ok(()),
        };

        let status = self
            .child
            .wait()
            .map_err(|e| anyhow::anyhow!("failed to wait for ffmpeg to finish: {e}"))?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow::anyhow!("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| anyhow::anyhow!("ffmpeg stderr read failed: {e}"))?,
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(anyhow::anyhow!(
                "ffmpeg {} exited with status {}: {}",
                self.label,
                status,
                stderr.trim()
            )
            .into());
        }
        read_result.map_err(|e| anyhow::anyhow!("ffmpeg stdout read failed: {e}"))?;
        Ok(())
    }
}

impl Drop for FfmpegProcess {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            // abandoned mid-stream, e.g. after cancellation
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
#[path = "../../../tests/unit/codec/ffmpeg.rs"]
mod tests;
