use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::sync::Mutex;

use crate::codec::ffmpeg::encode::encoder_args;
use crate::codec::ffmpeg::is_ffmpeg_on_path;
use crate::codec::{EncodeProbe, EncoderConfig};

/// Encode capability check that runs one synthetic frame through `ffmpeg`.
///
/// Answers are cached per codec and frame size.
#[derive(Debug, Default)]
pub struct FfmpegProbe {
    cache: Mutex<HashMap<(String, u32, u32), bool>>,
}

impl FfmpegProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn run(config: &EncoderConfig) -> bool {
        let args = match encoder_args(config) {
            Ok(args) => args,
            Err(e) => {
                tracing::debug!(codec = %config.codec, error = %e, "no encoder mapping");
                return false;
            }
        };
        let source = format!(
            "color=c=black:s={}x{}:r={}",
            config.width,
            config.height,
            config.framerate.max(1.0).round() as u32
        );
        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-f", "lavfi", "-i"])
            .arg(&source)
            .args(["-frames:v", "1"])
            .args(&args)
            .args(["-f", "null", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output();
        match output {
            Ok(out) if out.status.success() => true,
            Ok(out) => {
                tracing::debug!(
                    codec = %config.codec,
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "ffmpeg rejected encoder config"
                );
                false
            }
            Err(e) => {
                tracing::debug!(error = %e, "failed to run ffmpeg probe");
                false
            }
        }
    }
}

impl EncodeProbe for FfmpegProbe {
    fn is_config_supported(&self, config: &EncoderConfig) -> bool {
        let key = (config.codec.clone(), config.width, config.height);
        if let Ok(cache) = self.cache.lock()
            && let Some(&known) = cache.get(&key)
        {
            return known;
        }
        if !is_ffmpeg_on_path() {
            tracing::warn!("ffmpeg not found on PATH, no encoder config is supported");
            return false;
        }
        let supported = Self::run(config);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, supported);
        }
        supported
    }
}
