use std::sync::LazyLock;

use regex::Regex;

use crate::subtitle::cue::SubtitleCue;

static TIMECODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(\d{1,2}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{1,2}):(\d{2}):(\d{2})[,.](\d{3})",
    )
    .unwrap_or_else(|e| panic!("timecode regex is invalid: {e}"))
});

/// Parse SRT text into cues. Malformed blocks are skipped.
pub fn parse_srt(content: &str) -> Vec<SubtitleCue> {
    let normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    let mut cues = Vec::new();

    for block in split_blocks(&normalized) {
        let lines: Vec<&str> = block.trim().split('\n').collect();
        if lines.len() < 2 {
            continue;
        }
        let index_line = lines[0].trim_start_matches('\u{FEFF}').trim();
        let Ok(id) = index_line.parse::<u32>() else {
            continue;
        };
        let Some(caps) = TIMECODE.captures(lines[1]) else {
            continue;
        };
        let field = |i: usize| -> f64 {
            caps.get(i)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .unwrap_or(0.0)
        };
        let start = field(1) * 3600.0 + field(2) * 60.0 + field(3) + field(4) / 1000.0;
        let end = field(5) * 3600.0 + field(6) * 60.0 + field(7) + field(8) / 1000.0;

        let text = lines[2..].join("\n").trim().to_string();
        if text.is_empty() {
            continue;
        }
        cues.push(SubtitleCue::new(id, start, end, text));
    }

    cues
}

fn split_blocks(s: &str) -> impl Iterator<Item = &str> {
    s.split("\n\n").filter(|b| !b.trim().is_empty())
}

/// Render cues as SRT, sorted by start time and re-indexed from 1.
pub fn generate_srt(cues: &[SubtitleCue]) -> String {
    let mut sorted: Vec<&SubtitleCue> = cues.iter().collect();
    sorted.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

    let mut lines = Vec::with_capacity(sorted.len() * 4);
    for (i, cue) in sorted.iter().enumerate() {
        lines.push((i + 1).to_string());
        lines.push(format!(
            "{} --> {}",
            format_timestamp(cue.start_time),
            format_timestamp(cue.end_time)
        ));
        lines.push(cue.text.clone());
        lines.push(String::new());
    }
    lines.join("\n")
}

/// Format seconds as `HH:MM:SS,mmm`.
pub fn format_timestamp(total_seconds: f64) -> String {
    let total_ms = (total_seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

/// Return a user-facing message when `content` holds no usable cue.
pub fn validate_srt_content(content: &str) -> Option<&'static str> {
    if content.trim().is_empty() {
        return Some("Empty SRT content");
    }
    if parse_srt(content).is_empty() {
        return Some("No valid subtitle cues found");
    }
    None
}

#[cfg(test)]
#[path = "../../tests/unit/subtitle/srt.rs"]
mod tests;
