use std::collections::BTreeMap;

use crate::subtitle::cue::SubtitleCue;

pub const MAX_LINES: usize = 2;
pub const MAX_DURATION_SECS: f64 = 5.0;
/// Reading speed limit, whitespace excluded.
pub const MAX_CHARS_PER_SECOND: f64 = 25.0;
pub const MAX_CHARS_PER_LINE: usize = 42;

/// Category of a readability problem.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    TooManyLines,
    TooLong,
    TooFast,
    Overlap,
    TooWide,
}

/// A problem detected on one cue.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CueProblem {
    pub cue_id: u32,
    #[serde(rename = "type")]
    pub kind: ProblemKind,
    pub message: String,
    pub auto_fixable: bool,
}

/// Reading statistics of a cue.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CueStats {
    pub char_count: usize,
    pub line_count: usize,
    pub duration: f64,
    pub chars_per_second: f64,
}

pub fn cue_stats(cue: &SubtitleCue) -> CueStats {
    let char_count = cue.text.chars().filter(|c| !c.is_whitespace()).count();
    let line_count = cue.text.split('\n').count();
    let duration = cue.duration();
    let chars_per_second = if duration > 0.0 {
        char_count as f64 / duration
    } else {
        0.0
    };
    CueStats {
        char_count,
        line_count,
        duration,
        chars_per_second,
    }
}

pub fn validate_cue(cue: &SubtitleCue) -> Vec<CueProblem> {
    let stats = cue_stats(cue);
    let mut problems = Vec::new();
    let mut push = |kind, message: String, auto_fixable| {
        problems.push(CueProblem {
            cue_id: cue.id,
            kind,
            message,
            auto_fixable,
        })
    };

    if stats.line_count > MAX_LINES {
        push(
            ProblemKind::TooManyLines,
            format!("{} lines (max {MAX_LINES})", stats.line_count),
            true,
        );
    }
    if stats.duration > MAX_DURATION_SECS {
        push(
            ProblemKind::TooLong,
            format!("{:.1}s (max {MAX_DURATION_SECS}s)", stats.duration),
            false,
        );
    }
    if stats.chars_per_second > MAX_CHARS_PER_SECOND {
        push(
            ProblemKind::TooFast,
            format!(
                "{:.1} chars/s (max {MAX_CHARS_PER_SECOND})",
                stats.chars_per_second
            ),
            false,
        );
    }
    let widest = cue
        .text
        .split('\n')
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0);
    if widest > MAX_CHARS_PER_LINE {
        push(
            ProblemKind::TooWide,
            format!("{widest} chars (max {MAX_CHARS_PER_LINE})"),
            true,
        );
    }
    problems
}

/// Report every cue whose end runs past the next cue's start (in start order).
pub fn detect_overlaps(cues: &[SubtitleCue]) -> Vec<CueProblem> {
    let mut sorted: Vec<&SubtitleCue> = cues.iter().collect();
    sorted.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    sorted
        .windows(2)
        .filter(|w| w[0].end_time > w[1].start_time)
        .map(|w| CueProblem {
            cue_id: w[0].id,
            kind: ProblemKind::Overlap,
            message: format!("overlaps cue {}", w[1].id),
            auto_fixable: true,
        })
        .collect()
}

pub fn validate_all_cues(cues: &[SubtitleCue]) -> Vec<CueProblem> {
    let mut problems: Vec<CueProblem> = cues
        .iter()
        .filter(|c| !c.ignore_problems)
        .flat_map(validate_cue)
        .collect();
    problems.extend(detect_overlaps(cues));
    problems
}

pub fn problem_summary(problems: &[CueProblem]) -> BTreeMap<ProblemKind, usize> {
    let mut summary: BTreeMap<ProblemKind, usize> = [
        ProblemKind::TooManyLines,
        ProblemKind::TooLong,
        ProblemKind::TooFast,
        ProblemKind::Overlap,
        ProblemKind::TooWide,
    ]
    .into_iter()
    .map(|k| (k, 0))
    .collect();
    for p in problems {
        *summary.entry(p.kind).or_default() += 1;
    }
    summary
}

/// Greedy word wrap to `max_chars`, keeping at most [`MAX_LINES`] lines.
pub fn auto_wrap_lines(text: &str, max_chars: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate_len = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if candidate_len <= max_chars {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        } else {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines.truncate(MAX_LINES);
    lines.join("\n")
}

/// Pull `current.end` back to 1ms before `next.start` when they overlap.
pub fn fix_overlap(current: &SubtitleCue, next: &SubtitleCue) -> SubtitleCue {
    let mut fixed = current.clone();
    if current.end_time > next.start_time {
        fixed.end_time = next.start_time - 0.001;
    }
    fixed
}

#[cfg(test)]
#[path = "../../tests/unit/subtitle/validate.rs"]
mod tests;
