pub(crate) mod cue;
pub(crate) mod srt;
pub(crate) mod style;
pub(crate) mod validate;
