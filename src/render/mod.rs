//! End-to-end rendering: options, the threaded pipeline and preview frames.

pub(crate) mod options;
pub(crate) mod pipeline;
pub(crate) mod preview;
