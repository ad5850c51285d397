pub(crate) mod blur;
pub(crate) mod cpu;
pub(crate) mod plan;
pub(crate) mod text;
