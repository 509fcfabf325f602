pub(crate) mod control;
pub(crate) mod diagnostics;
pub(crate) mod error;
pub(crate) mod process;
