//! Waveform rendering through an external plotter.

/// Image sizing and output checks.
pub mod geometry;
/// `gnuplot` invocation.
pub mod plot;
