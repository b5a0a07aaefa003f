//! Shared utilities: frame pacing and host-side timing.

/// Start/stop wall-clock measurement.
pub mod clock;
/// Frame rate measurement and limiting.
pub mod frame_timing;
#[cfg(test)]
pub(crate) mod test_log;

pub use clock::CpuClock;
pub use frame_timing::FrameTiming;
