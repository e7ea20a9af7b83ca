//! Audio output handle.
//!
//! The mixer is constructed during bring-up when sound is enabled and handed
//! to the host, which owns the actual output device. Sample mixing itself is
//! the audio emulation layer's job.

pub const OUTPUT_SAMPLE_RATE: u32 = 44_100;

/// Hardware voice channels available to guest code.
pub const HARDWARE_CHANNELS: usize = 8;

#[derive(Debug)]
pub struct StereoMixer {
    pub sample_rate: u32,
    pub channels: usize,
}

impl StereoMixer {
    pub fn new() -> Self {
        StereoMixer {
            sample_rate: OUTPUT_SAMPLE_RATE,
            channels: HARDWARE_CHANNELS,
        }
    }
}

impl Default for StereoMixer {
    fn default() -> Self {
        StereoMixer::new()
    }
}

/// Host-side audio callbacks. The session calls `init_sound` once during
/// bring-up (sound enabled only) and `shutdown_sound` during teardown.
pub trait AudioHost: Send + Sync {
    fn init_sound(&self, mixer: &StereoMixer);
    fn shutdown_sound(&self);
}

/// Host without an audio device; headless runs and tests.
pub struct NullAudioHost;

impl AudioHost for NullAudioHost {
    fn init_sound(&self, _mixer: &StereoMixer) {}
    fn shutdown_sound(&self) {}
}
