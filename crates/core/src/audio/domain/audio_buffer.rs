/// Decoded audio: interleaved PCM samples normalized to [-1.0, 1.0].
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn silent(frames: usize, sample_rate: u32, channels: u16) -> Self {
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Frame index nearest to `time` seconds. Negative times map to 0.
    pub fn frame_at_time(&self, time: f64) -> usize {
        frame_at(time, self.sample_rate)
    }

    /// Interleaved samples for frames `[start, end)`, clamped to the buffer.
    pub fn frame_range(&self, start: usize, end: usize) -> &[f32] {
        let channels = self.channels as usize;
        let total = self.frames();
        let start = start.min(total);
        let end = end.clamp(start, total);
        &self.samples[start * channels..end * channels]
    }

    pub fn has_format_of(&self, other: &AudioBuffer) -> bool {
        self.sample_rate == other.sample_rate && self.channels == other.channels
    }
}

/// Frame index nearest to `time` seconds at `sample_rate`.
pub fn frame_at(time: f64, sample_rate: u32) -> usize {
    if time <= 0.0 {
        return 0;
    }
    (time * sample_rate as f64).round() as usize
}
