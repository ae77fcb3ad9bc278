use std::f64::consts::PI;

use crate::util::Sample;

/// The level detector the compressor queries once per sample. Implementations keep independent
/// state for every channel they were prepared for.
pub trait EnvelopeDetector<T: Sample> {
    /// Allocate per-channel state and recompute anything that depends on the sample rate. Called
    /// outside of the audio thread.
    fn prepare(&mut self, sample_rate: f64, num_channels: usize, max_block_size: usize);

    /// Forget all previously seen audio.
    fn reset(&mut self);

    fn set_attack_time(&mut self, attack_ms: T);

    fn set_release_time(&mut self, release_ms: T);

    /// Advance `channel` by exactly one sample and return its new envelope value. The result is
    /// always non-negative and in the linear gain domain.
    fn process_sample(&mut self, channel: usize, input: T) -> T;
}

/// How the input is rectified before it's smoothed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelDetection {
    /// Track the absolute value of the input.
    #[default]
    Peak,
    /// Track the mean square and return its square root.
    Rms,
}

/// A one-pole envelope follower with separate attack and release coefficients. A coefficient is
/// chosen per sample depending on whether the rectified input is above or below the previous
/// output.
#[derive(Debug, Clone)]
pub struct BallisticsFilter<T: Sample> {
    /// The previous output for each channel, before the RMS square root is taken.
    y_old: Vec<T>,

    sample_rate: f64,
    /// `-2 * pi * 1000 / sample_rate`, divided by a time in milliseconds to get the exponent of a
    /// coefficient.
    exp_factor: f64,

    attack_ms: T,
    release_ms: T,
    attack_coeff: T,
    release_coeff: T,

    level_detection: LevelDetection,
}

impl<T: Sample> Default for BallisticsFilter<T> {
    fn default() -> Self {
        let mut filter = Self {
            y_old: vec![T::zero(); 2],
            sample_rate: 44100.0,
            exp_factor: 0.0,
            attack_ms: T::one(),
            release_ms: T::from_f64(100.0),
            attack_coeff: T::zero(),
            release_coeff: T::zero(),
            level_detection: LevelDetection::Peak,
        };
        filter.update_exp_factor();
        filter
    }
}

impl<T: Sample> BallisticsFilter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level_detection(&self) -> LevelDetection {
        self.level_detection
    }

    pub fn set_level_detection(&mut self, level_detection: LevelDetection) {
        if self.level_detection != level_detection {
            self.level_detection = level_detection;
            self.reset();
        }
    }

    pub fn num_channels(&self) -> usize {
        self.y_old.len()
    }

    fn update_exp_factor(&mut self) {
        self.exp_factor = -2.0 * PI * 1000.0 / self.sample_rate;
        self.attack_coeff = self.coefficient_for(self.attack_ms);
        self.release_coeff = self.coefficient_for(self.release_ms);
    }

    /// Times below a microsecond make the follower jump straight to its input.
    fn coefficient_for(&self, time_ms: T) -> T {
        if time_ms < T::from_f64(1.0e-3) {
            T::zero()
        } else {
            (T::from_f64(self.exp_factor) / time_ms).exp()
        }
    }
}

impl<T: Sample> EnvelopeDetector<T> for BallisticsFilter<T> {
    fn prepare(&mut self, sample_rate: f64, num_channels: usize, _max_block_size: usize) {
        assert!(sample_rate > 0.0, "sample rate must be positive");
        assert!(num_channels > 0, "at least one channel is required");

        self.sample_rate = sample_rate;
        self.y_old.resize(num_channels, T::zero());
        self.update_exp_factor();
        self.reset();
    }

    fn reset(&mut self) {
        self.y_old.fill(T::zero());
    }

    fn set_attack_time(&mut self, attack_ms: T) {
        self.attack_ms = attack_ms;
        self.attack_coeff = self.coefficient_for(attack_ms);
    }

    fn set_release_time(&mut self, release_ms: T) {
        self.release_ms = release_ms;
        self.release_coeff = self.coefficient_for(release_ms);
    }

    #[inline]
    fn process_sample(&mut self, channel: usize, input: T) -> T {
        let target = match self.level_detection {
            LevelDetection::Peak => input.abs(),
            LevelDetection::Rms => input * input,
        };

        let y_old = &mut self.y_old[channel];
        let coeff = if target > *y_old {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        let result = target + coeff * (*y_old - target);
        *y_old = result;

        match self.level_detection {
            LevelDetection::Peak => result,
            LevelDetection::Rms => result.sqrt(),
        }
    }
}
