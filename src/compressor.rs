//! The feed-forward compressor. Gain is derived from an envelope value obtained from an
//! [`EnvelopeDetector`] and multiplied into the sample, there is no look-ahead and no output
//! limiting.

use crate::envelope::{BallisticsFilter, EnvelopeDetector};
use crate::util::{self, Sample};

/// Which gain curve is used around the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KneeMode {
    /// The curve bends sharply at the threshold and the knee width is ignored.
    #[default]
    Hard,
    /// A quadratic transition spanning `knee_db` decibels centered on the threshold.
    Soft,
}

/// Everything that can be configured on a [`Compressor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorParameters<T: Sample> {
    pub threshold_db: T,
    /// Input to output dB ratio above the threshold. Must be at least 1.
    pub ratio: T,
    pub attack_ms: T,
    pub release_ms: T,
    /// Width of the knee in decibels. Only consulted in [`KneeMode::Soft`].
    pub knee_db: T,
    pub knee_mode: KneeMode,
}

impl<T: Sample> Default for CompressorParameters<T> {
    fn default() -> Self {
        Self {
            threshold_db: T::zero(),
            ratio: T::one(),
            attack_ms: T::one(),
            release_ms: T::from_f64(100.0),
            knee_db: T::one(),
            knee_mode: KneeMode::Hard,
        }
    }
}

/// Values derived from [`CompressorParameters`] so the per-sample path doesn't need to convert
/// between decibels and gain more than necessary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedCoefficients<T: Sample> {
    /// The threshold as linear gain. `0.0` for thresholds at or below the silence floor.
    pub threshold: T,
    pub threshold_inverse: T,
    pub ratio_inverse: T,
    /// `1 / (ratio - 1)`, infinite when the ratio is 1.
    pub slope: T,
    pub lower_knee_db: T,
    pub upper_knee_db: T,
    /// The knee width as linear gain.
    pub knee: T,
}

impl<T: Sample> DerivedCoefficients<T> {
    /// Compute the coefficients for a set of parameters. This is a pure function.
    pub fn from_parameters(params: &CompressorParameters<T>) -> Self {
        let threshold = util::db_to_gain(params.threshold_db);
        let half_knee = params.knee_db * T::from_f64(0.5);

        Self {
            threshold,
            threshold_inverse: T::one() / threshold,
            ratio_inverse: T::one() / params.ratio,
            slope: T::one() / (params.ratio - T::one()),
            lower_knee_db: params.threshold_db - half_knee,
            upper_knee_db: params.threshold_db + half_knee,
            knee: util::db_to_gain(params.knee_db),
        }
    }
}

/// A feed-forward compressor for any number of channels. The envelope detector is a type parameter
/// so the ballistics can be swapped out, it defaults to a peak [`BallisticsFilter`].
///
/// Parameter setters recompute all derived coefficients immediately. There is no internal
/// synchronization, so parameter changes must happen between calls to the processing functions.
#[derive(Debug, Clone)]
pub struct Compressor<T: Sample, D: EnvelopeDetector<T> = BallisticsFilter<T>> {
    params: CompressorParameters<T>,
    coefficients: DerivedCoefficients<T>,
    envelope: D,

    sample_rate: f64,
}

impl<T: Sample> Default for Compressor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Sample> Compressor<T> {
    pub fn new() -> Self {
        Self::with_detector(BallisticsFilter::new())
    }

    pub fn with_parameters(params: CompressorParameters<T>) -> Self {
        let mut compressor = Self::new();
        compressor.set_parameters(params);
        compressor
    }
}

impl<T: Sample, D: EnvelopeDetector<T>> Compressor<T, D> {
    /// Create a compressor with default parameters around an existing envelope detector.
    pub fn with_detector(envelope: D) -> Self {
        let params = CompressorParameters::default();
        let mut compressor = Self {
            params,
            coefficients: DerivedCoefficients::from_parameters(&params),
            envelope,
            sample_rate: 44100.0,
        };
        compressor.update();
        compressor
    }

    pub fn parameters(&self) -> &CompressorParameters<T> {
        &self.params
    }

    pub fn coefficients(&self) -> &DerivedCoefficients<T> {
        &self.coefficients
    }

    pub fn detector(&self) -> &D {
        &self.envelope
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.envelope
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Replace all parameters at once.
    ///
    /// # Panics
    ///
    /// Panics if the ratio is below 1.
    pub fn set_parameters(&mut self, params: CompressorParameters<T>) {
        assert!(params.ratio >= T::one(), "ratio must be at least 1");

        self.params = params;
        self.update();
    }

    pub fn set_threshold(&mut self, threshold_db: T) {
        self.params.threshold_db = threshold_db;
        self.update();
    }

    /// # Panics
    ///
    /// Panics if `ratio` is less than `1.0`.
    pub fn set_ratio(&mut self, ratio: T) {
        assert!(ratio >= T::one(), "ratio must be at least 1");

        self.params.ratio = ratio;
        self.update();
    }

    pub fn set_attack(&mut self, attack_ms: T) {
        self.params.attack_ms = attack_ms;
        self.update();
    }

    pub fn set_release(&mut self, release_ms: T) {
        self.params.release_ms = release_ms;
        self.update();
    }

    pub fn set_knee(&mut self, knee_db: T) {
        self.params.knee_db = knee_db;
        self.update();
    }

    pub fn set_knee_mode(&mut self, knee_mode: KneeMode) {
        self.params.knee_mode = knee_mode;
        self.update();
    }

    /// Configure the compressor and its envelope detector for a new sample rate and channel
    /// count. This allocates, so it must not be called from the audio thread.
    ///
    /// # Panics
    ///
    /// Panics if `sample_rate` is not positive or if `num_channels` is zero.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize, num_channels: usize) {
        assert!(sample_rate > 0.0, "sample rate must be positive");
        assert!(num_channels > 0, "at least one channel is required");

        self.sample_rate = sample_rate;
        self.envelope.prepare(sample_rate, num_channels, max_block_size);

        self.update();
        self.reset();
    }

    /// Clear the envelope detector's history. Parameters are left untouched.
    pub fn reset(&mut self) {
        self.envelope.reset();
    }

    fn update(&mut self) {
        self.coefficients = DerivedCoefficients::from_parameters(&self.params);

        self.envelope.set_attack_time(self.params.attack_ms);
        self.envelope.set_release_time(self.params.release_ms);
    }

    /// The linear gain applied for an envelope value with the current settings. This doesn't touch
    /// any state, so it can also be used to draw a transfer curve.
    #[inline]
    pub fn gain_for_envelope(&self, env: T) -> T {
        let c = &self.coefficients;

        if self.params.knee_mode == KneeMode::Soft && self.params.knee_db > T::zero() {
            let env_db = util::gain_to_db(env);
            if env_db <= c.lower_knee_db {
                return T::one();
            }
            if env_db < c.upper_knee_db {
                let overshoot = env_db - c.lower_knee_db;
                let gain_db = (c.ratio_inverse - T::one()) * overshoot * overshoot
                    / (T::from_f64(2.0) * self.params.knee_db);
                return util::db_to_gain(gain_db);
            }
        } else if env < c.threshold {
            return T::one();
        }

        // Same as `threshold_db + (input_db - threshold_db) / ratio` without going through
        // decibels. The base is at least 1 here, rounding in the inverse must not make it smaller.
        (env * c.threshold_inverse)
            .max(T::one())
            .powf(c.ratio_inverse - T::one())
    }

    /// Advance `channel`'s envelope by one sample and return the compressed sample. Calling this
    /// twice with the same input will usually not yield the same result.
    #[inline]
    pub fn process_sample(&mut self, channel: usize, input: T) -> T {
        let env = self.envelope.process_sample(channel, input);

        self.gain_for_envelope(env) * input
    }

    /// Process `input` into `output`. When `bypassed` is set the input is copied verbatim and the
    /// envelope detector does not see the bypassed samples. In dual mono mode only the first
    /// channel is detected and compressed, and the result is written to both output channels.
    ///
    /// # Panics
    ///
    /// Panics if the input and output shapes don't match, or if `dual_mono` is set and there aren't
    /// exactly two channels. Dual mono only ever reads and writes channels 0 and 1, extra channels
    /// are rejected rather than silently passed through.
    pub fn process<I, O>(&mut self, input: &[I], output: &mut [O], bypassed: bool, dual_mono: bool)
    where
        I: AsRef<[T]>,
        O: AsMut<[T]>,
    {
        assert_eq!(input.len(), output.len(), "channel count mismatch");
        let num_samples = input.first().map_or(0, |channel| channel.as_ref().len());
        for (input_channel, output_channel) in input.iter().zip(output.iter_mut()) {
            assert_eq!(input_channel.as_ref().len(), num_samples, "sample count mismatch");
            assert_eq!(output_channel.as_mut().len(), num_samples, "sample count mismatch");
        }

        if bypassed {
            for (input_channel, output_channel) in input.iter().zip(output.iter_mut()) {
                output_channel.as_mut().copy_from_slice(input_channel.as_ref());
            }
            return;
        }

        if dual_mono {
            assert_eq!(input.len(), 2, "dual mono requires exactly two channels");

            let (left, right) = output.split_at_mut(1);
            let (left, right) = (left[0].as_mut(), right[0].as_mut());
            for ((&sample, left_sample), right_sample) in input[0]
                .as_ref()
                .iter()
                .zip(left.iter_mut())
                .zip(right.iter_mut())
            {
                *left_sample = self.process_sample(0, sample);
                *right_sample = *left_sample;
            }
        } else {
            for (channel_idx, (input_channel, output_channel)) in
                input.iter().zip(output.iter_mut()).enumerate()
            {
                for (&sample, output_sample) in input_channel
                    .as_ref()
                    .iter()
                    .zip(output_channel.as_mut().iter_mut())
                {
                    *output_sample = self.process_sample(channel_idx, sample);
                }
            }
        }
    }

    /// The in-place version of [`process()`][Self::process()], used when the host hands us a
    /// single buffer.
    ///
    /// # Panics
    ///
    /// Panics if the channels have different lengths, or if `dual_mono` is set and there aren't
    /// exactly two channels. As with [`process()`][Self::process()], a block with more than two
    /// channels is rejected in dual mono instead of leaving the extra channels unprocessed.
    pub fn process_replacing<B>(&mut self, block: &mut [B], bypassed: bool, dual_mono: bool)
    where
        B: AsMut<[T]>,
    {
        let num_samples = block.first_mut().map_or(0, |channel| channel.as_mut().len());
        for channel in block.iter_mut() {
            assert_eq!(channel.as_mut().len(), num_samples, "sample count mismatch");
        }

        if bypassed {
            return;
        }

        if dual_mono {
            assert_eq!(block.len(), 2, "dual mono requires exactly two channels");

            let (left, right) = block.split_at_mut(1);
            let (left, right) = (left[0].as_mut(), right[0].as_mut());
            for (left_sample, right_sample) in left.iter_mut().zip(right.iter_mut()) {
                *left_sample = self.process_sample(0, *left_sample);
                *right_sample = *left_sample;
            }
        } else {
            for (channel_idx, channel) in block.iter_mut().enumerate() {
                for sample in channel.as_mut().iter_mut() {
                    *sample = self.process_sample(channel_idx, *sample);
                }
            }
        }
    }
}
