use nih_plug::prelude::*;
use std::sync::Arc;

pub mod compressor;
pub use compressor::{Compressor, CompressorParameters, DerivedCoefficients, KneeMode};
pub mod envelope;
pub use envelope::{BallisticsFilter, EnvelopeDetector, LevelDetection};
pub mod util;
pub use util::Sample;

struct VcaComp {
    params: Arc<VcaCompParams>,
    compressor: Compressor<f32>,
    /// The number of main output channels, set in `initialize()`. Dual mono is only applied when
    /// this is two.
    num_channels: usize,
}

#[derive(Params)]
struct VcaCompParams {
    /// Level above which gain reduction starts.
    #[id = "threshold"]
    pub threshold: FloatParam,

    #[id = "ratio"]
    pub ratio: EnumParam<Ratio>,

    #[id = "attack"]
    pub attack: FloatParam,

    #[id = "release"]
    pub release: FloatParam,

    /// Width of the soft knee. Has no effect unless `soft_knee` is enabled.
    #[id = "knee"]
    pub knee: FloatParam,

    #[id = "soft_knee"]
    pub soft_knee: BoolParam,

    /// Only detect the left channel and write the compressed left channel to both outputs.
    #[id = "dual_mono"]
    pub dual_mono: BoolParam,

    #[id = "bypass"]
    pub bypass: BoolParam,
}

/// The ratios the host can choose from.
#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
enum Ratio {
    #[name = "2:1"]
    Two,
    #[name = "3:1"]
    Three,
    #[name = "4:1"]
    Four,
    #[name = "5:1"]
    Five,
    #[name = "6:1"]
    Six,
    #[name = "7:1"]
    Seven,
    #[name = "8:1"]
    Eight,
    #[name = "9:1"]
    Nine,
    #[name = "10:1"]
    Ten,
}

impl Ratio {
    fn to_f32(self) -> f32 {
        match self {
            Ratio::Two => 2.0,
            Ratio::Three => 3.0,
            Ratio::Four => 4.0,
            Ratio::Five => 5.0,
            Ratio::Six => 6.0,
            Ratio::Seven => 7.0,
            Ratio::Eight => 8.0,
            Ratio::Nine => 9.0,
            Ratio::Ten => 10.0,
        }
    }
}

impl Default for VcaComp {
    fn default() -> Self {
        Self {
            params: Arc::new(VcaCompParams::default()),
            compressor: Compressor::new(),
            num_channels: 2,
        }
    }
}

impl Default for VcaCompParams {
    fn default() -> Self {
        Self {
            threshold: FloatParam::new(
                "Threshold",
                0.0,
                FloatRange::Linear {
                    min: -60.0,
                    max: 0.0,
                },
            )
            .with_step_size(0.1)
            .with_unit(" dB"),
            ratio: EnumParam::new("Ratio", Ratio::Three),
            attack: FloatParam::new(
                "Attack",
                10.0,
                FloatRange::Linear {
                    min: 1.0,
                    max: 50.0,
                },
            )
            .with_step_size(1.0)
            .with_unit(" ms"),
            release: FloatParam::new(
                "Release",
                80.0,
                FloatRange::Linear {
                    min: 40.0,
                    max: 120.0,
                },
            )
            .with_step_size(5.0)
            .with_unit(" ms"),
            knee: FloatParam::new(
                "Knee",
                6.0,
                FloatRange::Linear {
                    min: 0.0,
                    max: 20.0,
                },
            )
            .with_step_size(1.0)
            .with_unit(" dB"),
            soft_knee: BoolParam::new("Soft Knee", false),
            dual_mono: BoolParam::new("Dual Mono", false),
            bypass: BoolParam::new("Bypass", false).make_bypass(),
        }
    }
}

impl VcaCompParams {
    /// The current parameter values in the form the compressor takes them.
    fn compressor_parameters(&self) -> CompressorParameters<f32> {
        CompressorParameters {
            threshold_db: self.threshold.value(),
            ratio: self.ratio.value().to_f32(),
            attack_ms: self.attack.value(),
            release_ms: self.release.value(),
            knee_db: self.knee.value(),
            knee_mode: if self.soft_knee.value() {
                KneeMode::Soft
            } else {
                KneeMode::Hard
            },
        }
    }
}

impl VcaComp {
    fn prepare(&mut self, sample_rate: f32, max_block_size: usize, num_channels: usize) {
        self.num_channels = num_channels;
        self.compressor.set_parameters(self.params.compressor_parameters());
        self.compressor.prepare(sample_rate as f64, max_block_size, num_channels);
    }

    /// Run the compressor over one block in place. Dual mono is ignored unless the plugin was
    /// prepared for exactly two channels.
    fn process_block(&mut self, block: &mut [&mut [f32]], bypassed: bool, dual_mono: bool) {
        self.compressor.set_parameters(self.params.compressor_parameters());

        let dual_mono = dual_mono && self.num_channels == 2;
        self.compressor.process_replacing(block, bypassed, dual_mono);
    }
}

impl Plugin for VcaComp {
    const NAME: &'static str = "Vca Comp";
    const VENDOR: &'static str = "Daishi Suzuki";
    const URL: &'static str = env!("CARGO_PKG_HOMEPAGE");
    const EMAIL: &'static str = "zukky.rikugame@gmail.com";

    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // Stereo is the default, mono is offered for hosts that insert effects on mono tracks. Dual
    // mono only does something with the stereo layout.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),

            aux_input_ports: &[],
            aux_output_ports: &[],

            names: PortNames::const_default(),
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),

            aux_input_ports: &[],
            aux_output_ports: &[],

            names: PortNames::const_default(),
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;
    const MIDI_OUTPUT: MidiConfig = MidiConfig::None;

    // Parameters are pushed into the compressor once per block
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        let num_channels = audio_io_layout
            .main_output_channels
            .map_or(0, |channels| channels.get() as usize);
        if num_channels == 0 || buffer_config.sample_rate <= 0.0 {
            nih_error!(
                "Cannot prepare for {} channels at {} Hz",
                num_channels,
                buffer_config.sample_rate
            );
            return false;
        }

        self.prepare(
            buffer_config.sample_rate,
            buffer_config.max_buffer_size as usize,
            num_channels,
        );
        nih_log!(
            "Prepared for {} channels at {} Hz, up to {} samples per block",
            num_channels,
            buffer_config.sample_rate,
            buffer_config.max_buffer_size
        );

        true
    }

    fn reset(&mut self) {
        // This is called on the audio thread after `initialize()` and whenever playback restarts,
        // only the envelope history is cleared
        self.compressor.reset();
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        if buffer.samples() == 0 {
            return ProcessStatus::Normal;
        }

        let bypassed = self.params.bypass.value();
        let dual_mono = self.params.dual_mono.value();
        self.process_block(buffer.as_slice(), bypassed, dual_mono);

        ProcessStatus::Normal
    }
}

impl ClapPlugin for VcaComp {
    const CLAP_ID: &'static str = "com.zukky.vca-comp";
    const CLAP_DESCRIPTION: Option<&'static str> = Some("Feed-forward compressor");
    const CLAP_MANUAL_URL: Option<&'static str> = Some(Self::URL);
    const CLAP_SUPPORT_URL: Option<&'static str> = None;

    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Stereo,
        ClapFeature::Mono,
        ClapFeature::Compressor,
    ];
}

nih_export_clap!(VcaComp);

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyContext;

    impl ProcessContext<VcaComp> for DummyContext {
        fn plugin_api(&self) -> PluginApi { PluginApi::Clap }
        fn execute_background(&self, _task: ()) {}
        fn execute_gui(&self, _task: ()) {}
        fn transport(&self) -> &Transport { unreachable!("transport unused") }
        fn next_event(&mut self) -> Option<PluginNoteEvent<VcaComp>> { None }
        fn send_event(&mut self, _event: PluginNoteEvent<VcaComp>) {}
        fn set_latency_samples(&self, _samples: u32) {}
        fn set_current_voice_capacity(&self, _capacity: u32) {}
    }

    fn prepared_plugin() -> VcaComp {
        let mut plugin = VcaComp::default();
        plugin.prepare(44100.0, 64, 2);
        plugin.reset();
        plugin
    }

    #[test]
    fn test_default_parameters() {
        let params = VcaCompParams::default().compressor_parameters();
        assert_eq!(params.threshold_db, 0.0);
        assert_eq!(params.ratio, 3.0);
        assert_eq!(params.attack_ms, 10.0);
        assert_eq!(params.release_ms, 80.0);
        assert_eq!(params.knee_db, 6.0);
        assert_eq!(params.knee_mode, KneeMode::Hard);
    }

    #[test]
    fn test_ratio_choices() {
        assert_eq!(Ratio::Two.to_f32(), 2.0);
        assert_eq!(Ratio::Ten.to_f32(), 10.0);
    }

    #[test]
    fn test_prepare_configures_compressor() {
        let mut plugin = VcaComp::default();
        plugin.prepare(96000.0, 128, 1);
        assert_eq!(plugin.num_channels, 1);
        assert_eq!(plugin.compressor.sample_rate(), 96000.0);
        assert_eq!(plugin.compressor.detector().num_channels(), 1);
        assert_eq!(plugin.compressor.parameters().ratio, 3.0);
    }

    #[test]
    fn test_process_silence() {
        let mut plugin = prepared_plugin();
        let mut left = vec![0.0_f32; 64];
        let mut right = vec![0.0_f32; 64];
        let mut buffer = Buffer::default();
        unsafe { buffer.set_slices(64, |out| *out = vec![&mut left, &mut right]) };
        let mut aux = AuxiliaryBuffers { inputs: &mut [], outputs: &mut [] };
        let mut ctx = DummyContext;
        plugin.process(&mut buffer, &mut aux, &mut ctx);
        for ch in buffer.as_slice() {
            assert!(ch.iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn test_process_below_threshold_passes() {
        let mut plugin = prepared_plugin();
        let mut left = vec![0.5_f32; 64];
        let mut right = vec![-0.25_f32; 64];
        let mut buffer = Buffer::default();
        unsafe { buffer.set_slices(64, |out| *out = vec![&mut left, &mut right]) };
        let mut aux = AuxiliaryBuffers { inputs: &mut [], outputs: &mut [] };
        let mut ctx = DummyContext;
        plugin.process(&mut buffer, &mut aux, &mut ctx);
        let slices = buffer.as_slice();
        assert!(slices[0].iter().all(|&s| s == 0.5));
        assert!(slices[1].iter().all(|&s| s == -0.25));
    }

    #[test]
    fn test_process_compresses_overs() {
        // The default threshold is 0 dBFS, so only signals above full scale are compressed
        let mut plugin = prepared_plugin();
        let mut left = vec![2.0_f32; 64];
        let mut right = vec![2.0_f32; 64];
        let mut buffer = Buffer::default();
        unsafe { buffer.set_slices(64, |out| *out = vec![&mut left, &mut right]) };
        let mut aux = AuxiliaryBuffers { inputs: &mut [], outputs: &mut [] };
        let mut ctx = DummyContext;
        plugin.process(&mut buffer, &mut aux, &mut ctx);
        let slices = buffer.as_slice();
        assert!(slices[0].iter().all(|&s| s <= 2.0));
        assert!(slices[0].iter().any(|&s| s != 2.0));
        assert_eq!(slices[0], slices[1]);
    }

    #[test]
    fn test_bypass_leaves_block_untouched() {
        let mut plugin = prepared_plugin();
        let mut left = vec![2.0_f32; 64];
        let mut right = vec![-3.0_f32; 64];
        let mut block = [left.as_mut_slice(), right.as_mut_slice()];
        plugin.process_block(&mut block, true, false);
        assert!(left.iter().all(|&s| s == 2.0));
        assert!(right.iter().all(|&s| s == -3.0));

        // The bypassed audio must not have charged the envelope either
        let mut reference = prepared_plugin();
        let mut expected = vec![2.0_f32; 64];
        let mut processed = vec![2.0_f32; 64];
        reference.process_block(&mut [expected.as_mut_slice()], false, false);
        plugin.process_block(&mut [processed.as_mut_slice()], false, false);
        assert_eq!(processed, expected);
    }

    #[test]
    fn test_dual_mono_stereo_copies_left() {
        let mut plugin = prepared_plugin();
        let mut left: Vec<f32> = (0..64).map(|i| 2.0 * (i as f32 * 0.1).sin()).collect();
        let mut right = vec![0.0_f32; 64];
        let mut expected = left.clone();
        let mut block = [left.as_mut_slice(), right.as_mut_slice()];
        plugin.process_block(&mut block, false, true);
        assert_eq!(left, right);

        let mut reference = prepared_plugin();
        reference.process_block(&mut [expected.as_mut_slice()], false, false);
        assert_eq!(left, expected);
    }

    #[test]
    fn test_dual_mono_ignored_for_mono_layout() {
        let mut plugin = VcaComp::default();
        plugin.prepare(44100.0, 64, 1);
        let mut samples = vec![2.0_f32; 64];
        plugin.process_block(&mut [samples.as_mut_slice()], false, true);
        assert!(samples.iter().all(|&s| s <= 2.0));
        assert!(samples.iter().any(|&s| s != 2.0));
    }
}
