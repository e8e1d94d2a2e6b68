pub mod output;
pub mod pcm;
pub mod playback;
pub mod wav;

pub use output::{default_output_factory, AudioOutput, OutputFactory, PlaybackHandle, RodioOutput};
pub use pcm::{
    decode, encode_pcm16, to_pcm16, AudioPayload, DecodedAudioBuffer, SampleFormat,
    SPEECH_CHANNELS, SPEECH_SAMPLE_RATE,
};
pub use playback::{
    PlaybackId, PlaybackPolicy, PlaybackRequest, PlaybackScheduler, PlaybackState, SchedulerConfig,
};
pub use wav::{read_wav, write_wav, WavExport};
