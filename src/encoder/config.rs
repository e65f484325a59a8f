//! Encoder configuration

use std::time::Duration;

/// Default publish origin when none is configured
pub const DEFAULT_ORIGIN_BASE: &str = "rtmp://localhost";

/// Default restart ceiling for a crashing encoder
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Encoder process configuration
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Encoder program to execute
    pub program: String,

    /// Origin base URL; streams publish to `<origin_base>/live/<streamId>`
    pub origin_base: String,

    /// Video codec (`-c:v`)
    pub video_codec: String,

    /// Encoder preset (`-preset`)
    pub preset: String,

    /// Audio codec (`-c:a`)
    pub audio_codec: String,

    /// Audio sample rate (`-ar`)
    pub audio_sample_rate: u32,

    /// Maximum consecutive restarts after abnormal exits
    pub max_retries: u32,

    /// Maximum queued bytes not yet accepted by the encoder's input
    pub pipe_high_watermark: usize,

    /// How long a stop waits for queued input to drain, and then for the exit, before killing
    pub stop_timeout: Duration,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".into(),
            origin_base: DEFAULT_ORIGIN_BASE.into(),
            video_codec: "libx264".into(),
            preset: "veryfast".into(),
            audio_codec: "aac".into(),
            audio_sample_rate: 44100,
            max_retries: DEFAULT_MAX_RETRIES,
            pipe_high_watermark: 8 * 1024 * 1024, // 8MB
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl EncoderConfig {
    /// Set the encoder program
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the origin base URL
    pub fn origin_base(mut self, base: impl Into<String>) -> Self {
        self.origin_base = base.into();
        self
    }

    /// Set the restart ceiling
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the input pipe high-watermark in bytes
    pub fn pipe_high_watermark(mut self, bytes: usize) -> Self {
        self.pipe_high_watermark = bytes;
        self
    }

    /// Set the stop drain timeout
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EncoderConfig::default();

        assert_eq!(config.program, "ffmpeg");
        assert_eq!(config.origin_base, "rtmp://localhost");
        assert_eq!(config.video_codec, "libx264");
        assert_eq!(config.preset, "veryfast");
        assert_eq!(config.audio_codec, "aac");
        assert_eq!(config.audio_sample_rate, 44100);
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_builder_chaining() {
        let config = EncoderConfig::default()
            .program("/usr/local/bin/ffmpeg")
            .origin_base("rtmp://origin.internal:1935")
            .max_retries(2)
            .pipe_high_watermark(1024)
            .stop_timeout(Duration::from_millis(250));

        assert_eq!(config.program, "/usr/local/bin/ffmpeg");
        assert_eq!(config.origin_base, "rtmp://origin.internal:1935");
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.pipe_high_watermark, 1024);
        assert_eq!(config.stop_timeout, Duration::from_millis(250));
    }
}
