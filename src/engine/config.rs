//! Engine configuration

use crate::encoder::EncoderConfig;

/// Engine configuration options
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Encoder process settings
    pub encoder: EncoderConfig,

    /// Capacity of the engine's event channel
    ///
    /// Connection readers wait when it is full, which slows publishers down
    /// instead of buffering without limit.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderConfig::default(),
            event_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Set the encoder configuration
    pub fn encoder(mut self, encoder: EncoderConfig) -> Self {
        self.encoder = encoder;
        self
    }

    /// Set the event channel capacity
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}
