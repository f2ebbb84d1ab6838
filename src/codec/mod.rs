//! Data-over-sound modem: multi-frequency FSK with Reed–Solomon protection.
//!
//! Text goes in as bytes and comes out as 48 kHz f32 audio; a streaming
//! [`Decoder`] turns (possibly noisy) audio back into bytes. Dropping the
//! decoder releases its recording buffers.

pub mod decoder;
pub mod encoder;
pub mod fft;
pub mod protocol;
pub mod reed_solomon;

pub use decoder::Decoder;
pub use encoder::encode;
pub use protocol::{Protocol, SAMPLE_RATE};

/// Errors returned by encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("payload is empty")]
    EmptyPayload,

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("invalid volume: {0} (must be 0..=100)")]
    InvalidVolume(u8),

    #[error("decode failed: could not extract valid payload from audio")]
    DecodeFailed,
}
