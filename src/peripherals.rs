//! Hardware collaborator interfaces
//!
//! The connectivity core never touches device registers. Camera, audio
//! codec, indicator and buttons sit behind these traits; platform drivers
//! implement them on real hardware, and the simulation types here let the
//! binary run off-device.

use anyhow::Result;
use bytes::Bytes;
use tracing::info;

/// Still-image source.
pub trait Camera: Send + Sync {
    /// Capture a single encoded frame.
    fn capture(&self) -> Result<Bytes>;
}

/// Duplex audio codec.
pub trait AudioCodec: Send {
    /// Fill `buf` with captured audio; returns the number of bytes written.
    fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Play a frame received from the backend.
    fn write_frame(&mut self, buf: &[u8]) -> Result<()>;
}

/// Visible indicator (LED).
pub trait Indicator: Send + Sync {
    fn set(&self, on: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonKind {
    /// Maintenance button: erases provisioning and restarts.
    Front,
    /// Doorbell button.
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    SingleClick,
    LongPress,
}

/// Event delivered by the button driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub kind: ButtonKind,
    pub action: ButtonAction,
}

/// Camera returning a fixed JPEG test frame.
pub struct SimCamera;

impl Camera for SimCamera {
    fn capture(&self) -> Result<Bytes> {
        // Minimal JPEG marker sequence, enough to exercise the upload path.
        Ok(Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9]))
    }
}

/// Codec producing silence and discarding playback.
#[derive(Default)]
pub struct SimCodec;

impl AudioCodec for SimCodec {
    fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize> {
        buf.fill(0);
        Ok(buf.len())
    }

    fn write_frame(&mut self, _buf: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// Indicator that only logs state changes.
pub struct LogIndicator;

impl Indicator for LogIndicator {
    fn set(&self, on: bool) {
        info!("indicator {}", if on { "on" } else { "off" });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_camera_produces_a_jpeg_frame() {
        let frame = SimCamera.capture().unwrap();
        assert_eq!(&frame[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn sim_codec_fills_silence() {
        let mut codec = SimCodec;
        let mut buf = [0xAAu8; 64];
        let n = codec.read_frame(&mut buf).unwrap();
        assert_eq!(n, 64);
        assert!(buf.iter().all(|b| *b == 0));
    }
}
