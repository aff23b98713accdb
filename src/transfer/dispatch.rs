//! Transmission of prepared images
//!
//! Picks the best channel the terminal confirmed and emits one
//! transmit-and-display command per image.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{debug, warn};
use std::io::Write;

use super::{TransferChannel, Verdicts};
use crate::constants::CHUNK_SIZE;
use crate::error::TransmitError;
use crate::pipeline::{ImagePayload, PixelFormat, Placement};
use crate::probe::artifacts::ArtifactBackend;
use crate::terminal::kitty::{GraphicsCommand, KittyAction, KittyFormat};
use crate::terminal::TerminalPort;

/// How images are shown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplaySettings {
    pub z_index: i32,
}

pub struct Dispatcher {
    settings: DisplaySettings,
}

impl Dispatcher {
    pub fn new(settings: DisplaySettings) -> Self {
        Self { settings }
    }

    /// Send `payload` as image `id` over the best usable channel.
    ///
    /// A channel whose transfer object cannot be created is skipped in
    /// favour of the next confirmed one.
    pub fn transmit<P: TerminalPort + ?Sized>(
        &self,
        port: &mut P,
        backend: &mut dyn ArtifactBackend,
        payload: &ImagePayload,
        verdicts: &Verdicts,
        id: u32,
    ) -> Result<TransferChannel, TransmitError> {
        let mut last_err = None;
        for channel in verdicts.supported() {
            match self.encode(channel, backend, payload, id) {
                Ok(bytes) => {
                    if let Some(place) = payload.placement {
                        port.write(cursor_to(place).as_bytes())?;
                    }
                    port.write(&bytes)?;
                    if payload.placement.is_none() {
                        port.write(b"\r\n")?;
                    }
                    port.flush()?;
                    debug!(
                        "Image {} ({}x{}) sent via {}",
                        id, payload.width, payload.height, channel
                    );
                    return Ok(channel);
                }
                Err(e) => {
                    warn!("Cannot send image {} via {}: {}", id, channel, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(TransmitError::NoChannel))
    }

    fn command(&self, channel: TransferChannel, payload: &ImagePayload, id: u32) -> GraphicsCommand {
        let mut cmd = GraphicsCommand {
            action: KittyAction::TransmitAndDisplay,
            format: match payload.format {
                PixelFormat::Rgb => KittyFormat::Rgb,
                PixelFormat::Rgba => KittyFormat::Rgba,
            },
            transmission: channel.transmission(),
            id,
            width: payload.width,
            height: payload.height,
            quiet: 2,
            z_index: self.settings.z_index,
            ..GraphicsCommand::default()
        };
        if let Some(place) = payload.placement {
            cmd.cols = place.width;
            cmd.rows = place.height;
            cmd.no_cursor_move = true;
        }
        cmd
    }

    fn encode(
        &self,
        channel: TransferChannel,
        backend: &mut dyn ArtifactBackend,
        payload: &ImagePayload,
        id: u32,
    ) -> Result<Vec<u8>, TransmitError> {
        let mut cmd = self.command(channel, payload, id);
        match channel {
            TransferChannel::Direct => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&payload.data)?;
                let compressed = encoder.finish()?;
                cmd.compression = Some('z');
                Ok(cmd.encode_chunked(&compressed, CHUNK_SIZE))
            }
            TransferChannel::TempFile => {
                let path = backend
                    .create_temp_file(&payload.data)
                    .map_err(|e| TransmitError::Artifact(e.to_string()))?;
                cmd.data_size = Some(payload.data.len());
                Ok(cmd.encode(path.to_string_lossy().as_bytes()))
            }
            TransferChannel::SharedMemory => {
                let name = backend
                    .create_shm(&payload.data)
                    .map_err(|e| TransmitError::Artifact(e.to_string()))?;
                cmd.data_size = Some(payload.data.len());
                Ok(cmd.encode(name.as_bytes()))
            }
        }
    }
}

/// Cursor position escape for a placement (1-based on the wire)
fn cursor_to(place: Placement) -> String {
    format!("\x1b[{};{}H", place.top + 1, place.left + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShmError;
    use crate::probe::artifacts::tests::FakeArtifacts;
    use crate::terminal::ScreenSize;
    use crate::transfer::TransferVerdict;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    #[derive(Default)]
    struct FakePort {
        out: Vec<u8>,
    }

    impl TerminalPort for FakePort {
        fn screen_size(&mut self) -> std::io::Result<ScreenSize> {
            Ok(ScreenSize::default())
        }
        fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
            self.out.extend_from_slice(data);
            Ok(())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
        fn report(&mut self, _message: &str) {}
    }

    fn payload(len: usize) -> ImagePayload {
        ImagePayload {
            width: 2,
            height: (len / 6).max(1) as u32,
            format: PixelFormat::Rgb,
            data: (0..len).map(|i| (i % 251) as u8).collect(),
            placement: None,
        }
    }

    fn all_supported() -> Verdicts {
        let mut v = Verdicts::new();
        for c in TransferChannel::PREFERENCE {
            v.settle(c, TransferVerdict::Supported);
        }
        v
    }

    #[test]
    fn test_direct_is_compressed_and_chunked() {
        let mut port = FakePort::default();
        let mut backend = FakeArtifacts::default();
        // Incompressible bytes so the payload spans several chunks
        let mut data = payload(12_000);
        let mut x: u32 = 12345;
        for b in data.data.iter_mut() {
            x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            *b = (x >> 16) as u8;
        }
        let sent = Dispatcher::new(DisplaySettings::default())
            .transmit(
                &mut port,
                &mut backend,
                &data,
                &Verdicts::forced(TransferChannel::Direct),
                5,
            )
            .unwrap();
        assert_eq!(sent, TransferChannel::Direct);

        let out = String::from_utf8(port.out).unwrap();
        assert!(out.starts_with("\x1b_Ga=T,f=24,t=d,i=5,s=2,v=2000,o=z,q=2,m=1;"));
        assert!(out.ends_with("\x1b\\\r\n"));

        let mut encoded = String::new();
        let mut chunks = 0;
        for part in out.trim_end().split("\x1b\\").filter(|p| !p.is_empty()) {
            let (_, chunk) = part.split_once(';').unwrap();
            assert!(chunk.len() <= CHUNK_SIZE);
            encoded.push_str(chunk);
            chunks += 1;
        }
        assert!(chunks > 1);
        let compressed = BASE64.decode(encoded).unwrap();
        let mut raw = Vec::new();
        ZlibDecoder::new(&compressed[..])
            .read_to_end(&mut raw)
            .unwrap();
        assert_eq!(raw, data.data);
    }

    #[test]
    fn test_prefers_shared_memory() {
        let mut port = FakePort::default();
        let mut backend = FakeArtifacts::default();
        let sent = Dispatcher::new(DisplaySettings { z_index: -3 })
            .transmit(&mut port, &mut backend, &payload(12), &all_supported(), 9)
            .unwrap();
        assert_eq!(sent, TransferChannel::SharedMemory);
        let out = String::from_utf8(port.out).unwrap();
        assert_eq!(
            out,
            format!(
                "\x1b_Ga=T,f=24,t=s,i=9,s=2,v=2,S=12,q=2,z=-3;{}\x1b\\\r\n",
                BASE64.encode("/pixcat-fake-0")
            )
        );
    }

    #[test]
    fn test_falls_back_when_artifact_fails() {
        let mut port = FakePort::default();
        let mut backend = FakeArtifacts {
            fail_shm: Some(|| ShmError::NotSupported),
            ..FakeArtifacts::default()
        };
        let sent = Dispatcher::new(DisplaySettings::default())
            .transmit(&mut port, &mut backend, &payload(12), &all_supported(), 1)
            .unwrap();
        assert_eq!(sent, TransferChannel::TempFile);
        let ledger = backend.ledger.lock().unwrap();
        assert_eq!(ledger.file_payloads[0], payload(12).data);
    }

    #[test]
    fn test_no_usable_channel() {
        let mut port = FakePort::default();
        let mut backend = FakeArtifacts {
            fail_file: true,
            ..FakeArtifacts::default()
        };
        let dispatcher = Dispatcher::new(DisplaySettings::default());
        let res = dispatcher.transmit(
            &mut port,
            &mut backend,
            &payload(12),
            &Verdicts::forced(TransferChannel::TempFile),
            1,
        );
        assert!(matches!(res, Err(TransmitError::Artifact(_))));

        let res = dispatcher.transmit(&mut port, &mut backend, &payload(12), &Verdicts::new(), 2);
        assert!(matches!(res, Err(TransmitError::NoChannel)));
        assert!(port.out.is_empty());
    }

    #[test]
    fn test_placement() {
        let mut port = FakePort::default();
        let mut backend = FakeArtifacts::default();
        let mut data = payload(12);
        data.placement = Some(Placement {
            width: 20,
            height: 10,
            left: 4,
            top: 2,
        });
        Dispatcher::new(DisplaySettings::default())
            .transmit(
                &mut port,
                &mut backend,
                &data,
                &Verdicts::forced(TransferChannel::Direct),
                1,
            )
            .unwrap();
        let out = String::from_utf8(port.out).unwrap();
        assert!(out.starts_with("\x1b[3;5H\x1b_Ga=T,"));
        assert!(out.contains(",q=2,c=20,r=10,C=1;"));
        assert!(out.ends_with("\x1b\\"));
    }
}
