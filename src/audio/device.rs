use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::capture::SampleSink;

/// Raw identifier assigned by the audio runtime. Indices can be reused
/// across runs, which is why transcript labels are positional instead.
pub type DeviceId = u32;

/// An input device as reported by the capture provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDevice {
    pub id: DeviceId,
    pub name: String,
}

/// Opaque handle for an open capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub u64);

/// Audio capture seam.
///
/// The pipeline depends only on receiving a push-style sample callback,
/// so providers are swappable: a real runtime-backed implementation, the
/// WAV-file provider used by tests and the `record` subcommand, or a mock.
#[async_trait]
pub trait AudioCaptureProvider: Send + Sync {
    /// Enumerate capture devices currently available.
    async fn list_input_devices(&self) -> Result<Vec<InputDevice>>;

    /// Open a capture stream for `device`. Samples are pushed into `sink`
    /// from the provider's capture context until the stream is closed or
    /// the device fails.
    async fn open_stream(
        &self,
        device: DeviceId,
        sample_rate: u32,
        sink: Arc<dyn SampleSink>,
    ) -> Result<StreamHandle>;

    /// Stop pushing samples for a previously opened stream.
    async fn close_stream(&self, handle: StreamHandle) -> Result<()>;
}
