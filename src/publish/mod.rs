//! Publisher boundary between the simulation and the message transport.
//!
//! A publisher serializes each reading and hands it to its transport. Delivery
//! and retry belong to the transport; the simulation only chooses whether to
//! wait for confirmation.

pub mod memory;
pub mod mqtt;

pub use memory::{MemoryHandle, MemoryPublisher};
pub use mqtt::{MqttPublisher, MqttSettings};

use crate::error::PublishError;
use crate::telemetry::TelemetryReading;

/// How long a publish call may hold the tick loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Return once the transport has queued the message.
    FireAndForget,
    /// Return once the broker has acknowledged the message (QoS >= 1).
    Confirmed,
}

/// An owned, explicitly closed link to a telemetry channel.
#[allow(async_fn_in_trait)]
pub trait Publisher {
    /// Serializes `reading` and publishes it once.
    async fn publish(
        &mut self,
        reading: &TelemetryReading,
        delivery: Delivery,
    ) -> Result<(), PublishError>;

    /// Flushes anything still buffered and releases the link.
    async fn disconnect(self) -> Result<(), PublishError>
    where
        Self: Sized;
}
