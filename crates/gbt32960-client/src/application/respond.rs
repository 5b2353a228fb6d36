//! AutoAckUseCase: answers platform commands that expect an acknowledgement.
//!
//! A packet whose ack flag is [`AckFlag::NotAck`] is a command waiting for a
//! reply.  This use case builds the reply with [`Packet::make_response`] and
//! hands it to a [`PacketSender`].  Packets that already carry a response code
//! (success, failure, ...) are replies themselves and are never answered.
//!
//! The sender and clock are injected, so the use case runs in tests against a
//! mock sender and a fixed clock.

use std::sync::Arc;

use async_trait::async_trait;
use gbt32960_core::{AckFlag, Clock, Packet};
use thiserror::Error;
use tracing::{debug, info};

/// Error type for the auto-acknowledge use case.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RespondError {
    #[error("failed to send acknowledgement: {0}")]
    Send(String),
}

/// Trait for writing a packet to the platform.
///
/// The infrastructure implementation is the network session; tests use a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PacketSender: Send + Sync {
    /// Sends one packet.
    async fn send_packet(&self, packet: &Packet) -> Result<(), String>;
}

/// Replies `Success` to every inbound command that awaits an answer.
pub struct AutoAckUseCase {
    sender: Arc<dyn PacketSender>,
    clock: Arc<dyn Clock + Send + Sync>,
    enabled: bool,
}

impl AutoAckUseCase {
    /// Creates the use case.  With `enabled == false` it never replies.
    pub fn new(
        sender: Arc<dyn PacketSender>,
        clock: Arc<dyn Clock + Send + Sync>,
        enabled: bool,
    ) -> Self {
        Self {
            sender,
            clock,
            enabled,
        }
    }

    /// Returns the reply for `packet`, or `None` if it needs no reply.
    pub fn response_for(&self, packet: &Packet) -> Option<Packet> {
        if !self.enabled || packet.ack_flag != AckFlag::NotAck {
            return None;
        }
        Some(packet.make_response(AckFlag::Success, self.clock.as_ref()))
    }

    /// Sends the reply for `packet` if one is due, returning what was sent.
    ///
    /// # Errors
    ///
    /// Returns [`RespondError::Send`] if the sender fails.
    pub async fn handle(&self, packet: &Packet) -> Result<Option<Packet>, RespondError> {
        let Some(response) = self.response_for(packet) else {
            debug!("no acknowledgement due for cmd={:02x}", packet.command_flag);
            return Ok(None);
        };
        self.sender
            .send_packet(&response)
            .await
            .map_err(RespondError::Send)?;
        info!(
            "acknowledged cmd={:02x} for VIN {}",
            response.command_flag, response.vin
        );
        Ok(Some(response))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
