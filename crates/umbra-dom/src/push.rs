//! Server push coordinator
//!
//! Per-document state machine deciding whether server-initiated changes are
//! pushed over a live channel or buffered until the next client request.
//! Instructing the client to actually open the channel is the transport
//! layer's job; the coordinator only tracks the resulting state.

/// Push channel lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushStatus {
    /// No push channel; mutations flush on the next page request
    #[default]
    Disabled,
    /// Client instructed to open a channel, not yet attached
    Connecting,
    /// Live channel attached; server-event scopes flush immediately
    Enabled,
}

/// Transport-side interface for a live push channel
pub trait PushChannel: Send {
    /// Deliver one serialized delta batch to the client
    fn send(&mut self, payload: &str) -> Result<(), ChannelError>;

    /// Release the channel; no further sends will follow
    fn close(&mut self);
}

/// Push channel failures reported back to the flushing caller
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("push channel closed by peer")]
    Closed,
    #[error("push channel transport error: {0}")]
    Transport(String),
}

/// State machine owned by each document
#[derive(Default)]
pub(crate) struct PushCoordinator {
    status: PushStatus,
    channel: Option<Box<dyn PushChannel>>,
}

impl PushCoordinator {
    pub fn status(&self) -> PushStatus {
        self.status
    }

    /// `Disabled -> Connecting`; a no-op in any other state
    pub fn start_connecting(&mut self) {
        if self.status == PushStatus::Disabled {
            self.status = PushStatus::Connecting;
            tracing::debug!("push coordinator connecting");
        }
    }

    /// Attach the live channel: `-> Enabled`
    pub fn attach(&mut self, channel: Box<dyn PushChannel>) {
        if let Some(mut old) = self.channel.replace(channel) {
            old.close();
        }
        self.status = PushStatus::Enabled;
        tracing::debug!("push channel attached");
    }

    /// Send one payload over the live channel
    pub fn send(&mut self, payload: &str) -> Result<(), ChannelError> {
        match self.channel.as_mut() {
            Some(channel) => channel.send(payload),
            None => Err(ChannelError::Closed),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.status == PushStatus::Enabled && self.channel.is_some()
    }

    /// Leave `Enabled` and release the channel
    pub fn shutdown(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.status = PushStatus::Disabled;
    }
}
