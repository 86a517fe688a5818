use parking_lot::Mutex;
use tracing::info;

use crate::metrics::CONNECTION_TRANSITIONS;
use crate::Error;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconfigured,
    Configured,
    Connected,
    Disconnected,
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Unconfigured => "unconfigured",
            ConnectionState::Configured => "configured",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Lifecycle state of one connector.
///
/// Transition methods report whether the state actually changed so the
/// caller fires connect/disconnect callbacks exactly once per transition.
pub struct StateTracker {
    transport: &'static str,
    state: Mutex<ConnectionState>,
}

impl StateTracker {
    pub fn new(transport: &'static str) -> Self {
        Self {
            transport,
            state: Mutex::new(ConnectionState::Unconfigured),
        }
    }

    pub fn get(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.get() == ConnectionState::Closed
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Open and past `configure`
    pub fn ensure_configured(&self) -> Result<()> {
        match self.get() {
            ConnectionState::Closed => Err(Error::Closed),
            ConnectionState::Unconfigured => Err(Error::NotConfigured),
            _ => Ok(()),
        }
    }

    /// Allowed until the first connection
    pub fn mark_configured(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            ConnectionState::Unconfigured | ConnectionState::Configured => {
                *state = ConnectionState::Configured;
                Ok(())
            }
            ConnectionState::Closed => Err(Error::Closed),
            ConnectionState::Connected | ConnectionState::Disconnected => {
                Err(Error::AlreadyConfigured)
            }
        }
    }

    /// Returns `true` when the connector was not connected before
    pub fn mark_connected(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            ConnectionState::Configured | ConnectionState::Disconnected => {
                *state = ConnectionState::Connected;
                drop(state);
                self.record(ConnectionState::Connected);
                true
            }
            _ => false,
        }
    }

    /// Returns `true` only for a `Connected -> Disconnected` transition
    pub fn mark_disconnected(&self) -> bool {
        let mut state = self.state.lock();
        if *state == ConnectionState::Connected {
            *state = ConnectionState::Disconnected;
            drop(state);
            self.record(ConnectionState::Disconnected);
            return true;
        }
        false
    }

    /// Returns the previous state if this call closed the connector
    pub fn mark_closed(&self) -> Option<ConnectionState> {
        let mut state = self.state.lock();
        if *state == ConnectionState::Closed {
            return None;
        }
        let previous = std::mem::replace(&mut *state, ConnectionState::Closed);
        drop(state);
        self.record(ConnectionState::Closed);
        Some(previous)
    }

    fn record(
        &self,
        state: ConnectionState,
    ) {
        info!(transport = self.transport, state = state.as_str(), "connection state changed");
        CONNECTION_TRANSITIONS
            .with_label_values(&[self.transport, state.as_str()])
            .inc();
    }
}
