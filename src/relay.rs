//! Serial PTT relay control.
//!
//! Two firmware families are in the field: boards switched by the RTS/DTR
//! lines themselves, and boards expecting a command byte sequence. The byte
//! variants differ between firmware revisions, so every known on/off sequence
//! is written back-to-back; relays ignore sequences they do not understand.
//!
//! A disconnected or failed relay must never take the pipeline down: keying a
//! dead controller is a reported no-op.

use std::time::Duration;

use anyhow::{Context, Result};
use serialport::SerialPort;

use crate::events::{EngineEvent, EventBus};

const ON_SEQUENCES: [&[u8]; 3] = [&[0xA0, 0x01, 0x01, 0xA2], &[0xFF, 0x01, 0x01], &[0x01]];
const OFF_SEQUENCES: [&[u8]; 3] = [&[0xA0, 0x01, 0x00, 0xA1], &[0xFF, 0x01, 0x00], &[0x00]];

const PORT_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RelayProtocol {
    /// Drive the RTS and DTR lines directly.
    SignalLines,
    /// Write firmware command bytes.
    CommandBytes,
}

pub struct RelayController {
    port: Option<Box<dyn SerialPort>>,
    protocol: RelayProtocol,
    keyed: bool,
    events: EventBus,
}

impl RelayController {
    /// Open the serial device and start unkeyed.
    pub fn connect(
        path: &str,
        baud: u32,
        protocol: RelayProtocol,
        events: EventBus,
    ) -> Result<Self> {
        let port = serialport::new(path, baud)
            .timeout(PORT_TIMEOUT)
            .open()
            .with_context(|| format!("failed to open relay port {path}"))?;
        tracing::info!(path, baud, ?protocol, "relay connected");
        let mut controller = Self {
            port: Some(port),
            protocol,
            keyed: false,
            events,
        };
        controller.write_state(false);
        Ok(controller)
    }

    /// A controller with no device behind it. Keying is a reported no-op.
    pub fn disconnected(protocol: RelayProtocol, events: EventBus) -> Self {
        Self {
            port: None,
            protocol,
            keyed: false,
            events,
        }
    }

    pub fn key(&mut self) {
        self.set_keyed(true);
    }

    pub fn unkey(&mut self) {
        self.set_keyed(false);
    }

    pub fn is_keyed(&self) -> bool {
        self.keyed
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn set_keyed(&mut self, on: bool) {
        if self.keyed == on {
            return;
        }
        self.keyed = on;
        if self.port.is_none() {
            tracing::debug!(on, "relay not connected, ptt request ignored");
            return;
        }
        self.write_state(on);
    }

    fn write_state(&mut self, on: bool) {
        let Some(port) = self.port.as_mut() else {
            return;
        };
        if let Err(err) = drive_port(port.as_mut(), self.protocol, on) {
            // Drop the port so PTT cannot be left hanging on a half-dead
            // device; the pipeline keeps running unkeyed.
            tracing::warn!(error = %err, on, "relay write failed, disconnecting");
            self.port = None;
            self.keyed = false;
            self.events.emit(EngineEvent::RelayError {
                reason: err.to_string(),
            });
        }
    }
}

fn drive_port(port: &mut dyn SerialPort, protocol: RelayProtocol, on: bool) -> Result<()> {
    match protocol {
        RelayProtocol::SignalLines => {
            port.write_request_to_send(on)?;
            port.write_data_terminal_ready(on)?;
        }
        RelayProtocol::CommandBytes => {
            let sequences = if on { &ON_SEQUENCES } else { &OFF_SEQUENCES };
            for seq in sequences {
                port.write_all(seq)?;
            }
            port.flush()?;
        }
    }
    Ok(())
}

impl Drop for RelayController {
    fn drop(&mut self) {
        self.unkey();
    }
}

/// Host serial devices, for `--list-serial-ports`.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().context("serial port enumeration failed")?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> EventBus {
        EventBus::new(8).0
    }

    #[test]
    fn disconnected_controller_tracks_intent() {
        let mut relay = RelayController::disconnected(RelayProtocol::CommandBytes, bus());
        assert!(!relay.is_connected());
        relay.key();
        assert!(relay.is_keyed());
        relay.unkey();
        assert!(!relay.is_keyed());
    }

    #[test]
    fn repeated_key_requests_are_idempotent() {
        let mut relay = RelayController::disconnected(RelayProtocol::SignalLines, bus());
        relay.key();
        relay.key();
        assert!(relay.is_keyed());
    }

    #[test]
    fn on_and_off_sequences_pair_up() {
        for (on, off) in ON_SEQUENCES.iter().zip(OFF_SEQUENCES.iter()) {
            assert_eq!(on.len(), off.len());
        }
    }
}
