//! MIDI input devices
//!
//! Discovers input ports, pairs them with configured devices and forwards
//! every incoming message to the dispatcher queue.

use anyhow::{anyhow, Result};
use midir::{MidiInput, MidiInputConnection};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::midi::{format_hex, MidiEvent};
use crate::router::EventSender;

const CLIENT_NAME: &str = "MIDI-Router";

/// Port pattern that selects every available input
pub const MATCH_ALL: &str = "*";

/// A configured device bound to a concrete input port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiDevice {
    pub name: String,
    pub port_name: String,
}

/// List available MIDI input ports
pub fn list_input_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new(&format!("{}-Scanner", CLIENT_NAME))?;

    let mut port_names = Vec::new();
    for port in midi_in.ports() {
        if let Ok(name) = midi_in.port_name(&port) {
            port_names.push(name);
        }
    }
    Ok(port_names)
}

/// Pair enabled devices with the ports their pattern selects
///
/// Patterns are case-insensitive substrings of the port name; `*` selects
/// every port. Results follow device order, then port order.
pub fn match_ports(devices: &[DeviceConfig], ports: &[String]) -> Vec<MidiDevice> {
    let mut matched = Vec::new();

    for device in devices.iter().filter(|d| d.enabled) {
        let pattern = device.pattern.to_lowercase();
        for port in ports {
            if pattern == MATCH_ALL || port.to_lowercase().contains(&pattern) {
                matched.push(MidiDevice {
                    name: device.name.clone(),
                    port_name: port.clone(),
                });
            }
        }
    }

    matched
}

/// Owns the open input connections
///
/// Dropping a connection stops its midir callback thread, which in turn
/// releases that listener's queue sender.
#[derive(Default)]
pub struct DeviceManager {
    connections: Vec<(MidiDevice, MidiInputConnection<()>)>,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open every device and forward its events to `tx`
    ///
    /// A device that fails to open is logged and skipped. Returns the number
    /// of connections now open.
    pub fn connect_all(&mut self, devices: &[MidiDevice], tx: &EventSender) -> usize {
        for device in devices {
            match open_input(device, tx.clone()) {
                Ok(conn) => {
                    info!("Listening on '{}' ({})", device.name, device.port_name);
                    self.connections.push((device.clone(), conn));
                }
                Err(e) => warn!("Failed to open '{}' ({}): {:#}", device.name, device.port_name, e),
            }
        }
        self.connections.len()
    }

    /// Close all input connections
    pub fn disconnect_all(&mut self) {
        for (device, conn) in self.connections.drain(..) {
            conn.close();
            debug!("Closed '{}' ({})", device.name, device.port_name);
        }
    }

    pub fn devices(&self) -> impl Iterator<Item = &MidiDevice> {
        self.connections.iter().map(|(device, _)| device)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

fn open_input(device: &MidiDevice, tx: EventSender) -> Result<MidiInputConnection<()>> {
    let midi_in = MidiInput::new(&format!("{}-{}", CLIENT_NAME, device.name))?;

    let port = midi_in
        .ports()
        .into_iter()
        .find(|p| midi_in.port_name(p).map(|n| n == device.port_name).unwrap_or(false))
        .ok_or_else(|| anyhow!("Port disappeared"))?;

    let device_name = device.name.clone();
    midi_in
        .connect(
            &port,
            &device.name,
            move |_timestamp, data, _| {
                let event = MidiEvent::parse(data);
                debug!("[{}] RX {}", device_name, format_hex(data));

                match tx.try_send((device_name.clone(), event)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("[{}] Event queue full, dropping event", device_name);
                    }
                    Err(TrySendError::Closed(_)) => {}
                }
            },
            (),
        )
        .map_err(|e| anyhow!("Failed to connect: {}", e))
}
