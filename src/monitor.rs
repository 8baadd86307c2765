//! MIDI monitor for debugging mappings
//!
//! Prints every message from every input port, parsed the same way the
//! router sees it, so rules can be written against real traffic.

use anyhow::{bail, Result};
use colored::*;
use midir::{MidiInput, MidiInputConnection};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::devices::list_input_ports;
use crate::midi::{format_hex, EventKind, MidiEvent};

/// One captured message
#[derive(Debug, Clone)]
struct MonitorEvent {
    timestamp_ms: u64,
    port_name: String,
    data: Vec<u8>,
    event: MidiEvent,
}

/// Print the numbered list of input ports
pub fn list_ports_formatted() -> Result<()> {
    let ports = list_input_ports()?;

    println!("\n{}", "=== Available MIDI Input Ports ===".bold().cyan());
    if ports.is_empty() {
        println!("  {}", "No input ports found".dimmed());
    }
    for (i, port) in ports.iter().enumerate() {
        println!("  {} {}", format!("[{}]", i).yellow(), port);
    }
    println!();
    Ok(())
}

/// Monitor all input ports until Ctrl+C
pub async fn run_monitor() -> Result<()> {
    println!("{}", "=== MIDI Monitor ===".bold().cyan());
    println!("Press Ctrl+C to exit\n");

    let (event_tx, mut event_rx) = mpsc::channel(1000);
    let connections = connect_all_inputs(event_tx)?;

    println!("{}", "Format: [timestamp] PORT | HEX => PARSED".dimmed());
    println!("{}\n", "─".repeat(80).dimmed());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => print_event(&event),
            _ = &mut ctrl_c => break,
        }
    }

    drop(connections);
    println!("\n{}", "Monitor stopped".yellow());
    Ok(())
}

fn connect_all_inputs(event_tx: mpsc::Sender<MonitorEvent>) -> Result<Vec<MidiInputConnection<()>>> {
    let start_time = Instant::now();
    let mut connections = Vec::new();

    let scanner = MidiInput::new("MIDI-Router-Monitor")?;
    for (index, port) in scanner.ports().iter().enumerate() {
        let port_name = match scanner.port_name(port) {
            Ok(name) => name,
            Err(_) => continue,
        };

        let midi_in = MidiInput::new(&format!("MIDI-Router-Monitor-{}", index))?;
        let tx = event_tx.clone();
        let name = port_name.clone();

        let conn = midi_in.connect(
            port,
            "Monitor",
            move |_timestamp, data, _| {
                let event = MonitorEvent {
                    timestamp_ms: start_time.elapsed().as_millis() as u64,
                    port_name: name.clone(),
                    data: data.to_vec(),
                    event: MidiEvent::parse(data),
                };
                let _ = tx.try_send(event);
            },
            (),
        );

        match conn {
            Ok(conn) => {
                info!("Connected to: {}", port_name);
                connections.push(conn);
            }
            Err(e) => warn!("Failed to connect to {}: {}", port_name, e),
        }
    }

    if connections.is_empty() {
        bail!("No MIDI input ports could be opened");
    }
    Ok(connections)
}

fn print_event(event: &MonitorEvent) {
    let port = if event.port_name.chars().count() > 20 {
        format!("{}...", event.port_name.chars().take(17).collect::<String>())
    } else {
        event.port_name.clone()
    };

    let hex = format_hex(&event.data);
    let hex_colored = match event.event.kind() {
        Some(EventKind::NoteOn) => hex.bright_green(),
        Some(EventKind::NoteOff) => hex.bright_red(),
        Some(EventKind::ControlChange) => hex.bright_yellow(),
        Some(EventKind::PitchWheel) => hex.bright_cyan(),
        Some(EventKind::ProgramChange) => hex.bright_magenta(),
        None => hex.bright_black(),
    };

    println!(
        "[{}ms] {:20} | {} => {}",
        format!("{:08}", event.timestamp_ms).dimmed(),
        port.white(),
        hex_colored,
        event.event.to_string().bright_blue()
    );
}
