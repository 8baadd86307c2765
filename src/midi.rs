//! MIDI event model
//!
//! Typed representation of the control-surface messages the router understands,
//! plus a total parser from raw transport bytes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Center value of the 14-bit pitch wheel
const PITCH_CENTER: i16 = 8192;

/// Kinds of event a rule can match on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ControlChange,
    NoteOn,
    NoteOff,
    ProgramChange,
    #[serde(rename = "pitchwheel", alias = "pitch_wheel")]
    PitchWheel,
}

impl EventKind {
    /// Every kind, in declaration order
    pub const ALL: [EventKind; 5] = [
        EventKind::ControlChange,
        EventKind::NoteOn,
        EventKind::NoteOff,
        EventKind::ProgramChange,
        EventKind::PitchWheel,
    ];

    /// Configuration name of this kind (also the signature prefix)
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ControlChange => "control_change",
            EventKind::NoteOn => "note_on",
            EventKind::NoteOff => "note_off",
            EventKind::ProgramChange => "program_change",
            EventKind::PitchWheel => "pitchwheel",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "control_change" => Ok(EventKind::ControlChange),
            "note_on" => Ok(EventKind::NoteOn),
            "note_off" => Ok(EventKind::NoteOff),
            "program_change" => Ok(EventKind::ProgramChange),
            "pitchwheel" | "pitch_wheel" => Ok(EventKind::PitchWheel),
            other => Err(format!("unknown event type '{}'", other)),
        }
    }
}

/// A single control-surface message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiEvent {
    /// Control Change: channel (0-15), control (0-127), value (0-127)
    ControlChange { channel: u8, control: u8, value: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Program Change: channel (0-15), program (0-127)
    ProgramChange { channel: u8, program: u8 },

    /// Pitch Wheel: channel (0-15), pitch (-8192..=8191, 0 = center)
    PitchWheel { channel: u8, pitch: i16 },

    /// Anything else, kept verbatim
    Unrecognized { raw: Vec<u8> },
}

impl MidiEvent {
    /// Parse raw MIDI bytes.
    ///
    /// Never fails: truncated, system or otherwise unsupported messages come
    /// back as [`MidiEvent::Unrecognized`] wrapping the input bytes.
    pub fn parse(data: &[u8]) -> Self {
        Self::parse_channel_message(data).unwrap_or_else(|| MidiEvent::Unrecognized {
            raw: data.to_vec(),
        })
    }

    fn parse_channel_message(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;

        // Data byte first means running status, system messages are 0xF0+
        if !(0x80..0xF0).contains(&status) {
            return None;
        }

        let channel = status & 0x0F;
        let data1 = data.get(1).map(|b| b & 0x7F);
        let data2 = data.get(2).map(|b| b & 0x7F);

        match status & 0xF0 {
            0x80 => Some(MidiEvent::NoteOff {
                channel,
                note: data1?,
                velocity: data2?,
            }),
            0x90 => Some(MidiEvent::NoteOn {
                channel,
                note: data1?,
                velocity: data2?,
            }),
            0xB0 => Some(MidiEvent::ControlChange {
                channel,
                control: data1?,
                value: data2?,
            }),
            0xC0 => Some(MidiEvent::ProgramChange {
                channel,
                program: data1?,
            }),
            0xE0 => {
                let value14 = ((data2? as i16) << 7) | data1? as i16;
                Some(MidiEvent::PitchWheel {
                    channel,
                    pitch: value14 - PITCH_CENTER,
                })
            }
            _ => None,
        }
    }

    /// Encode back to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiEvent::ControlChange { channel, control, value } => {
                vec![0xB0 | (channel & 0x0F), control & 0x7F, value & 0x7F]
            }
            MidiEvent::NoteOn { channel, note, velocity } => {
                vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiEvent::NoteOff { channel, note, velocity } => {
                vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiEvent::ProgramChange { channel, program } => {
                vec![0xC0 | (channel & 0x0F), program & 0x7F]
            }
            MidiEvent::PitchWheel { channel, pitch } => {
                let value14 = (pitch.clamp(-PITCH_CENTER, PITCH_CENTER - 1) + PITCH_CENTER) as u16;
                vec![
                    0xE0 | (channel & 0x0F),
                    (value14 & 0x7F) as u8,
                    ((value14 >> 7) & 0x7F) as u8,
                ]
            }
            MidiEvent::Unrecognized { ref raw } => raw.clone(),
        }
    }

    /// Kind of this event, `None` for unrecognized messages
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            MidiEvent::ControlChange { .. } => Some(EventKind::ControlChange),
            MidiEvent::NoteOn { .. } => Some(EventKind::NoteOn),
            MidiEvent::NoteOff { .. } => Some(EventKind::NoteOff),
            MidiEvent::ProgramChange { .. } => Some(EventKind::ProgramChange),
            MidiEvent::PitchWheel { .. } => Some(EventKind::PitchWheel),
            MidiEvent::Unrecognized { .. } => None,
        }
    }

    /// Channel (0-15), `None` for unrecognized messages
    pub fn channel(&self) -> Option<u8> {
        match *self {
            MidiEvent::ControlChange { channel, .. }
            | MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ProgramChange { channel, .. }
            | MidiEvent::PitchWheel { channel, .. } => Some(channel),
            MidiEvent::Unrecognized { .. } => None,
        }
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiEvent::ControlChange { channel, control, value } => {
                write!(f, "CC ch={} cc={} val={}", channel, control, value)
            }
            MidiEvent::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch={} note={} vel={}", channel, note, velocity)
            }
            MidiEvent::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch={} note={} vel={}", channel, note, velocity)
            }
            MidiEvent::ProgramChange { channel, program } => {
                write!(f, "PC ch={} prog={}", channel, program)
            }
            MidiEvent::PitchWheel { channel, pitch } => {
                write!(f, "PitchWheel ch={} pitch={}", channel, pitch)
            }
            MidiEvent::Unrecognized { ref raw } => write!(f, "Unknown: {}", format_hex(raw)),
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
