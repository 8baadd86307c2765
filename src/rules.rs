//! Match rules
//!
//! A rule is a conjunction of the constraints it explicitly sets; every
//! field left unset is a wildcard.

use serde::{Deserialize, Serialize};

use crate::midi::{EventKind, MidiEvent};

/// Separator between signature tokens
const SIGNATURE_SEPARATOR: &str = "_";

/// Inclusive value window, either bound optional
///
/// Deserializes from a bare integer (exact match) or a `{min, max}` map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "RangeRepr")]
pub struct ValueRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<u8>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RangeRepr {
    Exact(u8),
    Bounds {
        #[serde(default)]
        min: Option<u8>,
        #[serde(default)]
        max: Option<u8>,
    },
}

impl From<RangeRepr> for ValueRange {
    fn from(repr: RangeRepr) -> Self {
        match repr {
            RangeRepr::Exact(v) => ValueRange::exact(v),
            RangeRepr::Bounds { min, max } => ValueRange { min, max },
        }
    }
}

impl ValueRange {
    pub fn new(min: Option<u8>, max: Option<u8>) -> Self {
        Self { min, max }
    }

    pub fn exact(value: u8) -> Self {
        Self {
            min: Some(value),
            max: Some(value),
        }
    }

    /// `min > max` is a degenerate window that contains nothing
    pub fn contains(&self, value: u8) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// Declarative predicate over one event kind
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MatchRule {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
    /// Control Change only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<u8>,
    /// Note On/Off only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<u8>,
    /// Program Change only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<u8>,
    /// Control Change value window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ValueRange>,
    /// Note On/Off velocity window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<ValueRange>,
}

impl MatchRule {
    /// Rule matching every event of `kind`
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            channel: None,
            control: None,
            note: None,
            program: None,
            value: None,
            velocity: None,
        }
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_control(mut self, control: u8) -> Self {
        self.control = Some(control);
        self
    }

    pub fn with_note(mut self, note: u8) -> Self {
        self.note = Some(note);
        self
    }

    pub fn with_program(mut self, program: u8) -> Self {
        self.program = Some(program);
        self
    }

    pub fn with_value(mut self, min: Option<u8>, max: Option<u8>) -> Self {
        self.value = Some(ValueRange::new(min, max));
        self
    }

    pub fn with_velocity(mut self, min: Option<u8>, max: Option<u8>) -> Self {
        self.velocity = Some(ValueRange::new(min, max));
        self
    }

    /// Check whether `event` satisfies every constraint set on this rule
    ///
    /// Range fields only apply to the kind they belong to: `value` to
    /// Control Change, `velocity` to Note On/Off.
    pub fn matches(&self, event: &MidiEvent) -> bool {
        if event.kind() != Some(self.kind) {
            return false;
        }

        if let Some(channel) = self.channel {
            if event.channel() != Some(channel) {
                return false;
            }
        }

        match *event {
            MidiEvent::ControlChange { control, value, .. } => {
                field_matches(self.control, control) && range_matches(self.value, value)
            }
            MidiEvent::NoteOn { note, velocity, .. } | MidiEvent::NoteOff { note, velocity, .. } => {
                field_matches(self.note, note) && range_matches(self.velocity, velocity)
            }
            MidiEvent::ProgramChange { program, .. } => field_matches(self.program, program),
            MidiEvent::PitchWheel { .. } => true,
            MidiEvent::Unrecognized { .. } => false,
        }
    }

    /// Canonical identity of the physical control this rule addresses
    ///
    /// Built from the type and whichever of channel/control/note/program are
    /// set, in that fixed order. Value and velocity windows never take part,
    /// so every rule on the same control shares one cycle position.
    pub fn signature(&self) -> String {
        let mut parts = vec![self.kind.as_str().to_string()];
        if let Some(channel) = self.channel {
            parts.push(format!("ch{}", channel));
        }
        if let Some(control) = self.control {
            parts.push(format!("cc{}", control));
        }
        if let Some(note) = self.note {
            parts.push(format!("n{}", note));
        }
        if let Some(program) = self.program {
            parts.push(format!("p{}", program));
        }
        parts.join(SIGNATURE_SEPARATOR)
    }
}

fn field_matches(expected: Option<u8>, actual: u8) -> bool {
    expected.map_or(true, |e| e == actual)
}

fn range_matches(range: Option<ValueRange>, actual: u8) -> bool {
    range.map_or(true, |r| r.contains(actual))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cc(channel: u8, control: u8, value: u8) -> MidiEvent {
        MidiEvent::ControlChange { channel, control, value }
    }

    fn arb_event() -> impl Strategy<Value = MidiEvent> {
        prop_oneof![
            (0u8..16, 0u8..128, 0u8..128)
                .prop_map(|(channel, control, value)| MidiEvent::ControlChange { channel, control, value }),
            (0u8..16, 0u8..128, 0u8..128)
                .prop_map(|(channel, note, velocity)| MidiEvent::NoteOn { channel, note, velocity }),
            (0u8..16, 0u8..128, 0u8..128)
                .prop_map(|(channel, note, velocity)| MidiEvent::NoteOff { channel, note, velocity }),
            (0u8..16, 0u8..128).prop_map(|(channel, program)| MidiEvent::ProgramChange { channel, program }),
            (0u8..16, -8192i16..8192).prop_map(|(channel, pitch)| MidiEvent::PitchWheel { channel, pitch }),
            proptest::collection::vec(any::<u8>(), 0..4).prop_map(|raw| MidiEvent::Unrecognized { raw }),
        ]
    }

    fn arb_kind() -> impl Strategy<Value = EventKind> {
        proptest::sample::select(EventKind::ALL.to_vec())
    }

    fn arb_rule() -> impl Strategy<Value = MatchRule> {
        (
            arb_kind(),
            proptest::option::of(0u8..16),
            proptest::option::of(0u8..128),
            proptest::option::of(0u8..128),
            proptest::option::of(0u8..128),
            proptest::option::of((proptest::option::of(0u8..128), proptest::option::of(0u8..128))),
            proptest::option::of((proptest::option::of(0u8..128), proptest::option::of(0u8..128))),
        )
            .prop_map(|(kind, channel, control, note, program, value, velocity)| MatchRule {
                kind,
                channel,
                control,
                note,
                program,
                value: value.map(|(min, max)| ValueRange::new(min, max)),
                velocity: velocity.map(|(min, max)| ValueRange::new(min, max)),
            })
    }

    #[test]
    fn test_control_change_rule() {
        let rule = MatchRule::new(EventKind::ControlChange).with_control(7);

        assert!(rule.matches(&cc(0, 7, 127)));
        assert!(rule.matches(&cc(9, 7, 0)));
        assert!(!rule.matches(&cc(0, 8, 127)));
        assert!(!rule.matches(&MidiEvent::NoteOn { channel: 0, note: 7, velocity: 127 }));
    }

    #[test]
    fn test_note_rule_shares_check_for_on_and_off() {
        let on = MatchRule::new(EventKind::NoteOn).with_note(60).with_velocity(Some(1), None);
        let off = MatchRule::new(EventKind::NoteOff).with_note(60);

        assert!(on.matches(&MidiEvent::NoteOn { channel: 0, note: 60, velocity: 90 }));
        assert!(!on.matches(&MidiEvent::NoteOn { channel: 0, note: 60, velocity: 0 }));
        assert!(!on.matches(&MidiEvent::NoteOff { channel: 0, note: 60, velocity: 90 }));
        assert!(off.matches(&MidiEvent::NoteOff { channel: 3, note: 60, velocity: 0 }));
        assert!(!off.matches(&MidiEvent::NoteOff { channel: 3, note: 61, velocity: 0 }));
    }

    #[test]
    fn test_program_and_pitch_rules() {
        let program = MatchRule::new(EventKind::ProgramChange).with_program(4);
        assert!(program.matches(&MidiEvent::ProgramChange { channel: 0, program: 4 }));
        assert!(!program.matches(&MidiEvent::ProgramChange { channel: 0, program: 5 }));

        let pitch = MatchRule::new(EventKind::PitchWheel).with_channel(2);
        assert!(pitch.matches(&MidiEvent::PitchWheel { channel: 2, pitch: -100 }));
        assert!(!pitch.matches(&MidiEvent::PitchWheel { channel: 1, pitch: -100 }));
    }

    #[test]
    fn test_range_fields_ignored_for_other_kinds() {
        // A value window on a note rule has no effect
        let rule = MatchRule::new(EventKind::NoteOn).with_value(Some(100), Some(101));
        assert!(rule.matches(&MidiEvent::NoteOn { channel: 0, note: 1, velocity: 5 }));

        // A velocity window on a CC rule has no effect
        let rule = MatchRule::new(EventKind::ControlChange).with_velocity(Some(100), Some(101));
        assert!(rule.matches(&cc(0, 1, 5)));
    }

    #[test]
    fn test_unrecognized_never_matches() {
        let raw = MidiEvent::Unrecognized { raw: vec![0xF8] };
        for kind in EventKind::ALL {
            assert!(!MatchRule::new(kind).matches(&raw));
        }
    }

    #[test]
    fn test_every_kind_has_a_matching_event() {
        // Adding an event kind without teaching the matcher about it fails here
        for kind in EventKind::ALL {
            let event = match kind {
                EventKind::ControlChange => cc(0, 0, 0),
                EventKind::NoteOn => MidiEvent::NoteOn { channel: 0, note: 0, velocity: 0 },
                EventKind::NoteOff => MidiEvent::NoteOff { channel: 0, note: 0, velocity: 0 },
                EventKind::ProgramChange => MidiEvent::ProgramChange { channel: 0, program: 0 },
                EventKind::PitchWheel => MidiEvent::PitchWheel { channel: 0, pitch: 0 },
            };
            assert_eq!(event.kind(), Some(kind));
            assert!(MatchRule::new(kind).matches(&event), "{} never matches", kind);
        }
    }

    #[test]
    fn test_signature_format() {
        let rule = MatchRule::new(EventKind::ControlChange).with_channel(0).with_control(7);
        assert_eq!(rule.signature(), "control_change_ch0_cc7");

        let rule = MatchRule::new(EventKind::NoteOn).with_note(60);
        assert_eq!(rule.signature(), "note_on_n60");

        let rule = MatchRule::new(EventKind::ProgramChange).with_channel(3).with_program(1);
        assert_eq!(rule.signature(), "program_change_ch3_p1");

        assert_eq!(MatchRule::new(EventKind::PitchWheel).signature(), "pitchwheel");
    }

    #[test]
    fn test_signature_ignores_ranges() {
        let low = MatchRule::new(EventKind::ControlChange).with_control(7).with_value(Some(0), Some(63));
        let high = MatchRule::new(EventKind::ControlChange).with_control(7).with_value(Some(64), None);
        assert_eq!(low.signature(), high.signature());
    }

    #[test]
    fn test_degenerate_range_never_matches() {
        let rule = MatchRule::new(EventKind::ControlChange).with_value(Some(100), Some(10));
        for value in 0..=127u8 {
            assert!(!rule.matches(&cc(0, 0, value)));
        }
    }

    #[test]
    fn test_deserialize_rule_from_yaml() {
        let rule: MatchRule = serde_yaml::from_str(
            "{type: control_change, channel: 1, control: 20, value: {min: 64}}",
        )
        .unwrap();
        assert_eq!(
            rule,
            MatchRule::new(EventKind::ControlChange)
                .with_channel(1)
                .with_control(20)
                .with_value(Some(64), None)
        );

        let rule: MatchRule = serde_yaml::from_str("{type: note_on, velocity: 127}").unwrap();
        assert_eq!(rule.velocity, Some(ValueRange::exact(127)));

        assert!(serde_yaml::from_str::<MatchRule>("{type: sysex}").is_err());
        assert!(serde_yaml::from_str::<MatchRule>("{channel: 1}").is_err());
    }

    proptest! {
        #[test]
        fn prop_bare_rule_matches_exactly_its_kind(kind in arb_kind(), event in arb_event()) {
            let rule = MatchRule::new(kind);
            prop_assert_eq!(rule.matches(&event), event.kind() == Some(kind));
        }

        #[test]
        fn prop_channel_constraint_narrows(rule in arb_rule(), channel in 0u8..16, event in arb_event()) {
            let narrowed = rule.clone().with_channel(channel);
            if narrowed.matches(&event) {
                let mut widened = rule;
                widened.channel = None;
                prop_assert!(widened.matches(&event));
            }
        }

        #[test]
        fn prop_value_range_is_inclusive(a in 0u8..128, b in 0u8..128, value in 0u8..128) {
            let rule = MatchRule::new(EventKind::ControlChange).with_value(Some(a), Some(b));
            prop_assert_eq!(rule.matches(&cc(0, 0, value)), a <= value && value <= b);
        }

        #[test]
        fn prop_velocity_range_is_inclusive(a in 0u8..128, b in 0u8..128, velocity in 0u8..128) {
            let rule = MatchRule::new(EventKind::NoteOff).with_velocity(Some(a), Some(b));
            let event = MidiEvent::NoteOff { channel: 0, note: 0, velocity };
            prop_assert_eq!(rule.matches(&event), a <= velocity && velocity <= b);
        }

        #[test]
        fn prop_signature_depends_only_on_identity_fields(r1 in arb_rule(), r2 in arb_rule()) {
            let same_identity = r1.kind == r2.kind
                && r1.channel == r2.channel
                && r1.control == r2.control
                && r1.note == r2.note
                && r1.program == r2.program;
            prop_assert_eq!(r1.signature() == r2.signature(), same_identity);
        }
    }
}
