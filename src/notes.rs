//! Note naming for blocks and edges
//!
//! Blocks and edge controllers store a small `note_index` (a scale degree
//! counted upward from the root); the audio collaborator wants a note name
//! such as `"E4"`. This module maps between the two.

/// Pitch class names, sharps preferred
const PITCH_CLASSES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Highest note index a block or edge may carry.
pub const MAX_NOTE_INDEX: usize = 35;

/// Scale used to turn note indices into pitches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scale {
    #[default]
    MajorPentatonic,
    MinorPentatonic,
    Major,
    Minor,
    Chromatic,
}

impl Scale {
    /// Parse a scale name like "major-pentatonic" or "minor".
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "major-pentatonic" | "pentatonic" => Some(Scale::MajorPentatonic),
            "minor-pentatonic" => Some(Scale::MinorPentatonic),
            "major" | "ionian" => Some(Scale::Major),
            "minor" | "aeolian" => Some(Scale::Minor),
            "chromatic" => Some(Scale::Chromatic),
            _ => None,
        }
    }

    /// Semitone offsets of one octave of the scale
    pub fn intervals(self) -> &'static [u8] {
        match self {
            Scale::MajorPentatonic => &[0, 2, 4, 7, 9],
            Scale::MinorPentatonic => &[0, 3, 5, 7, 10],
            Scale::Major => &[0, 2, 4, 5, 7, 9, 11],
            Scale::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Scale::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }
}

/// MIDI number for a scale degree above `root`, clamped to the MIDI range.
pub fn note_midi(note_index: usize, root: u8, scale: Scale) -> u8 {
    let intervals = scale.intervals();
    let octave = (note_index / intervals.len()) as u32;
    let offset = intervals[note_index % intervals.len()] as u32;
    (root as u32 + octave * 12 + offset).min(127) as u8
}

/// Name a MIDI note, C4 = 60.
///
/// # Examples
/// ```
/// use bouncer::notes::midi_to_name;
///
/// assert_eq!(midi_to_name(60), "C4");
/// assert_eq!(midi_to_name(61), "C#4");
/// assert_eq!(midi_to_name(57), "A3");
/// ```
pub fn midi_to_name(midi: u8) -> String {
    let octave = (midi / 12) as i32 - 1;
    format!("{}{}", PITCH_CLASSES[(midi % 12) as usize], octave)
}

/// Note name for a block/edge note index.
pub fn note_name(note_index: usize, root: u8, scale: Scale) -> String {
    midi_to_name(note_midi(note_index, root, scale))
}

/// Parse a note name like "C4", "F#3" or "Bb2" into a MIDI number.
pub fn parse_note_name(s: &str) -> Option<u8> {
    let mut chars = s.trim().chars().peekable();

    let base: i32 = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let accidental = match chars.peek() {
        Some('#') => {
            chars.next();
            1
        }
        Some('b') => {
            chars.next();
            -1
        }
        _ => 0,
    };

    let octave: i32 = chars.collect::<String>().parse().ok()?;
    let midi = (octave + 1) * 12 + base + accidental;
    if (0..=127).contains(&midi) {
        Some(midi as u8)
    } else {
        None
    }
}
