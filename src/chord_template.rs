//! Chord Templates
//!
//! The fixed bank of 48 binary pitch-class masks (12 roots x 4 qualities)
//! that chroma frames are matched against.

use std::fmt::Display;
use std::str::FromStr;

use crate::chord_matcher::ChordError;
use crate::chroma::SEMITONES;

/// Number of chord qualities
pub const NUM_CHORD_KINDS: usize = 4;

/// Total number of chords (root x quality)
pub const NUM_CHORDS: usize = SEMITONES * NUM_CHORD_KINDS;

/// Supported chord qualities in bank order
pub const CHORD_KINDS: [ChordKind; NUM_CHORD_KINDS] = [
    ChordKind::Major,
    ChordKind::Minor,
    ChordKind::DominantSeventh,
    ChordKind::MajorSeventh,
];

/// Base patterns rooted at C, matching `CHORD_KINDS` order
const BASE_PATTERNS: [Mask; NUM_CHORD_KINDS] = [
    [1, 0, 0, 0, 1, 0, 0, 1, 0, 0, 0, 0],
    [1, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 0],
    [1, 0, 0, 0, 1, 0, 0, 1, 0, 0, 1, 0],
    [1, 0, 0, 0, 1, 0, 0, 1, 0, 0, 0, 1],
];

/// Binary pitch-class membership, index 0 = C
pub type Mask = [u8; SEMITONES];

/// Rotate a mask up by `semitones`: bin `i` of the result is bin
/// `i - semitones` (mod 12) of the input.
pub const fn rotate(mask: &Mask, semitones: usize) -> Mask {
    let mut out = [0u8; SEMITONES];
    let mut i = 0;
    while i < SEMITONES {
        out[(i + semitones) % SEMITONES] = mask[i];
        i += 1;
    }
    out
}

/// Supported chord qualities
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChordKind {
    /// Major chord (e.g., C-E-G)
    Major,
    /// Minor chord (e.g., C-Eb-G)
    Minor,
    /// Dominant seventh chord (e.g., C-E-G-Bb)
    DominantSeventh,
    /// Major seventh chord (e.g., C-E-G-B)
    MajorSeventh,
}

impl ChordKind {
    /// Label suffix: "", "m", "7", "maj7"
    pub const fn suffix(self) -> &'static str {
        match self {
            ChordKind::Major => "",
            ChordKind::Minor => "m",
            ChordKind::DominantSeventh => "7",
            ChordKind::MajorSeventh => "maj7",
        }
    }

    /// The quality's mask rooted at C.
    pub const fn base_pattern(self) -> Mask {
        BASE_PATTERNS[self as usize]
    }
}

impl Display for ChordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Twelve chromatic pitch classes
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NoteName {
    /// C
    C,
    /// C sharp / D flat
    Cs,
    /// D
    D,
    /// D sharp / E flat
    Ds,
    /// E
    E,
    /// F
    F,
    /// F sharp / G flat
    Fs,
    /// G
    G,
    /// G sharp / A flat
    Gs,
    /// A
    A,
    /// A sharp / B flat
    As,
    /// B
    B,
}

const NOTE_NAMES: [NoteName; SEMITONES] = [
    NoteName::C,
    NoteName::Cs,
    NoteName::D,
    NoteName::Ds,
    NoteName::E,
    NoteName::F,
    NoteName::Fs,
    NoteName::G,
    NoteName::Gs,
    NoteName::A,
    NoteName::As,
    NoteName::B,
];

impl NoteName {
    /// Pitch class for a semitone index; wraps modulo 12.
    pub const fn from_idx(idx: usize) -> NoteName {
        NOTE_NAMES[idx % SEMITONES]
    }

    /// Semitone distance from C, 0..=11.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Spelling used in chord labels (flats for black keys except C# and F#).
    pub const fn chord_spelling(self) -> &'static str {
        match self {
            NoteName::C => "C",
            NoteName::Cs => "C#",
            NoteName::D => "D",
            NoteName::Ds => "Eb",
            NoteName::E => "E",
            NoteName::F => "F",
            NoteName::Fs => "F#",
            NoteName::G => "G",
            NoteName::Gs => "Ab",
            NoteName::A => "A",
            NoteName::As => "Bb",
            NoteName::B => "B",
        }
    }

    /// Spelling with sharps only, used for key names.
    pub const fn sharp_spelling(self) -> &'static str {
        match self {
            NoteName::C => "C",
            NoteName::Cs => "C#",
            NoteName::D => "D",
            NoteName::Ds => "D#",
            NoteName::E => "E",
            NoteName::F => "F",
            NoteName::Fs => "F#",
            NoteName::G => "G",
            NoteName::Gs => "G#",
            NoteName::A => "A",
            NoteName::As => "A#",
            NoteName::B => "B",
        }
    }
}

impl Display for NoteName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.sharp_spelling())
    }
}

impl FromStr for NoteName {
    type Err = ChordError;

    /// Accepts naturals plus `#` and `b` spellings ("C#", "Db", "Bb", ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let natural = match chars.next() {
            Some('C') => 0,
            Some('D') => 2,
            Some('E') => 4,
            Some('F') => 5,
            Some('G') => 7,
            Some('A') => 9,
            Some('B') => 11,
            _ => return Err(invalid_name(s)),
        };
        let idx = match chars.as_str() {
            "" => natural,
            "#" => natural + 1,
            "b" => natural + SEMITONES - 1,
            _ => return Err(invalid_name(s)),
        };
        Ok(NoteName::from_idx(idx))
    }
}

fn invalid_name(s: &str) -> ChordError {
    ChordError::InvalidArgument {
        arg: "name",
        msg: format!("`{s}` is not a pitch or chord name"),
    }
}

/// One of the 48 template labels, e.g. "C", "C#m", "G7", "Fmaj7".
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChordLabel {
    /// Root pitch class.
    pub root: NoteName,
    /// Chord quality.
    pub quality: ChordKind,
}

impl ChordLabel {
    /// Create a label.
    pub const fn new(root: NoteName, quality: ChordKind) -> Self {
        ChordLabel { root, quality }
    }

    /// Position in the template bank: qualities outermost, roots innermost.
    pub const fn bank_index(self) -> usize {
        self.quality as usize * SEMITONES + self.root.index()
    }

    /// Pitch-class mask for this chord.
    pub const fn mask(self) -> Mask {
        rotate(&self.quality.base_pattern(), self.root.index())
    }
}

impl Display for ChordLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.root.chord_spelling(), self.quality.suffix())
    }
}

impl FromStr for ChordLabel {
    type Err = ChordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "maj7" must be tried before "m"
        let (root, quality) = if let Some(r) = s.strip_suffix("maj7") {
            (r, ChordKind::MajorSeventh)
        } else if let Some(r) = s.strip_suffix('7') {
            (r, ChordKind::DominantSeventh)
        } else if let Some(r) = s.strip_suffix('m') {
            (r, ChordKind::Minor)
        } else {
            (s, ChordKind::Major)
        };
        Ok(ChordLabel::new(root.parse()?, quality))
    }
}

/// A label paired with its binary pitch-class mask.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChordTemplate {
    /// Chord label.
    pub label: ChordLabel,
    /// Which pitch classes belong to the chord.
    pub mask: Mask,
}

/// The immutable library of 48 chord templates.
///
/// Iteration order is fixed: all majors C..B, then minors, dominant
/// sevenths and major sevenths. Matching ties resolve in this order.
#[derive(Debug, Clone)]
pub struct TemplateBank {
    templates: [ChordTemplate; NUM_CHORDS],
}

impl TemplateBank {
    /// Build the bank by rotating each base pattern through all 12 roots.
    pub fn new() -> Self {
        let mut templates = [ChordTemplate {
            label: ChordLabel::new(NoteName::C, ChordKind::Major),
            mask: [0; SEMITONES],
        }; NUM_CHORDS];

        for (kind_idx, &kind) in CHORD_KINDS.iter().enumerate() {
            let base = kind.base_pattern();
            for root in 0..SEMITONES {
                templates[kind_idx * SEMITONES + root] = ChordTemplate {
                    label: ChordLabel::new(NoteName::from_idx(root), kind),
                    mask: rotate(&base, root),
                };
            }
        }

        TemplateBank { templates }
    }

    /// All templates in bank order.
    pub fn iter(&self) -> std::slice::Iter<'_, ChordTemplate> {
        self.templates.iter()
    }

    /// Look up a template by label.
    pub fn get(&self, label: ChordLabel) -> &ChordTemplate {
        &self.templates[label.bank_index()]
    }

    /// Number of templates (always 48).
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Always false; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for TemplateBank {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> IntoIterator for &'a TemplateBank {
    type Item = &'a ChordTemplate;
    type IntoIter = std::slice::Iter<'a, ChordTemplate>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
