//! Directional sector classification
//!
//! The circle is split into eight 45° sectors centered on the cardinal and
//! intercardinal headings. Every sector is open on its lower edge and closed on its
//! upper edge, except North which wraps across 0°/360° and is closed on both edges:
//!
//! | Sector    | Range                      |
//! |-----------|----------------------------|
//! | North     | `[337.5, 360) ∪ [0, 22.5]` |
//! | NorthEast | `(22.5, 67.5]`             |
//! | East      | `(67.5, 112.5]`            |
//! | SouthEast | `(112.5, 157.5]`           |
//! | South     | `(157.5, 202.5]`           |
//! | SouthWest | `(202.5, 247.5]`           |
//! | West      | `(247.5, 292.5]`           |
//! | NorthWest | `(292.5, 337.5)`           |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::normalize_bearing;

/// Width of one compass sector in degrees
pub const SECTOR_WIDTH_DEG: f64 = 45.0;

const HALF_SECTOR_DEG: f64 = SECTOR_WIDTH_DEG / 2.0;

/// How intercardinal sectors are spoken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorPolicy {
    /// Intercardinals become `["between", A, "and", B]`
    #[default]
    Compound,
    /// Intercardinals get their own single token, e.g. `NorthEast`
    Named,
}

impl FromStr for SectorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compound" => Ok(SectorPolicy::Compound),
            "named" | "named_intercardinal" => Ok(SectorPolicy::Named),
            other => Err(format!("unknown sector policy '{}'", other)),
        }
    }
}

impl fmt::Display for SectorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectorPolicy::Compound => write!(f, "compound"),
            SectorPolicy::Named => write!(f, "named"),
        }
    }
}

/// One spoken word of a directional phrase. Each token maps to one audio clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhraseToken {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
    Between,
    And,
}

impl PhraseToken {
    pub const ALL: [PhraseToken; 10] = [
        PhraseToken::North,
        PhraseToken::NorthEast,
        PhraseToken::East,
        PhraseToken::SouthEast,
        PhraseToken::South,
        PhraseToken::SouthWest,
        PhraseToken::West,
        PhraseToken::NorthWest,
        PhraseToken::Between,
        PhraseToken::And,
    ];

    /// Stable lowercase key used for clip file names and config overrides
    pub fn clip_key(&self) -> &'static str {
        match self {
            PhraseToken::North => "north",
            PhraseToken::NorthEast => "north_east",
            PhraseToken::East => "east",
            PhraseToken::SouthEast => "south_east",
            PhraseToken::South => "south",
            PhraseToken::SouthWest => "south_west",
            PhraseToken::West => "west",
            PhraseToken::NorthWest => "north_west",
            PhraseToken::Between => "between",
            PhraseToken::And => "and",
        }
    }

    pub fn from_clip_key(key: &str) -> Option<PhraseToken> {
        PhraseToken::ALL.into_iter().find(|t| t.clip_key() == key)
    }

    pub fn is_cardinal(&self) -> bool {
        matches!(
            self,
            PhraseToken::North | PhraseToken::East | PhraseToken::South | PhraseToken::West
        )
    }
}

impl fmt::Display for PhraseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            PhraseToken::North => "North",
            PhraseToken::NorthEast => "NorthEast",
            PhraseToken::East => "East",
            PhraseToken::SouthEast => "SouthEast",
            PhraseToken::South => "South",
            PhraseToken::SouthWest => "SouthWest",
            PhraseToken::West => "West",
            PhraseToken::NorthWest => "NorthWest",
            PhraseToken::Between => "between",
            PhraseToken::And => "and",
        };
        f.write_str(word)
    }
}

/// Sector names in clockwise order starting at North
const SECTORS: [PhraseToken; 8] = [
    PhraseToken::North,
    PhraseToken::NorthEast,
    PhraseToken::East,
    PhraseToken::SouthEast,
    PhraseToken::South,
    PhraseToken::SouthWest,
    PhraseToken::West,
    PhraseToken::NorthWest,
];

/// Index into [`SECTORS`] for a bearing (0 = North, clockwise)
fn sector_index(bearing_deg: f64) -> usize {
    let bearing = normalize_bearing(bearing_deg);

    if bearing >= 360.0 - HALF_SECTOR_DEG || bearing <= HALF_SECTOR_DEG {
        return 0;
    }

    // (22.5, 67.5] -> 1, (67.5, 112.5] -> 2, ... (292.5, 337.5) -> 7
    let index = ((bearing - HALF_SECTOR_DEG) / SECTOR_WIDTH_DEG).ceil() as usize;
    index.clamp(1, 7)
}

/// Classify a bearing into the token sequence that describes it
///
/// Total over all inputs: out-of-range bearings are wrapped first and non-finite
/// values are treated as 0°. The result is never empty.
pub fn sector_phrase(bearing_deg: f64, policy: SectorPolicy) -> Vec<PhraseToken> {
    let index = sector_index(bearing_deg);
    let sector = SECTORS[index];

    if sector.is_cardinal() || policy == SectorPolicy::Named {
        return vec![sector];
    }

    // Odd indices are intercardinal; flank with the cardinals either side, clockwise
    let before = SECTORS[index - 1];
    let after = SECTORS[(index + 1) % SECTORS.len()];
    vec![PhraseToken::Between, before, PhraseToken::And, after]
}

/// Render a phrase as the space-separated words it would be spoken as
pub fn phrase_text(tokens: &[PhraseToken]) -> String {
    tokens
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
