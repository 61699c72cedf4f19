//! Contains common, primitive types shared by every part of the engine.
//!
//! Faces are identified by slotmap keys so that a rebuilt wall never reuses
//! the identity of a face it replaced. Cells are addressed relative to the
//! face that owns them.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Uniquely and safely identifies a clock face on the wall.
    ///
    /// Keys are versioned, so a face destroyed by a rebuild can never be
    /// confused with the face that took its slot.
    pub struct FaceId;
}

/// Addresses one flap cell: the face it belongs to and its digit position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId {
    pub face: FaceId,
    pub index: usize,
}

impl CellId {
    pub fn new(face: FaceId, index: usize) -> Self {
        Self { face, index }
    }
}

/// Padding shown in the tens-of-hour position for hours 1 through 9.
///
/// A figure space keeps the digit columns aligned.
pub const BLANK: char = '\u{2007}';

/// The dash a freshly built cell shows before it has ever displayed a digit.
pub const PLACEHOLDER: char = '\u{2013}';

/// Number of digit positions in a full sample: H10 H1 M10 M1 S10 S1.
pub const FULL_DIGITS: usize = 6;

/// Number of digit positions when seconds are hidden.
pub const SHORT_DIGITS: usize = 4;

/// The characters currently targeted by a face, one per cell.
pub type Digits = Vec<char>;

/// A named location with the IANA zone its clock tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub tz: String,
}

impl City {
    pub fn new(name: impl Into<String>, tz: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tz: tz.into(),
        }
    }
}

/// A 24-bit colour used to tint the period label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Well-known IANA zones offered when adding a city.
pub const COMMON_TIMEZONES: &[&str] = &[
    "America/New_York",
    "America/Chicago",
    "America/Denver",
    "America/Los_Angeles",
    "America/Anchorage",
    "Pacific/Honolulu",
    "America/Phoenix",
    "America/Toronto",
    "America/Vancouver",
    "America/Mexico_City",
    "America/Bogota",
    "America/Sao_Paulo",
    "America/Argentina/Buenos_Aires",
    "America/Santiago",
    "Europe/London",
    "Europe/Paris",
    "Europe/Berlin",
    "Europe/Madrid",
    "Europe/Rome",
    "Europe/Amsterdam",
    "Europe/Stockholm",
    "Europe/Moscow",
    "Europe/Istanbul",
    "Africa/Cairo",
    "Africa/Johannesburg",
    "Africa/Lagos",
    "Asia/Dubai",
    "Asia/Kolkata",
    "Asia/Bangkok",
    "Asia/Singapore",
    "Asia/Hong_Kong",
    "Asia/Shanghai",
    "Asia/Tokyo",
    "Asia/Seoul",
    "Asia/Jerusalem",
    "Asia/Taipei",
    "Australia/Sydney",
    "Australia/Melbourne",
    "Australia/Perth",
    "Pacific/Auckland",
    "Pacific/Fiji",
];
