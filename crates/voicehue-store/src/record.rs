//! Color records and the batches they are committed in.

use chrono::{DateTime, SubsecRound, Utc};
use voicehue_core::Rgb;

/// A committed color. Records are created only by the store and never
/// change afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRecord {
    id: i64,
    rgb: Rgb,
    created_at: DateTime<Utc>,
}

impl ColorRecord {
    pub(crate) fn new(id: i64, rgb: Rgb, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            rgb,
            created_at,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn rgb(&self) -> Rgb {
        self.rgb
    }

    pub fn red(&self) -> f32 {
        self.rgb.red
    }

    pub fn green(&self) -> f32 {
        self.rgb.green
    }

    pub fn blue(&self) -> f32 {
        self.rgb.blue
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// A color waiting to be committed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorCandidate {
    pub rgb: Rgb,
    pub created_at: DateTime<Utc>,
}

/// The candidates derived from one transcript, committed all-or-nothing.
///
/// Timestamps are truncated to the store's microsecond resolution and never
/// go backwards within a batch.
#[derive(Debug, Clone)]
pub struct Batch {
    started_at: DateTime<Utc>,
    candidates: Vec<ColorCandidate>,
}

impl Batch {
    pub fn new() -> Self {
        Self {
            started_at: now(),
            candidates: Vec::new(),
        }
    }

    /// Append a color stamped with the current time.
    pub fn push(&mut self, rgb: Rgb) {
        self.push_at(rgb, now());
    }

    /// Append a color with an explicit timestamp, clamped so the batch stays
    /// in non-decreasing order.
    pub fn push_at(&mut self, rgb: Rgb, created_at: DateTime<Utc>) {
        let created_at = created_at.trunc_subsecs(6);
        let floor = self
            .candidates
            .last()
            .map_or(created_at, |last| last.created_at);
        self.candidates.push(ColorCandidate {
            rgb,
            created_at: created_at.max(floor),
        });
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn candidates(&self) -> &[ColorCandidate] {
        &self.candidates
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Rgb> for Batch {
    fn from_iter<I: IntoIterator<Item = Rgb>>(iter: I) -> Self {
        let mut batch = Batch::new();
        for rgb in iter {
            batch.push(rgb);
        }
        batch
    }
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
