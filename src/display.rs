//! A list of stored colors kept in step with the store's change feed.

use std::fmt::Write;
use std::ops::Range;

use chrono::Local;
use voicehue_store::{ColorRecord, RecordStore, StoreError, StoreEvent};

use crate::color::NamedColor;

/// Records in ascending creation order, as the store returns them.
#[derive(Debug, Default)]
pub struct ColorList {
    records: Vec<ColorRecord>,
}

impl ColorList {
    /// Seed the list with everything currently stored.
    pub fn load(store: &RecordStore) -> Result<Self, StoreError> {
        Ok(Self {
            records: store.query()?,
        })
    }

    /// Apply a change feed entry and return the positions that were added.
    ///
    /// The store never hands out a timestamp older than one it already
    /// holds, so appending keeps the list ordered.
    pub fn apply(&mut self, event: StoreEvent) -> Range<usize> {
        match event {
            StoreEvent::Inserted(records) => {
                let start = self.records.len();
                self.records.extend(records);
                start..self.records.len()
            }
        }
    }

    pub fn records(&self) -> &[ColorRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// One line per record in `range`: a 24-bit ANSI swatch, the color name
    /// and the local creation time.
    pub fn render(&self, range: Range<usize>) -> String {
        let mut out = String::new();
        for record in &self.records[range] {
            let (r, g, b) = record.rgb().to_u8();
            let name = NamedColor::ALL
                .iter()
                .find(|c| c.rgb() == record.rgb())
                .map_or("custom", |c| c.name());
            let when = record.created_at().with_timezone(&Local);
            writeln!(
                out,
                "\x1b[48;2;{r};{g};{b}m      \x1b[0m  #{r:02x}{g:02x}{b:02x}  {name:<7} {}",
                when.format("%Y-%m-%d %H:%M:%S")
            )
            .ok();
        }
        out
    }

    pub fn render_all(&self) -> String {
        self.render(0..self.records.len())
    }
}
