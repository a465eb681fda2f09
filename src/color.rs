//! The colors voicehue understands and how they are found in a transcript.

use voicehue_core::Rgb;

pub const RED: Rgb = Rgb::new(255.0, 0.0, 0.0);
pub const GREEN: Rgb = Rgb::new(0.0, 255.0, 0.0);
pub const BLUE: Rgb = Rgb::new(0.0, 0.0, 255.0);
pub const ORANGE: Rgb = Rgb::new(255.0, 128.0, 0.0);
pub const PURPLE: Rgb = Rgb::new(76.0, 0.0, 153.0);
pub const PINK: Rgb = Rgb::new(255.0, 51.0, 255.0);
pub const YELLOW: Rgb = Rgb::new(255.0, 255.0, 0.0);
pub const BLACK: Rgb = Rgb::BLACK;
pub const WHITE: Rgb = Rgb::new(255.0, 255.0, 255.0);

/// A color name from the fixed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedColor {
    Red,
    Blue,
    Green,
    Orange,
    Purple,
    Pink,
    Yellow,
    Black,
    White,
}

impl NamedColor {
    pub const ALL: [NamedColor; 9] = [
        NamedColor::Red,
        NamedColor::Blue,
        NamedColor::Green,
        NamedColor::Orange,
        NamedColor::Purple,
        NamedColor::Pink,
        NamedColor::Yellow,
        NamedColor::Black,
        NamedColor::White,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NamedColor::Red => "red",
            NamedColor::Blue => "blue",
            NamedColor::Green => "green",
            NamedColor::Orange => "orange",
            NamedColor::Purple => "purple",
            NamedColor::Pink => "pink",
            NamedColor::Yellow => "yellow",
            NamedColor::Black => "black",
            NamedColor::White => "white",
        }
    }

    pub fn rgb(&self) -> Rgb {
        match self {
            NamedColor::Red => RED,
            NamedColor::Blue => BLUE,
            NamedColor::Green => GREEN,
            NamedColor::Orange => ORANGE,
            NamedColor::Purple => PURPLE,
            NamedColor::Pink => PINK,
            NamedColor::Yellow => YELLOW,
            NamedColor::Black => BLACK,
            NamedColor::White => WHITE,
        }
    }

    /// Case-insensitive lookup of a whole word.
    pub fn from_word(word: &str) -> Option<Self> {
        NamedColor::ALL
            .into_iter()
            .find(|color| color.name().eq_ignore_ascii_case(word))
    }
}

/// RGB for a color name. Names outside the vocabulary map to black.
pub fn lookup(name: &str) -> Rgb {
    NamedColor::from_word(name).map_or(BLACK, |color| color.rgb())
}

/// Recognizer hint listing the vocabulary, e.g. "Colors: red, green, ...".
pub fn vocabulary_prompt() -> String {
    let names: Vec<&str> = NamedColor::ALL.iter().map(|c| c.name()).collect();
    format!("Colors: {}.", names.join(", "))
}

/// Every vocabulary word in `text`, in order of appearance. Repeats are kept.
/// Words are split on anything that is not alphanumeric, so "red," and
/// "RED" match but "reddish" does not.
pub fn extract(text: &str) -> Vec<NamedColor> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .filter_map(NamedColor::from_word)
        .collect()
}
