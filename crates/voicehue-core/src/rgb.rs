//! RGB color values on the 0-255 float scale used for storage.

/// A color with each channel in `0.0..=255.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);

    pub const fn new(red: f32, green: f32, blue: f32) -> Self {
        Self { red, green, blue }
    }

    /// Channels rounded and clamped to bytes.
    pub fn to_u8(&self) -> (u8, u8, u8) {
        let channel = |v: f32| v.round().clamp(0.0, 255.0) as u8;
        (channel(self.red), channel(self.green), channel(self.blue))
    }
}
