use serde::{Deserialize, Serialize};

/// One of the eight ANSI colors selectable through SGR 30-37 / 40-47.
///
/// A `Color` is only ever an index into a [`Palette`]; the engine never
/// deals in concrete RGB values until a renderer asks for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

impl Color {
    /// Map an SGR color offset (0-7) to a color. Out-of-range values
    /// return `None` so the caller can ignore the code individually.
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Self::Black),
            1 => Some(Self::Red),
            2 => Some(Self::Green),
            3 => Some(Self::Yellow),
            4 => Some(Self::Blue),
            5 => Some(Self::Magenta),
            6 => Some(Self::Cyan),
            7 => Some(Self::White),
            _ => None,
        }
    }

    pub fn to_index(self) -> u8 {
        match self {
            Self::Black => 0,
            Self::Red => 1,
            Self::Green => 2,
            Self::Yellow => 3,
            Self::Blue => 4,
            Self::Magenta => 5,
            Self::Cyan => 6,
            Self::White => 7,
        }
    }
}

/// An RGB triple as handed to the rendering layer.
pub type Rgb = (u8, u8, u8);

/// Injected color configuration.
///
/// Styles carry `Option<Color>` where `None` means "whatever the
/// environment's default foreground/background is"; this type is that
/// environment. The embedding layer owns a `Palette` and passes it in
/// wherever styles need resolving -- there is no process-wide lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    pub foreground: Rgb,
    pub background: Rgb,
    pub ansi: [Rgb; 8],
}

impl Default for Palette {
    fn default() -> Self {
        // Standard xterm values.
        Self {
            foreground: (204, 204, 204),
            background: (30, 30, 30),
            ansi: [
                (0, 0, 0),
                (205, 0, 0),
                (0, 205, 0),
                (205, 205, 0),
                (0, 0, 238),
                (205, 0, 205),
                (0, 205, 205),
                (229, 229, 229),
            ],
        }
    }
}

impl Palette {
    /// Resolve an optional color against this palette.
    /// `is_foreground` picks the default when the color is inherited.
    pub fn resolve(&self, color: Option<Color>, is_foreground: bool) -> Rgb {
        match color {
            Some(c) => self.ansi[c.to_index() as usize],
            None if is_foreground => self.foreground,
            None => self.background,
        }
    }
}

/// An immutable text attribute value: colors, bold, underline, reverse.
///
/// `None` for either color means "inherit the palette default", which is
/// not the same thing as black or white -- a line styled with the default
/// keeps tracking the palette if the user later changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    foreground: Option<Color>,
    background: Option<Color>,
    bold: bool,
    underlined: bool,
    reverse_video: bool,
}

impl Style {
    /// The factory. There is deliberately no other way to build a `Style`
    /// and no way to mutate one after construction.
    pub fn with(
        foreground: Option<Color>,
        background: Option<Color>,
        bold: bool,
        underlined: bool,
        reverse_video: bool,
    ) -> Self {
        Self {
            foreground,
            background,
            bold,
            underlined,
            reverse_video,
        }
    }

    pub fn foreground(&self) -> Option<Color> {
        self.foreground
    }

    pub fn background(&self) -> Option<Color> {
        self.background
    }

    pub fn is_bold(&self) -> bool {
        self.bold
    }

    pub fn is_underlined(&self) -> bool {
        self.underlined
    }

    pub fn is_reverse_video(&self) -> bool {
        self.reverse_video
    }

    /// Resolve to concrete (foreground, background) RGB values.
    /// Reverse video is applied here so renderers never special-case it.
    pub fn resolve(&self, palette: &Palette) -> (Rgb, Rgb) {
        let fg = palette.resolve(self.foreground, true);
        let bg = palette.resolve(self.background, false);
        if self.reverse_video {
            (bg, fg)
        } else {
            (fg, bg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_style_inherits_palette() {
        let palette = Palette::default();
        let (fg, bg) = Style::default().resolve(&palette);
        assert_eq!(fg, palette.foreground);
        assert_eq!(bg, palette.background);
    }

    #[test]
    fn test_structural_equality() {
        let a = Style::with(Some(Color::Red), None, true, false, false);
        let b = Style::with(Some(Color::Red), None, true, false, false);
        assert_eq!(a, b);
        assert_ne!(a, Style::default());
    }

    #[test]
    fn test_reverse_video_swaps_resolved_colors() {
        let palette = Palette::default();
        let plain = Style::with(Some(Color::Red), Some(Color::Blue), false, false, false);
        let reversed = Style::with(Some(Color::Red), Some(Color::Blue), false, false, true);
        let (fg, bg) = plain.resolve(&palette);
        assert_eq!(reversed.resolve(&palette), (bg, fg));
    }

    #[test]
    fn test_color_index_round_trip() {
        for i in 0..8 {
            let c = Color::from_index(i).unwrap();
            assert_eq!(c.to_index() as u32, i);
        }
        assert_eq!(Color::from_index(8), None);
    }
}
