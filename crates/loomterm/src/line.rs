use crate::style::{Color, Style};

// Tabs are stored in-band: the first cell covered by a tab holds TAB_START
// and every further cell it covers holds TAB_CONTINUE. Tab stops can move
// in the outside world at any time, but a line must keep its integrity once
// a tab has been written into it, so the width is frozen at insertion time.
// This encoding never leaks past this module: get_string() turns both
// markers into spaces and get_tabbed_string() collapses them back into '\t'.
const TAB_START: char = '\t';
const TAB_CONTINUE: char = '\r';

/// One row of the terminal: its characters plus an optional per-character
/// style overlay.
///
/// The overlay is lazy: a line that has only ever seen default-styled text
/// carries no overlay at all. When present, the overlay always has exactly
/// one entry per character.
#[derive(Debug, Clone)]
pub struct TextLine {
    chars: Vec<char>,
    styles: Option<Vec<Style>>,
    /// Background ink used beyond the last real character and for padding.
    background: Option<Color>,
}

impl TextLine {
    pub fn new(background: Option<Color>) -> Self {
        Self {
            chars: Vec::new(),
            styles: None,
            background,
        }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn background(&self) -> Option<Color> {
        self.background
    }

    pub fn set_background(&mut self, background: Option<Color>) {
        self.background = background;
    }

    pub fn clear(&mut self) {
        self.chars.clear();
        self.styles = None;
    }

    pub fn style_at(&self, index: usize) -> Style {
        match &self.styles {
            Some(styles) => styles.get(index).copied().unwrap_or_default(),
            None => Style::default(),
        }
    }

    /// Return the first index in `[start, end)` whose style differs from the
    /// style at `start`, or `end` if the whole range is uniform.
    ///
    /// This is the compression primitive renderers iterate with:
    ///
    /// ```text
    /// let mut start = 0;
    /// while start < line.len() {
    ///     let done = line.get_run_limit(start, line.len());
    ///     draw(&line.get_string()[start..done], line.style_at(start));
    ///     start = done;
    /// }
    /// ```
    pub fn get_run_limit(&self, start: usize, end: usize) -> usize {
        let end = end.min(self.len());
        if start >= end {
            return end;
        }
        let styles = match &self.styles {
            // No overlay: the whole line is one default-styled run.
            None => return end,
            Some(styles) => styles,
        };
        let to_match = styles[start];
        for (i, style) in styles.iter().enumerate().take(end).skip(start + 1) {
            if *style != to_match {
                return i;
            }
        }
        end
    }

    /// The line's text with tab markers flattened to spaces (display form).
    pub fn get_string(&self) -> String {
        self.chars
            .iter()
            .map(|&ch| match ch {
                TAB_START | TAB_CONTINUE => ' ',
                other => other,
            })
            .collect()
    }

    /// The line's text with tab runs collapsed back into real tab
    /// characters (clipboard form).
    pub fn get_tabbed_string(&self, start: usize, end: usize) -> String {
        let end = end.min(self.len());
        let start = start.min(end);
        self.chars[start..end]
            .iter()
            .filter(|&&ch| ch != TAB_CONTINUE)
            .collect()
    }

    /// Remove the character range `[start, end)`. Text and style overlay
    /// shrink together or not at all.
    pub fn kill_text(&mut self, start: usize, end: usize) {
        if start >= end || start >= self.chars.len() {
            return;
        }
        let end = end.min(self.chars.len());
        self.chars.drain(start..end);
        if let Some(styles) = &mut self.styles {
            styles.drain(start..end);
        }
    }

    /// Write text at `offset`, overwriting whatever is underneath and
    /// extending the line if the text runs past the end. Offsets beyond the
    /// current length are reached by padding with background-inked spaces.
    pub fn write_text_at(&mut self, offset: usize, text: &str, style: Style) {
        self.pad_to(offset);
        let mut count = 0;
        for (i, ch) in text.chars().enumerate() {
            if offset + i < self.chars.len() {
                self.chars[offset + i] = ch;
            } else {
                self.chars.push(ch);
            }
            count += 1;
        }
        self.overwrite_style_run(offset, count, style);
    }

    /// Insert text at `offset`, shifting existing content right.
    pub fn insert_text_at(&mut self, offset: usize, text: &str, style: Style) {
        self.pad_to(offset);
        let incoming: Vec<char> = text.chars().collect();
        let count = incoming.len();
        self.chars.splice(offset..offset, incoming);
        self.insert_style_run(offset, count, style);
    }

    /// Insert a tab covering `tab_length` display positions at `offset`.
    pub fn insert_tab_at(&mut self, offset: usize, tab_length: usize, style: Style) {
        if tab_length == 0 {
            return;
        }
        let mut markers = String::with_capacity(tab_length);
        markers.push(TAB_START);
        for _ in 1..tab_length {
            markers.push(TAB_CONTINUE);
        }
        self.insert_text_at(offset, &markers, style);
    }

    fn pad_to(&mut self, offset: usize) {
        if offset <= self.chars.len() {
            return;
        }
        let count = offset - self.chars.len();
        let pad_start = self.chars.len();
        self.chars.extend(std::iter::repeat(' ').take(count));
        // Even an empty line can have a background color; the padding keeps it.
        let pad_style = Style::with(None, self.background, false, false, false);
        // chars already grew, so compensate when materializing the overlay.
        self.fill_style_run(pad_start, count, pad_style, count);
    }

    fn overwrite_style_run(&mut self, offset: usize, count: usize, style: Style) {
        if self.styles.is_none() && style == Style::default() {
            return;
        }
        let len = self.chars.len();
        let styles = self
            .styles
            .get_or_insert_with(|| vec![Style::default(); len]);
        styles.resize(len, Style::default());
        styles[offset..offset + count].fill(style);
    }

    fn insert_style_run(&mut self, offset: usize, count: usize, style: Style) {
        self.fill_style_run(offset, count, style, count);
    }

    // Shared by insertion paths: the text has already grown by
    // `grown_by` characters, so a freshly materialized overlay must be
    // sized to the pre-growth length before the new run is spliced in.
    fn fill_style_run(&mut self, offset: usize, count: usize, style: Style, grown_by: usize) {
        if self.styles.is_none() && style == Style::default() {
            return;
        }
        let old_len = self.chars.len() - grown_by;
        let styles = self
            .styles
            .get_or_insert_with(|| vec![Style::default(); old_len]);
        styles.splice(offset..offset, std::iter::repeat(style).take(count));
        debug_assert_eq!(styles.len(), self.chars.len());
    }
}
