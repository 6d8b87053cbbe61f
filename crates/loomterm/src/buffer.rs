use smallvec::SmallVec;
use std::sync::mpsc::Sender;

use crate::action::TerminalListener;
use crate::line::TextLine;
use crate::style::Style;

/// Cursor location. `y` is buffer-absolute: an index into the full line
/// store including scrollback, not into the visible screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub x: usize,
    pub y: usize,
}

/// The terminal's data model: every line ever emitted (scrollback included)
/// plus the visible window, cursor, scroll region and alternate screen.
///
/// The visible screen is always the last `height` lines; growth at the
/// bottom is what scrolls old content into history. Rendering layers read
/// lines through `line`/`visible_lines` and never mutate.
pub struct ScreenBuffer {
    lines: Vec<TextLine>,
    width: usize,
    height: usize,
    cursor: Cursor,
    current_style: Style,
    /// Scroll region bounds, 0-based and display-relative, both inclusive.
    first_scroll_line: usize,
    last_scroll_line: usize,
    saved_cursor: Option<(Cursor, Style)>,
    /// The real screen's visible lines while the alternate buffer is active.
    saved_screen: Option<Vec<TextLine>>,
    tab_positions: SmallVec<[usize; 8]>,
    window_title: String,
    caret_visible: bool,
    response_tx: Option<Sender<Vec<u8>>>,
}

impl ScreenBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            lines: (0..height).map(|_| TextLine::new(None)).collect(),
            width,
            height,
            cursor: Cursor::default(),
            current_style: Style::default(),
            first_scroll_line: 0,
            last_scroll_line: height - 1,
            saved_cursor: None,
            saved_screen: None,
            tab_positions: SmallVec::new(),
            window_title: String::new(),
            caret_visible: true,
            response_tx: None,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Total line count, scrollback included.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Index of the first line of the visible screen.
    pub fn first_display_line(&self) -> usize {
        self.lines.len() - self.height
    }

    pub fn line(&self, index: usize) -> Option<&TextLine> {
        self.lines.get(index)
    }

    pub fn visible_lines(&self) -> impl Iterator<Item = &TextLine> {
        self.lines[self.first_display_line()..].iter()
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn window_title(&self) -> &str {
        &self.window_title
    }

    pub fn is_caret_visible(&self) -> bool {
        self.caret_visible
    }

    pub fn using_alternate_buffer(&self) -> bool {
        self.saved_screen.is_some()
    }

    /// Register the channel that carries replies (device attributes and the
    /// like) back towards the connection.
    pub fn set_response_tx(&mut self, tx: Sender<Vec<u8>>) {
        self.response_tx = Some(tx);
    }

    /// Change the screen dimensions. Blank lines are added if the buffer
    /// does not yet reach the new height; the scroll region resets to the
    /// whole screen and the cursor is pulled back inside the view.
    pub fn resize(&mut self, width: usize, height: usize) {
        let width = width.max(1);
        let height = height.max(1);
        self.width = width;
        self.height = height;
        while self.lines.len() < height {
            let blank = self.blank_line();
            self.lines.push(blank);
        }
        self.first_scroll_line = 0;
        self.last_scroll_line = height - 1;
        self.cursor.y = self
            .cursor
            .y
            .clamp(self.first_display_line(), self.lines.len() - 1);
        self.cursor.x = self.cursor.x.min(width - 1);
    }

    fn blank_line(&self) -> TextLine {
        TextLine::new(self.current_style.background())
    }

    fn line_at_mut(&mut self, index: usize) -> &mut TextLine {
        if index >= self.lines.len() {
            tracing::warn!(
                index,
                line_count = self.lines.len(),
                "line requested beyond buffer, extending"
            );
            while self.lines.len() <= index {
                let blank = self.blank_line();
                self.lines.push(blank);
            }
        }
        &mut self.lines[index]
    }

    /// Move the cursor to a buffer-absolute line, scrolling if it lies
    /// below the scroll region.
    fn move_to_line(&mut self, index: usize) {
        if index > self.first_display_line() + self.last_scroll_line {
            self.insert_line(index);
        } else {
            self.cursor.y = index;
        }
    }

    fn insert_line(&mut self, index: usize) {
        // The first display line moves as lines are added and removed, so
        // pin it for the whole operation.
        let first_display = self.first_display_line();
        let region_top = first_display + self.first_scroll_line;
        let region_bottom = first_display + self.last_scroll_line;
        if index > region_bottom {
            for at in region_bottom + 1..=index {
                let blank = self.blank_line();
                self.lines.insert(at, blank);
            }
            if self.using_alternate_buffer() || self.first_scroll_line > 0 {
                // With explicit scroll bounds (or on the alternate screen)
                // a newline at the bottom discards the region's top line
                // instead of growing the history.
                self.lines.remove(region_top);
            } else {
                self.cursor.y = index;
            }
        } else {
            self.lines.remove(region_bottom);
            let blank = self.blank_line();
            self.lines.insert(index, blank);
            self.cursor.y = index;
        }
    }

    fn next_tab_position(&self, char_offset: usize) -> usize {
        if let Some(&pos) = self.tab_positions.iter().find(|&&pos| pos > char_offset) {
            return pos;
        }
        // No explicit tab to our right; fall back to 8-column stops.
        (char_offset + 8) & !7
    }

    fn insert_tab(&mut self) {
        let start_offset = self.cursor.x;
        let tab_length = self.next_tab_position(start_offset) - start_offset;
        let style = self.current_style;
        let y = self.cursor.y;
        let line = self.line_at_mut(y);
        // Tab characters are only materialized when the tab lands at the
        // end of the line, so copied output keeps its tabs. Mid-line tabs
        // are pure cursor motion.
        if start_offset == line.len() {
            line.insert_tab_at(start_offset, tab_length, style);
        }
        self.cursor.x = start_offset + tab_length;
    }
}

impl TerminalListener for ScreenBuffer {
    fn process_line(&mut self, text: &str) {
        let Cursor { x, y } = self.cursor;
        let style = self.current_style;
        self.line_at_mut(y).write_text_at(x, text, style);
        self.cursor.x = x + text.chars().count();
    }

    fn process_special_character(&mut self, ch: char) {
        match ch {
            '\r' => self.cursor.x = 0,
            '\n' => self.move_to_line(self.cursor.y + 1),
            '\u{b}' => self.move_cursor_vertically(1),
            '\t' => self.insert_tab(),
            '\u{8}' => self.move_cursor_horizontally(-1),
            other => tracing::warn!("unsupported special character {:?}", other as u32),
        }
    }

    fn full_reset(&mut self) {
        let first = self.first_display_line();
        for i in 0..self.height {
            self.line_at_mut(first + i).clear();
        }
        self.set_cursor_position(-1, 1);
    }

    fn set_style(&mut self, style: Style) {
        self.current_style = style;
    }

    fn style(&self) -> Style {
        self.current_style
    }

    fn kill_horizontally(&mut self, from_start: bool, to_end: bool) {
        if !from_start && !to_end {
            tracing::warn!("kill_horizontally called with nothing to kill");
            return;
        }
        let Cursor { x, y } = self.cursor;
        let style = self.current_style;
        let background = style.background();
        let line = self.line_at_mut(y);
        if !to_end {
            // Clearing before the cursor leaves spaces behind. The cursor
            // position itself is included, hence + 1.
            let spaces = " ".repeat(x + 1);
            line.write_text_at(0, &spaces, style);
        } else {
            line.set_background(background);
            let start = if from_start { 0 } else { x };
            let end = line.len();
            line.kill_text(start, end);
        }
    }

    fn kill_vertically(&mut self, from_top: bool, to_bottom: bool) {
        if !from_top && !to_bottom {
            tracing::warn!("kill_vertically called with nothing to kill");
            return;
        }
        let Cursor { x, y } = self.cursor;
        let style = self.current_style;
        let background = style.background();
        let start = if from_top { self.first_display_line() } else { y };
        let start_clearing = if from_top { start } else { start + 1 };
        let end_clearing = if to_bottom { self.line_count() } else { y };
        for i in start_clearing..end_clearing {
            let line = self.line_at_mut(i);
            line.clear();
            line.set_background(background);
        }
        let line = self.line_at_mut(y);
        if to_bottom {
            let end = line.len();
            line.kill_text(x, end);
        } else {
            // The cursor position is always erased, hence the + 1.
            let spaces = " ".repeat(x + 1);
            line.write_text_at(0, &spaces, style);
        }
        if from_top && to_bottom {
            self.set_cursor_position(1, 1);
        }
    }

    fn set_cursor_position(&mut self, x: i32, y: i32) {
        // Coordinates are 1-based but badly-behaved programs send (0,0),
        // so clamp rather than reject.
        if x != -1 {
            let char_offset = (x.max(1) - 1) as usize;
            self.cursor.x = char_offset.min(self.width - 1);
        }
        if y != -1 {
            let display_offset = ((y.max(1) - 1) as usize).min(self.height - 1);
            self.cursor.y = self.first_display_line() + display_offset;
        }
    }

    fn move_cursor_horizontally(&mut self, dx: i32) {
        // No clamp on the right: line editing on serial consoles moves the
        // cursor past the width and expects it to stick.
        self.cursor.x = (self.cursor.x as i32 + dx).max(0) as usize;
    }

    fn move_cursor_vertically(&mut self, dy: i32) {
        let y = self.cursor.y as i32 + dy;
        let y = y.max(self.first_display_line() as i32) as usize;
        self.cursor.y = y.min(self.lines.len() - 1);
    }

    fn set_scroll_screen(&mut self, first: i32, last: i32) {
        let first = if first == -1 { 1 } else { first.max(1) };
        let last = if last == -1 {
            self.height as i32
        } else {
            last.max(1)
        };
        self.first_scroll_line = (first as usize - 1).min(self.height - 1);
        self.last_scroll_line =
            (last as usize - 1).clamp(self.first_scroll_line, self.height - 1);
    }

    fn scroll_display_up(&mut self) {
        let add_index = self.first_display_line() + self.first_scroll_line;
        let remove_index = self.first_display_line() + self.last_scroll_line + 1;
        let blank = self.blank_line();
        self.lines.insert(add_index, blank);
        self.lines.remove(remove_index);
    }

    fn scroll_display_down(&mut self) {
        let remove_index = self.first_display_line() + self.first_scroll_line;
        let add_index = self.first_display_line() + self.last_scroll_line;
        self.lines.remove(remove_index);
        let blank = self.blank_line();
        self.lines.insert(add_index, blank);
    }

    fn insert_lines(&mut self, count: usize) {
        for _ in 0..count {
            self.insert_line(self.cursor.y);
        }
    }

    fn delete_characters(&mut self, count: usize) {
        let Cursor { x, y } = self.cursor;
        self.line_at_mut(y).kill_text(x, x + count);
    }

    fn set_caret_display(&mut self, visible: bool) {
        self.caret_visible = visible;
    }

    fn use_alternative_buffer(&mut self, enabled: bool) {
        if enabled == self.using_alternate_buffer() {
            return;
        }
        let first = self.first_display_line();
        if enabled {
            let mut saved = Vec::with_capacity(self.height);
            for i in 0..self.height {
                let blank = self.blank_line();
                saved.push(std::mem::replace(&mut self.lines[first + i], blank));
            }
            self.saved_screen = Some(saved);
        } else if let Some(saved) = self.saved_screen.take() {
            for (i, line) in saved.into_iter().enumerate() {
                if i < self.height {
                    self.lines[first + i] = line;
                } else {
                    self.lines.push(line);
                }
            }
        }
    }

    fn save_cursor(&mut self) {
        self.saved_cursor = Some((self.cursor, self.current_style));
    }

    fn restore_cursor(&mut self) {
        if let Some((cursor, style)) = self.saved_cursor {
            self.cursor = Cursor {
                x: cursor.x.min(self.width - 1),
                y: cursor.y.min(self.lines.len() - 1),
            };
            self.current_style = style;
        }
    }

    fn set_tab_at_cursor(&mut self) {
        let x = self.cursor.x;
        match self.tab_positions.binary_search(&x) {
            Ok(_) => {}
            Err(at) => self.tab_positions.insert(at, x),
        }
    }

    fn set_window_title(&mut self, title: &str) {
        self.window_title = title.to_string();
    }

    fn send_response(&mut self, data: &[u8]) {
        if let Some(tx) = &self.response_tx {
            if tx.send(data.to_vec()).is_err() {
                tracing::warn!("response channel closed, dropping reply");
                self.response_tx = None;
            }
        }
    }
}
