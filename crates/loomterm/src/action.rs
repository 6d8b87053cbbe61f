use crate::style::{Color, Style};

/// The contract through which decoded terminal semantics reach the screen
/// model. `ScreenBuffer` is the real implementation; tests plug in
/// recorders. The rendering layer observes the buffer, it never implements
/// this.
pub trait TerminalListener {
    /// Literal printable text, written at the cursor.
    fn process_line(&mut self, text: &str);
    /// A bare control character (CR, LF, BS, HT, VT).
    fn process_special_character(&mut self, ch: char);
    fn full_reset(&mut self);
    fn set_style(&mut self, style: Style);
    fn style(&self) -> Style;
    fn kill_horizontally(&mut self, from_start: bool, to_end: bool);
    fn kill_vertically(&mut self, from_top: bool, to_bottom: bool);
    /// 1-based coordinates; -1 leaves that coordinate unchanged.
    fn set_cursor_position(&mut self, x: i32, y: i32);
    fn move_cursor_horizontally(&mut self, dx: i32);
    fn move_cursor_vertically(&mut self, dy: i32);
    /// 1-based first/last scroll lines; (-1, -1) means the whole screen.
    fn set_scroll_screen(&mut self, first: i32, last: i32);
    fn scroll_display_up(&mut self);
    fn scroll_display_down(&mut self);
    fn insert_lines(&mut self, count: usize);
    fn delete_characters(&mut self, count: usize);
    fn set_caret_display(&mut self, visible: bool);
    fn use_alternative_buffer(&mut self, enabled: bool);
    fn save_cursor(&mut self);
    fn restore_cursor(&mut self);
    fn set_tab_at_cursor(&mut self);
    fn set_window_title(&mut self, title: &str);
    /// Bytes to send back to the connection (device-attribute replies).
    fn send_response(&mut self, _data: &[u8]) {}
}

/// One decoded unit of the byte stream: a run of literal text or a single
/// control operation. Closed set; `apply` is exhaustive over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalAction {
    /// A coalesced run of printable characters.
    Text(String),
    /// CR, LF, BS, HT or VT outside (or bypassing) an escape sequence.
    Control(char),
    /// `ESC` + one character from the single-char alphabet.
    SingleChar(char),
    /// `ESC` + one of `# ( ) * + $ @` + one more character.
    CharsetDesignation { kind: char, designator: char },
    /// `ESC [ body final_byte` where body is everything between.
    Csi { body: String, final_byte: char },
    /// `ESC ] body` up to (not including) its terminator.
    Osc { body: String },
    /// A sequence that completed without matching any known form.
    Unrecognized(String),
}

impl TerminalAction {
    /// Apply this action to a listener. Unsupported and malformed input is
    /// logged and absorbed; nothing here can fail.
    pub fn apply(&self, listener: &mut dyn TerminalListener) {
        match self {
            Self::Text(text) => listener.process_line(text),
            Self::Control(ch) => listener.process_special_character(*ch),
            Self::SingleChar(ch) => apply_single_char(listener, *ch),
            Self::CharsetDesignation { kind, designator } => {
                tracing::debug!("ignoring charset designation ESC {kind} {designator}");
            }
            Self::Csi { body, final_byte } => apply_csi(listener, body, *final_byte),
            Self::Osc { body } => apply_osc(listener, body),
            Self::Unrecognized(sequence) => {
                tracing::warn!("unrecognized escape sequence {sequence:?}");
            }
        }
    }
}

const DEVICE_ATTRIBUTES_REPLY: &[u8] = b"\x1b[?1;0c";

fn apply_single_char(listener: &mut dyn TerminalListener, ch: char) {
    match ch {
        '7' => listener.save_cursor(),
        '8' => listener.restore_cursor(),
        // IND: cursor down one line, scrolling at the bottom. Effectively NL.
        'D' => listener.process_special_character('\n'),
        // NEL: effectively CR, NL.
        'E' => {
            listener.process_special_character('\r');
            listener.process_special_character('\n');
        }
        'H' => listener.set_tab_at_cursor(),
        'M' => listener.scroll_display_up(),
        // Obsolete form of CSI c.
        'Z' => listener.send_response(DEVICE_ATTRIBUTES_REPLY),
        'c' => listener.full_reset(),
        '6' | '9' | '=' | '>' | 'n' | 'o' => {
            tracing::warn!("unsupported single-character escape ESC {ch}");
        }
        other => tracing::warn!("unrecognized single-character escape ESC {other}"),
    }
}

fn apply_csi(listener: &mut dyn TerminalListener, body: &str, final_byte: char) {
    match final_byte {
        'A' => move_cursor(listener, body, 0, -1),
        'B' => move_cursor(listener, body, 0, 1),
        'C' => move_cursor(listener, body, 1, 0),
        'D' => move_cursor(listener, body, -1, 0),
        'c' => device_attributes_request(listener, body),
        'f' | 'H' => move_cursor_to(listener, body),
        'K' => kill_line_contents(listener, body),
        'J' => kill_lines(listener, body),
        'L' => listener.insert_lines(parse_count(body, 1) as usize),
        'M' => {
            // xterm deletes lines here; the historical behavior this engine
            // keeps is a repeated downward region scroll.
            for _ in 0..parse_count(body, 1) {
                listener.scroll_display_down();
            }
        }
        'P' => listener.delete_characters(parse_count(body, 1) as usize),
        'h' => set_modes(listener, body, true),
        'l' => set_modes(listener, body, false),
        'm' => select_graphic_rendition(listener, body),
        'r' => set_scroll_screen(listener, body),
        other => tracing::warn!("unimplemented CSI sequence [{body}{other}"),
    }
}

fn move_cursor(listener: &mut dyn TerminalListener, body: &str, dx: i32, dy: i32) {
    let count = parse_count(body, 1) as i32;
    if dx != 0 {
        listener.move_cursor_horizontally(dx * count);
    }
    if dy != 0 {
        listener.move_cursor_vertically(dy * count);
    }
}

fn move_cursor_to(listener: &mut dyn TerminalListener, body: &str) {
    // Two 1-based parameters, row first. Anything short of "row;col"
    // means home.
    let (row, col) = match body.split_once(';') {
        Some((row, col)) => (parse_count(row, 1), parse_count(col, 1)),
        None => (1, 1),
    };
    listener.set_cursor_position(col as i32, row as i32);
}

fn kill_line_contents(listener: &mut dyn TerminalListener, body: &str) {
    let kind = parse_count(body, 0);
    let from_start = kind >= 1;
    let to_end = kind != 1;
    listener.kill_horizontally(from_start, to_end);
}

fn kill_lines(listener: &mut dyn TerminalListener, body: &str) {
    let kind = parse_count(body, 0);
    let from_top = kind >= 1;
    let to_bottom = kind != 1;
    listener.kill_vertically(from_top, to_bottom);
}

fn set_modes(listener: &mut dyn TerminalListener, body: &str, value: bool) {
    let Some(modes) = body.strip_prefix('?') else {
        tracing::warn!("unsupported non-private mode change [{body}");
        return;
    };
    // Unknown modes are skipped individually; the rest of the list still
    // applies.
    for mode in modes.split(';') {
        match mode.parse::<u32>() {
            Ok(25) => listener.set_caret_display(value),
            Ok(47) => listener.use_alternative_buffer(value),
            _ => tracing::warn!("unknown mode {mode:?} in [?{modes}"),
        }
    }
}

fn set_scroll_screen(listener: &mut dyn TerminalListener, body: &str) {
    match body.split_once(';') {
        Some((first, last)) => {
            listener.set_scroll_screen(parse_line_number(first), parse_line_number(last));
        }
        None => listener.set_scroll_screen(-1, -1),
    }
}

fn device_attributes_request(listener: &mut dyn TerminalListener, body: &str) {
    if body.is_empty() || body == "0" {
        listener.send_response(DEVICE_ATTRIBUTES_REPLY);
    } else {
        tracing::warn!("unsupported device attributes request [{body}c");
    }
}

/// SGR codes mutate the *current* style, except 0 which resets everything
/// to the inherited defaults.
fn select_graphic_rendition(listener: &mut dyn TerminalListener, body: &str) {
    let old = listener.style();
    let mut foreground = old.foreground();
    let mut background = old.background();
    let mut bold = old.is_bold();
    let mut underlined = old.is_underlined();
    let mut reverse_video = old.is_reverse_video();
    for part in body.split(';') {
        let code = parse_count(part, 0);
        match code {
            0 => {
                foreground = None;
                background = None;
                bold = false;
                underlined = false;
                reverse_video = false;
            }
            1 => bold = true,
            4 => underlined = true,
            7 => std::mem::swap(&mut foreground, &mut background),
            30..=37 => foreground = Color::from_index(code - 30),
            40..=47 => background = Color::from_index(code - 40),
            // Everything else is ignored individually.
            _ => {}
        }
    }
    listener.set_style(Style::with(
        foreground,
        background,
        bold,
        underlined,
        reverse_video,
    ));
}

fn apply_osc(listener: &mut dyn TerminalListener, body: &str) {
    let Some((selector, text)) = body.split_once(';') else {
        tracing::warn!("malformed OSC sequence ]{body}");
        return;
    };
    match selector.parse::<u32>() {
        Ok(0) | Ok(2) => listener.set_window_title(text),
        _ => tracing::warn!("unsupported OSC selector {selector:?}"),
    }
}

/// Parse a decimal parameter, falling back to the operation's default when
/// the parameter is absent or malformed.
fn parse_count(body: &str, default: u32) -> u32 {
    if body.is_empty() {
        default
    } else {
        body.parse().unwrap_or(default)
    }
}

fn parse_line_number(part: &str) -> i32 {
    part.parse().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        style: Style,
    }

    impl TerminalListener for Recorder {
        fn process_line(&mut self, text: &str) {
            self.calls.push(format!("line {text:?}"));
        }
        fn process_special_character(&mut self, ch: char) {
            self.calls.push(format!("special {ch:?}"));
        }
        fn full_reset(&mut self) {
            self.calls.push("full_reset".into());
        }
        fn set_style(&mut self, style: Style) {
            self.style = style;
            self.calls.push("set_style".into());
        }
        fn style(&self) -> Style {
            self.style
        }
        fn kill_horizontally(&mut self, from_start: bool, to_end: bool) {
            self.calls.push(format!("kill_h {from_start} {to_end}"));
        }
        fn kill_vertically(&mut self, from_top: bool, to_bottom: bool) {
            self.calls.push(format!("kill_v {from_top} {to_bottom}"));
        }
        fn set_cursor_position(&mut self, x: i32, y: i32) {
            self.calls.push(format!("cursor_to {x} {y}"));
        }
        fn move_cursor_horizontally(&mut self, dx: i32) {
            self.calls.push(format!("move_h {dx}"));
        }
        fn move_cursor_vertically(&mut self, dy: i32) {
            self.calls.push(format!("move_v {dy}"));
        }
        fn set_scroll_screen(&mut self, first: i32, last: i32) {
            self.calls.push(format!("scroll_screen {first} {last}"));
        }
        fn scroll_display_up(&mut self) {
            self.calls.push("scroll_up".into());
        }
        fn scroll_display_down(&mut self) {
            self.calls.push("scroll_down".into());
        }
        fn insert_lines(&mut self, count: usize) {
            self.calls.push(format!("insert_lines {count}"));
        }
        fn delete_characters(&mut self, count: usize) {
            self.calls.push(format!("delete_chars {count}"));
        }
        fn set_caret_display(&mut self, visible: bool) {
            self.calls.push(format!("caret {visible}"));
        }
        fn use_alternative_buffer(&mut self, enabled: bool) {
            self.calls.push(format!("alt_buffer {enabled}"));
        }
        fn save_cursor(&mut self) {
            self.calls.push("save_cursor".into());
        }
        fn restore_cursor(&mut self) {
            self.calls.push("restore_cursor".into());
        }
        fn set_tab_at_cursor(&mut self) {
            self.calls.push("set_tab".into());
        }
        fn set_window_title(&mut self, title: &str) {
            self.calls.push(format!("title {title:?}"));
        }
        fn send_response(&mut self, data: &[u8]) {
            self.calls.push(format!("response {data:?}"));
        }
    }

    fn csi(body: &str, final_byte: char) -> TerminalAction {
        TerminalAction::Csi {
            body: body.to_string(),
            final_byte,
        }
    }

    #[test]
    fn test_cursor_movement_defaults_to_one() {
        let mut recorder = Recorder::default();
        csi("", 'A').apply(&mut recorder);
        csi("3", 'C').apply(&mut recorder);
        assert_eq!(recorder.calls, vec!["move_v -1", "move_h 3"]);
    }

    #[test]
    fn test_cursor_position_defaults_to_home() {
        let mut recorder = Recorder::default();
        csi("", 'H').apply(&mut recorder);
        csi("5;10", 'f').apply(&mut recorder);
        csi(";8", 'H').apply(&mut recorder);
        assert_eq!(
            recorder.calls,
            vec!["cursor_to 1 1", "cursor_to 10 5", "cursor_to 8 1"]
        );
    }

    #[test]
    fn test_erase_parameters() {
        let mut recorder = Recorder::default();
        csi("", 'K').apply(&mut recorder);
        csi("1", 'K').apply(&mut recorder);
        csi("2", 'K').apply(&mut recorder);
        csi("2", 'J').apply(&mut recorder);
        assert_eq!(
            recorder.calls,
            vec![
                "kill_h false true",
                "kill_h true false",
                "kill_h true true",
                "kill_v true true"
            ]
        );
    }

    #[test]
    fn test_sgr_builds_on_current_style() {
        let mut recorder = Recorder::default();
        csi("31;1", 'm').apply(&mut recorder);
        assert_eq!(recorder.style.foreground(), Some(Color::Red));
        assert!(recorder.style.is_bold());

        // Underline on top should keep the red and the bold.
        csi("4", 'm').apply(&mut recorder);
        assert_eq!(recorder.style.foreground(), Some(Color::Red));
        assert!(recorder.style.is_bold());
        assert!(recorder.style.is_underlined());

        csi("0", 'm').apply(&mut recorder);
        assert_eq!(recorder.style, Style::default());
    }

    #[test]
    fn test_sgr_reverse_swaps_colors_and_is_its_own_inverse() {
        let mut recorder = Recorder::default();
        csi("31;42", 'm').apply(&mut recorder);
        csi("7", 'm').apply(&mut recorder);
        assert_eq!(recorder.style.foreground(), Some(Color::Green));
        assert_eq!(recorder.style.background(), Some(Color::Red));
        csi("7", 'm').apply(&mut recorder);
        assert_eq!(recorder.style.foreground(), Some(Color::Red));
        assert_eq!(recorder.style.background(), Some(Color::Green));
    }

    #[test]
    fn test_private_modes() {
        let mut recorder = Recorder::default();
        csi("?25", 'l').apply(&mut recorder);
        csi("?47;25", 'h').apply(&mut recorder);
        assert_eq!(
            recorder.calls,
            vec!["caret false", "alt_buffer true", "caret true"]
        );
    }

    #[test]
    fn test_scroll_screen_without_parameters_resets_region() {
        let mut recorder = Recorder::default();
        csi("", 'r').apply(&mut recorder);
        csi("5;20", 'r').apply(&mut recorder);
        assert_eq!(
            recorder.calls,
            vec!["scroll_screen -1 -1", "scroll_screen 5 20"]
        );
    }

    #[test]
    fn test_device_attributes_reply() {
        let mut recorder = Recorder::default();
        csi("", 'c').apply(&mut recorder);
        TerminalAction::SingleChar('Z').apply(&mut recorder);
        let expected = format!("response {:?}", b"\x1b[?1;0c");
        assert_eq!(recorder.calls, vec![expected.clone(), expected]);
    }

    #[test]
    fn test_csi_m_scrolls_down_repeatedly() {
        let mut recorder = Recorder::default();
        csi("3", 'M').apply(&mut recorder);
        assert_eq!(recorder.calls, vec!["scroll_down"; 3]);
    }

    #[test]
    fn test_osc_sets_window_title() {
        let mut recorder = Recorder::default();
        TerminalAction::Osc {
            body: "2;hello world".into(),
        }
        .apply(&mut recorder);
        assert_eq!(recorder.calls, vec!["title \"hello world\""]);
    }

    #[test]
    fn test_nel_is_cr_then_nl() {
        let mut recorder = Recorder::default();
        TerminalAction::SingleChar('E').apply(&mut recorder);
        assert_eq!(recorder.calls, vec!["special '\\r'", "special '\\n'"]);
    }
}
