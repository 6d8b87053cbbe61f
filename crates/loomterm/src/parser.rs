use crate::action::TerminalAction;

const ESC: char = '\u{1b}';
const BEL: char = '\u{7}';
const BS: char = '\u{8}';
const HT: char = '\t';
const LF: char = '\n';
const VT: char = '\u{b}';
const CR: char = '\r';
const SO: char = '\u{e}';
const SI: char = '\u{f}';

/// Escapes understood as `ESC` + exactly one more character.
const SINGLE_CHAR_ESCAPES: &str = "6789=>DEHMZcno";
/// Escapes understood as `ESC` + one of these + one more character.
const TWO_CHAR_PREFIXES: &str = "#()*+$@";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Literal text, accumulated into a run.
    Normal,
    /// Just saw ESC; the next character selects the sequence family.
    SawEscape,
    /// Saw `ESC` + a two-character prefix; one character to go.
    TwoChar(char),
    /// Inside `ESC [`, collecting until a final byte.
    CollectingCsi,
    /// Inside `ESC ]`, collecting until BEL or a string terminator.
    CollectingOsc,
    /// Inside `ESC ]` and just saw ESC, which may start `ESC \`.
    OscSawEscape,
}

/// Incremental decoder for the raw byte stream. Bytes may arrive split at
/// arbitrary points, including mid escape sequence and mid UTF-8 character;
/// all partial state is carried across `feed` calls.
pub struct EscapeSequenceParser {
    state: State,
    /// Printable characters not yet flushed as a Text action.
    text_run: String,
    /// The collected escape sequence, without the leading ESC.
    sequence: String,
    /// True while an OSC body is still in its numeric selector.
    osc_in_selector: bool,
    utf8_buf: [u8; 4],
    utf8_len: usize,
    utf8_remaining: usize,
}

impl Default for EscapeSequenceParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EscapeSequenceParser {
    pub fn new() -> Self {
        Self {
            state: State::Normal,
            text_run: String::new(),
            sequence: String::new(),
            osc_in_selector: false,
            utf8_buf: [0; 4],
            utf8_len: 0,
            utf8_remaining: 0,
        }
    }

    /// Decode a chunk of bytes into actions. Any literal run still open at
    /// the end of the chunk is flushed; escape-sequence and UTF-8 state is
    /// kept for the next chunk.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<TerminalAction> {
        let mut actions = Vec::new();
        for &byte in bytes {
            if let Some(ch) = self.decode_utf8(byte) {
                self.process_char(ch, &mut actions);
            }
        }
        self.flush_text(&mut actions);
        actions
    }

    fn decode_utf8(&mut self, byte: u8) -> Option<char> {
        if self.utf8_remaining == 0 {
            if byte < 0x80 {
                return Some(byte as char);
            }
            self.utf8_remaining = match byte {
                0xc0..=0xdf => 1,
                0xe0..=0xef => 2,
                0xf0..=0xf7 => 3,
                _ => {
                    tracing::trace!("dropping stray UTF-8 byte {byte:#04x}");
                    return None;
                }
            };
            self.utf8_buf[0] = byte;
            self.utf8_len = 1;
            return None;
        }
        if byte & 0xc0 != 0x80 {
            tracing::trace!("dropping malformed UTF-8 sequence");
            self.utf8_remaining = 0;
            self.utf8_len = 0;
            // Not a continuation byte; reinterpret it from scratch.
            return self.decode_utf8(byte);
        }
        self.utf8_buf[self.utf8_len] = byte;
        self.utf8_len += 1;
        self.utf8_remaining -= 1;
        if self.utf8_remaining > 0 {
            return None;
        }
        let len = self.utf8_len;
        self.utf8_len = 0;
        match std::str::from_utf8(&self.utf8_buf[..len]) {
            Ok(s) => s.chars().next(),
            Err(_) => {
                tracing::trace!("dropping malformed UTF-8 sequence");
                None
            }
        }
    }

    fn process_char(&mut self, ch: char, actions: &mut Vec<TerminalAction>) {
        // BS, CR and VT act immediately even while an escape sequence is in
        // flight, without disturbing it. Interleaving them inside sequences
        // is how some programs do cheap cursor motion.
        if self.state != State::Normal && matches!(ch, BS | CR | VT) {
            self.flush_text(actions);
            actions.push(TerminalAction::Control(ch));
            return;
        }

        if ch == ESC {
            self.flush_text(actions);
            match self.state {
                State::Normal | State::SawEscape => {
                    if self.state == State::SawEscape {
                        tracing::debug!("discarding lone ESC before another ESC");
                    }
                }
                State::CollectingOsc => {
                    // Might be the ESC of an ST terminator.
                    self.state = State::OscSawEscape;
                    return;
                }
                _ => {
                    tracing::debug!(
                        "discarding incomplete escape sequence {:?}",
                        self.sequence
                    );
                }
            }
            self.sequence.clear();
            self.state = State::SawEscape;
            return;
        }

        match self.state {
            State::Normal => self.process_normal_char(ch, actions),
            State::SawEscape => self.process_escape_start(ch, actions),
            State::TwoChar(kind) => {
                actions.push(TerminalAction::CharsetDesignation {
                    kind,
                    designator: ch,
                });
                self.state = State::Normal;
            }
            State::CollectingCsi => self.process_csi_char(ch, actions),
            State::CollectingOsc => self.process_osc_char(ch, actions),
            State::OscSawEscape => {
                if ch == '\\' {
                    self.complete_osc(actions);
                } else {
                    // The ESC started a new sequence; the OSC is lost.
                    tracing::debug!(
                        "discarding incomplete OSC sequence {:?}",
                        self.sequence
                    );
                    self.sequence.clear();
                    self.state = State::SawEscape;
                    self.process_char(ch, actions);
                }
            }
        }
    }

    fn process_normal_char(&mut self, ch: char, actions: &mut Vec<TerminalAction>) {
        match ch {
            CR | LF | BS | HT | VT => {
                self.flush_text(actions);
                actions.push(TerminalAction::Control(ch));
            }
            BEL => tracing::trace!("bell"),
            // Some telnet servers pad lines with NUL.
            '\0' => {}
            SO | SI => tracing::debug!("ignoring charset shift {:?}", ch),
            ch if ch < ' ' => tracing::trace!("ignoring control character {ch:?}"),
            ch => self.text_run.push(ch),
        }
    }

    fn process_escape_start(&mut self, ch: char, actions: &mut Vec<TerminalAction>) {
        match ch {
            '[' => {
                self.sequence.clear();
                self.state = State::CollectingCsi;
            }
            ']' => {
                self.sequence.clear();
                self.osc_in_selector = true;
                self.state = State::CollectingOsc;
            }
            ch if TWO_CHAR_PREFIXES.contains(ch) => {
                self.state = State::TwoChar(ch);
            }
            ch if SINGLE_CHAR_ESCAPES.contains(ch) => {
                actions.push(TerminalAction::SingleChar(ch));
                self.state = State::Normal;
            }
            other => {
                actions.push(TerminalAction::Unrecognized(format!("ESC {other:?}")));
                self.state = State::Normal;
            }
        }
    }

    fn process_csi_char(&mut self, ch: char, actions: &mut Vec<TerminalAction>) {
        if ('\u{40}'..='\u{7e}').contains(&ch) {
            actions.push(TerminalAction::Csi {
                body: std::mem::take(&mut self.sequence),
                final_byte: ch,
            });
            self.state = State::Normal;
        } else if ch < ' ' {
            // A control character other than the bypass set aborts the
            // sequence; the character itself is consumed.
            actions.push(TerminalAction::Unrecognized(format!(
                "ESC [{}{ch:?}",
                self.sequence
            )));
            self.sequence.clear();
            self.state = State::Normal;
        } else {
            self.sequence.push(ch);
        }
    }

    fn process_osc_char(&mut self, ch: char, actions: &mut Vec<TerminalAction>) {
        if ch == BEL || ch < ' ' {
            self.complete_osc(actions);
            return;
        }
        if self.osc_in_selector {
            if ch == ';' {
                self.osc_in_selector = false;
            } else if !ch.is_ascii_digit() {
                // A non-numeric selector cannot be valid; complete the
                // sequence and let dispatch report it.
                self.sequence.push(ch);
                self.complete_osc(actions);
                return;
            }
        }
        self.sequence.push(ch);
    }

    fn complete_osc(&mut self, actions: &mut Vec<TerminalAction>) {
        actions.push(TerminalAction::Osc {
            body: std::mem::take(&mut self.sequence),
        });
        self.state = State::Normal;
    }

    fn flush_text(&mut self, actions: &mut Vec<TerminalAction>) {
        if !self.text_run.is_empty() {
            actions.push(TerminalAction::Text(std::mem::take(&mut self.text_run)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_str(parser: &mut EscapeSequenceParser, input: &str) -> Vec<TerminalAction> {
        parser.feed(input.as_bytes())
    }

    fn text(s: &str) -> TerminalAction {
        TerminalAction::Text(s.to_string())
    }

    fn csi(body: &str, final_byte: char) -> TerminalAction {
        TerminalAction::Csi {
            body: body.to_string(),
            final_byte,
        }
    }

    #[test]
    fn test_plain_text_with_newline() {
        let mut parser = EscapeSequenceParser::new();
        let actions = feed_str(&mut parser, "Hi\r\n");
        assert_eq!(
            actions,
            vec![
                text("Hi"),
                TerminalAction::Control('\r'),
                TerminalAction::Control('\n')
            ]
        );
    }

    #[test]
    fn test_sgr_sequence_between_text() {
        let mut parser = EscapeSequenceParser::new();
        let actions = feed_str(&mut parser, "a\x1b[31;1mb");
        assert_eq!(actions, vec![text("a"), csi("31;1", 'm'), text("b")]);
    }

    #[test]
    fn test_sequence_split_across_chunks() {
        let mut parser = EscapeSequenceParser::new();
        assert_eq!(feed_str(&mut parser, "\x1b[3"), vec![]);
        assert_eq!(feed_str(&mut parser, "1m"), vec![csi("31", 'm')]);
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let mut parser = EscapeSequenceParser::new();
        let bytes = "é".as_bytes();
        assert_eq!(parser.feed(&bytes[..1]), vec![]);
        assert_eq!(parser.feed(&bytes[1..]), vec![text("é")]);
    }

    #[test]
    fn test_osc_title_with_bel_terminator() {
        let mut parser = EscapeSequenceParser::new();
        let actions = feed_str(&mut parser, "\x1b]2;My Title\x07");
        assert_eq!(
            actions,
            vec![TerminalAction::Osc {
                body: "2;My Title".into()
            }]
        );
    }

    #[test]
    fn test_osc_title_with_string_terminator() {
        let mut parser = EscapeSequenceParser::new();
        let actions = feed_str(&mut parser, "\x1b]0;title\x1b\\after");
        assert_eq!(
            actions,
            vec![
                TerminalAction::Osc {
                    body: "0;title".into()
                },
                text("after")
            ]
        );
    }

    #[test]
    fn test_backspace_bypasses_sequence_in_flight() {
        let mut parser = EscapeSequenceParser::new();
        let actions = feed_str(&mut parser, "\x1b[1\x08;2H");
        assert_eq!(
            actions,
            vec![TerminalAction::Control('\u{8}'), csi("1;2", 'H')]
        );
    }

    #[test]
    fn test_escape_mid_sequence_starts_over() {
        let mut parser = EscapeSequenceParser::new();
        let actions = feed_str(&mut parser, "\x1b[12\x1b[3m");
        assert_eq!(actions, vec![csi("3", 'm')]);
    }

    #[test]
    fn test_unknown_final_byte_does_not_wedge_parser() {
        let mut parser = EscapeSequenceParser::new();
        let actions = feed_str(&mut parser, "\x1bQafter");
        assert_eq!(
            actions,
            vec![
                TerminalAction::Unrecognized("ESC 'Q'".into()),
                text("after")
            ]
        );
    }

    #[test]
    fn test_single_char_escapes() {
        let mut parser = EscapeSequenceParser::new();
        let actions = feed_str(&mut parser, "\x1bM\x1b7");
        assert_eq!(
            actions,
            vec![
                TerminalAction::SingleChar('M'),
                TerminalAction::SingleChar('7')
            ]
        );
    }

    #[test]
    fn test_charset_designation() {
        let mut parser = EscapeSequenceParser::new();
        let actions = feed_str(&mut parser, "\x1b(B");
        assert_eq!(
            actions,
            vec![TerminalAction::CharsetDesignation {
                kind: '(',
                designator: 'B'
            }]
        );
    }

    #[test]
    fn test_nul_bytes_are_ignored() {
        let mut parser = EscapeSequenceParser::new();
        let actions = parser.feed(b"a\0b");
        assert_eq!(actions, vec![text("ab")]);
    }

    #[test]
    fn test_control_char_aborts_csi() {
        let mut parser = EscapeSequenceParser::new();
        let actions = feed_str(&mut parser, "\x1b[12\nx");
        assert_eq!(
            actions,
            vec![
                TerminalAction::Unrecognized("ESC [12'\\n'".into()),
                text("x")
            ]
        );
    }

    #[test]
    fn test_literal_runs_are_coalesced() {
        let mut parser = EscapeSequenceParser::new();
        let actions = feed_str(&mut parser, "hello world");
        assert_eq!(actions, vec![text("hello world")]);
    }
}
