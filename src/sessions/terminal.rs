//! Terminal-emulator adapter (§4.3).
//!
//! Wraps `vt100::Parser`, the external VT-parsing/screen-model library
//! this crate depends on rather than hand-rolling a cell grid, for the
//! cell contents, SGR attributes, and cursor position. Parsing is
//! synchronous and incremental and accepts arbitrary byte boundaries,
//! including mid-escape-sequence splits and partial UTF-8 — that's
//! `vt100`'s own contract.
//!
//! `vt100::Screen` doesn't surface the DEC private modes the snapshot
//! renderer needs to restore (origin mode, wraparound, reverse
//! wraparound, bracketed paste, alternate screen, scroll region margins),
//! so this adapter tracks them itself from the raw byte stream — an
//! explicit mode-tracking side channel of exactly the kind §9's design
//! notes anticipate for modes a library doesn't expose.

/// DEC private/ANSI modes and margins not exposed by `vt100::Screen`,
/// tracked by scanning the same bytes fed to the parser.
#[derive(Debug, Clone, Copy)]
pub struct Modes {
    pub cursor_visible: bool,
    pub alternate_screen: bool,
    pub origin_mode: bool,
    /// Autowrap is on by default on a freshly reset terminal.
    pub wraparound: bool,
    pub reverse_wraparound: bool,
    pub bracketed_paste: bool,
    /// `(top, bottom)`, 1-indexed inclusive, `None` meaning full window.
    pub scroll_region: Option<(u16, u16)>,
}

impl Default for Modes {
    fn default() -> Self {
        Modes {
            cursor_visible: true,
            alternate_screen: false,
            origin_mode: false,
            wraparound: true,
            reverse_wraparound: false,
            bracketed_paste: false,
            scroll_region: None,
        }
    }
}

pub struct Terminal {
    parser: vt100::Parser,
    modes: Modes,
    scan: CsiScanState,
}

#[derive(Default)]
struct CsiScanState {
    in_escape: bool,
    in_csi: bool,
    private: bool,
    params: String,
}

impl Terminal {
    pub fn new(rows: u16, cols: u16) -> Self {
        Terminal {
            parser: vt100::Parser::new(rows, cols, 0),
            modes: Modes::default(),
            scan: CsiScanState::default(),
        }
    }

    /// Feed a chunk of raw PTY output. Must be called, in order, before
    /// any dependent action (broadcast, snapshot, resize) per §3's
    /// invariant.
    pub fn process(&mut self, bytes: &[u8]) {
        self.scan_modes(bytes);
        self.parser.process(bytes);
    }

    /// Resize the emulator. Per §4.5 this must happen strictly before the
    /// PTY's OS-level window size is changed.
    pub fn set_size(&mut self, rows: u16, cols: u16) {
        self.parser.set_size(rows, cols);
    }

    pub fn size(&self) -> (u16, u16) {
        self.parser.screen().size()
    }

    pub fn screen(&self) -> &vt100::Screen {
        self.parser.screen()
    }

    pub fn modes(&self) -> Modes {
        self.modes
    }

    /// Scan for the CSI sequences that set/reset the modes and margins
    /// this adapter tracks on top of `vt100`. Handles arbitrary chunking
    /// the same way the real parser does, by carrying scan state across
    /// calls.
    fn scan_modes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            let st = &mut self.scan;
            if st.in_csi {
                if b == b'?' && st.params.is_empty() {
                    st.private = true;
                } else if b.is_ascii_digit() || b == b';' {
                    st.params.push(b as char);
                } else if b == b'h' || b == b'l' {
                    let set = b == b'h';
                    if st.private {
                        for p in st.params.split(';').filter_map(|s| s.parse::<u32>().ok()) {
                            self.apply_private_mode(p, set);
                        }
                    }
                    st.in_csi = false;
                    st.private = false;
                    st.params.clear();
                } else if b == b'r' {
                    if !st.private {
                        if let Some((top, bottom)) = parse_two_params(&st.params) {
                            self.modes.scroll_region = if top <= 1 && bottom == 0 {
                                None
                            } else {
                                Some((top, bottom))
                            };
                        }
                    }
                    st.in_csi = false;
                    st.private = false;
                    st.params.clear();
                } else if (0x40..=0x7e).contains(&b) {
                    st.in_csi = false;
                    st.private = false;
                    st.params.clear();
                }
            } else if st.in_escape {
                if b == b'[' {
                    st.in_csi = true;
                    st.private = false;
                    st.params.clear();
                } else {
                    st.in_escape = false;
                }
            } else if b == 0x1b {
                st.in_escape = true;
            }
        }
    }

    fn apply_private_mode(&mut self, code: u32, set: bool) {
        match code {
            25 => self.modes.cursor_visible = set,
            6 => self.modes.origin_mode = set,
            7 => self.modes.wraparound = set,
            45 => self.modes.reverse_wraparound = set,
            2004 => self.modes.bracketed_paste = set,
            47 | 1047 | 1049 => self.modes.alternate_screen = set,
            _ => {}
        }
    }
}

fn parse_two_params(params: &str) -> Option<(u16, u16)> {
    let mut it = params.split(';');
    let top: u16 = it.next()?.parse().unwrap_or(1);
    let bottom: u16 = it.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    Some((top.max(1), bottom))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_cursor_after_plain_text() {
        let mut term = Terminal::new(24, 80);
        term.process(b"hello\n");
        let (row, _col) = term.screen().cursor_position();
        assert!(row >= 1);
    }

    #[test]
    fn tracks_scroll_region_set_and_cleared() {
        let mut term = Terminal::new(24, 80);
        term.process(b"\x1b[5;10r");
        assert_eq!(term.modes().scroll_region, Some((5, 10)));
        term.process(b"\x1b[r");
        assert_eq!(term.modes().scroll_region, None);
    }

    #[test]
    fn tracks_alternate_screen_and_cursor_visibility() {
        let mut term = Terminal::new(24, 80);
        term.process(b"\x1b[?1049h");
        assert!(term.modes().alternate_screen);
        term.process(b"\x1b[?25l");
        assert!(!term.modes().cursor_visible);
        term.process(b"\x1b[?25h");
        assert!(term.modes().cursor_visible);
    }

    #[test]
    fn resize_updates_reported_size() {
        let mut term = Terminal::new(24, 80);
        term.set_size(30, 120);
        assert_eq!(term.size(), (30, 120));
    }
}
