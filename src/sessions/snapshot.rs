//! Snapshot renderer (§4.4).
//!
//! Produces, for a re-attaching client only, one contiguous byte sequence
//! that redraws the supervisor's authoritative screen. Never used on
//! first attach and never replays scrollback — only ever a single
//! synthesized frame, per the spec's explicit Non-goal.

use std::fmt::Write as _;

use super::terminal::Terminal;

#[derive(Clone, Copy, PartialEq, Eq)]
struct Style {
    bold: bool,
    italic: bool,
    underline: bool,
    inverse: bool,
    fg: vt100::Color,
    bg: vt100::Color,
}

impl Default for Style {
    fn default() -> Self {
        Style {
            bold: false,
            italic: false,
            underline: false,
            inverse: false,
            fg: vt100::Color::Default,
            bg: vt100::Color::Default,
        }
    }
}

/// Render the current screen held by `term` as a self-contained redraw
/// stream (§4.4 steps 1-9).
pub fn render(term: &Terminal) -> Vec<u8> {
    let modes = term.modes();
    let screen = term.screen();
    let (rows, cols) = screen.size();
    let mut out = String::new();

    // 1. Hide cursor.
    out.push_str("\x1b[?25l");
    // 2. Reset any previously-set scroll region.
    out.push_str("\x1b[r");
    // 3. Reset SGR attributes.
    out.push_str("\x1b[0m");
    // 4. Enter the alternate screen if last seen there; clear and home.
    if modes.alternate_screen {
        out.push_str("\x1b[?1049h");
    }
    out.push_str("\x1b[2J\x1b[H");

    // 5. Paint each row of the active viewport.
    let mut last_style = Style::default();
    for row in 0..rows {
        let _ = write!(out, "\x1b[{};1H\x1b[2K", row + 1);
        let mut col = 0u16;
        while col < cols {
            let Some(cell) = screen.cell(row, col) else {
                col += 1;
                continue;
            };
            if cell.is_wide_continuation() {
                col += 1;
                continue;
            }
            let style = Style {
                bold: cell.bold(),
                italic: cell.italic(),
                underline: cell.underline(),
                inverse: cell.inverse(),
                fg: cell.fgcolor(),
                bg: cell.bgcolor(),
            };
            if style != last_style {
                emit_sgr_delta(&mut out, &last_style, &style);
                last_style = style;
            }
            let text = cell.contents();
            if text.is_empty() {
                out.push(' ');
            } else {
                out.push_str(&text);
            }
            col += if cell.is_wide() { 2 } else { 1 };
        }
    }

    // 6. Restore scroll region if non-default.
    if let Some((top, bottom)) = modes.scroll_region {
        let _ = write!(out, "\x1b[{top};{bottom}r");
    }

    // 7. Restore recognized DEC modes.
    out.push_str(if modes.origin_mode {
        "\x1b[?6h"
    } else {
        "\x1b[?6l"
    });
    if !modes.wraparound {
        out.push_str("\x1b[?7l");
    }
    out.push_str(if modes.reverse_wraparound {
        "\x1b[?45h"
    } else {
        "\x1b[?45l"
    });
    out.push_str(if modes.bracketed_paste {
        "\x1b[?2004h"
    } else {
        "\x1b[?2004l"
    });

    // 8. Restore cursor position (origin-mode relative if a region is set).
    let (cur_row, cur_col) = screen.cursor_position();
    let (out_row, out_col) = if modes.origin_mode {
        let top = modes.scroll_region.map(|(t, _)| t).unwrap_or(1);
        (cur_row + 1 - (top - 1), cur_col + 1)
    } else {
        (cur_row + 1, cur_col + 1)
    };
    let _ = write!(out, "\x1b[{out_row};{out_col}H");

    // 9. Show cursor, unless the live screen currently has it hidden.
    if modes.cursor_visible {
        out.push_str("\x1b[?25h");
    }

    out.into_bytes()
}

fn emit_sgr_delta(out: &mut String, from: &Style, to: &Style) {
    let mut codes: Vec<String> = Vec::new();
    if *to == Style::default() {
        codes.push("0".to_string());
    } else {
        if to.bold && !from.bold {
            codes.push("1".to_string());
        } else if !to.bold && from.bold {
            codes.push("22".to_string());
        }
        if to.italic && !from.italic {
            codes.push("3".to_string());
        } else if !to.italic && from.italic {
            codes.push("23".to_string());
        }
        if to.underline && !from.underline {
            codes.push("4".to_string());
        } else if !to.underline && from.underline {
            codes.push("24".to_string());
        }
        if to.inverse && !from.inverse {
            codes.push("7".to_string());
        } else if !to.inverse && from.inverse {
            codes.push("27".to_string());
        }
        if to.fg != from.fg {
            push_color_codes(&mut codes, to.fg, true);
        }
        if to.bg != from.bg {
            push_color_codes(&mut codes, to.bg, false);
        }
    }
    if !codes.is_empty() {
        let _ = write!(out, "\x1b[{}m", codes.join(";"));
    }
}

fn push_color_codes(codes: &mut Vec<String>, color: vt100::Color, foreground: bool) {
    match color {
        vt100::Color::Default => codes.push(if foreground { "39" } else { "49" }.to_string()),
        vt100::Color::Idx(n) => {
            if foreground {
                codes.push(format!("38;5;{n}"));
            } else {
                codes.push(format!("48;5;{n}"));
            }
        }
        vt100::Color::Rgb(r, g, b) => {
            if foreground {
                codes.push(format!("38;2;{r};{g};{b}"));
            } else {
                codes.push(format!("48;2;{r};{g};{b}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_begins_by_hiding_cursor() {
        let term = Terminal::new(24, 80);
        let bytes = render(&term);
        assert!(bytes.starts_with(b"\x1b[?25l"));
    }

    #[test]
    fn snapshot_contains_written_text() {
        let mut term = Terminal::new(24, 80);
        term.process(b"hello");
        let bytes = render(&term);
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("hello"));
    }

    #[test]
    fn snapshot_enters_alternate_screen_when_active() {
        let mut term = Terminal::new(24, 80);
        term.process(b"\x1b[?1049h");
        let bytes = render(&term);
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("\x1b[?1049h"));
    }
}
