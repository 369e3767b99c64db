//! Input decoding, line splitting and character classes.

use std::borrow::Cow;

/// Tab stops are every four columns.
pub const TAB_STOP: usize = 4;

/// Decode raw bytes, replacing invalid UTF-8 with U+FFFD.
pub fn decode(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// Split `text` into logical lines.
///
/// CR, LF and CRLF all end a line. Every returned line ends with exactly
/// one `\n`, including a final line that had no terminator. NUL becomes
/// U+FFFD and a leading byte order mark is dropped.
pub fn split_lines(text: &str) -> Vec<String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\n' => {
                current.push('\n');
                lines.push(std::mem::take(&mut current));
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                current.push('\n');
                lines.push(std::mem::take(&mut current));
            }
            '\0' => current.push('\u{fffd}'),
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        current.push('\n');
        lines.push(current);
    }
    lines
}

pub fn is_line_end(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

pub fn is_space_or_tab(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Space, tab or line ending.
pub fn is_blank_byte(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// Whether the rest of `s` holds only spaces and tabs before the line end.
pub fn is_blank(s: &[u8]) -> bool {
    s.iter()
        .take_while(|&&b| !is_line_end(b))
        .all(|&b| is_space_or_tab(b))
}

/// Characters that may be backslash-escaped.
pub fn is_ascii_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
}

/// Unicode punctuation or symbol, as used by the flanking rules.
pub fn is_punctuation(c: char) -> bool {
    if c.is_ascii() {
        return c.is_ascii_punctuation();
    }
    let code = c as u32;
    matches!(code,
        // Latin-1 punctuation and symbols
        0x00A1..=0x00BF | 0x00D7 | 0x00F7 |
        // Spacing modifiers and Greek/Armenian/Hebrew/Arabic punctuation
        0x02C2..=0x02C5 | 0x02D2..=0x02DF | 0x037E | 0x0387 |
        0x055A..=0x055F | 0x0589..=0x058A | 0x05BE | 0x05C0 | 0x05C3 | 0x05C6 |
        0x05F3..=0x05F4 | 0x0609..=0x060D | 0x061B | 0x061D..=0x061F |
        0x066A..=0x066D | 0x06D4 | 0x0964..=0x0965 | 0x0970 | 0x0E4F | 0x0E5A..=0x0E5B |
        // General punctuation, currency, letterlike, arrows, math, technical
        0x2010..=0x2027 | 0x2030..=0x205E | 0x207A..=0x207E | 0x208A..=0x208E |
        0x20A0..=0x20C0 | 0x2100..=0x2101 | 0x2103..=0x2106 | 0x2108..=0x2109 |
        0x2114 | 0x2116..=0x2118 | 0x211E..=0x2123 | 0x2125 | 0x2127 | 0x2129 |
        0x212E | 0x213A..=0x213B | 0x2140..=0x2144 | 0x214A..=0x214D | 0x214F |
        0x218A..=0x218B | 0x2190..=0x2426 | 0x2440..=0x244A | 0x249C..=0x24E9 |
        0x2500..=0x2775 | 0x2794..=0x2B73 | 0x2B76..=0x2B95 | 0x2B97..=0x2BFF |
        0x2CE5..=0x2CEA | 0x2CF9..=0x2CFC | 0x2CFE..=0x2CFF | 0x2E00..=0x2E2E |
        0x2E30..=0x2E5D | 0x2E80..=0x2FFB |
        // CJK symbols and punctuation, fullwidth forms
        0x3001..=0x3004 | 0x3008..=0x3020 | 0x3030 | 0x3036..=0x3037 | 0x303D..=0x303F |
        0x309B..=0x309C | 0x30A0 | 0x30FB | 0xFE10..=0xFE19 | 0xFE30..=0xFE52 |
        0xFE54..=0xFE66 | 0xFE68..=0xFE6B | 0xFF01..=0xFF0F | 0xFF1A..=0xFF20 |
        0xFF3B..=0xFF40 | 0xFF5B..=0xFF65 | 0xFFE0..=0xFFE6 | 0xFFE8..=0xFFEE |
        // Emoji and pictographs
        0x1F000..=0x1FAFF
    )
}

/// Unicode whitespace for the flanking rules; line ends count as whitespace.
pub fn is_whitespace(c: char) -> bool {
    c.is_whitespace()
}

/// CJK ideographs, kana, hangul and fullwidth forms.
pub fn is_cjk(c: char) -> bool {
    let code = c as u32;
    matches!(code,
        0x1100..=0x11FF | 0x2E80..=0x2FDF | 0x3000..=0x303F | 0x3040..=0x30FF |
        0x3100..=0x312F | 0x3130..=0x318F | 0x31A0..=0x31FF | 0x3200..=0x4DBF |
        0x4E00..=0x9FFF | 0xA960..=0xA97F | 0xAC00..=0xD7FF | 0xF900..=0xFAFF |
        0xFE30..=0xFE4F | 0xFF00..=0xFFEF | 0x20000..=0x3FFFF
    )
}

/// The character ending at byte `pos` of `s` (exclusive), if any.
pub fn char_before(s: &str, pos: usize) -> Option<char> {
    s.get(..pos)?.chars().next_back()
}

/// The character starting at byte `pos` of `s`, if any.
pub fn char_at(s: &str, pos: usize) -> Option<char> {
    s.get(pos..)?.chars().next()
}
