//! Entity references and backslash escapes.

use crate::scanner::is_ascii_punctuation;

/// Named references that expand to two code points.
const TWO_CODE_POINTS: &[(&str, &str)] = &[
    ("acE", "\u{223e}\u{333}"),
    ("bne", "\u{3d}\u{20e5}"),
    ("bnequiv", "\u{2261}\u{20e5}"),
    ("caps", "\u{2229}\u{fe00}"),
    ("cups", "\u{222a}\u{fe00}"),
    ("fjlig", "\u{66}\u{6a}"),
    ("gesl", "\u{22db}\u{fe00}"),
    ("gvertneqq", "\u{2269}\u{fe00}"),
    ("gvnE", "\u{2269}\u{fe00}"),
    ("lates", "\u{2aad}\u{fe00}"),
    ("lesg", "\u{22da}\u{fe00}"),
    ("lvertneqq", "\u{2268}\u{fe00}"),
    ("lvnE", "\u{2268}\u{fe00}"),
    ("nang", "\u{2220}\u{20d2}"),
    ("napE", "\u{2a70}\u{338}"),
    ("napid", "\u{224b}\u{338}"),
    ("nbump", "\u{224e}\u{338}"),
    ("nbumpe", "\u{224f}\u{338}"),
    ("ncongdot", "\u{2a6d}\u{338}"),
    ("nedot", "\u{2250}\u{338}"),
    ("nesim", "\u{2242}\u{338}"),
    ("ngE", "\u{2267}\u{338}"),
    ("ngeqq", "\u{2267}\u{338}"),
    ("ngeqslant", "\u{2a7e}\u{338}"),
    ("nges", "\u{2a7e}\u{338}"),
    ("nGg", "\u{22d9}\u{338}"),
    ("nGt", "\u{226b}\u{20d2}"),
    ("nGtv", "\u{226b}\u{338}"),
    ("nlE", "\u{2266}\u{338}"),
    ("nleqq", "\u{2266}\u{338}"),
    ("nleqslant", "\u{2a7d}\u{338}"),
    ("nles", "\u{2a7d}\u{338}"),
    ("nLl", "\u{22d8}\u{338}"),
    ("nLt", "\u{226a}\u{20d2}"),
    ("nLtv", "\u{226a}\u{338}"),
    ("NotEqualTilde", "\u{2242}\u{338}"),
    ("NotGreaterFullEqual", "\u{2267}\u{338}"),
    ("NotGreaterGreater", "\u{226b}\u{338}"),
    ("NotGreaterSlantEqual", "\u{2a7e}\u{338}"),
    ("NotHumpDownHump", "\u{224e}\u{338}"),
    ("NotHumpEqual", "\u{224f}\u{338}"),
    ("notindot", "\u{22f5}\u{338}"),
    ("notinE", "\u{22f9}\u{338}"),
    ("NotLeftTriangleBar", "\u{29cf}\u{338}"),
    ("NotLessLess", "\u{226a}\u{338}"),
    ("NotLessSlantEqual", "\u{2a7d}\u{338}"),
    ("NotNestedGreaterGreater", "\u{2aa2}\u{338}"),
    ("NotNestedLessLess", "\u{2aa1}\u{338}"),
    ("NotPrecedesEqual", "\u{2aaf}\u{338}"),
    ("NotRightTriangleBar", "\u{29d0}\u{338}"),
    ("NotSquareSubset", "\u{228f}\u{338}"),
    ("NotSquareSuperset", "\u{2290}\u{338}"),
    ("NotSubset", "\u{2282}\u{20d2}"),
    ("NotSucceedsEqual", "\u{2ab0}\u{338}"),
    ("NotSucceedsTilde", "\u{227f}\u{338}"),
    ("NotSuperset", "\u{2283}\u{20d2}"),
    ("nparsl", "\u{2afd}\u{20e5}"),
    ("npart", "\u{2202}\u{338}"),
    ("npre", "\u{2aaf}\u{338}"),
    ("npreceq", "\u{2aaf}\u{338}"),
    ("nrarrc", "\u{2933}\u{338}"),
    ("nrarrw", "\u{219d}\u{338}"),
    ("nsce", "\u{2ab0}\u{338}"),
    ("nsubE", "\u{2ac5}\u{338}"),
    ("nsubset", "\u{2282}\u{20d2}"),
    ("nsubseteqq", "\u{2ac5}\u{338}"),
    ("nsucceq", "\u{2ab0}\u{338}"),
    ("nsupE", "\u{2ac6}\u{338}"),
    ("nsupset", "\u{2283}\u{20d2}"),
    ("nsupseteqq", "\u{2ac6}\u{338}"),
    ("nvap", "\u{224d}\u{20d2}"),
    ("nvge", "\u{2265}\u{20d2}"),
    ("nvgt", "\u{3e}\u{20d2}"),
    ("nvle", "\u{2264}\u{20d2}"),
    ("nvlt", "\u{3c}\u{20d2}"),
    ("nvltrie", "\u{22b4}\u{20d2}"),
    ("nvrtrie", "\u{22b5}\u{20d2}"),
    ("nvsim", "\u{223c}\u{20d2}"),
    ("race", "\u{223d}\u{331}"),
    ("smtes", "\u{2aac}\u{fe00}"),
    ("sqcaps", "\u{2293}\u{fe00}"),
    ("sqcups", "\u{2294}\u{fe00}"),
    ("ThickSpace", "\u{205f}\u{200a}"),
    ("varsubsetneq", "\u{228a}\u{fe00}"),
    ("varsubsetneqq", "\u{2acb}\u{fe00}"),
    ("varsupsetneq", "\u{228b}\u{fe00}"),
    ("varsupsetneqq", "\u{2acc}\u{fe00}"),
    ("vnsub", "\u{2282}\u{20d2}"),
    ("vnsup", "\u{2283}\u{20d2}"),
    ("vsubne", "\u{228a}\u{fe00}"),
    ("vsubnE", "\u{2acb}\u{fe00}"),
    ("vsupne", "\u{228b}\u{fe00}"),
    ("vsupnE", "\u{2acc}\u{fe00}"),
];

/// Decode the entity or numeric character reference starting at `&` in
/// `input[start]`. Returns the decoded text and the byte position after `;`.
pub fn decode_entity(input: &[u8], start: usize) -> Option<(String, usize)> {
    if input.get(start) != Some(&b'&') {
        return None;
    }
    let mut i = start + 1;

    if input.get(i) == Some(&b'#') {
        i += 1;
        let hex = matches!(input.get(i), Some(b'x' | b'X'));
        if hex {
            i += 1;
        }
        let digits_start = i;
        let max_digits = if hex { 6 } else { 7 };
        while i < input.len()
            && i - digits_start < max_digits
            && (if hex {
                input[i].is_ascii_hexdigit()
            } else {
                input[i].is_ascii_digit()
            })
        {
            i += 1;
        }
        if i == digits_start || input.get(i) != Some(&b';') {
            return None;
        }
        let digits = std::str::from_utf8(&input[digits_start..i]).ok()?;
        let code = u32::from_str_radix(digits, if hex { 16 } else { 10 }).ok()?;
        // NUL and invalid code points become the replacement character
        let ch = match code {
            0 => '\u{fffd}',
            c => char::from_u32(c).unwrap_or('\u{fffd}'),
        };
        return Some((ch.to_string(), i + 1));
    }

    let name_start = i;
    while i < input.len() && i - name_start < 32 && input[i].is_ascii_alphanumeric() {
        i += 1;
    }
    if i == name_start || input.get(i) != Some(&b';') {
        return None;
    }
    let name = std::str::from_utf8(&input[name_start..i]).ok()?;
    if let Some((_, decoded)) = TWO_CODE_POINTS.iter().find(|(n, _)| *n == name) {
        return Some((decoded.to_string(), i + 1));
    }
    let reference = std::str::from_utf8(&input[start..=i]).ok()?;
    let decoded = html_escape::decode_html_entities(reference);
    // Every named reference expands to one or two code points; anything
    // longer is a legacy prefix match such as `&not` in `&notanentity;`.
    if decoded == reference || decoded.chars().count() > 2 {
        None
    } else {
        Some((decoded.into_owned(), i + 1))
    }
}

/// Resolve backslash escapes and entity references, as done for link
/// destinations, titles and info strings.
pub fn unescape(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut result = String::with_capacity(text.len());
    let mut i = 0;
    let mut run_start = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' if i + 1 < bytes.len() && is_ascii_punctuation(bytes[i + 1] as char) => {
                result.push_str(&text[run_start..i]);
                result.push(bytes[i + 1] as char);
                i += 2;
                run_start = i;
            }
            b'&' => match decode_entity(bytes, i) {
                Some((decoded, next)) => {
                    result.push_str(&text[run_start..i]);
                    result.push_str(&decoded);
                    i = next;
                    run_start = i;
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }
    result.push_str(&text[run_start..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_entities() {
        assert_eq!(decode_entity(b"&amp;", 0), Some(("&".to_string(), 5)));
        assert_eq!(
            decode_entity(b"&ClockwiseContourIntegral;", 0).map(|(s, _)| s),
            Some("\u{2232}".to_string())
        );
        assert_eq!(decode_entity(b"&nosuchentity;", 0), None);
        assert_eq!(decode_entity(b"&ngE;", 0), Some(("\u{2267}\u{338}".to_string(), 5)));
        assert_eq!(
            decode_entity(b"&ThickSpace;", 0).map(|(s, _)| s),
            Some("\u{205f}\u{200a}".to_string())
        );
        assert_eq!(decode_entity(b"&amp", 0), None);
    }

    #[test]
    fn test_numeric_entities() {
        assert_eq!(decode_entity(b"&#35;", 0), Some(("#".to_string(), 5)));
        assert_eq!(decode_entity(b"&#X22;", 0), Some(("\"".to_string(), 6)));
        assert_eq!(decode_entity(b"&#0;", 0), Some(("\u{fffd}".to_string(), 4)));
        assert_eq!(decode_entity(b"&#87654321;", 0), None);
        assert_eq!(decode_entity(b"&#xD800;", 0).map(|(s, _)| s), Some("\u{fffd}".to_string()));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"foo\*bar"), "foo*bar");
        assert_eq!(unescape(r"a\b"), r"a\b");
        assert_eq!(unescape("f&ouml;&ouml;"), "föö");
        assert_eq!(unescape("&#x20;x"), " x");
    }
}
