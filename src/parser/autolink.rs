//! Extended autolinks: `www.` domains, URLs and email addresses found in
//! plain text.

/// A link recognized in a run of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Autolink {
    /// Byte range of the link text.
    pub start: usize,
    pub end: usize,
    /// Destination, with `http://` or `mailto:` added where needed.
    pub url: String,
}

const SCHEMES: &[&str] = &["http", "https", "ftp"];

/// Find the first autolink in `text`.
pub fn find_autolink(text: &str, relaxed: bool) -> Option<Autolink> {
    let bytes = text.as_bytes();
    for i in 0..bytes.len() {
        let found = match bytes[i] {
            b'w' | b'W' => www_match(text, i, relaxed),
            b':' => url_match(text, i, relaxed),
            b'@' => email_match(text, i),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

fn valid_boundary(bytes: &[u8], start: usize, relaxed: bool) -> bool {
    if start == 0 {
        return true;
    }
    let c = bytes[start - 1];
    c.is_ascii_whitespace()
        || matches!(c, b'*' | b'_' | b'~' | b'(')
        || (relaxed && matches!(c, b'[' | b'{' | b'"' | b'\''))
}

/// Length of a valid domain at the start of `s`: dot-separated labels of
/// alphanumerics, `-` and `_`, with no `_` in the last two labels.
fn domain_len(s: &[u8], need_dot: bool) -> Option<usize> {
    let mut i = 0;
    let mut labels: Vec<(usize, usize)> = Vec::new();
    let mut label_start = 0;
    while i < s.len() {
        let c = s[i];
        if c == b'.' {
            if i == label_start {
                break;
            }
            labels.push((label_start, i));
            label_start = i + 1;
        } else if !(c.is_ascii_alphanumeric() || c == b'-' || c == b'_' || c >= 0x80) {
            break;
        }
        i += 1;
    }
    if i > label_start {
        labels.push((label_start, i));
    } else if label_start > 0 {
        // Trailing dot belongs to the surrounding text.
        i = label_start - 1;
    }
    if labels.is_empty() || (need_dot && labels.len() < 2) {
        return None;
    }
    let has_underscore = labels
        .iter()
        .rev()
        .take(2)
        .any(|&(a, b)| s[a..b].contains(&b'_'));
    if has_underscore {
        return None;
    }
    Some(i)
}

/// Extend a link over its path and drop trailing punctuation that belongs
/// to the sentence. The link never shrinks below `min_end`.
fn link_end(text: &str, start: usize, domain_end: usize, min_end: usize, relaxed: bool) -> usize {
    let bytes = text.as_bytes();
    let mut end = domain_end;
    while end < bytes.len() && !bytes[end].is_ascii_whitespace() && bytes[end] != b'<' {
        end += 1;
    }

    loop {
        if end <= min_end {
            return min_end;
        }
        let last = bytes[end - 1];
        match last {
            b'?' | b'!' | b'.' | b',' | b':' | b'*' | b'_' | b'~' | b'\'' | b'"' => end -= 1,
            b')' => {
                let link = &bytes[start..end];
                let opens = link.iter().filter(|&&b| b == b'(').count();
                let closes = link.iter().filter(|&&b| b == b')').count();
                if closes > opens {
                    end -= 1;
                } else {
                    return end;
                }
            }
            b']' if relaxed => {
                let link = &bytes[start..end];
                let opens = link.iter().filter(|&&b| b == b'[').count();
                let closes = link.iter().filter(|&&b| b == b']').count();
                if closes > opens {
                    end -= 1;
                } else {
                    return end;
                }
            }
            b';' => {
                // Entity-like tails such as `&amp;` are not part of the link.
                let mut j = end - 1;
                while j > min_end && bytes[j - 1].is_ascii_alphanumeric() {
                    j -= 1;
                }
                if j > min_end && j < end - 1 && bytes[j - 1] == b'&' {
                    end = j - 1;
                } else {
                    return end;
                }
            }
            _ => return end,
        }
    }
}

fn www_match(text: &str, start: usize, relaxed: bool) -> Option<Autolink> {
    let bytes = text.as_bytes();
    if !bytes[start..].starts_with(b"www.") || !valid_boundary(bytes, start, relaxed) {
        return None;
    }
    let domain = domain_len(&bytes[start..], true)?;
    let end = link_end(text, start, start + domain, start + domain, relaxed);
    Some(Autolink {
        start,
        end,
        url: format!("http://{}", &text[start..end]),
    })
}

fn url_match(text: &str, colon: usize, relaxed: bool) -> Option<Autolink> {
    let bytes = text.as_bytes();
    if !bytes[colon + 1..].starts_with(b"//") {
        return None;
    }
    let mut start = colon;
    while start > 0 && bytes[start - 1].is_ascii_alphabetic() {
        start -= 1;
    }
    if relaxed {
        while start > 0
            && (bytes[start - 1].is_ascii_alphanumeric() || matches!(bytes[start - 1], b'+' | b'.' | b'-'))
        {
            start -= 1;
        }
        while start < colon && !bytes[start].is_ascii_alphabetic() {
            start += 1;
        }
    }
    let scheme = &text[start..colon];
    if scheme.is_empty() {
        return None;
    }
    if !relaxed && !SCHEMES.iter().any(|s| s.eq_ignore_ascii_case(scheme)) {
        return None;
    }
    if !valid_boundary(bytes, start, relaxed) {
        return None;
    }
    let host = colon + 3;
    let (domain_end, min_end) = if relaxed {
        let len = bytes[host..]
            .iter()
            .take_while(|&&b| !b.is_ascii_whitespace() && !matches!(b, b'<' | b'/' | b')' | b']'))
            .count();
        if len == 0 {
            return None;
        }
        (host + len, host + 1)
    } else {
        let domain_end = host + domain_len(&bytes[host..], false)?;
        (domain_end, domain_end)
    };
    let end = link_end(text, start, domain_end, min_end, relaxed);
    Some(Autolink {
        start,
        end,
        url: text[start..end].to_string(),
    })
}

fn email_match(text: &str, at: usize) -> Option<Autolink> {
    let bytes = text.as_bytes();
    let is_local = |b: u8| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'+' | b'-' | b'_');
    let mut start = at;
    while start > 0 && is_local(bytes[start - 1]) {
        start -= 1;
    }
    if start == at {
        return None;
    }
    let mut end = at + 1;
    let mut dots = 0;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || matches!(bytes[end], b'-' | b'_' | b'.')) {
        if bytes[end] == b'.' {
            if end + 1 >= bytes.len() || !bytes[end + 1].is_ascii_alphanumeric() {
                break;
            }
            dots += 1;
        }
        end += 1;
    }
    if dots == 0 || end == at + 1 || matches!(bytes[end - 1], b'-' | b'_') {
        return None;
    }
    Some(Autolink {
        start,
        end,
        url: format!("mailto:{}", &text[start..end]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(text: &str) -> Option<(String, String)> {
        find_autolink(text, false).map(|l| (text[l.start..l.end].to_string(), l.url))
    }

    #[test]
    fn test_www_link_drops_trailing_period() {
        assert_eq!(
            link("Hello www.github.com."),
            Some(("www.github.com".to_string(), "http://www.github.com".to_string()))
        );
    }

    #[test]
    fn test_url_with_path_and_parens() {
        assert_eq!(
            link("see https://example.com/a_(b)) now").map(|l| l.0),
            Some("https://example.com/a_(b)".to_string())
        );
    }

    #[test]
    fn test_entity_tail_excluded() {
        assert_eq!(
            link("www.google.com/search?q=commonmark&hl;").map(|l| l.0),
            Some("www.google.com/search?q=commonmark".to_string())
        );
    }

    #[test]
    fn test_underscore_in_last_labels_rejected() {
        assert_eq!(link("www.xxx.yyy._zzz"), None);
        assert!(link("www.xx_x.yyy.zzz").is_some());
    }

    #[test]
    fn test_email() {
        assert_eq!(
            link("mail foo@bar.baz."),
            Some(("foo@bar.baz".to_string(), "mailto:foo@bar.baz".to_string()))
        );
        assert_eq!(link("a.b-c_d@a.b-"), None);
        assert_eq!(link("foo@bar"), None);
    }

    #[test]
    fn test_scheme_allow_list_unless_relaxed() {
        assert_eq!(link("irc://example.org/x"), None);
        let relaxed = find_autolink("irc://example.org/x", true).map(|l| l.url);
        assert_eq!(relaxed.as_deref(), Some("irc://example.org/x"));
    }

    #[test]
    fn test_relaxed_trims_brackets_and_punctuation() {
        let relaxed = |text: &str| find_autolink(text, true).map(|l| l.url);
        assert_eq!(relaxed("[https://a.com]").as_deref(), Some("https://a.com"));
        assert_eq!(relaxed("See https://a.com.").as_deref(), Some("https://a.com"));
        assert_eq!(relaxed("(https://a.com)").as_deref(), Some("https://a.com"));
        assert_eq!(relaxed("[https://a.com/x]").as_deref(), Some("https://a.com/x"));
        assert_eq!(relaxed("git+ssh://host.org, then").as_deref(), Some("git+ssh://host.org"));
    }

    #[test]
    fn test_requires_word_boundary() {
        assert_eq!(link("xwww.example.com"), None);
        assert!(link("(www.example.com)").is_some());
    }
}
