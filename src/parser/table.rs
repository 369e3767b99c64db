//! GFM table rows.

use crate::ast::TableAlignment;
use crate::scanner::{is_line_end, is_space_or_tab};

/// One cell of a table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Trimmed content with `\|` unescaped.
    pub content: String,
    /// Byte offsets of the trimmed content within the line.
    pub start: usize,
    pub end: usize,
}

/// Split a row into cells. `start` is the first non-space byte of the line.
pub fn parse_row(line: &[u8], start: usize) -> Vec<Cell> {
    let end = line
        .iter()
        .position(|&b| is_line_end(b))
        .unwrap_or(line.len());
    let mut i = start;
    if line.get(i) == Some(&b'|') {
        i += 1;
    }

    let mut cells = Vec::new();
    let mut cell_start = i;
    let mut content: Vec<u8> = Vec::new();
    while i < end {
        match line[i] {
            b'\\' if line.get(i + 1) == Some(&b'|') => {
                content.push(b'|');
                i += 2;
            }
            b'\\' if i + 1 < end => {
                content.extend_from_slice(&line[i..i + 2]);
                i += 2;
            }
            b'|' => {
                cells.push(make_cell(&content, line, cell_start, i));
                content.clear();
                i += 1;
                cell_start = i;
            }
            b => {
                content.push(b);
                i += 1;
            }
        }
    }
    // A trailing pipe closes the last cell rather than opening a new one.
    if cell_start < end && !line[cell_start..end].iter().all(|&b| is_space_or_tab(b)) {
        cells.push(make_cell(&content, line, cell_start, end));
    } else if cells.is_empty() {
        cells.push(make_cell(&content, line, cell_start, end));
    }
    cells
}

fn make_cell(content: &[u8], line: &[u8], start: usize, end: usize) -> Cell {
    let text = String::from_utf8_lossy(content);
    let trimmed = text.trim_matches(|c| c == ' ' || c == '\t');
    let leading = line[start..end]
        .iter()
        .take_while(|&&b| is_space_or_tab(b))
        .count();
    let trailing = line[start..end]
        .iter()
        .rev()
        .take_while(|&&b| is_space_or_tab(b))
        .count();
    let cell_start = start + leading;
    Cell {
        content: trimmed.to_string(),
        start: cell_start,
        end: end.saturating_sub(trailing).max(cell_start),
    }
}

/// Parse a delimiter row such as `| :-- | :-: | --: |`.
pub fn parse_delimiter_row(line: &[u8], start: usize) -> Option<Vec<TableAlignment>> {
    let cells = parse_row(line, start);
    let has_pipe = line[start..].contains(&b'|');
    if cells.len() > 1 && !has_pipe {
        return None;
    }
    cells
        .iter()
        .map(|cell| {
            let marker = cell.content.as_bytes();
            let left = marker.first() == Some(&b':');
            let right = marker.len() > 1 && marker.last() == Some(&b':');
            let dashes = &marker[usize::from(left)..marker.len() - usize::from(right)];
            if dashes.is_empty() || !dashes.iter().all(|&b| b == b'-') {
                return None;
            }
            Some(match (left, right) {
                (true, true) => TableAlignment::Center,
                (true, false) => TableAlignment::Left,
                (false, true) => TableAlignment::Right,
                (false, false) => TableAlignment::None,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(cells: &[Cell]) -> Vec<&str> {
        cells.iter().map(|c| c.content.as_str()).collect()
    }

    #[test]
    fn test_parse_row_with_outer_pipes() {
        let cells = parse_row(b"| a | b |\n", 0);
        assert_eq!(contents(&cells), vec!["a", "b"]);
        assert_eq!(cells[0].start, 2);
        assert_eq!(cells[0].end, 3);
    }

    #[test]
    fn test_parse_row_without_outer_pipes() {
        assert_eq!(contents(&parse_row(b"a | b\n", 0)), vec!["a", "b"]);
        assert_eq!(contents(&parse_row(b"single\n", 0)), vec!["single"]);
    }

    #[test]
    fn test_parse_row_keeps_empty_cells() {
        assert_eq!(contents(&parse_row(b"| a |  | c |\n", 0)), vec!["a", "", "c"]);
    }

    #[test]
    fn test_parse_row_unescapes_pipes() {
        assert_eq!(contents(&parse_row(b"| `a\\|b` | c |\n", 0)), vec!["`a|b`", "c"]);
    }

    #[test]
    fn test_delimiter_row() {
        assert_eq!(
            parse_delimiter_row(b"| :-- | :-: | --: | --- |\n", 0),
            Some(vec![
                TableAlignment::Left,
                TableAlignment::Center,
                TableAlignment::Right,
                TableAlignment::None
            ])
        );
        assert_eq!(parse_delimiter_row(b"|---|---|\n", 0).map(|a| a.len()), Some(2));
        assert_eq!(parse_delimiter_row(b"| -x- |\n", 0), None);
        assert_eq!(parse_delimiter_row(b"| : |\n", 0), None);
    }
}
