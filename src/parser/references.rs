//! Link reference definitions and footnote resolution.

use std::collections::HashMap;

use unicode_casefold::UnicodeCaseFold;

use crate::ast::{Ast, NodeId, NodeValue};
use crate::parser::entity::unescape;
use crate::parser::inlines::{clean_url, link_destination, link_label, link_title, spnl};

/// Longest accepted reference label, in bytes.
const MAX_LABEL_LENGTH: usize = 999;

/// A resolved link reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub url: String,
    pub title: String,
}

/// Reference definitions keyed by normalized label. The first definition
/// of a label wins.
#[derive(Debug, Default)]
pub struct RefMap {
    map: HashMap<String, Reference>,
}

impl RefMap {
    pub fn insert(&mut self, label: &str, reference: Reference) {
        let key = normalize_label(label);
        if key.is_empty() {
            return;
        }
        self.map.entry(key).or_insert(reference);
    }

    pub fn get(&self, normalized: &str) -> Option<&Reference> {
        self.map.get(normalized)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}

/// Case-fold a label and collapse internal whitespace.
pub fn normalize_label(label: &str) -> String {
    let collapsed = label.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().case_fold().collect()
}

/// A reference definition parsed off the front of a paragraph.
#[derive(Debug, PartialEq, Eq)]
pub struct Definition<'a> {
    /// Bytes consumed, including the final line ending.
    pub consumed: usize,
    pub label: &'a str,
    pub reference: Reference,
}

/// Parse one `[label]: destination "title"` definition at the start of `input`.
pub fn parse_definition(input: &str) -> Option<Definition<'_>> {
    let bytes = input.as_bytes();
    let (label, mut pos) = link_label(input, 0)?;
    if label.is_empty() || label.len() > MAX_LABEL_LENGTH {
        return None;
    }
    if bytes.get(pos) != Some(&b':') {
        return None;
    }
    pos = spnl(bytes, pos + 1);

    let (dest, dest_end) = link_destination(input, pos)?;
    if dest_end == pos {
        return None;
    }
    let url = clean_url(dest);

    let before_title = dest_end;
    pos = spnl(bytes, before_title);
    let mut title = None;
    if pos != before_title
        && let Some((raw, end)) = link_title(input, pos)
    {
        title = Some(raw);
        pos = end;
    }
    if title.is_none() {
        pos = before_title;
    }

    // The rest of the line must be blank; a title followed by garbage is
    // dropped in favor of a definition without one.
    let mut end = skip_spaces(bytes, pos);
    if !at_line_end(bytes, end) {
        if title.is_none() {
            return None;
        }
        title = None;
        end = skip_spaces(bytes, before_title);
        if !at_line_end(bytes, end) {
            return None;
        }
    }
    if end < bytes.len() {
        end += 1;
    }

    Some(Definition {
        consumed: end,
        label,
        reference: Reference {
            url,
            title: title.map(unescape).unwrap_or_default(),
        },
    })
}

fn skip_spaces(bytes: &[u8], mut i: usize) -> usize {
    while matches!(bytes.get(i), Some(b' ' | b'\t')) {
        i += 1;
    }
    i
}

fn at_line_end(bytes: &[u8], i: usize) -> bool {
    matches!(bytes.get(i), None | Some(b'\n' | b'\r'))
}

/// Number footnotes by first reference, link references to definitions and
/// move referenced definitions to the end of the document. References to
/// missing definitions are kept as their source text. Unless
/// `leave_in_place` is set, unreferenced definitions are dropped.
pub fn process_footnotes(ast: &mut Ast, root: NodeId, leave_in_place: bool) {
    let mut definitions: HashMap<String, NodeId> = HashMap::new();
    let defs: Vec<NodeId> = ast
        .descendants(root)
        .filter(|&id| matches!(ast[id].value, NodeValue::FootnoteDefinition(_)))
        .collect();
    for id in defs {
        if let NodeValue::FootnoteDefinition(def) = &ast[id].value {
            definitions.entry(normalize_label(&def.name)).or_insert(id);
        }
        if !leave_in_place {
            ast.detach(id);
        }
    }

    let mut ordered: Vec<NodeId> = Vec::new();
    let mut ix_of: HashMap<NodeId, u32> = HashMap::new();
    number_references(ast, root, &definitions, &mut ordered, &mut ix_of);
    if !leave_in_place {
        // References inside definitions can pull in further definitions.
        let mut i = 0;
        while i < ordered.len() {
            let def = ordered[i];
            number_references(ast, def, &definitions, &mut ordered, &mut ix_of);
            i += 1;
        }
        for def in &ordered {
            ast.append(root, *def);
        }
    }
    tracing::debug!(
        definitions = definitions.len(),
        referenced = ordered.len(),
        "resolved footnotes"
    );
}

fn number_references(
    ast: &mut Ast,
    scope: NodeId,
    definitions: &HashMap<String, NodeId>,
    ordered: &mut Vec<NodeId>,
    ix_of: &mut HashMap<NodeId, u32>,
) {
    let refs: Vec<NodeId> = ast
        .descendants(scope)
        .filter(|&id| matches!(ast[id].value, NodeValue::FootnoteReference(_)))
        .collect();
    for id in refs {
        let NodeValue::FootnoteReference(reference) = &ast[id].value else {
            continue;
        };
        let name = reference.name.clone();
        let Some(&def) = definitions.get(&normalize_label(&name)) else {
            ast[id].value = NodeValue::EscapedTag(format!("[^{name}]"));
            continue;
        };
        let next_ix = ordered.len() as u32 + 1;
        let ix = *ix_of.entry(def).or_insert_with(|| {
            ordered.push(def);
            next_ix
        });
        let (def_name, ref_num) = match &mut ast[def].value {
            NodeValue::FootnoteDefinition(d) => {
                d.total_references += 1;
                (d.name.clone(), d.total_references)
            }
            _ => continue,
        };
        if let NodeValue::FootnoteReference(r) = &mut ast[id].value {
            r.name = def_name;
            r.ix = ix;
            r.ref_num = ref_num;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{NodeFootnoteDefinition, NodeFootnoteReference, Sourcepos};

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  Foo\n  BAR "), "foo bar");
        assert_eq!(normalize_label("ẞ"), "ss");
        assert_eq!(normalize_label("Толпой"), "толпой");
    }

    #[test]
    fn test_parse_definition() {
        let def = parse_definition("[Foo bar]: /url \"title\"\nrest").unwrap();
        assert_eq!(def.label, "Foo bar");
        assert_eq!(def.consumed, 24);
        assert_eq!(def.reference.url, "/url");
        assert_eq!(def.reference.title, "title");
    }

    #[test]
    fn test_parse_definition_multiline_title() {
        let def = parse_definition("[foo]:\n<my url>\n'the\ntitle'\n").unwrap();
        assert_eq!(def.reference.url, "my url");
        assert_eq!(def.reference.title, "the\ntitle");
    }

    #[test]
    fn test_parse_definition_rejects_garbage() {
        assert!(parse_definition("[foo]: /url \"title\" ok\n").is_none());
        assert!(parse_definition("[foo]:\n").is_none());
        assert!(parse_definition("[]: /url\n").is_none());
        assert!(parse_definition("[foo] /url\n").is_none());
    }

    #[test]
    fn test_title_on_next_line_may_fail_alone() {
        let def = parse_definition("[foo]: /url\n\"title\" ok\n").unwrap();
        assert_eq!(def.consumed, 12);
        assert_eq!(def.reference.title, "");
    }

    #[test]
    fn test_refmap_first_definition_wins() {
        let mut map = RefMap::default();
        let r = |url: &str| Reference {
            url: url.to_string(),
            title: String::new(),
        };
        map.insert("Foo", r("/first"));
        map.insert("FOO", r("/second"));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("foo").map(|r| r.url.as_str()), Some("/first"));
    }

    #[test]
    fn test_process_footnotes_numbers_and_drops() {
        let mut ast = Ast::default();
        let sp = Sourcepos::default();
        let root = ast.alloc(NodeValue::Document, sp);
        let para = ast.alloc(NodeValue::Paragraph, sp);
        ast.append(root, para);
        for name in ["b", "missing", "b"] {
            let r = ast.alloc(
                NodeValue::FootnoteReference(NodeFootnoteReference {
                    name: name.to_string(),
                    ref_num: 0,
                    ix: 0,
                }),
                sp,
            );
            ast.append(para, r);
        }
        for name in ["a", "b"] {
            let d = ast.alloc(
                NodeValue::FootnoteDefinition(NodeFootnoteDefinition {
                    name: name.to_string(),
                    total_references: 0,
                }),
                sp,
            );
            ast.append(root, d);
        }

        process_footnotes(&mut ast, root, false);

        let top: Vec<NodeId> = ast.children(root).collect();
        assert_eq!(top.len(), 2);
        match &ast[top[1]].value {
            NodeValue::FootnoteDefinition(d) => {
                assert_eq!(d.name, "b");
                assert_eq!(d.total_references, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        let inline: Vec<NodeValue> = ast.children(para).map(|id| ast[id].value.clone()).collect();
        assert!(matches!(&inline[0], NodeValue::FootnoteReference(r) if r.ix == 1 && r.ref_num == 1));
        assert_eq!(inline[1], NodeValue::EscapedTag("[^missing]".to_string()));
        assert!(matches!(&inline[2], NodeValue::FootnoteReference(r) if r.ix == 1 && r.ref_num == 2));
    }
}
