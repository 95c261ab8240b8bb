//! Document structure read with `lopdf`: page tree, outline and the named
//! destination tables. Everything is extracted once at load time into plain
//! data so lookups afterwards never touch the parser.

use std::collections::{HashMap, HashSet};

use lopdf::{Dictionary, Document, Object, ObjectId};
use pdfchapters_core::{DestinationParam, DestinationRef, ExplicitDestination, ObjectRef, OutlineNode};
use tracing::{debug, warn};

/// Deeper outlines than this are cut off.
const MAX_OUTLINE_DEPTH: usize = 64;
/// Upper bound on outline items visited, guards against malformed /Next chains.
const MAX_OUTLINE_ITEMS: usize = 10_000;
const MAX_NAME_TREE_DEPTH: usize = 32;
/// Destination dictionaries followed through `/D` before giving up.
const MAX_DESTINATION_DEPTH: usize = 8;

#[derive(Debug, Default)]
pub(crate) struct Structure {
    pub page_count: usize,
    pub pages: HashMap<ObjectRef, usize>,
    pub outline: Option<Vec<OutlineNode>>,
    pub named: HashMap<String, ExplicitDestination>,
}

pub(crate) fn read_structure(doc: &Document) -> Structure {
    let pages: HashMap<ObjectRef, usize> = doc
        .get_pages()
        .into_iter()
        .map(|(number, id)| (object_ref(id), number.saturating_sub(1) as usize))
        .collect();

    let Some(catalog) = catalog(doc) else {
        warn!("document has no readable catalog");
        return Structure {
            page_count: pages.len(),
            pages,
            ..Structure::default()
        };
    };

    let mut named = HashMap::new();
    collect_legacy_dests(doc, catalog, &mut named);
    if let Some(tree) = catalog
        .get(b"Names")
        .ok()
        .and_then(|names| resolve(doc, names).as_dict().ok())
        .and_then(|names| names.get(b"Dests").ok())
        .and_then(|dests| resolve(doc, dests).as_dict().ok())
    {
        let mut visited = HashSet::new();
        collect_name_tree(doc, tree, 0, &mut visited, &mut named);
    }

    let outline = read_outline(doc, catalog);
    debug!(
        pages = pages.len(),
        named = named.len(),
        outline = outline.as_ref().map(Vec::len),
        "read document structure"
    );

    Structure {
        page_count: pages.len(),
        pages,
        outline,
        named,
    }
}

fn catalog(doc: &Document) -> Option<&Dictionary> {
    let root = doc.trailer.get(b"Root").ok()?;
    resolve(doc, root).as_dict().ok()
}

fn read_outline(doc: &Document, catalog: &Dictionary) -> Option<Vec<OutlineNode>> {
    let outlines = catalog.get(b"Outlines").ok()?;
    let outlines = resolve(doc, outlines).as_dict().ok()?;
    let mut walker = OutlineWalker {
        doc,
        visited: HashSet::new(),
    };
    Some(match outlines.get(b"First") {
        Ok(Object::Reference(first)) => walker.siblings(*first, 0),
        _ => Vec::new(),
    })
}

struct OutlineWalker<'a> {
    doc: &'a Document,
    visited: HashSet<ObjectId>,
}

impl OutlineWalker<'_> {
    fn siblings(&mut self, first: ObjectId, depth: usize) -> Vec<OutlineNode> {
        let mut nodes = Vec::new();
        if depth >= MAX_OUTLINE_DEPTH {
            warn!(depth, "outline nested too deeply; ignoring deeper levels");
            return nodes;
        }

        let mut current = Some(first);
        while let Some(id) = current {
            if self.visited.len() >= MAX_OUTLINE_ITEMS || !self.visited.insert(id) {
                warn!(?id, "outline item revisited or limit reached; stopping walk");
                break;
            }
            let Some(item) = self.doc.get_object(id).ok().and_then(|o| o.as_dict().ok()) else {
                break;
            };

            let title = item
                .get(b"Title")
                .ok()
                .and_then(|title| text_string(resolve(self.doc, title)))
                .unwrap_or_default();
            let children = match item.get(b"First") {
                Ok(Object::Reference(child)) => self.siblings(*child, depth + 1),
                _ => Vec::new(),
            };
            nodes.push(OutlineNode {
                title,
                destination: item_destination(self.doc, item),
                children,
            });

            current = match item.get(b"Next") {
                Ok(Object::Reference(next)) => Some(*next),
                _ => None,
            };
        }
        nodes
    }
}

/// `/Dest` of an outline item, or the `/D` of its `/GoTo` action.
fn item_destination(doc: &Document, item: &Dictionary) -> Option<DestinationRef> {
    if let Ok(dest) = item.get(b"Dest") {
        return parse_destination(doc, dest);
    }
    let action = resolve(doc, item.get(b"A").ok()?).as_dict().ok()?;
    match action.get(b"S") {
        Ok(Object::Name(kind)) if kind.as_slice() == b"GoTo" => {
            parse_destination(doc, action.get(b"D").ok()?)
        }
        _ => None,
    }
}

fn parse_destination(doc: &Document, object: &Object) -> Option<DestinationRef> {
    let mut current = resolve(doc, object);
    for _ in 0..MAX_DESTINATION_DEPTH {
        match current {
            Object::Array(items) => {
                return Some(DestinationRef::Explicit(explicit_destination(items)))
            }
            Object::String(..) => return text_string(current).map(DestinationRef::Named),
            Object::Name(name) => {
                return Some(DestinationRef::Named(
                    String::from_utf8_lossy(name).into_owned(),
                ))
            }
            Object::Dictionary(dict) => current = resolve(doc, dict.get(b"D").ok()?),
            _ => return None,
        }
    }
    warn!("destination dictionaries nested too deeply; treating as unresolved");
    None
}

fn explicit_destination(items: &[Object]) -> ExplicitDestination {
    let target = match items.first() {
        Some(Object::Reference(id)) => Some(object_ref(*id)),
        _ => None,
    };
    let params = items
        .iter()
        .skip(1)
        .map(|item| match item {
            Object::Name(name) => DestinationParam::Name(String::from_utf8_lossy(name).into_owned()),
            Object::Integer(value) => DestinationParam::Number(*value as f64),
            Object::Real(value) => DestinationParam::Number(f64::from(*value)),
            _ => DestinationParam::Null,
        })
        .collect();
    ExplicitDestination { target, params }
}

/// Resolves a table value (an array, or a dictionary carrying `/D`) to an
/// explicit destination.
fn table_destination(doc: &Document, value: &Object) -> Option<ExplicitDestination> {
    match parse_destination(doc, value)? {
        DestinationRef::Explicit(explicit) => Some(explicit),
        DestinationRef::Named(_) => None,
    }
}

/// PDF 1.1 style `/Dests` dictionary in the catalog.
fn collect_legacy_dests(
    doc: &Document,
    catalog: &Dictionary,
    named: &mut HashMap<String, ExplicitDestination>,
) {
    let Some(dests) = catalog
        .get(b"Dests")
        .ok()
        .and_then(|dests| resolve(doc, dests).as_dict().ok())
    else {
        return;
    };
    for (key, value) in dests.iter() {
        if let Some(explicit) = table_destination(doc, value) {
            named.insert(String::from_utf8_lossy(key).into_owned(), explicit);
        }
    }
}

/// `/Names → /Dests` name tree: leaves carry `/Names [key value ...]`,
/// intermediate nodes `/Kids`.
fn collect_name_tree(
    doc: &Document,
    node: &Dictionary,
    depth: usize,
    visited: &mut HashSet<ObjectId>,
    named: &mut HashMap<String, ExplicitDestination>,
) {
    if depth >= MAX_NAME_TREE_DEPTH {
        warn!(depth, "name tree nested too deeply");
        return;
    }

    if let Some(pairs) = node
        .get(b"Names")
        .ok()
        .and_then(|names| resolve(doc, names).as_array().ok())
    {
        for pair in pairs.chunks_exact(2) {
            let Some(key) = text_string(resolve(doc, &pair[0])) else {
                continue;
            };
            if let Some(explicit) = table_destination(doc, &pair[1]) {
                // First definition wins, matching lookup order in the tree.
                named.entry(key).or_insert(explicit);
            }
        }
    }

    if let Some(kids) = node
        .get(b"Kids")
        .ok()
        .and_then(|kids| resolve(doc, kids).as_array().ok())
    {
        for kid in kids {
            if let Object::Reference(id) = kid {
                if !visited.insert(*id) {
                    continue;
                }
            }
            if let Ok(child) = resolve(doc, kid).as_dict() {
                collect_name_tree(doc, child, depth + 1, visited, named);
            }
        }
    }
}

/// Follows one level of indirection; dangling references resolve to `Null`.
fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(&Object::Null),
        other => other,
    }
}

fn object_ref(id: ObjectId) -> ObjectRef {
    ObjectRef::new(id.0, id.1)
}

/// Decodes a PDF text string object (UTF-16BE, UTF-8 or PDFDocEncoding).
/// Strings lopdf rejects are decoded lossily as UTF-8.
fn text_string(object: &Object) -> Option<String> {
    let bytes = object.as_str().ok()?;
    let text = lopdf::decode_text_string(object)
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned());
    Some(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_owned(),
        None => text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_strings_are_decoded() {
        let decode = |bytes: &[u8]| text_string(&Object::string_literal(bytes.to_vec()));
        assert_eq!(decode(b"Chapter 1").as_deref(), Some("Chapter 1"));
        assert_eq!(
            decode(&[0xFE, 0xFF, 0x00, 0x4B, 0x00, 0xE9]).as_deref(),
            Some("Ké")
        );
        assert_eq!(decode(&[0xEF, 0xBB, 0xBF, b'o', b'k']).as_deref(), Some("ok"));
        assert_eq!(decode(&[0x43, 0x61, 0x66, 0xE9]).as_deref(), Some("Café"));
        assert_eq!(text_string(&Object::Integer(3)), None);
    }

    #[test]
    fn pdfdoc_punctuation_is_decoded() {
        let title = Object::string_literal(b"Part 1 \x84 Intro".to_vec());
        assert_eq!(text_string(&title).as_deref(), Some("Part 1 \u{2014} Intro"));
        let bullet = Object::string_literal(b"\x80 Notes".to_vec());
        assert_eq!(text_string(&bullet).as_deref(), Some("\u{2022} Notes"));
    }

    #[test]
    fn self_referencing_destination_dictionary_is_unresolved() {
        let mut doc = Document::with_version("1.5");
        let id = doc.new_object_id();
        doc.objects
            .insert(id, Object::Dictionary(lopdf::dictionary! { "D" => id }));
        assert_eq!(parse_destination(&doc, &Object::Reference(id)), None);
    }

    #[test]
    fn explicit_destination_keeps_view_parameters() {
        let items = vec![
            Object::Reference((12, 0)),
            Object::Name(b"XYZ".to_vec()),
            Object::Integer(0),
            Object::Real(792.0),
            Object::Null,
        ];
        let explicit = explicit_destination(&items);
        assert_eq!(explicit.target, Some(ObjectRef::new(12, 0)));
        assert_eq!(
            explicit.params,
            vec![
                DestinationParam::Name("XYZ".to_owned()),
                DestinationParam::Number(0.0),
                DestinationParam::Number(792.0),
                DestinationParam::Null,
            ]
        );
    }

    #[test]
    fn destination_without_leading_reference_has_no_target() {
        let items = vec![Object::Integer(3), Object::Name(b"Fit".to_vec())];
        assert_eq!(explicit_destination(&items).target, None);
        assert_eq!(explicit_destination(&[]).target, None);
    }
}
