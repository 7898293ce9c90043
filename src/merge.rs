//! Concatenates single-page PDF fragments into one document.

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::capture::PageFragment;
use crate::{HandbookError, Result};

/// Page attributes a page may inherit from its `Pages` ancestors.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic `Parent` chains in malformed input.
const MAX_PARENT_DEPTH: usize = 32;

/// The final PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

/// Append each fragment's single page, in input order, to a new document.
pub fn merge(fragments: &[PageFragment]) -> Result<MergedDocument> {
    if fragments.is_empty() {
        return Err(HandbookError::merge("no page fragments to merge"));
    }

    let mut document = Document::with_version("1.5");
    let mut next_id: u32 = 1;
    let mut kids: Vec<ObjectId> = Vec::with_capacity(fragments.len());

    for (position, fragment) in fragments.iter().enumerate() {
        let mut source = Document::load_mem(&fragment.bytes).map_err(|err| {
            HandbookError::merge(format!(
                "fragment {} (section {}) is not a readable PDF: {err}",
                position + 1,
                fragment.index
            ))
        })?;

        source.renumber_objects_with(next_id);
        next_id = source.max_id + 1;

        let pages = source.get_pages();
        if pages.len() != 1 {
            return Err(HandbookError::merge(format!(
                "fragment {} (section {}) has {} pages, expected exactly 1",
                position + 1,
                fragment.index,
                pages.len()
            )));
        }
        let page_id = *pages.values().next().ok_or_else(|| {
            HandbookError::merge(format!("fragment {} has no page", position + 1))
        })?;

        let page = flatten_page(&source, page_id)?;

        for (object_id, object) in source.objects {
            match object.type_name().unwrap_or("") {
                "Catalog" | "Pages" | "Page" | "Outlines" | "Outline" => {}
                _ => {
                    document.objects.insert(object_id, object);
                }
            }
        }
        document.objects.insert(page_id, Object::Dictionary(page));
        kids.push(page_id);
    }

    document.max_id = next_id.saturating_sub(1);
    let pages_id = document.new_object_id();
    for page_id in &kids {
        if let Ok(Object::Dictionary(page)) = document.get_object_mut(*page_id) {
            page.set("Parent", Object::Reference(pages_id));
        }
    }

    let page_count = kids.len();
    document.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            (
                "Kids",
                Object::Array(kids.into_iter().map(Object::Reference).collect()),
            ),
            ("Count", Object::Integer(page_count as i64)),
        ])),
    );
    let catalog_id = document.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    document.trailer.set("Root", Object::Reference(catalog_id));

    document.renumber_objects();
    document.compress();

    let mut bytes = Vec::new();
    document
        .save_to(&mut bytes)
        .map_err(|err| HandbookError::merge(format!("could not write merged PDF: {err}")))?;

    Ok(MergedDocument { bytes, page_count })
}

/// The page dictionary with inherited attributes copied in, so it survives re-parenting.
fn flatten_page(source: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut page = source
        .get_dictionary(page_id)
        .map_err(|err| HandbookError::merge(format!("page object unreadable: {err}")))?
        .clone();

    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(parent_id) = parent {
        depth += 1;
        if depth > MAX_PARENT_DEPTH {
            return Err(HandbookError::merge("page tree is too deep or cyclic"));
        }
        let Ok(node) = source.get_dictionary(parent_id) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    page.remove(b"Parent");
    Ok(page)
}

/// Page count of a PDF, for callers that only hold bytes.
pub fn page_count(bytes: &[u8]) -> Result<usize> {
    let document = Document::load_mem(bytes)
        .map_err(|err| HandbookError::merge(format!("not a readable PDF: {err}")))?;
    Ok(document.get_pages().len())
}
