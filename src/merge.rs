// src/merge.rs

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{IntakeError, Result};

pub const MSG_TOO_FEW: &str = "PDF 파일을 2개 이상 선택해주세요.";
pub const MSG_NO_FILES: &str = "PDF 파일을 선택해주세요.";
pub const MSG_INCOMPLETE: &str = "요청 데이터가 부족합니다.";
pub const MSG_BAD_MANIFEST: &str = "요청 형식이 올바르지 않습니다.";

// Attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// One uploaded PDF as handed over by the request layer.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A user-labelled set of documents; member order is page order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeGroup {
    #[serde(default = "default_group_name")]
    pub name: String,
    #[serde(default)]
    pub file_ids: Vec<String>,
}

fn default_group_name() -> String {
    "merged".to_string()
}

/// Batch request: `file_ids[i]` names `documents[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchManifest {
    #[serde(default)]
    pub file_ids: Vec<String>,
    #[serde(default)]
    pub groups: Vec<MergeGroup>,
}

impl BatchManifest {
    /// Parse the raw manifest field. An empty string is an empty manifest.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw).map_err(|e| {
            warn!(error = %e, "Manifest is not valid JSON");
            IntakeError::validation(MSG_BAD_MANIFEST)
        })
    }
}

/// Output of one group in a batch.
#[derive(Debug)]
pub struct GroupMerge<'a> {
    pub name: String,
    pub members: Vec<&'a UploadedDocument>,
    pub pdf: Vec<u8>,
}

/// Concatenate every page of at least two documents, in input order.
pub fn merge_documents<B: AsRef<[u8]>>(sources: &[B]) -> Result<Vec<u8>> {
    if sources.len() < 2 {
        return Err(IntakeError::validation(MSG_TOO_FEW));
    }
    concat_pages(sources)
}

/// Merge each group of a batch independently.
///
/// Empty groups and ids missing from the id map are skipped.
pub fn merge_batch<'a>(
    documents: &'a [UploadedDocument],
    manifest: &BatchManifest,
) -> Result<Vec<GroupMerge<'a>>> {
    if documents.is_empty() {
        return Err(IntakeError::validation(MSG_NO_FILES));
    }
    if manifest.file_ids.is_empty()
        || manifest.file_ids.len() != documents.len()
        || manifest.groups.is_empty()
    {
        warn!(
            ids = manifest.file_ids.len(),
            documents = documents.len(),
            groups = manifest.groups.len(),
            "Incomplete batch manifest"
        );
        return Err(IntakeError::validation(MSG_INCOMPLETE));
    }

    let id_map: HashMap<&str, &UploadedDocument> = manifest
        .file_ids
        .iter()
        .map(String::as_str)
        .zip(documents.iter())
        .collect();

    let mut merged = Vec::new();
    for group in &manifest.groups {
        let span = tracing::info_span!("merge", group = %group.name);
        let _guard = span.enter();

        let members: Vec<&UploadedDocument> = group
            .file_ids
            .iter()
            .filter_map(|id| {
                let doc = id_map.get(id.as_str()).copied();
                if doc.is_none() {
                    warn!(file_id = %id, "Unknown file id, skipped");
                }
                doc
            })
            .collect();

        if members.is_empty() {
            info!("No resolvable members, group skipped");
            continue;
        }

        let sources: Vec<&[u8]> = members.iter().map(|d| d.bytes.as_slice()).collect();
        let pdf = concat_pages(&sources)?;
        info!(members = members.len(), bytes = pdf.len(), "Group merged");
        merged.push(GroupMerge {
            name: group.name.clone(),
            members,
            pdf,
        });
    }
    Ok(merged)
}

fn load(bytes: &[u8], idx: usize) -> Result<Document> {
    Document::load_mem(bytes)
        .map_err(|e| IntakeError::processing(format!("document #{} unreadable: {e}", idx + 1)))
}

/// Copy inheritable attributes down from the page tree, since the source
/// `Pages` nodes are not carried into the output.
fn inherit_page_attributes(doc: &Document, page: &mut Dictionary) {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(parent_id) = parent {
        let Ok(node) = doc.get_dictionary(parent_id) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        depth += 1;
        if depth > 64 {
            break;
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
}

fn concat_pages<B: AsRef<[u8]>>(sources: &[B]) -> Result<Vec<u8>> {
    let mut output = Document::with_version("1.5");
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut next_id: u32 = 1;

    for (idx, source) in sources.iter().enumerate() {
        let mut doc = load(source.as_ref(), idx)?;
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        for page_id in doc.get_pages().into_values() {
            let mut dict = doc
                .get_dictionary(page_id)
                .map_err(|e| {
                    IntakeError::processing(format!("document #{} page {page_id:?}: {e}", idx + 1))
                })?
                .clone();
            inherit_page_attributes(&doc, &mut dict);
            pages.push((page_id, dict));
        }

        for (object_id, object) in doc.objects {
            match object.type_name().unwrap_or("") {
                "Catalog" | "Pages" | "Page" | "Outlines" | "Outline" => {}
                _ => {
                    output.objects.insert(object_id, object);
                }
            }
        }
    }

    output.max_id = next_id - 1;
    let pages_id = output.new_object_id();

    let kids: Vec<Object> = pages.iter().map(|(id, _)| Object::Reference(*id)).collect();
    let count = pages.len() as i64;
    for (page_id, mut dict) in pages {
        dict.set("Parent", Object::Reference(pages_id));
        output.objects.insert(page_id, Object::Dictionary(dict));
    }

    output.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(count)),
        ])),
    );

    let catalog_id = output.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    output.trailer.set("Root", Object::Reference(catalog_id));

    output.renumber_objects();
    output.compress();

    let mut bytes = Vec::new();
    output
        .save_to(&mut bytes)
        .map_err(|e| IntakeError::processing(format!("failed to write merged PDF: {e}")))?;
    Ok(bytes)
}
