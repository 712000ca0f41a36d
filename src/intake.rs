// src/intake.rs

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::config::ExtractionSection;
use crate::error::Result;
use crate::group::{self, ResolvedGroupMetadata};
use crate::heuristics::{self, ExtractedIdentity, PcInfo, document_prefix, is_pc_filename};
use crate::merge::{self, BatchManifest, MergeGroup, UploadedDocument};
use crate::naming::{self, BatchNames};
use crate::pdf_extract;
use crate::settings::Settings;
use crate::storage::Storage;

/// A merged PDF and the name it should be stored under.
#[derive(Debug)]
pub struct MergeOutput {
    pub filename: String,
    pub metadata: ResolvedGroupMetadata,
    pub bytes: Vec<u8>,
}

/// One file inside a planned group.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedMember {
    pub index: usize,
    pub filename: String,
    pub prefix: String,
    /// Display name of the document type, e.g. `수입신고필증` for `IMP`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_name: Option<String>,
    #[serde(flatten)]
    pub identity: ExtractedIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pc_info: Option<PcInfo>,
}

/// Automatic grouping of a set of uploads.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedGroup {
    pub key: String,
    #[serde(flatten)]
    pub metadata: ResolvedGroupMetadata,
    pub importer: Option<String>,
    pub members: Vec<PlannedMember>,
}

pub fn identify_all(documents: &[UploadedDocument]) -> Vec<ExtractedIdentity> {
    documents
        .iter()
        .map(|doc| {
            let id = heuristics::identify(&doc.filename);
            info!(
                filename = %doc.filename,
                customs = ?id.customs_number,
                bl = ?id.bl_code,
                "Identified"
            );
            id
        })
        .collect()
}

/// Merge all documents into one PDF named after their shared customs number.
pub fn merge_single(documents: &[UploadedDocument], started: OffsetDateTime) -> Result<MergeOutput> {
    let timestamp = naming::format_timestamp(started);
    let sources: Vec<&[u8]> = documents.iter().map(|d| d.bytes.as_slice()).collect();
    let bytes = merge::merge_documents(&sources)?;

    let metadata = group::resolve_group(&identify_all(documents));
    let filename = naming::merged_filename(&metadata.customs, &timestamp);
    info!(
        filename = %filename,
        documents = documents.len(),
        customs = %metadata.customs,
        bl_confirmed = metadata.has_bl(),
        "Merged"
    );
    Ok(MergeOutput {
        filename,
        metadata,
        bytes,
    })
}

/// Merge every group of a manifest; output names are unique within the batch.
pub fn merge_batch(
    documents: &[UploadedDocument],
    manifest: &BatchManifest,
    started: OffsetDateTime,
) -> Result<Vec<MergeOutput>> {
    let timestamp = naming::format_timestamp(started);
    let mut names = BatchNames::new();

    let outputs: Vec<MergeOutput> = merge::merge_batch(documents, manifest)?
        .into_iter()
        .map(|group| {
            let identities: Vec<ExtractedIdentity> = group
                .members
                .iter()
                .map(|d| heuristics::identify(&d.filename))
                .collect();
            let metadata = group::resolve_group(&identities);
            if !metadata.has_customs() {
                warn!(group = %group.name, "No single customs number for group");
            }
            let filename = names.assign(&metadata.customs, &metadata.bl, &timestamp);
            info!(group = %group.name, filename = %filename, "Batch output named");
            MergeOutput {
                filename,
                metadata,
                bytes: group.pdf,
            }
        })
        .collect();

    info!(groups = manifest.groups.len(), outputs = names.len(), "Batch merged");
    Ok(outputs)
}

/// Request-level operations that touch storage.
pub struct Intake {
    uploads: Box<dyn Storage>,
    merged: Box<dyn Storage>,
    extraction: ExtractionSection,
}

impl Intake {
    pub fn new(
        uploads: Box<dyn Storage>,
        merged: Box<dyn Storage>,
        extraction: ExtractionSection,
    ) -> Self {
        Self {
            uploads,
            merged,
            extraction,
        }
    }

    pub fn uploads(&self) -> &dyn Storage {
        self.uploads.as_ref()
    }

    pub fn merged(&self) -> &dyn Storage {
        self.merged.as_ref()
    }

    /// Store uploads under collision-free names, in input order.
    pub async fn store_uploads(&self, documents: &[UploadedDocument]) -> Result<Vec<String>> {
        let mut saved = Vec::with_capacity(documents.len());
        for doc in documents {
            let name = naming::safe_label(&doc.filename);
            saved.push(self.uploads.save_unique(&name, &doc.bytes).await?);
        }
        info!(count = saved.len(), "Uploads stored");
        Ok(saved)
    }

    /// Persist merged outputs; returns the names actually written.
    pub async fn save_outputs(&self, outputs: &[MergeOutput]) -> Result<Vec<String>> {
        let mut written = Vec::with_capacity(outputs.len());
        for out in outputs {
            let name = self.merged.save_unique(&out.filename, &out.bytes).await?;
            if name != out.filename {
                warn!(wanted = %out.filename, written = %name, "Merged name already taken");
            }
            written.push(name);
        }
        Ok(written)
    }

    /// Importer and fees of a stored payment-confirmation document.
    pub async fn pc_info(&self, name: &str) -> Result<PcInfo> {
        let bytes = self.uploads.read(name).await?;
        let span = tracing::info_span!("pc_info", filename = %name);
        let _guard = span.enter();
        pdf_extract::pc_info_from_pdf(&bytes, &self.extraction)
    }

    /// Group documents automatically and order each group for merging.
    ///
    /// A `PC_` file that cannot be read keeps its place in the plan without
    /// importer or fees.
    pub fn plan(&self, documents: &[UploadedDocument], settings: &Settings) -> Vec<PlannedGroup> {
        let order = settings.merge_order();
        let identities = identify_all(documents);
        let keys = group::assign_group_keys(&identities);

        group::group_indices(&keys)
            .into_iter()
            .map(|(key, indices)| {
                let mut members: Vec<PlannedMember> = indices
                    .into_iter()
                    .map(|idx| {
                        let doc = &documents[idx];
                        let pc_info = is_pc_filename(&doc.filename)
                            .then(|| self.member_pc_info(doc))
                            .flatten();
                        let prefix = document_prefix(&doc.filename);
                        PlannedMember {
                            index: idx,
                            filename: doc.filename.clone(),
                            document_name: settings.document_name(&prefix),
                            prefix,
                            identity: identities[idx].clone(),
                            pc_info,
                        }
                    })
                    .collect();
                order.sort_by_filename(&mut members, |m| m.filename.as_str());

                let member_ids: Vec<ExtractedIdentity> =
                    members.iter().map(|m| m.identity.clone()).collect();
                let importer = group::resolve_importer(
                    members
                        .iter()
                        .map(|m| m.pc_info.as_ref().and_then(|p| p.importer.as_deref())),
                );
                PlannedGroup {
                    key,
                    metadata: group::resolve_group(&member_ids),
                    importer,
                    members,
                }
            })
            .collect()
    }

    fn member_pc_info(&self, doc: &UploadedDocument) -> Option<PcInfo> {
        match pdf_extract::pc_info_from_pdf(&doc.bytes, &self.extraction) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(filename = %doc.filename, error = %e, "PC info unavailable");
                None
            }
        }
    }
}

/// Batch manifest for a plan; file ids are the input indices.
pub fn plan_manifest(plan: &[PlannedGroup], document_count: usize) -> BatchManifest {
    BatchManifest {
        file_ids: (0..document_count).map(|i| i.to_string()).collect(),
        groups: plan
            .iter()
            .map(|g| MergeGroup {
                name: g.key.clone(),
                file_ids: g.members.iter().map(|m| m.index.to_string()).collect(),
            })
            .collect(),
    }
}
