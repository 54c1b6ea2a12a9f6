//! Join records linking uploaded content to hierarchy records.

use doc_uploader_core::hierarchy::display_value;
use doc_uploader_core::{DocumentRecord, EntityType};
use serde_json::{json, Value};

use crate::batch::{created_ids_by_reference, submit_chunked, BatchOptions};
use crate::error::UploadError;
use crate::progress::{ProgressSpan, StatusSink};
use crate::salesforce::{OrgApi, Subrequest};

pub const ATTACHMENT_OBJECT: &str = "Attachments_Uploader__c";

/// Record page of a content document inside the org.
pub fn deep_link(content_document_id: &str) -> String {
    format!("/lightning/r/ContentDocument/{}/view", content_document_id)
}

/// `Image`, `PDF` or `Video`, from the MIME type `mime_guess` maps the file
/// extension to. File contents are not inspected. Unknown extensions and
/// other types count as images.
pub fn content_category(file_name: &str) -> &'static str {
    let Some(mime) = mime_guess::from_path(file_name).first() else {
        return "Image";
    };
    if mime.type_() == mime_guess::mime::IMAGE {
        "Image"
    } else if mime.essence_str() == "application/pdf" {
        "PDF"
    } else if mime.type_() == mime_guess::mime::VIDEO {
        "Video"
    } else {
        "Image"
    }
}

/// Lookup field on the join record for `level`.
pub fn lookup_field(level: EntityType) -> &'static str {
    match level {
        EntityType::Project => "Project__c",
        EntityType::Phase => "Phase__c",
        EntityType::Zone => "Zone__c",
        EntityType::Building => "Building__c",
        EntityType::Unit => "Unit__c",
        EntityType::DesignType => "Design_Type__c",
    }
}

/// Fields of the join record for `doc`, or `None` when the document lacks
/// its content document id or its own level id.
pub fn attachment_fields(doc: &DocumentRecord) -> Option<Value> {
    let content_document_id = doc.content_document_id()?;
    let entity_id = doc.entity_id()?;

    let url = doc
        .resolved_ids()
        .distribution_url()
        .map(str::to_string)
        .unwrap_or_else(|| deep_link(content_document_id));
    let display = display_value(doc);

    let mut fields = json!({
        "Name": entity_id,
        "Attachment_Type__c": doc.document_type().label(),
        "Content_Type__c": content_category(doc.file_name()),
        "ContentDocumentId__c": content_document_id,
        "Attachment_Url__c": url,
        "Display_Value__c": display,
        "Display_Value_Arabic__c": display,
    });
    fields[lookup_field(doc.entity_type())] = Value::String(entity_id.to_string());
    Some(fields)
}

/// Create one join record per uploaded document. Returns the number of
/// records created.
pub async fn create_attachments(
    org: &dyn OrgApi,
    docs: &[DocumentRecord],
    batch: BatchOptions,
    sink: &dyn StatusSink,
    span: ProgressSpan,
) -> Result<usize, UploadError> {
    let mut requests = Vec::new();
    for doc in docs {
        let Some(fields) = attachment_fields(doc) else {
            tracing::warn!(
                path = doc.source_path(),
                content_document = ?doc.content_document_id(),
                entity_id = ?doc.entity_id(),
                "skipping attachment record, identifiers missing"
            );
            continue;
        };
        let reference = format!("attRef{}", requests.len());
        requests.push(Subrequest::create(
            org.api_version(),
            ATTACHMENT_OBJECT,
            reference,
            fields,
        ));
    }

    if requests.is_empty() {
        return Err(UploadError::NothingToCreate);
    }

    let count = requests.len();
    tracing::info!(records = count, "creating attachment records");
    let subs = submit_chunked(org, requests, batch, sink, span).await?;
    created_ids_by_reference(&subs, "attRef", count)?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_uploader_core::parse::parse_flat;

    fn uploaded(name: &str) -> DocumentRecord {
        let mut doc = parse_flat(name).unwrap();
        let level = doc.entity_type();
        doc.resolved_ids_mut().record_level(level, "a0U000000000001").unwrap();
        doc.set_content_document_id("069000000000001").unwrap();
        doc
    }

    #[test]
    fn test_content_category() {
        assert_eq!(content_category("a.pdf"), "PDF");
        assert_eq!(content_category("a.JPG"), "Image");
        assert_eq!(content_category("a.mp4"), "Video");
        assert_eq!(content_category("a.docx"), "Image");
        assert_eq!(content_category("noext"), "Image");
    }

    #[test]
    fn test_unit_record_fields() {
        let doc = uploaded("up_u_ProjA_Ph1_Zn1_Bd1_U101.pdf");
        let fields = attachment_fields(&doc).unwrap();
        assert_eq!(fields["Name"], "a0U000000000001");
        assert_eq!(fields["Unit__c"], "a0U000000000001");
        assert!(fields.get("Building__c").is_none());
        assert_eq!(fields["Attachment_Type__c"], "Unit Plan");
        assert_eq!(fields["Content_Type__c"], "PDF");
        assert_eq!(
            fields["Attachment_Url__c"],
            "/lightning/r/ContentDocument/069000000000001/view"
        );
        assert_eq!(
            fields["Display_Value__c"],
            "Unit Plan for Unit U101 of Building Bd1 in Phase Ph1 of ProjA"
        );
        assert_eq!(fields["Display_Value_Arabic__c"], fields["Display_Value__c"]);
    }

    #[test]
    fn test_distribution_url_preferred() {
        let mut doc = uploaded("g_dt_ProjA_Ph1_Villa.png");
        doc.resolved_ids_mut()
            .record_distribution_url("https://x/sfc/p/abc")
            .unwrap();
        let fields = attachment_fields(&doc).unwrap();
        assert_eq!(fields["Attachment_Url__c"], "https://x/sfc/p/abc");
        assert_eq!(fields["Design_Type__c"], "a0U000000000001");
    }

    #[test]
    fn test_skips_documents_without_content() {
        let doc = parse_flat("pp_p_ProjA_Ph1.pdf").unwrap();
        assert!(attachment_fields(&doc).is_none());
    }
}
