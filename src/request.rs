use crate::{
    compose::{BaseDocument, SkippedAttachment, compose_findings, compose_session},
    document::DocumentBackend,
    error::CalqueResult,
    findings::FormSubmission,
    store::SessionSnapshot,
    surface::BaseSurface,
};

/// What a generation request carries: one annotation's findings straight
/// from the form, or a whole session snapshot for the multi-annotation
/// report.
#[derive(Clone, Debug)]
pub enum GenerateRequest {
    Single(FormSubmission),
    Session {
        snapshot: SessionSnapshot,
        /// Optional trailing line (the caller stamps the generation date
        /// here; the library takes no clock).
        footer: Option<String>,
    },
}

/// The finished document plus transport metadata.
#[derive(Clone, Debug)]
pub struct GeneratedDocument {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub filename: String,
    pub skipped: Vec<SkippedAttachment>,
}

/// Runs a generation request against a backend. Fatal errors yield no
/// document at all; per-attachment skips are reported in
/// [`GeneratedDocument::skipped`] and do not fail the generation.
pub fn generate(
    request: &GenerateRequest,
    base: Option<&BaseSurface>,
    backend: &mut dyn DocumentBackend,
) -> CalqueResult<GeneratedDocument> {
    let base_doc = match base {
        Some(BaseSurface::Template { bytes }) => BaseDocument::Template(bytes),
        Some(BaseSurface::Image { bytes, .. }) => BaseDocument::Image(bytes),
        None => BaseDocument::Blank,
    };

    let (skipped, stem) = match request {
        GenerateRequest::Single(submission) => (
            compose_findings(backend, submission, base_doc)?,
            "rapport_supervision",
        ),
        GenerateRequest::Session { snapshot, footer } => (
            compose_session(backend, snapshot, base_doc, footer.as_deref())?,
            "Rapport_Points_Inspection",
        ),
    };

    let bytes = backend.finish()?;
    Ok(GeneratedDocument {
        bytes,
        content_type: backend.content_type(),
        filename: format!("{stem}.{}", backend.suggested_extension()),
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        document_record::RecordingBackend,
        findings::{Findings, Mode},
        model::Surface,
    };

    #[test]
    fn session_generation_names_the_report() {
        let request = GenerateRequest::Session {
            snapshot: SessionSnapshot {
                mode: Mode::Supervision,
                surface: Surface::new(800.0, 600.0).unwrap(),
                annotations: Vec::new(),
            },
            footer: None,
        };
        let mut backend = RecordingBackend::new();
        let doc = generate(&request, None, &mut backend).unwrap();
        assert_eq!(doc.filename, "Rapport_Points_Inspection.json");
        assert_eq!(doc.content_type, "application/json");
        assert!(doc.skipped.is_empty());
        assert!(!doc.bytes.is_empty());
    }

    #[test]
    fn single_generation_without_template_fails_with_no_output() {
        let request =
            GenerateRequest::Single(FormSubmission::new(Findings::empty(Mode::Supervision)));
        let mut backend = RecordingBackend::new();
        assert!(generate(&request, None, &mut backend).is_err());
        assert!(backend.document().is_none());
    }
}
