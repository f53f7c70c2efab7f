//! End-to-end generation through the real PDF backend, validated by
//! reloading the produced bytes.

use std::io::Cursor;

use calque::{
    Annotation, AttachmentKind, BaseSurface, DocumentBackend as _, Findings, FormSubmission,
    GenerateRequest, Mode, PdfBackend, PhotoAttachment, Severity, SupervisionFindings, Surface,
    SessionSnapshot, generate,
};
use lopdf::Document;

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([80, 90, 100, 255]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn blank_pdf(pages: usize) -> Vec<u8> {
    let mut b = PdfBackend::new();
    b.create_blank(calque::DEFAULT_PAGE).unwrap();
    for _ in 1..pages {
        b.add_page().unwrap();
    }
    b.finish().unwrap()
}

fn annotation(id: u32, photos: Vec<PhotoAttachment>) -> Annotation {
    Annotation {
        id,
        position: kurbo::Point::new(100.0, 120.0),
        zone: None,
        severity: Severity::Orange,
        findings: Findings::Supervision(SupervisionFindings {
            zone_name: format!("Zone {id}"),
            ..SupervisionFindings::default()
        }),
        photos,
    }
}

fn snapshot(annotations: Vec<Annotation>) -> SessionSnapshot {
    SessionSnapshot {
        mode: Mode::Supervision,
        surface: Surface::new(800.0, 600.0).unwrap(),
        annotations,
    }
}

#[test]
fn session_report_is_a_loadable_pdf() {
    let request = GenerateRequest::Session {
        snapshot: snapshot(vec![annotation(1, vec![])]),
        footer: Some("A&C Process".to_string()),
    };
    let mut backend = PdfBackend::new();
    let doc = generate(&request, None, &mut backend).unwrap();

    assert_eq!(doc.filename, "Rapport_Points_Inspection.pdf");
    assert_eq!(doc.content_type, "application/pdf");
    assert!(doc.bytes.starts_with(b"%PDF-"));

    let reloaded = Document::load_mem(&doc.bytes).unwrap();
    assert_eq!(reloaded.get_pages().len(), 1);
}

#[test]
fn pdf_attachment_appends_its_pages() {
    let attachment = PhotoAttachment::new(AttachmentKind::Pdf, "annexe", blank_pdf(2));
    let request = GenerateRequest::Session {
        snapshot: snapshot(vec![annotation(1, vec![
            PhotoAttachment::new(AttachmentKind::Png, "photo", png_bytes(20, 30)),
            attachment,
        ])]),
        footer: None,
    };
    let mut backend = PdfBackend::new();
    let doc = generate(&request, None, &mut backend).unwrap();
    assert!(doc.skipped.is_empty());

    let reloaded = Document::load_mem(&doc.bytes).unwrap();
    assert_eq!(reloaded.get_pages().len(), 3);
}

#[test]
fn corrupt_attachment_still_yields_a_report() {
    let request = GenerateRequest::Session {
        snapshot: snapshot(vec![annotation(1, vec![
            PhotoAttachment::new(AttachmentKind::Pdf, "annexe cassée", b"junk".to_vec()),
            PhotoAttachment::new(AttachmentKind::Png, "photo", png_bytes(16, 16)),
        ])]),
        footer: None,
    };
    let mut backend = PdfBackend::new();
    let doc = generate(&request, None, &mut backend).unwrap();

    assert_eq!(doc.skipped.len(), 1);
    assert_eq!(doc.skipped[0].photo_index, 0);
    let reloaded = Document::load_mem(&doc.bytes).unwrap();
    assert_eq!(reloaded.get_pages().len(), 1);
}

#[test]
fn single_findings_compose_over_the_template() {
    let template = BaseSurface::Template {
        bytes: blank_pdf(1),
    };
    let submission = FormSubmission {
        severity: Severity::Red,
        findings: Findings::Supervision(SupervisionFindings {
            zone_name: "Four".to_string(),
            ..SupervisionFindings::default()
        }),
        photos: vec![],
    };
    let request = GenerateRequest::Single(submission);
    let mut backend = PdfBackend::new();
    let doc = generate(&request, Some(&template), &mut backend).unwrap();

    assert_eq!(doc.filename, "rapport_supervision.pdf");
    let reloaded = Document::load_mem(&doc.bytes).unwrap();
    assert_eq!(reloaded.get_pages().len(), 1);

    let page_id = reloaded.get_pages()[&1];
    let content =
        lopdf::content::Content::decode(&reloaded.get_page_content(page_id).unwrap()).unwrap();
    let text_runs = content
        .operations
        .iter()
        .filter(|op| op.operator == "Tj")
        .count();
    // Zone line + severity line.
    assert_eq!(text_runs, 2);
}

#[test]
fn single_findings_without_template_produce_nothing() {
    let request =
        GenerateRequest::Single(FormSubmission::new(Findings::empty(Mode::Supervision)));
    let mut backend = PdfBackend::new();
    let err = generate(&request, None, &mut backend).unwrap_err();
    assert!(matches!(err, calque::CalqueError::TemplateNotFound(_)));
    assert_eq!(backend.page_count(), 0);
}

#[test]
fn raster_base_embeds_the_plan_before_annotations() {
    let plan = png_bytes(400, 200);
    let base = BaseSurface::Image {
        surface: Surface::new(400.0, 200.0).unwrap(),
        bytes: plan,
    };
    let request = GenerateRequest::Session {
        snapshot: snapshot(vec![annotation(1, vec![])]),
        footer: None,
    };
    let mut backend = PdfBackend::new();
    let doc = generate(&request, Some(&base), &mut backend).unwrap();

    let reloaded = Document::load_mem(&doc.bytes).unwrap();
    let page_id = reloaded.get_pages()[&1];
    let content =
        lopdf::content::Content::decode(&reloaded.get_page_content(page_id).unwrap()).unwrap();
    assert!(content.operations.iter().any(|op| op.operator == "Do"));
}
