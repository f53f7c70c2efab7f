use crate::{
    document::{DEFAULT_PAGE, DocumentBackend, RasterFormat, TextOptions},
    error::{CalqueError, CalqueResult},
    findings::{Findings, FormSubmission, Mode},
    model::{AttachmentKind, PhotoAttachment, Severity},
    store::SessionSnapshot,
};

/// Layout contract of the generated report. Coordinates are document
/// points, origin bottom-left; the cursor walks downwards from `top_y`.
#[derive(Clone, Copy, Debug)]
pub struct LayoutMetrics {
    pub margin_x: f64,
    pub indent_x: f64,
    pub top_y: f64,
    pub line_spacing: f64,
    pub body_size: f64,
    pub detail_size: f64,
    pub image_scale: f64,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            margin_x: 50.0,
            indent_x: 70.0,
            top_y: 700.0,
            line_spacing: 20.0,
            body_size: 12.0,
            detail_size: 10.0,
            image_scale: 0.5,
        }
    }
}

const BODY_RGB: [f32; 3] = [0.0, 0.0, 0.0];
const ACCENT_RGB: [f32; 3] = [0.0, 0.478, 1.0];
const MUTED_RGB: [f32; 3] = [0.294, 0.333, 0.388];

/// The surface the report is composed over.
#[derive(Clone, Copy, Debug)]
pub enum BaseDocument<'a> {
    /// An existing template document; content is drawn over its first page.
    Template(&'a [u8]),
    /// The reference plan as a raster; a blank document is created and the
    /// plan is embedded before the annotations.
    Image(&'a [u8]),
    /// No base at all; a blank titled document is created.
    Blank,
}

/// One attachment left out of the document, for diagnostics. Skips are
/// invisible to the caller as far as success/failure goes.
#[derive(Clone, Debug, PartialEq)]
pub struct SkippedAttachment {
    pub annotation_id: Option<u32>,
    pub photo_index: usize,
    pub reason: String,
}

/// Composes a single annotation's findings over the report template, the
/// way the findings form submits them. A missing or unparseable template
/// aborts the whole generation.
#[tracing::instrument(skip_all)]
pub fn compose_findings(
    backend: &mut dyn DocumentBackend,
    submission: &FormSubmission,
    base: BaseDocument<'_>,
) -> CalqueResult<Vec<SkippedAttachment>> {
    let BaseDocument::Template(bytes) = base else {
        return Err(CalqueError::template_not_found(
            "findings generation requires the report template",
        ));
    };
    backend.load_template(bytes)?;

    let mut c = Compositor::new(backend, LayoutMetrics::default());
    c.findings_block(
        None,
        submission.severity,
        &submission.findings,
        &submission.photos,
    )?;
    Ok(c.skipped)
}

/// Composes the whole session snapshot into one report: title block,
/// optional plan image, then every annotation in order under a `Point {id}`
/// header.
#[tracing::instrument(skip_all, fields(annotations = snapshot.annotations.len()))]
pub fn compose_session(
    backend: &mut dyn DocumentBackend,
    snapshot: &SessionSnapshot,
    base: BaseDocument<'_>,
    footer: Option<&str>,
) -> CalqueResult<Vec<SkippedAttachment>> {
    snapshot.validate()?;

    let mut plan_image = None;
    match base {
        BaseDocument::Template(bytes) => backend.load_template(bytes)?,
        BaseDocument::Image(bytes) => {
            backend.create_blank(DEFAULT_PAGE)?;
            plan_image = Some(bytes);
        }
        BaseDocument::Blank => backend.create_blank(DEFAULT_PAGE)?,
    }

    let metrics = LayoutMetrics::default();
    let mut c = Compositor::new(backend, metrics);

    if !matches!(base, BaseDocument::Template(_)) {
        c.title_block()?;
    }
    if let Some(bytes) = plan_image {
        c.embed_plan(bytes)?;
    }

    for ann in &snapshot.annotations {
        c.line_with(
            &format!("Point {}", ann.id),
            c.metrics.margin_x,
            16.0,
            ACCENT_RGB,
        )?;
        c.findings_block(Some(ann.id), ann.severity, &ann.findings, &ann.photos)?;
    }

    if let Some(footer) = footer
        && !footer.trim().is_empty()
    {
        c.line_with(footer, c.metrics.margin_x, c.metrics.detail_size, MUTED_RGB)?;
    }

    Ok(c.skipped)
}

struct Compositor<'a> {
    backend: &'a mut dyn DocumentBackend,
    metrics: LayoutMetrics,
    cursor_y: f64,
    skipped: Vec<SkippedAttachment>,
}

impl<'a> Compositor<'a> {
    fn new(backend: &'a mut dyn DocumentBackend, metrics: LayoutMetrics) -> Self {
        let cursor_y = metrics.top_y;
        Self {
            backend,
            metrics,
            cursor_y,
            skipped: Vec::new(),
        }
    }

    /// One body line at the left margin; absent (empty) values emit nothing
    /// and the cursor does not advance.
    fn field_line(&mut self, label: &str, value: &str) -> CalqueResult<()> {
        if value.trim().is_empty() {
            return Ok(());
        }
        self.line_with(
            &format!("{label} : {value}"),
            self.metrics.margin_x,
            self.metrics.body_size,
            BODY_RGB,
        )
    }

    fn line_with(&mut self, text: &str, x: f64, size: f64, rgb: [f32; 3]) -> CalqueResult<()> {
        self.backend
            .draw_text(text, TextOptions::new(x, self.cursor_y, size).rgb(rgb))?;
        self.cursor_y -= self.metrics.line_spacing;
        Ok(())
    }

    fn title_block(&mut self) -> CalqueResult<()> {
        self.backend.draw_text(
            "Rapport Détail des Points",
            TextOptions::new(self.metrics.margin_x, self.metrics.top_y + 50.0, 18.0)
                .rgb(ACCENT_RGB),
        )?;
        self.backend.draw_text(
            "Ce document détaille les informations de chaque point enregistré.",
            TextOptions::new(self.metrics.margin_x, self.metrics.top_y + 30.0, 12.0)
                .rgb(MUTED_RGB),
        )?;
        Ok(())
    }

    fn findings_block(
        &mut self,
        annotation_id: Option<u32>,
        severity: Severity,
        findings: &Findings,
        photos: &[PhotoAttachment],
    ) -> CalqueResult<()> {
        self.field_line("Zone", findings.zone_name())?;
        self.field_line("Niveau de gravité", severity.as_str())?;

        if !findings.materials().is_empty() {
            let header = match findings.mode() {
                Mode::Supervision => "Matériaux supervisés :",
                Mode::Expertise => "Matériaux expertisés :",
            };
            self.line_with(header, self.metrics.margin_x, self.metrics.body_size, BODY_RGB)?;
            for row in findings.materials() {
                self.line_with(
                    &format!(" - {}, Épaisseur : {} mm", row.material, row.thickness_mm),
                    self.metrics.indent_x,
                    self.metrics.detail_size,
                    BODY_RGB,
                )?;
            }
        }

        for (label, value) in findings.text_fields() {
            self.field_line(label, value)?;
        }

        if !photos.is_empty() {
            self.line_with(
                "Descriptions des photos et documents :",
                self.metrics.margin_x,
                self.metrics.body_size,
                BODY_RGB,
            )?;
            for (index, photo) in photos.iter().enumerate() {
                self.line_with(
                    &format!("Élément {} : {}", index + 1, photo.description),
                    self.metrics.indent_x,
                    self.metrics.detail_size,
                    BODY_RGB,
                )?;
                self.embed_attachment(annotation_id, index, photo)?;
            }
        }

        Ok(())
    }

    /// One attachment. Decode and sub-document failures skip the attachment
    /// and keep going; everything else is fatal.
    fn embed_attachment(
        &mut self,
        annotation_id: Option<u32>,
        index: usize,
        photo: &PhotoAttachment,
    ) -> CalqueResult<()> {
        match photo.kind {
            AttachmentKind::Png | AttachmentKind::Jpeg => {
                let format = if photo.kind == AttachmentKind::Png {
                    RasterFormat::Png
                } else {
                    RasterFormat::Jpeg
                };
                match self.backend.embed_image(&photo.bytes, format) {
                    Ok(img) => {
                        let w = img.width * self.metrics.image_scale;
                        let h = img.height * self.metrics.image_scale;
                        if self.cursor_y - h < 0.0 {
                            self.backend.add_page()?;
                            self.cursor_y = self.metrics.top_y;
                        }
                        self.backend
                            .place_image(&img, self.metrics.margin_x, self.cursor_y - h, w, h)?;
                        self.cursor_y -= h + self.metrics.line_spacing;
                        Ok(())
                    }
                    Err(e) if e.is_recoverable_attachment_error() => {
                        self.skip(annotation_id, index, &e);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            AttachmentKind::Pdf => match self.backend.append_document(&photo.bytes) {
                Ok(pages) => {
                    tracing::debug!(pages, "appended attachment document");
                    Ok(())
                }
                Err(e) if e.is_recoverable_attachment_error() => {
                    self.skip(annotation_id, index, &e);
                    Ok(())
                }
                Err(e) => Err(e),
            },
            AttachmentKind::Unknown => {
                self.skip(
                    annotation_id,
                    index,
                    &CalqueError::attachment_decode("unsupported attachment type"),
                );
                Ok(())
            }
        }
    }

    /// The reference plan raster at the head of a session report, scaled to
    /// the content width. A broken plan image aborts: it is the base
    /// surface, not an attachment.
    fn embed_plan(&mut self, bytes: &[u8]) -> CalqueResult<()> {
        let format = match image::guess_format(bytes) {
            Ok(image::ImageFormat::Png) => RasterFormat::Png,
            Ok(image::ImageFormat::Jpeg) => RasterFormat::Jpeg,
            _ => {
                return Err(CalqueError::template_not_found(
                    "plan image is not a supported raster",
                ));
            }
        };
        let img = self.backend.embed_image(bytes, format)?;
        let content_width = DEFAULT_PAGE.width - 2.0 * self.metrics.margin_x;
        let scale = (content_width / img.width).min(1.0);
        let w = img.width * scale;
        let h = img.height * scale;
        if self.cursor_y - h < 0.0 {
            self.backend.add_page()?;
            self.cursor_y = self.metrics.top_y;
        }
        self.backend
            .place_image(&img, self.metrics.margin_x, self.cursor_y - h, w, h)?;
        self.cursor_y -= h + self.metrics.line_spacing;
        Ok(())
    }

    fn skip(&mut self, annotation_id: Option<u32>, photo_index: usize, reason: &CalqueError) {
        tracing::warn!(
            annotation_id,
            photo_index,
            %reason,
            "skipping attachment"
        );
        self.skipped.push(SkippedAttachment {
            annotation_id,
            photo_index,
            reason: reason.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        document_record::{RecordedOp, RecordingBackend},
        findings::SupervisionFindings,
    };

    fn submission_with(findings: SupervisionFindings, severity: Severity) -> FormSubmission {
        FormSubmission {
            severity,
            findings: Findings::Supervision(findings),
            photos: Vec::new(),
        }
    }

    fn template_bytes() -> Vec<u8> {
        use crate::document::DEFAULT_PAGE;
        let mut b = crate::document_pdf::PdfBackend::new();
        b.create_blank(DEFAULT_PAGE).unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn findings_require_a_template() {
        let sub = submission_with(SupervisionFindings::default(), Severity::Green);
        let mut backend = RecordingBackend::new();
        let err = compose_findings(&mut backend, &sub, BaseDocument::Blank).unwrap_err();
        assert!(matches!(err, CalqueError::TemplateNotFound(_)));
    }

    #[test]
    fn empty_fields_do_not_advance_the_cursor() {
        let template = template_bytes();
        let sub = submission_with(
            SupervisionFindings {
                zone_name: "Mur Nord".to_string(),
                general_appreciation: "correct".to_string(),
                ..SupervisionFindings::default()
            },
            Severity::Green,
        );
        let mut backend = RecordingBackend::new();
        compose_findings(&mut backend, &sub, BaseDocument::Template(&template)).unwrap();

        let pages = backend.drawn_pages();
        let ys: Vec<f64> = pages[0]
            .iter()
            .map(|op| match op {
                RecordedOp::Text { y, .. } => *y,
                RecordedOp::Image { y, .. } => *y,
            })
            .collect();
        // Three present lines, consecutive slots, no gaps for the absent
        // fields between them.
        assert_eq!(ys, [700.0, 680.0, 660.0]);
    }

    #[test]
    fn severity_line_is_always_present() {
        let template = template_bytes();
        let sub = submission_with(SupervisionFindings::default(), Severity::Green);
        let mut backend = RecordingBackend::new();
        compose_findings(&mut backend, &sub, BaseDocument::Template(&template)).unwrap();
        assert_eq!(
            backend.text_lines(),
            ["Niveau de gravité : green"]
        );
    }

    #[test]
    fn session_blank_report_gets_title_block() {
        let snapshot = SessionSnapshot {
            mode: Mode::Supervision,
            surface: crate::model::Surface::new(800.0, 600.0).unwrap(),
            annotations: Vec::new(),
        };
        let mut backend = RecordingBackend::new();
        compose_session(&mut backend, &snapshot, BaseDocument::Blank, None).unwrap();
        let lines = backend.text_lines();
        assert_eq!(lines[0], "Rapport Détail des Points");
        assert!(lines[1].starts_with("Ce document détaille"));
    }

    #[test]
    fn session_footer_is_caller_supplied() {
        let snapshot = SessionSnapshot {
            mode: Mode::Supervision,
            surface: crate::model::Surface::new(800.0, 600.0).unwrap(),
            annotations: Vec::new(),
        };
        let mut backend = RecordingBackend::new();
        compose_session(
            &mut backend,
            &snapshot,
            BaseDocument::Blank,
            Some("Document généré le : 2024-11-02"),
        )
        .unwrap();
        assert!(
            backend
                .text_lines()
                .contains(&"Document généré le : 2024-11-02")
        );
    }
}
