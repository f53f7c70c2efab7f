use crate::{
    document::{DocumentBackend, EmbeddedImage, PageSize, RasterFormat, TextOptions},
    error::{CalqueError, CalqueResult},
};

/// Structural document backend: instead of encoding bytes it records the
/// draw calls, page by page, in emission order. Generation runs against it
/// in tests, and twice-generated snapshots are compared for structural
/// identity. `finish` serializes the record as JSON.
#[derive(Clone, Debug, Default)]
pub struct RecordingBackend {
    doc: Option<RecordedDocument>,
    /// Index into `pages` of the page draw calls currently target.
    current: usize,
    images: Vec<(f64, f64)>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RecordedDocument {
    pub base: RecordedBase,
    pub pages: Vec<RecordedPage>,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RecordedBase {
    Blank { size: PageSize },
    /// A loaded template; only its first page is drawn on, the rest ride
    /// along untouched.
    Template { pages: usize },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RecordedPage {
    Drawn { ops: Vec<RecordedOp> },
    /// All pages of one appended sub-document.
    Appended { pages: usize },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RecordedOp {
    Text {
        text: String,
        x: f64,
        y: f64,
        size: f64,
    },
    Image {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The record so far. Tests inspect this directly instead of parsing the
    /// serialized form.
    pub fn document(&self) -> Option<&RecordedDocument> {
        self.doc.as_ref()
    }

    /// Draw ops of every drawn page, in page order.
    pub fn drawn_pages(&self) -> Vec<&[RecordedOp]> {
        self.doc
            .as_ref()
            .map(|d| {
                d.pages
                    .iter()
                    .filter_map(|p| match p {
                        RecordedPage::Drawn { ops } => Some(ops.as_slice()),
                        RecordedPage::Appended { .. } => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every text line in emission order, across pages.
    pub fn text_lines(&self) -> Vec<&str> {
        self.drawn_pages()
            .into_iter()
            .flatten()
            .filter_map(|op| match op {
                RecordedOp::Text { text, .. } => Some(text.as_str()),
                RecordedOp::Image { .. } => None,
            })
            .collect()
    }

    fn doc_mut(&mut self) -> CalqueResult<&mut RecordedDocument> {
        self.doc
            .as_mut()
            .ok_or_else(|| CalqueError::document("no document has been started"))
    }

    fn current_ops(&mut self) -> CalqueResult<&mut Vec<RecordedOp>> {
        let current = self.current;
        match self.doc_mut()?.pages.get_mut(current) {
            Some(RecordedPage::Drawn { ops }) => Ok(ops),
            _ => Err(CalqueError::document("current page is not drawable")),
        }
    }
}

impl DocumentBackend for RecordingBackend {
    fn load_template(&mut self, bytes: &[u8]) -> CalqueResult<()> {
        let template = lopdf::Document::load_mem(bytes).map_err(|e| {
            CalqueError::template_not_found(format!("template could not be parsed: {e}"))
        })?;
        let pages = template.get_pages().len();
        if pages == 0 {
            return Err(CalqueError::template_not_found("template has no pages"));
        }
        self.doc = Some(RecordedDocument {
            base: RecordedBase::Template { pages },
            pages: vec![RecordedPage::Drawn { ops: Vec::new() }],
        });
        self.current = 0;
        Ok(())
    }

    fn create_blank(&mut self, size: PageSize) -> CalqueResult<()> {
        self.doc = Some(RecordedDocument {
            base: RecordedBase::Blank { size },
            pages: vec![RecordedPage::Drawn { ops: Vec::new() }],
        });
        self.current = 0;
        Ok(())
    }

    fn add_page(&mut self) -> CalqueResult<()> {
        let doc = self.doc_mut()?;
        doc.pages.push(RecordedPage::Drawn { ops: Vec::new() });
        self.current = doc.pages.len() - 1;
        Ok(())
    }

    fn page_count(&self) -> usize {
        let Some(doc) = &self.doc else { return 0 };
        let template_rest = match doc.base {
            RecordedBase::Template { pages } => pages.saturating_sub(1),
            RecordedBase::Blank { .. } => 0,
        };
        template_rest
            + doc
                .pages
                .iter()
                .map(|p| match p {
                    RecordedPage::Drawn { .. } => 1,
                    RecordedPage::Appended { pages } => *pages,
                })
                .sum::<usize>()
    }

    fn draw_text(&mut self, text: &str, opts: TextOptions) -> CalqueResult<()> {
        self.current_ops()?.push(RecordedOp::Text {
            text: text.to_string(),
            x: opts.x,
            y: opts.y,
            size: opts.size,
        });
        Ok(())
    }

    fn embed_image(&mut self, bytes: &[u8], format: RasterFormat) -> CalqueResult<EmbeddedImage> {
        let decoded = decode_raster(bytes, format)?;
        let key = self.images.len();
        self.images.push(decoded);
        Ok(EmbeddedImage {
            key,
            width: decoded.0,
            height: decoded.1,
        })
    }

    fn place_image(
        &mut self,
        image: &EmbeddedImage,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> CalqueResult<()> {
        if image.key >= self.images.len() {
            return Err(CalqueError::document("image was never embedded"));
        }
        self.current_ops()?.push(RecordedOp::Image {
            x,
            y,
            width,
            height,
        });
        Ok(())
    }

    fn append_document(&mut self, bytes: &[u8]) -> CalqueResult<usize> {
        let sub = lopdf::Document::load_mem(bytes).map_err(|e| {
            CalqueError::sub_document_load(format!("sub-document could not be parsed: {e}"))
        })?;
        let pages = sub.get_pages().len();
        if pages == 0 {
            return Err(CalqueError::sub_document_load("sub-document has no pages"));
        }
        self.doc_mut()?
            .pages
            .push(RecordedPage::Appended { pages });
        Ok(pages)
    }

    fn finish(&mut self) -> CalqueResult<Vec<u8>> {
        let doc = self.doc_mut()?;
        serde_json::to_vec_pretty(doc).map_err(|e| CalqueError::serde(e.to_string()))
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn suggested_extension(&self) -> &'static str {
        "json"
    }
}

/// Decodes a raster payload and checks the payload really is the declared
/// format, so a mislabelled attachment fails its own embed instead of
/// producing a corrupt object.
pub(crate) fn decode_raster(bytes: &[u8], format: RasterFormat) -> CalqueResult<(f64, f64)> {
    if bytes.is_empty() {
        return Err(CalqueError::attachment_decode("attachment payload is empty"));
    }
    let guessed = image::guess_format(bytes)
        .map_err(|e| CalqueError::attachment_decode(format!("unrecognized raster payload: {e}")))?;
    let matches = matches!(
        (format, guessed),
        (RasterFormat::Png, image::ImageFormat::Png)
            | (RasterFormat::Jpeg, image::ImageFormat::Jpeg)
    );
    if !matches {
        return Err(CalqueError::attachment_decode(format!(
            "payload is {guessed:?} but was declared {format:?}"
        )));
    }
    let img = image::load_from_memory(bytes)
        .map_err(|e| CalqueError::attachment_decode(format!("raster decode failed: {e}")))?;
    Ok((f64::from(img.width()), f64::from(img.height())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DEFAULT_PAGE;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn records_text_and_pages_in_order() {
        let mut b = RecordingBackend::new();
        b.create_blank(DEFAULT_PAGE).unwrap();
        b.draw_text("un", TextOptions::new(50.0, 700.0, 12.0))
            .unwrap();
        b.add_page().unwrap();
        b.draw_text("deux", TextOptions::new(50.0, 700.0, 12.0))
            .unwrap();

        assert_eq!(b.page_count(), 2);
        assert_eq!(b.text_lines(), ["un", "deux"]);
        let pages = b.drawn_pages();
        assert_eq!(pages[0].len(), 1);
        assert_eq!(pages[1].len(), 1);
    }

    #[test]
    fn embed_checks_declared_format() {
        let mut b = RecordingBackend::new();
        b.create_blank(DEFAULT_PAGE).unwrap();

        let png = png_bytes(4, 6);
        let img = b.embed_image(&png, RasterFormat::Png).unwrap();
        assert_eq!((img.width, img.height), (4.0, 6.0));

        let err = b.embed_image(&png, RasterFormat::Jpeg).unwrap_err();
        assert!(matches!(err, CalqueError::AttachmentDecode(_)));

        let err = b.embed_image(&[], RasterFormat::Png).unwrap_err();
        assert!(matches!(err, CalqueError::AttachmentDecode(_)));
    }

    #[test]
    fn draw_without_document_fails() {
        let mut b = RecordingBackend::new();
        let err = b
            .draw_text("x", TextOptions::new(0.0, 0.0, 12.0))
            .unwrap_err();
        assert!(matches!(err, CalqueError::Document(_)));
    }

    #[test]
    fn append_rejects_garbage_sub_document() {
        let mut b = RecordingBackend::new();
        b.create_blank(DEFAULT_PAGE).unwrap();
        let err = b.append_document(b"not a pdf").unwrap_err();
        assert!(matches!(err, CalqueError::SubDocumentLoad(_)));
        assert_eq!(b.page_count(), 1);
    }

    #[test]
    fn finish_serializes_record() {
        let mut b = RecordingBackend::new();
        b.create_blank(DEFAULT_PAGE).unwrap();
        b.draw_text("ligne", TextOptions::new(50.0, 700.0, 12.0))
            .unwrap();
        let bytes = b.finish().unwrap();
        let parsed: RecordedDocument = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, *b.document().unwrap());
    }
}
