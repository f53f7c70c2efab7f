use crate::error::CalqueResult;

/// Page size in document points (1/72 inch), origin at the bottom-left.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// A4 portrait, the size a blank report is created at.
pub const DEFAULT_PAGE: PageSize = PageSize {
    width: 595.28,
    height: 841.89,
};

/// Text run options for [`DocumentBackend::draw_text`]. `rgb` components are
/// in `0..=1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextOptions {
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub rgb: [f32; 3],
}

impl TextOptions {
    pub fn new(x: f64, y: f64, size: f64) -> Self {
        Self {
            x,
            y,
            size,
            rgb: [0.0, 0.0, 0.0],
        }
    }

    pub fn rgb(mut self, rgb: [f32; 3]) -> Self {
        self.rgb = rgb;
        self
    }
}

/// Raster formats the embed path accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RasterFormat {
    Png,
    Jpeg,
}

/// An embedded raster, ready to be placed any number of times. Dimensions
/// are the native pixel dimensions of the decoded payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmbeddedImage {
    pub(crate) key: usize,
    pub width: f64,
    pub height: f64,
}

/// The document capability the compositor draws through. One implementation
/// records structure (for tests and structural-identity checks), one encodes
/// real PDF bytes.
///
/// The backend keeps a "current page" cursor: `draw_text` and `place_image`
/// target the most recently created page (or the template's first page),
/// matching how the compositor walks a document top to bottom.
pub trait DocumentBackend {
    /// Starts from an existing template document. Its first page becomes the
    /// current page.
    fn load_template(&mut self, bytes: &[u8]) -> CalqueResult<()>;

    /// Starts from scratch with one blank page of the given size.
    fn create_blank(&mut self, size: PageSize) -> CalqueResult<()>;

    /// Appends a fresh page (template page size, or `DEFAULT_PAGE` when the
    /// document was created blank) and makes it current.
    fn add_page(&mut self) -> CalqueResult<()>;

    fn page_count(&self) -> usize;

    fn draw_text(&mut self, text: &str, opts: TextOptions) -> CalqueResult<()>;

    /// Decodes and embeds a raster payload, returning its native dimensions.
    /// Fails with an attachment decode error on malformed payloads.
    fn embed_image(&mut self, bytes: &[u8], format: RasterFormat) -> CalqueResult<EmbeddedImage>;

    /// Places a previously embedded raster on the current page.
    fn place_image(
        &mut self,
        image: &EmbeddedImage,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> CalqueResult<()>;

    /// Appends every page of a sub-document verbatim, after the current last
    /// page. Returns the number of pages appended. The current page is left
    /// unchanged: inline layout continues where it was.
    fn append_document(&mut self, bytes: &[u8]) -> CalqueResult<usize>;

    /// Serializes the finished document.
    fn finish(&mut self) -> CalqueResult<Vec<u8>>;

    fn content_type(&self) -> &'static str;

    fn suggested_extension(&self) -> &'static str;
}

#[derive(Clone, Copy, Debug)]
pub enum BackendKind {
    Pdf,
    Recording,
}

pub fn create_backend(kind: BackendKind) -> Box<dyn DocumentBackend> {
    match kind {
        BackendKind::Pdf => Box::new(crate::document_pdf::PdfBackend::new()),
        BackendKind::Recording => Box::new(crate::document_record::RecordingBackend::new()),
    }
}
