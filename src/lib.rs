#![forbid(unsafe_code)]

pub mod compose;
pub mod document;
pub mod document_pdf;
pub mod document_record;
pub mod error;
pub mod findings;
pub mod geometry;
pub mod model;
pub mod request;
pub mod store;
pub mod surface;

pub use compose::{BaseDocument, LayoutMetrics, SkippedAttachment, compose_findings, compose_session};
pub use document::{
    BackendKind, DEFAULT_PAGE, DocumentBackend, EmbeddedImage, PageSize, RasterFormat,
    TextOptions, create_backend,
};
pub use document_pdf::PdfBackend;
pub use document_record::{RecordedBase, RecordedDocument, RecordedOp, RecordedPage, RecordingBackend};
pub use error::{CalqueError, CalqueResult};
pub use findings::{
    ExpertiseFindings, Findings, FormSubmission, MaterialRow, Mode, SupervisionFindings,
};
pub use geometry::{DrawTool, FormTarget, GestureEngine, GestureEvent, GestureState, HIT_RADIUS};
pub use model::{Annotation, AttachmentKind, PhotoAttachment, Severity, Surface, Zone};
pub use request::{GenerateRequest, GeneratedDocument, generate};
pub use store::{PersistedPoint, PersistedSession, Session, SessionSnapshot};
pub use surface::{BaseSurface, FsSurfaceProvider, SurfaceProvider, kind_for_path};
