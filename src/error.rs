pub type CalqueResult<T> = Result<T, CalqueError>;

#[derive(thiserror::Error, Debug)]
pub enum CalqueError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    #[error("edit conflict: {0}")]
    EditConflict(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("attachment decode error: {0}")]
    AttachmentDecode(String),

    #[error("sub-document load error: {0}")]
    SubDocumentLoad(String),

    #[error("document error: {0}")]
    Document(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CalqueError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn out_of_bounds(msg: impl Into<String>) -> Self {
        Self::OutOfBounds(msg.into())
    }

    pub fn edit_conflict(msg: impl Into<String>) -> Self {
        Self::EditConflict(msg.into())
    }

    pub fn template_not_found(msg: impl Into<String>) -> Self {
        Self::TemplateNotFound(msg.into())
    }

    pub fn attachment_decode(msg: impl Into<String>) -> Self {
        Self::AttachmentDecode(msg.into())
    }

    pub fn sub_document_load(msg: impl Into<String>) -> Self {
        Self::SubDocumentLoad(msg.into())
    }

    pub fn document(msg: impl Into<String>) -> Self {
        Self::Document(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Whether generation may continue past this error by skipping the
    /// offending attachment. Everything else aborts the whole document.
    pub fn is_recoverable_attachment_error(&self) -> bool {
        matches!(
            self,
            Self::AttachmentDecode(_) | Self::SubDocumentLoad(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            CalqueError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            CalqueError::out_of_bounds("x")
                .to_string()
                .contains("out of bounds:")
        );
        assert!(
            CalqueError::template_not_found("x")
                .to_string()
                .contains("template not found:")
        );
        assert!(
            CalqueError::attachment_decode("x")
                .to_string()
                .contains("attachment decode error:")
        );
        assert!(
            CalqueError::sub_document_load("x")
                .to_string()
                .contains("sub-document load error:")
        );
        assert!(
            CalqueError::edit_conflict("x")
                .to_string()
                .contains("edit conflict:")
        );
    }

    #[test]
    fn attachment_errors_are_recoverable() {
        assert!(CalqueError::attachment_decode("x").is_recoverable_attachment_error());
        assert!(CalqueError::sub_document_load("x").is_recoverable_attachment_error());
        assert!(!CalqueError::template_not_found("x").is_recoverable_attachment_error());
        assert!(!CalqueError::validation("x").is_recoverable_attachment_error());
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = CalqueError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
