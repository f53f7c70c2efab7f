use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::{
    error::{CalqueError, CalqueResult},
    model::{AttachmentKind, Surface},
};

/// What annotations are positioned against: either the reference plan as a
/// raster (with its pixel dimensions, used for clamping), or an existing
/// template document for generation to draw over.
#[derive(Clone, Debug)]
pub enum BaseSurface {
    Image {
        surface: Surface,
        bytes: Vec<u8>,
    },
    Template {
        bytes: Vec<u8>,
    },
}

impl BaseSurface {
    pub fn surface(&self) -> Option<&Surface> {
        match self {
            Self::Image { surface, .. } => Some(surface),
            Self::Template { .. } => None,
        }
    }
}

/// Resolves a reference key to a base surface. IO lives behind this seam;
/// the geometry engine and the compositor never touch the filesystem.
pub trait SurfaceProvider {
    fn load(&self, key: &str) -> CalqueResult<BaseSurface>;
}

/// Filesystem provider rooted at a directory. `.pdf` keys load as
/// templates; raster keys are decoded for their pixel dimensions. A missing
/// or unreadable base is fatal for generation.
#[derive(Clone, Debug)]
pub struct FsSurfaceProvider {
    root: PathBuf,
}

impl FsSurfaceProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, key: &str) -> CalqueResult<Vec<u8>> {
        let path = self.root.join(key);
        if !path.is_file() {
            return Err(CalqueError::template_not_found(format!(
                "base surface '{}' does not exist",
                path.display()
            )));
        }
        let bytes = std::fs::read(&path)
            .with_context(|| format!("read base surface '{}'", path.display()))?;
        Ok(bytes)
    }
}

impl SurfaceProvider for FsSurfaceProvider {
    fn load(&self, key: &str) -> CalqueResult<BaseSurface> {
        let bytes = self.read(key)?;
        match kind_for_path(key) {
            AttachmentKind::Pdf => Ok(BaseSurface::Template { bytes }),
            AttachmentKind::Png | AttachmentKind::Jpeg => {
                let (width, height) = image::load_from_memory(&bytes)
                    .map(|img| (f64::from(img.width()), f64::from(img.height())))
                    .map_err(|e| {
                        CalqueError::template_not_found(format!(
                            "base surface '{key}' could not be decoded: {e}"
                        ))
                    })?;
                Ok(BaseSurface::Image {
                    surface: Surface::new(width, height)?,
                    bytes,
                })
            }
            AttachmentKind::Unknown => Err(CalqueError::template_not_found(format!(
                "base surface '{key}' has an unsupported extension"
            ))),
        }
    }
}

/// MIME-by-extension mapping used for surface keys and photo sources.
pub fn kind_for_path(path: impl AsRef<Path>) -> AttachmentKind {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(AttachmentKind::from_extension)
        .unwrap_or(AttachmentKind::Unknown)
}
