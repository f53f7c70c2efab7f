use kurbo::{Point, Rect};

use crate::{
    error::{CalqueError, CalqueResult},
    findings::Findings,
};

/// Reference-plan bounds in image-pixel space. Containment is inclusive on
/// all four edges: `0 <= x <= width`, `0 <= y <= height`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Surface {
    pub width: f64,
    pub height: f64,
}

impl Surface {
    pub fn new(width: f64, height: f64) -> CalqueResult<Self> {
        if !(width > 0.0) || !(height > 0.0) {
            return Err(CalqueError::validation(
                "surface width/height must be > 0",
            ));
        }
        Ok(Self { width, height })
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= 0.0 && p.x <= self.width && p.y >= 0.0 && p.y <= self.height
    }

    pub fn clamp_point(&self, p: Point) -> Point {
        Point::new(p.x.clamp(0.0, self.width), p.y.clamp(0.0, self.height))
    }
}

/// Axis-aligned zone bound to an annotation. During a drag the extents may
/// be negative (dragging up/left); a finalized zone always has `x,y` at the
/// top-left corner and `width, height >= 0`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Zone {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Zone {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Raw candidate rectangle between the pointer-down point and the
    /// current pointer position.
    pub fn from_drag(origin: Point, current: Point) -> Self {
        Self {
            x: origin.x,
            y: origin.y,
            width: current.x - origin.x,
            height: current.y - origin.y,
        }
    }

    /// Folds negative extents so `x,y` is the top-left corner.
    pub fn normalized(&self) -> Self {
        let x = if self.width < 0.0 {
            self.x + self.width
        } else {
            self.x
        };
        let y = if self.height < 0.0 {
            self.y + self.height
        } else {
            self.y
        };
        Self {
            x,
            y,
            width: self.width.abs(),
            height: self.height.abs(),
        }
    }

    pub fn is_normalized(&self) -> bool {
        self.width >= 0.0 && self.height >= 0.0
    }

    pub fn centroid(&self) -> Point {
        let n = self.normalized();
        Point::new(n.x + n.width / 2.0, n.y + n.height / 2.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        let n = self.normalized();
        p.x >= n.x && p.x <= n.x + n.width && p.y >= n.y && p.y <= n.y + n.height
    }

    /// Re-centers the zone on `center`, shifted so it never exits the
    /// surface. Extents are unchanged.
    pub fn recentered_within(&self, center: Point, surface: &Surface) -> Self {
        let n = self.normalized();
        let max_x = (surface.width - n.width).max(0.0);
        let max_y = (surface.height - n.height).max(0.0);
        Self {
            x: (center.x - n.width / 2.0).clamp(0.0, max_x),
            y: (center.y - n.height / 2.0).clamp(0.0, max_y),
            width: n.width,
            height: n.height,
        }
    }

    pub fn to_rect(&self) -> Rect {
        let n = self.normalized();
        Rect::new(n.x, n.y, n.x + n.width, n.y + n.height)
    }

    pub fn from_rect(r: Rect) -> Self {
        let r = r.abs();
        Self {
            x: r.x0,
            y: r.y0,
            width: r.width(),
            height: r.height(),
        }
    }
}

/// Ordinal compliance rating. The wire form is the color token the original
/// capture UI stores.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Green,
    LightGreen,
    Orange,
    Red,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::LightGreen => "lightgreen",
            Self::Orange => "orange",
            Self::Red => "red",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attachment payload classification. Unknown kinds are retained in the
/// model and skipped at render time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AttachmentKind {
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "application/pdf")]
    Pdf,
    #[serde(other, rename = "application/octet-stream")]
    Unknown,
}

impl AttachmentKind {
    pub fn from_mime(mime: &str) -> Self {
        match mime {
            "image/png" => Self::Png,
            "image/jpeg" | "image/jpg" => Self::Jpeg,
            "application/pdf" => Self::Pdf,
            _ => Self::Unknown,
        }
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Self::Png,
            "jpg" | "jpeg" => Self::Jpeg,
            "pdf" => Self::Pdf,
            _ => Self::Unknown,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Pdf => "application/pdf",
            Self::Unknown => "application/octet-stream",
        }
    }

    pub fn is_raster(&self) -> bool {
        matches!(self, Self::Png | Self::Jpeg)
    }
}

/// One photo or document attached to an annotation. Payload and description
/// travel together so the photos/descriptions arrays can never drift out of
/// alignment.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PhotoAttachment {
    pub kind: AttachmentKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub bytes: Vec<u8>,
}

impl PhotoAttachment {
    pub fn new(kind: AttachmentKind, description: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            kind,
            description: description.into(),
            bytes,
        }
    }
}

/// A point on the reference surface (optionally bound to a zone) carrying
/// structured findings. `id` is assigned at creation and never mutated,
/// reused, or renumbered by later edits or deletions.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Annotation {
    pub id: u32,
    pub position: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<Zone>,
    #[serde(default)]
    pub severity: Severity,
    pub findings: Findings,
    #[serde(default)]
    pub photos: Vec<PhotoAttachment>,
}

impl Annotation {
    pub fn validate(&self, surface: &Surface) -> CalqueResult<()> {
        if !surface.contains(self.position) {
            return Err(CalqueError::out_of_bounds(format!(
                "annotation {} position ({}, {}) outside surface {}x{}",
                self.id, self.position.x, self.position.y, surface.width, surface.height
            )));
        }
        if let Some(zone) = &self.zone
            && !zone.is_normalized()
        {
            return Err(CalqueError::validation(format!(
                "annotation {} zone has negative extents",
                self.id
            )));
        }
        Ok(())
    }
}
