use kurbo::Point;

use crate::{
    error::{CalqueError, CalqueResult},
    findings::{FormSubmission, Mode},
    model::{Annotation, Surface, Zone},
};

/// Single source of truth for one annotation session: the active mode, the
/// reference surface, the ordered annotation collection, and the single
/// "currently editing" slot.
///
/// All operations are synchronous and mutate nothing outside the session.
/// Generation never reads the live session; it reads a [`SessionSnapshot`].
#[derive(Clone, Debug)]
pub struct Session {
    mode: Mode,
    surface: Surface,
    annotations: Vec<Annotation>,
    editing: Option<usize>,
    next_id: u32,
}

impl Session {
    pub fn new(mode: Mode, surface: Surface) -> Self {
        Self {
            mode,
            surface,
            annotations: Vec::new(),
            editing: None,
            next_id: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn editing(&self) -> Option<usize> {
        self.editing
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Appends a new annotation with a freshly assigned id. Fails when the
    /// position leaves the surface or the zone still has negative extents.
    pub fn add(
        &mut self,
        position: Point,
        zone: Option<Zone>,
        submission: FormSubmission,
    ) -> CalqueResult<&Annotation> {
        if !self.surface.contains(position) {
            return Err(CalqueError::out_of_bounds(format!(
                "position ({}, {}) outside surface {}x{}",
                position.x, position.y, self.surface.width, self.surface.height
            )));
        }
        if let Some(zone) = &zone
            && !zone.is_normalized()
        {
            return Err(CalqueError::validation(
                "zone must be normalized before it is stored",
            ));
        }
        if submission.findings.mode() != self.mode {
            return Err(CalqueError::validation(format!(
                "findings mode {:?} does not match session mode {:?}",
                submission.findings.mode(),
                self.mode
            )));
        }

        self.next_id += 1;
        self.annotations.push(Annotation {
            id: self.next_id,
            position,
            zone,
            severity: submission.severity,
            findings: submission.findings,
            photos: submission.photos,
        });
        Ok(self.annotations.last().expect("just pushed"))
    }

    /// Replaces the findings payload of the annotation at `index` in place.
    /// Id, position and zone are untouched.
    pub fn update(&mut self, index: usize, submission: FormSubmission) -> CalqueResult<()> {
        if submission.findings.mode() != self.mode {
            return Err(CalqueError::validation(format!(
                "findings mode {:?} does not match session mode {:?}",
                submission.findings.mode(),
                self.mode
            )));
        }
        let ann = self.annotation_mut(index)?;
        ann.severity = submission.severity;
        ann.findings = submission.findings;
        ann.photos = submission.photos;
        Ok(())
    }

    /// Drag support: moves the annotation towards `position`, clamped to the
    /// surface. A bound zone is re-centered and kept fully inside the
    /// surface; the stored position is the zone's centroid after clamping.
    pub fn move_annotation(&mut self, index: usize, position: Point) -> CalqueResult<()> {
        let surface = self.surface;
        let ann = self.annotation_mut(index)?;
        let target = surface.clamp_point(position);
        match &mut ann.zone {
            Some(zone) => {
                *zone = zone.recentered_within(target, &surface);
                ann.position = zone.centroid();
            }
            None => ann.position = target,
        }
        Ok(())
    }

    /// Removes the annotation and its bound zone in one step. Surviving
    /// annotations keep their ids; the editing slot is repaired to keep
    /// pointing at the same annotation, or cleared if it was the deleted one.
    pub fn delete(&mut self, index: usize) -> CalqueResult<Annotation> {
        if index >= self.annotations.len() {
            return Err(CalqueError::validation(format!(
                "no annotation at index {index}"
            )));
        }
        let removed = self.annotations.remove(index);
        self.editing = match self.editing {
            Some(e) if e == index => None,
            Some(e) if e > index => Some(e - 1),
            other => other,
        };
        Ok(removed)
    }

    /// Clears the whole collection. Irreversible; there is no undo stack.
    /// The id counter restarts with the fresh session.
    pub fn reset(&mut self) {
        self.annotations.clear();
        self.editing = None;
        self.next_id = 0;
    }

    /// Opens the annotation at `index` for editing. At most one annotation
    /// may be open at a time; a second open is rejected until the first one
    /// resolves.
    pub fn begin_edit(&mut self, index: usize) -> CalqueResult<()> {
        if let Some(current) = self.editing {
            return Err(CalqueError::edit_conflict(format!(
                "annotation at index {current} is already open for edit"
            )));
        }
        if index >= self.annotations.len() {
            return Err(CalqueError::validation(format!(
                "no annotation at index {index}"
            )));
        }
        self.editing = Some(index);
        Ok(())
    }

    pub fn end_edit(&mut self) {
        self.editing = None;
    }

    /// Immutable snapshot for document generation: one snapshot, no
    /// concurrent writers during its use.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            mode: self.mode,
            surface: self.surface,
            annotations: self.annotations.clone(),
        }
    }

    fn annotation_mut(&mut self, index: usize) -> CalqueResult<&mut Annotation> {
        let len = self.annotations.len();
        self.annotations
            .get_mut(index)
            .ok_or_else(|| CalqueError::validation(format!("no annotation at index {index} (len {len})")))
    }
}

/// Read-only view of a session, taken at generation time.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionSnapshot {
    pub mode: Mode,
    pub surface: Surface,
    pub annotations: Vec<Annotation>,
}

impl SessionSnapshot {
    pub fn validate(&self) -> CalqueResult<()> {
        for ann in &self.annotations {
            ann.validate(&self.surface)?;
            if ann.findings.mode() != self.mode {
                return Err(CalqueError::validation(format!(
                    "annotation {} findings mode does not match session mode",
                    ann.id
                )));
            }
        }
        Ok(())
    }
}

/// External persistence layout: two parallel arrays keyed by position.
/// `rectangles[i]` is the zone bound to `points[i]`, `None` for a point-only
/// annotation. Index alignment between the arrays is an invariant of the
/// format.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PersistedSession {
    pub mode: Mode,
    pub surface: Surface,
    pub points: Vec<PersistedPoint>,
    pub rectangles: Vec<Option<Zone>>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PersistedPoint {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub severity: crate::model::Severity,
    pub findings: crate::findings::Findings,
    #[serde(default)]
    pub photos: Vec<crate::model::PhotoAttachment>,
}

impl PersistedSession {
    pub fn from_session(session: &Session) -> Self {
        let snapshot = session.snapshot();
        Self::from_snapshot(&snapshot)
    }

    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        let mut points = Vec::with_capacity(snapshot.annotations.len());
        let mut rectangles = Vec::with_capacity(snapshot.annotations.len());
        for ann in &snapshot.annotations {
            points.push(PersistedPoint {
                id: ann.id,
                x: ann.position.x,
                y: ann.position.y,
                severity: ann.severity,
                findings: ann.findings.clone(),
                photos: ann.photos.clone(),
            });
            rectangles.push(ann.zone);
        }
        Self {
            mode: snapshot.mode,
            surface: snapshot.surface,
            points,
            rectangles,
        }
    }

    pub fn into_snapshot(self) -> CalqueResult<SessionSnapshot> {
        if self.points.len() != self.rectangles.len() {
            return Err(CalqueError::validation(format!(
                "points/rectangles length mismatch: {} vs {}",
                self.points.len(),
                self.rectangles.len()
            )));
        }
        let annotations = self
            .points
            .into_iter()
            .zip(self.rectangles)
            .map(|(p, zone)| Annotation {
                id: p.id,
                position: Point::new(p.x, p.y),
                zone,
                severity: p.severity,
                findings: p.findings,
                photos: p.photos,
            })
            .collect();
        let snapshot = SessionSnapshot {
            mode: self.mode,
            surface: self.surface,
            annotations,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Restores a live session. Ids continue above the highest persisted id
    /// so restored sessions never reuse one.
    pub fn into_session(self) -> CalqueResult<Session> {
        let snapshot = self.into_snapshot()?;
        let next_id = snapshot.annotations.iter().map(|a| a.id).max().unwrap_or(0);
        Ok(Session {
            mode: snapshot.mode,
            surface: snapshot.surface,
            annotations: snapshot.annotations,
            editing: None,
            next_id,
        })
    }
}
