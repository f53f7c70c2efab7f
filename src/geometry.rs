use kurbo::{Point, Vec2};

use crate::{
    error::{CalqueError, CalqueResult},
    findings::FormSubmission,
    model::Zone,
    store::Session,
};

/// Hit radius around an annotation's position, in image pixels. Also the
/// displacement below which a drag-and-release still counts as a click.
pub const HIT_RADIUS: f64 = 10.0;

/// Whether pointer-down on empty surface starts a point annotation directly
/// or draws a zone rectangle first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DrawTool {
    #[default]
    Point,
    Zone,
}

/// What the pending findings form will commit to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FormTarget {
    /// A freshly completed gesture; committed via `Session::add`.
    New { position: Point, zone: Option<Zone> },
    /// An existing annotation opened by click; committed via
    /// `Session::update`.
    Existing { index: usize },
}

/// The per-pointer-sequence state machine. One current mode at a time; no
/// independent drawing/dragging/editing flags.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GestureState {
    Idle,
    Drawing {
        origin: Point,
        current: Point,
    },
    Dragging {
        index: usize,
        down: Point,
        grab: Vec2,
        moved: bool,
    },
    PendingForm {
        target: FormTarget,
    },
}

/// What a pointer event resolved to. `Ignored` means no state changed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GestureEvent {
    Ignored,
    DrawStarted,
    DrawUpdated,
    DragStarted { index: usize },
    DragUpdated { index: usize },
    Moved { index: usize },
    FormOpened { target: FormTarget },
}

/// Maps low-level pointer gestures onto annotation geometry, disambiguating
/// "create", "drag to move" and "click to edit" against a [`Session`].
#[derive(Clone, Debug)]
pub struct GestureEngine {
    tool: DrawTool,
    state: GestureState,
}

impl GestureEngine {
    pub fn new(tool: DrawTool) -> Self {
        Self {
            tool,
            state: GestureState::Idle,
        }
    }

    pub fn tool(&self) -> DrawTool {
        self.tool
    }

    pub fn state(&self) -> &GestureState {
        &self.state
    }

    pub fn pending_target(&self) -> Option<FormTarget> {
        match self.state {
            GestureState::PendingForm { target } => Some(target),
            _ => None,
        }
    }

    /// The candidate rectangle while a zone draw is in flight. Extents may
    /// be negative (dragging up/left of the origin).
    pub fn draw_candidate(&self) -> Option<Zone> {
        match self.state {
            GestureState::Drawing { origin, current } => Some(Zone::from_drag(origin, current)),
            _ => None,
        }
    }

    pub fn pointer_down(&mut self, p: Point, session: &Session) -> CalqueResult<GestureEvent> {
        match self.state {
            GestureState::PendingForm { .. } => {
                return Err(CalqueError::edit_conflict(
                    "a findings form is already pending",
                ));
            }
            GestureState::Drawing { .. } | GestureState::Dragging { .. } => {
                // A second pointer cannot start a concurrent gesture.
                return Ok(GestureEvent::Ignored);
            }
            GestureState::Idle => {}
        }

        if !session.surface().contains(p) {
            return Ok(GestureEvent::Ignored);
        }

        if let Some(index) = hit_test(session, p) {
            let grab = session.annotations()[index].position - p;
            self.state = GestureState::Dragging {
                index,
                down: p,
                grab,
                moved: false,
            };
            return Ok(GestureEvent::DragStarted { index });
        }

        match self.tool {
            DrawTool::Zone => {
                self.state = GestureState::Drawing {
                    origin: p,
                    current: p,
                };
                Ok(GestureEvent::DrawStarted)
            }
            DrawTool::Point => {
                let target = FormTarget::New {
                    position: p,
                    zone: None,
                };
                self.state = GestureState::PendingForm { target };
                Ok(GestureEvent::FormOpened { target })
            }
        }
    }

    pub fn pointer_move(&mut self, p: Point, session: &mut Session) -> CalqueResult<GestureEvent> {
        match &mut self.state {
            GestureState::Drawing { current, .. } => {
                *current = session.surface().clamp_point(p);
                Ok(GestureEvent::DrawUpdated)
            }
            GestureState::Dragging {
                index,
                down,
                grab,
                moved,
            } => {
                let index = *index;
                // Below the threshold this is still a click candidate and
                // the geometry must stay untouched.
                if !*moved && (p - *down).hypot() <= HIT_RADIUS {
                    return Ok(GestureEvent::Ignored);
                }
                *moved = true;
                let target = p + *grab;
                session.move_annotation(index, target)?;
                Ok(GestureEvent::DragUpdated { index })
            }
            _ => Ok(GestureEvent::Ignored),
        }
    }

    pub fn pointer_up(&mut self, session: &mut Session) -> CalqueResult<GestureEvent> {
        match self.state {
            GestureState::Drawing { origin, current } => {
                let zone = Zone::from_drag(origin, current).normalized();
                let target = FormTarget::New {
                    position: zone.centroid(),
                    zone: Some(zone),
                };
                self.state = GestureState::PendingForm { target };
                Ok(GestureEvent::FormOpened { target })
            }
            GestureState::Dragging { index, moved, .. } => {
                if moved {
                    self.state = GestureState::Idle;
                    Ok(GestureEvent::Moved { index })
                } else {
                    session.begin_edit(index)?;
                    let target = FormTarget::Existing { index };
                    self.state = GestureState::PendingForm { target };
                    Ok(GestureEvent::FormOpened { target })
                }
            }
            _ => Ok(GestureEvent::Ignored),
        }
    }

    /// Commits the pending form into the session. Returns the index of the
    /// committed annotation.
    pub fn submit(
        &mut self,
        submission: FormSubmission,
        session: &mut Session,
    ) -> CalqueResult<usize> {
        match self.state {
            GestureState::PendingForm {
                target: FormTarget::New { position, zone },
            } => {
                let index = session.len();
                session.add(position, zone, submission)?;
                self.state = GestureState::Idle;
                Ok(index)
            }
            GestureState::PendingForm {
                target: FormTarget::Existing { index },
            } => {
                session.update(index, submission)?;
                session.end_edit();
                self.state = GestureState::Idle;
                Ok(index)
            }
            _ => Err(CalqueError::validation("no findings form is pending")),
        }
    }

    /// Closes the pending form without committing. A newly drawn rectangle
    /// is discarded; an existing annotation is released unchanged.
    pub fn cancel(&mut self, session: &mut Session) {
        if let GestureState::PendingForm {
            target: FormTarget::Existing { .. },
        } = self.state
        {
            session.end_edit();
        }
        self.state = GestureState::Idle;
    }
}

/// Topmost-first hit test: within `HIT_RADIUS` of an annotation's position,
/// or anywhere inside its zone. Later annotations render on top, so they
/// are tested first.
fn hit_test(session: &Session, p: Point) -> Option<usize> {
    for (index, ann) in session.annotations().iter().enumerate().rev() {
        if (ann.position - p).hypot() <= HIT_RADIUS {
            return Some(index);
        }
        if let Some(zone) = &ann.zone
            && zone.contains(p)
        {
            return Some(index);
        }
    }
    None
}
