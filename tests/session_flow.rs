//! Pointer gestures through to a persisted session and a generated report.

use calque::{
    BaseDocument, DrawTool, Findings, FormSubmission, FormTarget, GestureEngine, GestureEvent,
    MaterialRow, Mode, PersistedSession, RecordingBackend, Session, Severity, SupervisionFindings,
    Surface, compose_session,
};
use kurbo::Point;

fn new_session() -> Session {
    Session::new(Mode::Supervision, Surface::new(1000.0, 750.0).unwrap())
}

fn submission(zone_name: &str) -> FormSubmission {
    FormSubmission {
        severity: Severity::Orange,
        findings: Findings::Supervision(SupervisionFindings {
            zone_name: zone_name.to_string(),
            materials: vec![MaterialRow {
                material: "Brique".to_string(),
                thickness_mm: "50".to_string(),
            }],
            ..SupervisionFindings::default()
        }),
        photos: Vec::new(),
    }
}

#[test]
fn draw_then_edit_then_move_then_report() {
    let mut session = new_session();
    let mut engine = GestureEngine::new(DrawTool::Zone);

    // Draw a zone dragging up-left; the stored rectangle is normalized.
    engine.pointer_down(Point::new(400.0, 300.0), &session).unwrap();
    engine
        .pointer_move(Point::new(300.0, 220.0), &mut session)
        .unwrap();
    let ev = engine.pointer_up(&mut session).unwrap();
    assert!(matches!(
        ev,
        GestureEvent::FormOpened {
            target: FormTarget::New { .. }
        }
    ));
    engine.submit(submission("Mur Ouest"), &mut session).unwrap();

    let ann = &session.annotations()[0];
    let zone = ann.zone.unwrap();
    assert_eq!((zone.x, zone.y), (300.0, 220.0));
    assert_eq!((zone.width, zone.height), (100.0, 80.0));
    assert_eq!(ann.position, Point::new(350.0, 260.0));

    // Click the annotation (tiny wiggle, below the threshold): the form
    // opens for edit and the geometry stays put.
    engine.pointer_down(Point::new(352.0, 261.0), &session).unwrap();
    engine
        .pointer_move(Point::new(354.0, 262.0), &mut session)
        .unwrap();
    let ev = engine.pointer_up(&mut session).unwrap();
    assert_eq!(
        ev,
        GestureEvent::FormOpened {
            target: FormTarget::Existing { index: 0 }
        }
    );
    assert_eq!(session.annotations()[0].position, Point::new(350.0, 260.0));
    engine
        .submit(submission("Mur Ouest (revu)"), &mut session)
        .unwrap();
    assert_eq!(session.annotations()[0].findings.zone_name(), "Mur Ouest (revu)");
    assert_eq!(session.annotations()[0].zone, Some(zone));

    // Drag it well past the threshold: a pure move, no form.
    engine.pointer_down(Point::new(350.0, 260.0), &session).unwrap();
    engine
        .pointer_move(Point::new(500.0, 400.0), &mut session)
        .unwrap();
    let ev = engine.pointer_up(&mut session).unwrap();
    assert_eq!(ev, GestureEvent::Moved { index: 0 });
    assert_eq!(session.editing(), None);
    let moved = &session.annotations()[0];
    assert_eq!(moved.position, Point::new(500.0, 400.0));
    assert_eq!(moved.zone.unwrap().centroid(), moved.position);

    // Persist, restore, and generate the session report.
    let persisted = PersistedSession::from_session(&session);
    let json = serde_json::to_string(&persisted).unwrap();
    let restored: PersistedSession = serde_json::from_str(&json).unwrap();
    let snapshot = restored.into_snapshot().unwrap();

    let mut backend = RecordingBackend::new();
    compose_session(&mut backend, &snapshot, BaseDocument::Blank, None).unwrap();
    let lines = backend.text_lines();
    assert!(lines.contains(&"Point 1"));
    assert!(lines.contains(&"Zone : Mur Ouest (revu)"));
    assert!(lines.contains(&" - Brique, Épaisseur : 50 mm"));
}

#[test]
fn point_sessions_persist_with_aligned_parallel_arrays() {
    let mut session = new_session();
    let mut engine = GestureEngine::new(DrawTool::Point);

    for (x, name) in [(100.0, "A"), (200.0, "B")] {
        engine.pointer_down(Point::new(x, 50.0), &session).unwrap();
        engine.submit(submission(name), &mut session).unwrap();
    }

    // Mixed-in zone annotation.
    let mut zone_engine = GestureEngine::new(DrawTool::Zone);
    zone_engine
        .pointer_down(Point::new(300.0, 300.0), &session)
        .unwrap();
    zone_engine
        .pointer_move(Point::new(340.0, 340.0), &mut session)
        .unwrap();
    zone_engine.pointer_up(&mut session).unwrap();
    zone_engine.submit(submission("C"), &mut session).unwrap();

    let persisted = PersistedSession::from_session(&session);
    assert_eq!(persisted.points.len(), 3);
    assert_eq!(persisted.rectangles.len(), 3);
    assert_eq!(persisted.rectangles[0], None);
    assert_eq!(persisted.rectangles[1], None);
    assert!(persisted.rectangles[2].is_some());

    // Deleting the middle annotation keeps ids and array alignment.
    let mut session = persisted.into_session().unwrap();
    session.delete(1).unwrap();
    let persisted = PersistedSession::from_session(&session);
    let ids: Vec<_> = persisted.points.iter().map(|p| p.id).collect();
    assert_eq!(ids, [1, 3]);
    assert_eq!(persisted.rectangles.len(), 2);
}

#[test]
fn out_of_bounds_gestures_never_touch_the_session() {
    let mut session = new_session();
    let mut engine = GestureEngine::new(DrawTool::Zone);

    let ev = engine
        .pointer_down(Point::new(1200.0, 50.0), &session)
        .unwrap();
    assert_eq!(ev, GestureEvent::Ignored);
    let ev = engine.pointer_up(&mut session).unwrap();
    assert_eq!(ev, GestureEvent::Ignored);
    assert!(session.is_empty());
    assert_eq!(session.editing(), None);
}
