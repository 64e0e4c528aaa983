use knifetrack_rs::tracker::IdAllocator;
use knifetrack_rs::tracker::{match_or_create, propagate_tracks, PyramidalLk};
use knifetrack_rs::{
    Detection, FlowPropagator, LkParams, MatchPolicy, Rect, StrategyKind, TrackMap, TrackedObject,
    TrackerConfig, TrackingSession,
};
use ndarray::Array2;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn session(strategy: StrategyKind) -> TrackingSession {
    TrackingSession::new(TrackerConfig::with_strategy(strategy)).unwrap()
}

fn blob_frame(size: usize, cx: f32, cy: f32) -> Array2<u8> {
    Array2::from_shape_fn((size, size), |(y, x)| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        (220.0 * (-(dx * dx + dy * dy) / 72.0).exp() + 20.0) as u8
    })
}

#[test]
fn test_strategies_diverge_on_second_frame() {
    init_tracing();
    let frame1 = vec![
        Detection::from_tlwh(0.0, 0.0, 20.0, 20.0, 0.9),
        Detection::from_tlwh(100.0, 100.0, 20.0, 20.0, 0.9),
        Detection::from_tlwh(200.0, 200.0, 20.0, 20.0, 0.9),
    ];
    let frame2 = vec![Detection::from_tlwh(2.0, 2.0, 20.0, 20.0, 0.9)];
    assert!(frame2[0].bbox.iou(&frame1[0].bbox) > 0.5);

    // Persistent matching keeps id 1 for the moved object.
    let mut persistent = session(StrategyKind::Persistent);
    let report = persistent.process_frame(&frame1, None).unwrap();
    assert!(report.has_detections);
    assert_eq!(report.detections.iter().map(|d| d.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(report.newly_seen_ids, vec![1, 2, 3]);

    let report = persistent.process_frame(&frame2, None).unwrap();
    assert_eq!(report.detections[0].id, 1);
    assert!(!report.detections[0].is_new_track);
    assert!(report.newly_seen_ids.is_empty());
    assert_eq!(report.tracks.len(), 3);

    // Per-frame numbering opens a fresh track 1 every frame.
    let mut per_frame = session(StrategyKind::PerFrame);
    let report = per_frame.process_frame(&frame1, None).unwrap();
    assert_eq!(report.detections.iter().map(|d| d.id).collect::<Vec<_>>(), vec![1, 2, 3]);

    let report = per_frame.process_frame(&frame2, None).unwrap();
    assert_eq!(report.detections[0].id, 1);
    assert!(report.detections[0].is_new_track);
    assert_eq!(report.newly_seen_ids, vec![1]);
    assert!(report.should_alert());
    assert_eq!(report.tracks.len(), 1);
}

#[test]
fn test_alert_only_on_first_sighting() {
    let mut session = session(StrategyKind::Persistent);
    let det = Detection::new(10.0, 10.0, 50.0, 50.0, 0.9);

    let n = session.process_frame(&[det], None).unwrap();
    assert_eq!(n.newly_seen_ids, vec![1]);
    assert!(n.should_alert());

    let n1 = session
        .process_frame(&[Detection::new(12.0, 12.0, 50.0, 50.0, 0.9)], None)
        .unwrap();
    assert_eq!(n1.detections[0].id, 1);
    assert!(n1.newly_seen_ids.is_empty());
    assert!(!n1.should_alert());
}

#[test]
fn test_match_or_create_on_public_api() {
    let mut ids = IdAllocator::new();
    let mut tracks = TrackMap::new();

    let first = match_or_create(&Rect::new(10.0, 10.0, 50.0, 50.0), &tracks, &mut ids, 0.5);
    assert_eq!(first.id, 1);
    assert_eq!(ids.peek(), 2);
    tracks.insert(TrackedObject::new(first.id, Rect::new(10.0, 10.0, 50.0, 50.0), 0.9, 1));

    let second = match_or_create(&Rect::new(12.0, 12.0, 50.0, 50.0), &tracks, &mut ids, 0.5);
    assert_eq!(second.id, 1);
    assert!(!second.created);
    assert_eq!(ids.peek(), 2);
}

#[test]
fn test_first_match_follows_insertion_order() {
    let mut session = session(StrategyKind::Persistent);
    // Overlapping boxes in one frame collapse onto the first track.
    session
        .process_frame(
            &[
                Detection::new(0.0, 0.0, 100.0, 100.0, 0.9),
                Detection::new(4.0, 4.0, 100.0, 100.0, 0.9),
            ],
            None,
        )
        .unwrap();
    assert_eq!(session.tracks().ids(), vec![1]);

    let config = TrackerConfig {
        match_policy: MatchPolicy::BestIou,
        ..TrackerConfig::default()
    };
    let mut best = TrackingSession::new(config).unwrap();
    let report = best
        .process_frame(
            &[
                Detection::new(0.0, 0.0, 100.0, 100.0, 0.9),
                Detection::new(4.0, 4.0, 100.0, 100.0, 0.9),
            ],
            None,
        )
        .unwrap();
    assert_eq!(report.detections.iter().map(|d| d.id).collect::<Vec<_>>(), vec![1, 2]);
    let report = best
        .process_frame(&[Detection::new(5.0, 5.0, 100.0, 100.0, 0.9)], None)
        .unwrap();
    assert_eq!(report.detections[0].id, 2);
}

#[test]
fn test_flow_failure_terminates_track() {
    init_tracing();
    let mut tracks = TrackMap::new();
    tracks.insert(TrackedObject::from_history(1, vec![(30.0, 30.0)], 1));
    tracks.insert(TrackedObject::from_history(2, vec![(80.0, 80.0)], 1));

    let textured_left = blob_frame(96, 30.0, 30.0);
    let mut propagator = FlowPropagator::new(LkParams::default());
    let tracks = propagator.propagate(&tracks, textured_left.view()).unwrap();
    let tracks = propagator.propagate(&tracks, textured_left.view()).unwrap();

    // Track 2 sits on a flat region and is dropped.
    assert_eq!(tracks.ids(), vec![1]);

    // The object now shows up where track 2 used to be; propagation alone
    // never brings the identifier back.
    let both = {
        let mut frame = blob_frame(96, 30.0, 30.0);
        frame.zip_mut_with(&blob_frame(96, 80.0, 80.0), |a, &b| *a = (*a).max(b));
        frame
    };
    let tracks = propagator.propagate(&tracks, both.view()).unwrap();
    let tracks = propagator.propagate(&tracks, both.view()).unwrap();
    assert_eq!(tracks.ids(), vec![1]);
    assert_eq!(tracks.get(1).unwrap().history.len(), 4);
}

#[test]
fn test_propagation_never_creates_ids() {
    let lk = PyramidalLk::new(LkParams::default());
    let prev = blob_frame(64, 30.0, 30.0);
    let next = blob_frame(64, 31.0, 30.0);
    let moved = propagate_tracks(&lk, prev.view(), next.view(), TrackMap::new(), None);
    assert!(moved.is_empty());
}

#[test]
fn test_flow_assisted_session_keeps_fast_object() {
    init_tracing();
    let mut session = session(StrategyKind::FlowAssisted);
    let f1 = blob_frame(64, 24.0, 30.0);
    let f2 = blob_frame(64, 30.0, 30.0);

    let r1 = session
        .process_frame(&[Detection::new(18.0, 24.0, 30.0, 36.0, 0.9)], Some(f1.view()))
        .unwrap();
    assert_eq!(r1.newly_seen_ids, vec![1]);

    let r2 = session
        .process_frame(&[Detection::new(24.0, 24.0, 36.0, 36.0, 0.9)], Some(f2.view()))
        .unwrap();
    assert_eq!(r2.detections[0].id, 1);
    assert!(r2.newly_seen_ids.is_empty());
    assert_eq!(session.finish().objects_alerted, 1);
}

#[test]
fn test_sessions_are_isolated() {
    let det = Detection::new(0.0, 0.0, 20.0, 20.0, 0.9);
    let mut a = session(StrategyKind::Persistent);
    let mut b = session(StrategyKind::Persistent);

    assert_eq!(a.process_frame(&[det], None).unwrap().newly_seen_ids, vec![1]);
    // The same identifier alerts again in another session.
    assert_eq!(b.process_frame(&[det], None).unwrap().newly_seen_ids, vec![1]);
    assert!(a.process_frame(&[det], None).unwrap().newly_seen_ids.is_empty());
}

#[test]
fn test_session_moves_across_threads() {
    let mut session = session(StrategyKind::FlowAssisted);
    let handle = std::thread::spawn(move || {
        session
            .process_frame(&[Detection::new(0.0, 0.0, 20.0, 20.0, 0.9)], None)
            .unwrap()
            .newly_seen_ids
    });
    assert_eq!(handle.join().unwrap(), vec![1]);
}
