use super::*;

fn close(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() < 1e-6 && (a.y - b.y).abs() < 1e-6
}

#[test]
fn corners_map_to_viewport_corners() {
    let view = MapViewport::default();
    assert!(close(view.project(-33.8850, 151.1950), Point { x: 50.0, y: 75.0 }));
    assert!(close(view.project(-33.8800, 151.2000), Point { x: 350.0, y: 375.0 }));
}

#[test]
fn center_maps_to_middle() {
    let view = MapViewport::default();
    assert!(close(view.project(-33.8825, 151.1975), Point { x: 200.0, y: 225.0 }));
}

#[test]
fn outside_points_are_clamped() {
    let view = MapViewport::default();
    // Central Station sits well north-east of the campus box.
    assert!(close(view.project(-33.8688, 151.2093), Point { x: 350.0, y: 375.0 }));
    assert!(close(view.project(-34.0, 151.0), Point { x: 50.0, y: 75.0 }));
    assert!(!view.contains(-33.8688, 151.2093));
    assert!(view.contains(-33.8825, 151.1975));
}
