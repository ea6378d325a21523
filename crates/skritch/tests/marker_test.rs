use skritch::{Converter, Options, Sketch, SketchEngine, StyleConfig};
use std::sync::{Arc, Mutex};

/// Records only the rectangle calls produced by marker content, which is
/// enough to count placed marker instances and observe their positions.
#[derive(Debug, Default)]
struct MarkerRecorder {
    rects: Mutex<Vec<(f64, f64)>>,
    other: Mutex<usize>,
}

impl SketchEngine for MarkerRecorder {
    fn circle(&self, _cx: f64, _cy: f64, _d: f64, _style: &StyleConfig) -> Sketch {
        *self.other.lock().expect("lock") += 1;
        Sketch::default()
    }
    fn ellipse(&self, _cx: f64, _cy: f64, _w: f64, _h: f64, _style: &StyleConfig) -> Sketch {
        *self.other.lock().expect("lock") += 1;
        Sketch::default()
    }
    fn rectangle(&self, x: f64, y: f64, _w: f64, _h: f64, _style: &StyleConfig) -> Sketch {
        self.rects.lock().expect("lock").push((x, y));
        Sketch::default()
    }
    fn line(&self, _x1: f64, _y1: f64, _x2: f64, _y2: f64, _style: &StyleConfig) -> Sketch {
        *self.other.lock().expect("lock") += 1;
        Sketch::default()
    }
    fn linear_path(&self, _points: &[skritch::geom::Point], _style: &StyleConfig) -> Sketch {
        *self.other.lock().expect("lock") += 1;
        Sketch::default()
    }
    fn polygon(&self, _points: &[skritch::geom::Point], _style: &StyleConfig) -> Sketch {
        *self.other.lock().expect("lock") += 1;
        Sketch::default()
    }
    fn path(&self, d: &str, _style: &StyleConfig) -> Sketch {
        // Rotated marker rects arrive as reconstructed paths; recover the
        // first point so orientation remains observable.
        if let Some(origin) = parse_first_point(d) {
            self.rects.lock().expect("lock").push(origin);
        } else {
            *self.other.lock().expect("lock") += 1;
        }
        Sketch::default()
    }
}

fn parse_first_point(d: &str) -> Option<(f64, f64)> {
    let rest = d.strip_prefix('M')?;
    let mut it = rest.split_whitespace();
    let x = it.next()?.parse::<f64>().ok()?;
    let y = it.next()?.parse::<f64>().ok()?;
    Some((x, y))
}

fn rect_positions(svg: &str) -> Vec<(f64, f64)> {
    let recorder = Arc::new(MarkerRecorder::default());
    let converter = Converter::new(Options::default())
        .expect("construct ok")
        .with_sketcher(recorder.clone());
    converter.convert_str(svg).expect("convert ok");
    let out = recorder.rects.lock().expect("lock").clone();
    out
}

const MARKER_DEF: &str = r#"<marker id="m" markerUnits="userSpaceOnUse" markerWidth="4" markerHeight="4">
    <rect width="2" height="2"/>
  </marker>"#;

#[test]
fn mid_markers_skip_first_and_last_vertices() {
    let svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg"><defs>{MARKER_DEF}</defs>
        <polyline points="0,0 10,0 10,10" fill="none" stroke="black" marker-mid="url(#m)"/>
        </svg>"#
    );
    let rects = rect_positions(&svg);
    assert_eq!(rects.len(), 1, "three vertices have one interior, got {rects:?}");
}

#[test]
fn two_point_polyline_places_no_mid_markers() {
    let svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg"><defs>{MARKER_DEF}</defs>
        <polyline points="0,0 10,0" fill="none" stroke="black" marker-mid="url(#m)"/>
        </svg>"#
    );
    assert!(rect_positions(&svg).is_empty());
}

#[test]
fn closing_segment_of_a_polygon_is_visible_to_mid_markers() {
    // Triangle: the duplicated closing vertex makes both non-terminal
    // vertices interior.
    let svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg"><defs>{MARKER_DEF}</defs>
        <polygon points="0,0 10,0 5,8" fill="none" stroke="black" marker-mid="url(#m)"/>
        </svg>"#
    );
    let rects = rect_positions(&svg);
    assert_eq!(rects.len(), 2, "got {rects:?}");
}

#[test]
fn start_and_end_markers_place_once_each() {
    let svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg"><defs>{MARKER_DEF}</defs>
        <line x1="0" y1="0" x2="20" y2="0" stroke="black"
              marker-start="url(#m)" marker-end="url(#m)"/>
        </svg>"#
    );
    let rects = rect_positions(&svg);
    assert_eq!(rects.len(), 2, "got {rects:?}");
    // userSpaceOnUse keeps the unit scale: rect origins land on the
    // vertices themselves.
    assert!(rects.iter().any(|(x, _)| (*x - 0.0).abs() < 1e-9));
    assert!(rects.iter().any(|(x, _)| (*x - 20.0).abs() < 1e-9));
}

#[test]
fn missing_marker_reference_degrades_to_no_marker() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
        <line x1="0" y1="0" x2="20" y2="0" stroke="black" marker-end="url(#nope)"/>
        </svg>"#;
    assert!(rect_positions(svg).is_empty());
}

#[test]
fn end_marker_orientation_differs_between_open_and_closed_outlines() {
    // orient="auto" end marker on an open polyline follows the final
    // segment; on a closed triangle it takes the bisector of the closing
    // and first segments. The placed rect origin moves accordingly.
    let oriented_marker = r#"<marker id="m" orient="auto" markerUnits="userSpaceOnUse"
        markerWidth="4" markerHeight="4" refX="0" refY="0">
        <rect x="1" y="0" width="2" height="2"/>
      </marker>"#;

    let open_svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg"><defs>{oriented_marker}</defs>
        <polyline points="0,0 10,0 10,10" fill="none" stroke="black" marker-end="url(#m)"/>
        </svg>"#
    );
    let closed_svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg"><defs>{oriented_marker}</defs>
        <polygon points="0,0 10,0 10,10" fill="none" stroke="black" marker-end="url(#m)"/>
        </svg>"#
    );

    let open_rects = rect_positions(&open_svg);
    let closed_rects = rect_positions(&closed_svg);
    assert_eq!(open_rects.len(), 1);
    assert_eq!(closed_rects.len(), 1);

    // Open: the final segment points straight down, so the offset rect
    // corner (1,0) rotates onto (10, 11). Closed: the marker sits at the
    // closure vertex (0,0) with a bisector orientation instead.
    let (ox, oy) = open_rects[0];
    assert!((ox - 10.0).abs() < 1e-6 && (oy - 11.0).abs() < 1e-6, "got {open_rects:?}");
    let (cx, cy) = closed_rects[0];
    assert!(
        (cx - ox).abs() > 1e-6 || (cy - oy).abs() > 1e-6,
        "closed-path end marker must not reuse the open-path tangent: {closed_rects:?}"
    );
}
