use skritch::text::DeterministicTextMeasurer;
use skritch::{Options, RenderPass, RoughSketcher};

fn find<'a, 'i>(
    doc: &'a roxmltree::Document<'i>,
    tag: &str,
) -> roxmltree::Node<'a, 'i> {
    doc.descendants()
        .find(|n| n.tag_name().name() == tag)
        .unwrap_or_else(|| panic!("expected <{tag}> in fixture"))
}

#[test]
fn own_attribute_wins_over_ancestors() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
        <g fill="blue"><rect fill="red" width="10" height="10"/></g>
        </svg>"#;
    let doc = roxmltree::Document::parse(svg).expect("parse ok");
    let options = Options::default();
    let sketcher = RoughSketcher;
    let measurer = DeterministicTextMeasurer::default();
    let pass = RenderPass::new(&doc, &options, &sketcher, &measurer).expect("pass ok");

    let rect = find(&doc, "rect");
    assert_eq!(
        pass.effective_attribute(rect, "fill", &None).as_deref(),
        Some("red")
    );
    assert_eq!(
        pass.effective_attribute(rect, "stroke", &None),
        None,
        "no ancestor declares stroke; caller applies the hard default"
    );
}

#[test]
fn inherited_attribute_walks_to_the_nearest_ancestor() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" fill="green">
        <g><g><circle r="5"/></g></g>
        </svg>"#;
    let doc = roxmltree::Document::parse(svg).expect("parse ok");
    let options = Options::default();
    let sketcher = RoughSketcher;
    let measurer = DeterministicTextMeasurer::default();
    let pass = RenderPass::new(&doc, &options, &sketcher, &measurer).expect("pass ok");

    let circle = find(&doc, "circle");
    assert_eq!(
        pass.effective_attribute(circle, "fill", &None).as_deref(),
        Some("green")
    );
}

#[test]
fn opacity_multiplies_along_the_ancestor_chain() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
        <g opacity="0.5"><g opacity="0.5"><rect opacity="2" width="1" height="1"/></g></g>
        </svg>"#;
    let doc = roxmltree::Document::parse(svg).expect("parse ok");
    let options = Options::default();
    let sketcher = RoughSketcher;
    let measurer = DeterministicTextMeasurer::default();
    let pass = RenderPass::new(&doc, &options, &sketcher, &measurer).expect("pass ok");

    let rect = find(&doc, "rect");
    // 2 clamps to 1 per step; 0.5 * 0.5 remains.
    let opacity = pass.effective_opacity(rect, "opacity", &None);
    assert!((opacity - 0.25).abs() < 1e-12, "got {opacity}");
}

#[test]
fn gradient_flattening_is_memoized_under_the_source_id() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
        <defs>
          <linearGradient id="grad">
            <stop offset="0%" stop-color="red"/>
            <stop offset="100%" stop-color="blue"/>
          </linearGradient>
        </defs>
        <rect width="10" height="10" fill="url(#grad)"/>
        </svg>"#;
    let doc = roxmltree::Document::parse(svg).expect("parse ok");
    let options = Options::default();
    let sketcher = RoughSketcher;
    let measurer = DeterministicTextMeasurer::default();
    let mut pass = RenderPass::new(&doc, &options, &sketcher, &measurer).expect("pass ok");

    let gradient = find(&doc, "linearGradient");
    let first = pass
        .flatten_gradient("grad", gradient, 1.0)
        .expect("gradient resolves");

    // The second lookup deliberately passes an unrelated node: a memoized
    // flatten never re-reads the gradient element.
    let rect = find(&doc, "rect");
    let second = pass
        .flatten_gradient("grad", rect, 1.0)
        .expect("memoized result");
    assert_eq!(first, second);
    assert_eq!(first.to_css(), second.to_css());
}

#[test]
fn single_stop_gradient_uses_that_stop_with_requested_opacity() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
        <linearGradient id="g"><stop offset="0" stop-color="#336699"/></linearGradient>
        </svg>"#;
    let doc = roxmltree::Document::parse(svg).expect("parse ok");
    let options = Options::default();
    let sketcher = RoughSketcher;
    let measurer = DeterministicTextMeasurer::default();
    let mut pass = RenderPass::new(&doc, &options, &sketcher, &measurer).expect("pass ok");

    let gradient = find(&doc, "linearGradient");
    let color = pass
        .flatten_gradient("g", gradient, 0.5)
        .expect("gradient resolves");
    assert_eq!(color.r, 0x33);
    assert_eq!(color.g, 0x66);
    assert_eq!(color.b, 0x99);
    assert!((color.a - 0.5).abs() < 1e-12);
}

#[test]
fn stopless_gradient_follows_its_template_reference() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
        <linearGradient id="base"><stop offset="0" stop-color="red"/></linearGradient>
        <linearGradient id="derived" href="#base"/>
        </svg>"#;
    let doc = roxmltree::Document::parse(svg).expect("parse ok");
    let options = Options::default();
    let sketcher = RoughSketcher;
    let measurer = DeterministicTextMeasurer::default();
    let mut pass = RenderPass::new(&doc, &options, &sketcher, &measurer).expect("pass ok");

    let derived = doc
        .descendants()
        .find(|n| n.attribute("id") == Some("derived"))
        .expect("derived gradient");
    let color = pass
        .flatten_gradient("derived", derived, 1.0)
        .expect("template stops resolve");
    assert_eq!((color.r, color.g, color.b), (255, 0, 0));
}
