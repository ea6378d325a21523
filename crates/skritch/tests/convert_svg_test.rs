use skritch::{Converter, FillKind, Options};

fn convert(svg: &str, options: Options) -> String {
    Converter::new(options)
        .expect("construct ok")
        .convert_str(svg)
        .expect("convert ok")
}

#[test]
fn conversion_is_deterministic_for_a_fixed_seed() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100">
        <rect x="10" y="10" width="50" height="30" fill="red" stroke="black"/>
        <circle cx="70" cy="70" r="15" fill="none" stroke="blue"/>
        </svg>"#;
    let options = Options {
        seed: 7,
        ..Default::default()
    };
    let a = convert(svg, options.clone());
    let b = convert(svg, options);
    assert_eq!(a, b, "same seed must reproduce the same sketch");

    let c = convert(
        svg,
        Options {
            seed: 8,
            ..Default::default()
        },
    );
    assert_ne!(a, c, "a different seed must perturb the sketch");
}

#[test]
fn output_document_shape() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20">
        <rect width="40" height="20" fill="black"/>
        </svg>"#;
    let out = convert(svg, Options::default());
    assert!(out.starts_with("<svg "), "got {out}");
    assert!(out.contains(r#"xmlns="http://www.w3.org/2000/svg""#));
    assert!(out.contains(r#"width="40""#));
    assert!(out.contains(r#"height="20""#));
    assert!(out.contains("<path"), "sketched layers are paths: {out}");
}

#[test]
fn background_color_fills_the_canvas_first() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"/>"#;
    let out = convert(
        svg,
        Options {
            background_color: Some("#fffff0".to_string()),
            ..Default::default()
        },
    );
    let rect_at = out.find(r#"fill="#fffff0""#).expect("background rect present");
    let content_at = out.find("<g").expect("content group present");
    assert!(rect_at < content_at, "background paints before content: {out}");
}

#[test]
fn pencil_filter_wraps_the_content_group() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg"><rect width="5" height="5"/></svg>"#;
    let out = convert(
        svg,
        Options {
            pencil_filter: true,
            ..Default::default()
        },
    );
    assert!(out.contains(r#"<filter id="pencilTextureFilter""#), "got {out}");
    assert!(out.contains(r#"filter="url(#pencilTextureFilter)""#));
    assert!(out.contains("feTurbulence"));
}

#[test]
fn clip_paths_flatten_into_output_defs() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
        <defs><clipPath id="c"><rect x="0" y="0" width="20" height="20"/></clipPath></defs>
        <circle cx="10" cy="10" r="8" clip-path="url(#c)" fill="red"/>
        </svg>"#;
    let out = convert(svg, Options::default());
    assert!(out.contains(r#"<clipPath id="skritch-clip-1">"#), "got {out}");
    assert!(out.contains(r#"clip-path="url(#skritch-clip-1)""#));
}

#[test]
fn missing_clip_reference_fails_open() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
        <circle cx="10" cy="10" r="8" clip-path="url(#missing)" fill="red"/>
        </svg>"#;
    let out = convert(svg, Options::default());
    assert!(!out.contains("<clipPath"), "no clip emitted: {out}");
    assert!(out.contains("<path"), "shape still draws unclipped: {out}");
}

#[test]
fn unsupported_clip_children_discard_the_empty_clip() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
        <defs><clipPath id="c"><text>nope</text></clipPath></defs>
        <rect width="10" height="10" clip-path="url(#c)" fill="red"/>
        </svg>"#;
    let out = convert(svg, Options::default());
    assert!(
        !out.contains("<clipPath"),
        "an all-unsupported clip must be discarded, not emitted empty: {out}"
    );
    assert!(out.contains("<path"), "shape still draws: {out}");
}

#[test]
fn gradients_flatten_to_one_solid_paint() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
        <defs>
          <linearGradient id="grad">
            <stop offset="0%" stop-color="red"/>
            <stop offset="100%" stop-color="blue"/>
          </linearGradient>
        </defs>
        <rect width="60" height="60" fill="url(#grad)"/>
        </svg>"#;
    let out = convert(svg, Options::default());

    // One self-average of red, ten copies of the red/blue average, reduced
    // by quadratic mean per channel.
    let r = ((255.0_f64.powi(2) + 10.0 * 128.0_f64.powi(2)) / 11.0).sqrt().round() as u8;
    let b = ((10.0 * 128.0_f64.powi(2)) / 11.0).sqrt().round() as u8;
    let expected = format!("#{r:02x}00{b:02x}");
    assert!(out.contains(&expected), "expected {expected} in {out}");
    assert!(!out.contains("linearGradient"), "gradient is not carried over");
}

#[test]
fn pattern_paint_emits_a_proxy_shape_and_copies_the_definition() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
        <defs>
          <pattern id="pat" width="8" height="8">
            <circle cx="4" cy="4" r="2" fill="black"/>
          </pattern>
        </defs>
        <rect width="40" height="40" fill="url(#pat)" stroke="green"/>
        </svg>"#;
    let out = convert(svg, Options::default());
    assert!(out.contains(r#"<pattern"#), "pattern definition copied: {out}");
    assert!(
        out.contains(r#"fill="url(#pat)""#),
        "proxy shape painted only with the pattern: {out}"
    );
}

#[test]
fn solid_fill_style_draws_without_hachure_layers() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
        <rect width="30" height="30" fill="#123456" stroke="none"/>
        </svg>"#;
    let out = convert(
        svg,
        Options {
            fill_style: FillKind::Solid,
            randomize: false,
            seed: 3,
            ..Default::default()
        },
    );
    assert!(out.contains(r#"fill="#123456""#), "solid fill layer: {out}");
}

#[test]
fn embedded_svg_data_urls_re_enter_the_interpreter() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
        <image x="5" y="5" href="data:image/svg+xml,%3Csvg xmlns='http://www.w3.org/2000/svg'%3E%3Crect width='10' height='10' fill='red'/%3E%3C/svg%3E"/>
        </svg>"#;
    let out = convert(svg, Options::default());
    assert!(
        !out.contains("<image"),
        "embedded svg is interpreted, not passed through: {out}"
    );
    assert!(out.contains("<path"), "embedded rect is sketched: {out}");
}

#[test]
fn raster_images_pass_through_untouched() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
        <image x="1" y="2" width="10" height="10" href="data:image/png;base64,AAAA"/>
        </svg>"#;
    let out = convert(svg, Options::default());
    assert!(out.contains("<image"), "raster image placed as-is: {out}");
    assert!(out.contains("data:image/png;base64,AAAA"));
}

#[test]
fn text_is_re_hosted_with_the_font_override() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
        <text x="5" y="20" font-family="serif" fill="navy">hello</text>
        </svg>"#;
    let out = convert(svg, Options::default());
    assert!(out.contains("<text"), "text clone present: {out}");
    assert!(out.contains("hello"));
    assert!(
        out.contains("Comic Sans MS, cursive"),
        "default font override applies: {out}"
    );

    let kept = convert(
        svg,
        Options {
            font_family: None,
            ..Default::default()
        },
    );
    assert!(kept.contains("serif"), "without override the original family stays: {kept}");
}

#[test]
fn inline_style_rules_reach_paint_resolution() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
        <style>.warm { fill: #aa0000; }</style>
        <path class="warm" d="M0 0 L10 0 L10 10 Z"/>
        </svg>"#;
    let out = convert(svg, Options::default());
    assert!(out.contains("#aa0000"), "rule-driven fill resolved: {out}");
}
