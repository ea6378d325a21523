//! Restricted inline `<style>` support.
//!
//! Simple selector matching only: `*`, type, `#id`, `.class` and compounds
//! of those. Selectors with combinators or pseudo-classes are skipped. There
//! is no specificity cascade: rules apply in document order and the last
//! declaration wins, with inline `style=""` declarations on top.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default)]
pub struct Selector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Rule {
    selectors: Vec<Selector>,
    declarations: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    rules: Vec<Rule>,
}

fn re_comment() -> &'static Regex {
    static ONCE: OnceLock<Regex> = OnceLock::new();
    ONCE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").unwrap())
}

impl Stylesheet {
    /// Gathers every `<style>` element of the document, in document order.
    pub fn collect(doc: &roxmltree::Document<'_>) -> Self {
        let mut text = String::new();
        for node in doc.descendants() {
            if node.is_element() && node.tag_name().name() == "style" {
                for child in node.children() {
                    if let Some(t) = child.text() {
                        text.push_str(t);
                        text.push('\n');
                    }
                }
            }
        }
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Self {
        let text = re_comment().replace_all(text, "");
        let mut rules = Vec::new();
        for block in text.split('}') {
            let Some((selector_part, declaration_part)) = block.split_once('{') else {
                continue;
            };
            let selector_part = selector_part.trim();
            if selector_part.is_empty() || selector_part.starts_with('@') {
                continue;
            }
            let selectors: Vec<Selector> = selector_part
                .split(',')
                .filter_map(|s| parse_simple_selector(s.trim()))
                .collect();
            if selectors.is_empty() {
                continue;
            }
            let declarations = parse_declarations(declaration_part);
            if declarations.is_empty() {
                continue;
            }
            rules.push(Rule {
                selectors,
                declarations,
            });
        }
        Self { rules }
    }

    /// The cascaded value of `name` for `node`: last matching rule wins,
    /// inline `style=""` wins over all rules. Returns `None` when no CSS
    /// declaration applies (the caller falls back to the raw attribute).
    pub fn declared_value(&self, node: roxmltree::Node<'_, '_>, name: &str) -> Option<String> {
        let mut found = None;
        for rule in &self.rules {
            if !rule.selectors.iter().any(|s| selector_matches(s, node)) {
                continue;
            }
            for (prop, value) in &rule.declarations {
                if prop == name {
                    found = Some(value.clone());
                }
            }
        }
        if let Some(inline) = node.attribute("style") {
            for (prop, value) in parse_declarations(inline) {
                if prop == name {
                    found = Some(value);
                }
            }
        }
        found
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn parse_declarations(text: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for decl in text.split(';') {
        let Some((prop, value)) = decl.split_once(':') else {
            continue;
        };
        let prop = prop.trim();
        let value = value.trim().trim_end_matches("!important").trim();
        if !prop.is_empty() && !value.is_empty() {
            out.push((prop.to_string(), value.to_string()));
        }
    }
    out
}

/// Parses a compound simple selector; anything with combinators or
/// pseudo-selectors is unsupported and yields `None`.
fn parse_simple_selector(s: &str) -> Option<Selector> {
    if s.is_empty() || s.chars().any(|c| c.is_whitespace() || matches!(c, '>' | '+' | '~' | ':' | '[')) {
        return None;
    }
    if s == "*" {
        return Some(Selector::default());
    }
    let mut sel = Selector::default();
    let mut rest = s;
    if !rest.starts_with('#') && !rest.starts_with('.') {
        let end = rest.find(['#', '.']).unwrap_or(rest.len());
        sel.tag = Some(rest[..end].to_string());
        rest = &rest[end..];
    }
    while !rest.is_empty() {
        let marker = rest.as_bytes()[0];
        let body = &rest[1..];
        let end = body.find(['#', '.']).unwrap_or(body.len());
        let token = &body[..end];
        if token.is_empty() {
            return None;
        }
        match marker {
            b'#' => sel.id = Some(token.to_string()),
            b'.' => sel.classes.push(token.to_string()),
            _ => return None,
        }
        rest = &body[end..];
    }
    Some(sel)
}

fn selector_matches(sel: &Selector, node: roxmltree::Node<'_, '_>) -> bool {
    if let Some(tag) = &sel.tag {
        if node.tag_name().name() != tag {
            return false;
        }
    }
    if let Some(id) = &sel.id {
        if node.attribute("id") != Some(id.as_str()) {
            return false;
        }
    }
    if !sel.classes.is_empty() {
        let Some(class_attr) = node.attribute("class") else {
            return false;
        };
        let classes: Vec<&str> = class_attr.split_whitespace().collect();
        if !sel.classes.iter().all(|c| classes.contains(&c.as_str())) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_rect<'a, 'i>(doc: &'a roxmltree::Document<'i>) -> roxmltree::Node<'a, 'i> {
        doc.descendants()
            .find(|n| n.tag_name().name() == "rect")
            .expect("rect present")
    }

    #[test]
    fn last_rule_wins_and_inline_style_overrides() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg">
            <style>rect { fill: red; } .box { fill: green; }</style>
            <rect class="box" width="10" height="10"/>
            </svg>"##;
        let doc = roxmltree::Document::parse(svg).expect("parse ok");
        let sheet = Stylesheet::collect(&doc);
        let rect = first_rect(&doc);
        assert_eq!(sheet.declared_value(rect, "fill").as_deref(), Some("green"));

        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg">
            <style>rect { fill: red; }</style>
            <rect style="fill: blue" width="10" height="10"/>
            </svg>"##;
        let doc = roxmltree::Document::parse(svg).expect("parse ok");
        let sheet = Stylesheet::collect(&doc);
        let rect = first_rect(&doc);
        assert_eq!(sheet.declared_value(rect, "fill").as_deref(), Some("blue"));
    }

    #[test]
    fn combinator_selectors_are_skipped() {
        let sheet = Stylesheet::parse("g > rect { fill: red; } #a.b { stroke: blue; }");
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg"><rect id="a" class="b c"/></svg>"##;
        let doc = roxmltree::Document::parse(svg).expect("parse ok");
        let rect = first_rect(&doc);
        assert_eq!(sheet.declared_value(rect, "fill"), None);
        assert_eq!(sheet.declared_value(rect, "stroke").as_deref(), Some("blue"));
    }
}
