//! Placeholder substitution for question templates.
//!
//! Templates use `{name}` placeholders where `name` is an identifier.
//! `{{` and `}}` produce literal braces. A brace that does not open an
//! identifier placeholder (for example inside a JSON example) is kept as-is.

use std::collections::BTreeMap;

use crate::error::CatalogError;

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn segments(template: &str) -> Vec<Segment<'_>> {
    let bytes = template.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => {
                // keep one brace of the escaped pair
                out.push(Segment::Text(&template[start..=i]));
                i += 2;
                start = i;
            }
            b'{' => {
                if let Some(len) = template[i + 1..].find('}') {
                    let name = &template[i + 1..i + 1 + len];
                    if is_identifier(name) {
                        out.push(Segment::Text(&template[start..i]));
                        out.push(Segment::Placeholder(name));
                        i += len + 2;
                        start = i;
                        continue;
                    }
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    out.push(Segment::Text(&template[start..]));
    out
}

/// Names of all placeholders in `template`, in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for segment in segments(template) {
        if let Segment::Placeholder(name) = segment {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// Substitutes every placeholder in `template` from `bindings`.
///
/// `template_name` is only used for error reporting. Bindings that the
/// template does not mention are ignored.
pub fn render(
    template_name: &str,
    template: &str,
    bindings: &BTreeMap<&str, &str>,
) -> Result<String, CatalogError> {
    let mut rendered = String::with_capacity(template.len());
    for segment in segments(template) {
        match segment {
            Segment::Text(text) => rendered.push_str(text),
            Segment::Placeholder(name) => {
                let value =
                    bindings
                        .get(name)
                        .ok_or_else(|| CatalogError::UnresolvedPlaceholder {
                            template: template_name.to_string(),
                            placeholder: name.to_string(),
                        })?;
                rendered.push_str(value);
            }
        }
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings<'a>(pairs: &[(&'a str, &'a str)]) -> BTreeMap<&'a str, &'a str> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_render_substitutes_all_occurrences() {
        let out = render(
            "t",
            "Scene: {description}\nAgain: {description}",
            &bindings(&[("description", "a car")]),
        )
        .expect("render");
        assert_eq!(out, "Scene: a car\nAgain: a car");
    }

    #[test]
    fn test_render_missing_binding_is_error() {
        let err = render("six", "{missing_info} and {distributions}", &bindings(&[("missing_info", "x")]))
            .expect_err("distributions unbound");
        match err {
            CatalogError::UnresolvedPlaceholder {
                template,
                placeholder,
            } => {
                assert_eq!(template, "six");
                assert_eq!(placeholder, "distributions");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_escaped_braces() {
        let out = render("t", "{{literal}} {name}", &bindings(&[("name", "v")])).expect("render");
        assert_eq!(out, "{literal} v");
    }

    #[test]
    fn test_non_identifier_braces_kept() {
        let template = r#"Answer as {"speed": Range(1, 2)} for {object}"#;
        let out = render("t", template, &bindings(&[("object", "car")])).expect("render");
        assert_eq!(out, r#"Answer as {"speed": Range(1, 2)} for car"#);
        assert_eq!(placeholders(template), vec!["object".to_string()]);
    }

    #[test]
    fn test_unclosed_brace_is_literal() {
        let out = render("t", "open { brace", &BTreeMap::new()).expect("render");
        assert_eq!(out, "open { brace");
    }

    #[test]
    fn test_placeholders_deduplicated_in_order() {
        let names = placeholders("{b} {a} {b} {{c}}");
        assert_eq!(names, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_values_are_not_reinterpreted() {
        let out = render("t", "{x}", &bindings(&[("x", "{y}")])).expect("render");
        assert_eq!(out, "{y}");
    }
}
