//! Server-side filter (ECQL) and style (SLD) text sent to GeoServer.
//!
//! The two filter shapes quote differently. Equality literals double an
//! embedded quote (`O''Brien`), `LIKE` patterns backslash it (`O\'Brien`).
//! Both conventions are relied upon by the layers we query.

/// Doubles single quotes for a plain ECQL string literal.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Backslash-escapes a value placed inside a `LIKE` pattern.
pub fn escape_like(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// `field = 'value'`
pub fn equals(field: &str, value: &str) -> String {
    format!("{} = '{}'", field, escape_literal(value))
}

/// `field LIKE '%a%' OR field LIKE '%b%'`, one term per non-empty name.
/// `None` when there is nothing to match.
pub fn contains_any(field: &str, names: &[String]) -> Option<String> {
    let terms: Vec<String> = names
        .iter()
        .filter(|n| !n.is_empty())
        .map(|n| format!("{} LIKE '%{}%'", field, escape_like(n)))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn sld(layer: &str, symbolizer: &str) -> String {
    format!(
        concat!(
            r#"<StyledLayerDescriptor version="1.0.0" xmlns="http://www.opengis.net/sld" "#,
            r#"xmlns:ogc="http://www.opengis.net/ogc">"#,
            "<NamedLayer><Name>{}</Name><UserStyle><FeatureTypeStyle><Rule>{}</Rule>",
            "</FeatureTypeStyle></UserStyle></NamedLayer></StyledLayerDescriptor>"
        ),
        escape_xml(layer),
        symbolizer
    )
}

/// Red circle markers.
pub fn point_style(layer: &str) -> String {
    sld(
        layer,
        concat!(
            "<PointSymbolizer><Graphic><Mark><WellKnownName>circle</WellKnownName>",
            r#"<Fill><CssParameter name="fill">#E04A3F</CssParameter></Fill>"#,
            r#"<Stroke><CssParameter name="stroke">#FFFFFF</CssParameter></Stroke>"#,
            "</Mark><Size>10</Size></Graphic></PointSymbolizer>"
        ),
    )
}

/// Translucent orange fill with a solid outline.
pub fn polygon_style(layer: &str) -> String {
    sld(
        layer,
        concat!(
            "<PolygonSymbolizer>",
            r#"<Fill><CssParameter name="fill">#F28C28</CssParameter>"#,
            r#"<CssParameter name="fill-opacity">0.35</CssParameter></Fill>"#,
            r#"<Stroke><CssParameter name="stroke">#C0561A</CssParameter>"#,
            r#"<CssParameter name="stroke-width">1.5</CssParameter></Stroke>"#,
            "</PolygonSymbolizer>"
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// True when every quote inside the outer `'...'` is escaped by `escape`.
    fn quotes_balanced(literal: &str, doubled: bool) -> bool {
        let inner = &literal[1..literal.len() - 1];
        let chars: Vec<char> = inner.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '\'' if doubled => {
                    if chars.get(i + 1) != Some(&'\'') {
                        return false;
                    }
                    i += 2;
                }
                '\\' if !doubled => i += 2,
                '\'' => return false,
                _ => i += 1,
            }
        }
        true
    }

    #[test]
    fn equality_filter_doubles_quotes() {
        let expr = equals("member", "O'Brien");
        assert_eq!(expr, "member = 'O''Brien'");
        let literal = expr.trim_start_matches("member = ");
        assert!(quotes_balanced(literal, true));
    }

    #[test]
    fn like_filter_backslashes_quotes() {
        let expr = contains_any("name", &["O'Brien".to_string()]).unwrap();
        assert_eq!(expr, r"name LIKE '%O\'Brien%'");
        let literal = expr.trim_start_matches("name LIKE ");
        assert!(quotes_balanced(literal, false));
    }

    #[test]
    fn like_filter_cannot_be_closed_by_trailing_backslash() {
        let expr = contains_any("name", &[r"x\' OR 1=1 OR name LIKE '".to_string()]).unwrap();
        let literal = expr.trim_start_matches("name LIKE ");
        assert!(quotes_balanced(literal, false));
    }

    #[test]
    fn like_terms_are_or_joined() {
        let names = vec!["广东".to_string(), String::new(), "广西".to_string()];
        assert_eq!(
            contains_any("name", &names).unwrap(),
            "name LIKE '%广东%' OR name LIKE '%广西%'"
        );
        assert!(contains_any("name", &[]).is_none());
    }

    #[test]
    fn styles_name_the_layer() {
        let style = polygon_style("travel:provinces");
        assert!(style.starts_with("<StyledLayerDescriptor"));
        assert!(style.contains("<Name>travel:provinces</Name>"));
        assert!(style.contains("PolygonSymbolizer"));
        assert!(point_style("a<b").contains("<Name>a&lt;b</Name>"));
    }
}
