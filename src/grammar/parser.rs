//! Parser for the `${(<hint>):<argument>}` back-reference grammar.
//!
//! The parser is total: malformed hints fall back to defaults instead of
//! failing. `None` is returned only when the text is not a `${…}` form at
//! all — a plain string is a plain string, never an error.

use hashbrown::HashMap;

use crate::model::ROOT_TOKEN;
use super::expr::{BackRefExpr, RefKind, BASE_GLOBAL, BASE_ROOT};

/// Whole-string recognizer. True when the text has the `${…}` shape and
/// therefore deserves a `parse` attempt during interpolation.
pub fn is_expression(text: &str) -> bool {
    text.len() > 3 && text.starts_with("${") && text.ends_with('}')
}

/// Parse a back-reference expression.
///
/// Grammar: `${(<hint>):<argument>}` where the hint is an optional
/// semicolon-separated list — first token the kind, later `@key:value`
/// tokens an attribute map. Absent or unrecognized hints default to a
/// variable reference against the global scope.
pub fn parse(text: &str) -> Option<BackRefExpr> {
    if !is_expression(text) {
        return None;
    }
    let inner = &text[2..text.len() - 1];

    // Split off the parenthesized hint, if any. An unterminated hint is
    // malformed, so the whole inner text degrades to an argument.
    let (hint, argument) = match inner.strip_prefix('(') {
        Some(rest) => match rest.split_once("):") {
            Some((hint, arg)) => (Some(hint), arg),
            None => (None, inner),
        },
        None => (None, inner),
    };

    let (kind, attrs) = parse_hint(hint);
    let base = attrs
        .get("base")
        .cloned()
        .unwrap_or_else(|| default_base(kind).to_owned());

    // Leading `../` tokens are consumed left-to-right into parent hops.
    let mut arg = argument;
    let mut parent_hops = 0;
    while let Some(rest) = arg.strip_prefix("../") {
        parent_hops += 1;
        arg = rest;
    }

    // `^` and `@root` both name the root itself: no further navigation.
    let segments = if arg == ROOT_TOKEN || arg == "@root" {
        Vec::new()
    } else {
        arg.split(['.', '/'])
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    };

    Some(BackRefExpr {
        kind,
        base,
        parent_hops,
        segments,
        source: text.to_owned(),
    })
}

/// Scan the hint token list. Unknown kind tokens and malformed attribute
/// pairs are ignored — defaults win.
fn parse_hint(hint: Option<&str>) -> (RefKind, HashMap<String, String>) {
    let mut attrs = HashMap::new();
    let Some(hint) = hint else {
        return (RefKind::Variable, attrs);
    };

    let mut tokens = hint.split(';');
    let kind = match tokens.next().map(str::trim).unwrap_or("") {
        "@path" | "@tree" | "@object" | "@obj" => RefKind::Graph,
        _ => RefKind::Variable,
    };

    for token in tokens {
        let token = token.trim().trim_start_matches('@');
        if let Some((key, value)) = token.split_once(':') {
            attrs.insert(key.to_owned(), value.to_owned());
        }
    }

    (kind, attrs)
}

fn default_base(kind: RefKind) -> &'static str {
    match kind {
        RefKind::Graph => BASE_ROOT,
        RefKind::Variable => BASE_GLOBAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_path_expression() {
        let expr = parse("${(@path;@base:root):a.b.c}").unwrap();
        assert_eq!(expr.kind, RefKind::Graph);
        assert_eq!(expr.base, "root");
        assert_eq!(expr.parent_hops, 0);
        assert_eq!(expr.segments, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_root_self_token() {
        let expr = parse("${(@path;@base:root):^}").unwrap();
        assert!(expr.is_root_base());
        assert!(expr.targets_base());

        // the `@root` spelling normalizes the same way
        let expr = parse("${(@path;@base:root):@root}").unwrap();
        assert!(expr.targets_base());
    }

    #[test]
    fn test_bare_variable() {
        let expr = parse("${name.first}").unwrap();
        assert_eq!(expr.kind, RefKind::Variable);
        assert_eq!(expr.base, "global");
        assert_eq!(expr.segments, vec!["name", "first"]);
    }

    #[test]
    fn test_variable_hints() {
        for text in ["${(@var):x}", "${(@variable):x}", "${(@value):x}", "${():x}"] {
            let expr = parse(text).unwrap();
            assert_eq!(expr.kind, RefKind::Variable, "for {text}");
            assert_eq!(expr.segments, vec!["x"], "for {text}");
        }
    }

    #[test]
    fn test_graph_kind_aliases() {
        for text in ["${(@path):x}", "${(@tree):x}", "${(@object):x}", "${(@obj):x}"] {
            let expr = parse(text).unwrap();
            assert_eq!(expr.kind, RefKind::Graph, "for {text}");
            assert_eq!(expr.base, "root", "for {text}");
        }
    }

    #[test]
    fn test_parent_hops() {
        let expr = parse("${(@path;@base:this):../../x.y}").unwrap();
        assert_eq!(expr.parent_hops, 2);
        assert_eq!(expr.segments, vec!["x", "y"]);
        assert!(expr.is_current_base());
    }

    #[test]
    fn test_slash_delimited_argument() {
        let expr = parse("${(@path):a/b/c}").unwrap();
        assert_eq!(expr.segments, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_malformed_hint_falls_back() {
        // unknown kind token → variable defaults
        let expr = parse("${(@bogus):x}").unwrap();
        assert_eq!(expr.kind, RefKind::Variable);
        assert_eq!(expr.base, "global");

        // attribute without a colon is dropped, not fatal
        let expr = parse("${(@path;@base):x}").unwrap();
        assert_eq!(expr.kind, RefKind::Graph);
        assert_eq!(expr.base, "root");
    }

    #[test]
    fn test_unterminated_hint_degrades_to_argument() {
        let expr = parse("${(abc}").unwrap();
        assert_eq!(expr.kind, RefKind::Variable);
        assert_eq!(expr.segments, vec!["(abc"]);
    }

    #[test]
    fn test_custom_base_attribute() {
        let expr = parse("${(@path;@base:shared):items.0}").unwrap();
        assert_eq!(expr.base, "shared");
        assert_eq!(expr.segments, vec!["items", "0"]);
    }

    #[test]
    fn test_non_expressions() {
        assert!(parse("plain text").is_none());
        assert!(parse("${unterminated").is_none());
        assert!(parse("prefix ${x}").is_none());
        assert!(parse("${}").is_none());
        assert!(!is_expression("{x}"));
    }
}
