//! Built-in minifiers for html, css and js.
//!
//! All three go through `minify_html`: stylesheets and scripts are wrapped
//! in a `<style>` / `<script>` element so its embedded css and js minifiers
//! run, then unwrapped again.

use std::borrow::Cow;

// ============================================================================
// Types
// ============================================================================

/// Content type for minification.
pub enum MinifyType<'a> {
    /// HTML content
    Html(&'a [u8]),
    /// Stylesheet content
    Css(&'a [u8]),
    /// Script content
    Js(&'a [u8]),
}

// ============================================================================
// Unified Minify Function
// ============================================================================

/// Minify content based on type.
///
/// Returns `Cow::Borrowed` when minifying would not make the content
/// smaller, so the result is never larger than the input.
pub fn minify(content: MinifyType<'_>) -> Cow<'_, [u8]> {
    let (input, minified) = match content {
        MinifyType::Html(html) => (html, Some(minify_html_inner(html))),
        MinifyType::Css(css) => (css, minify_embedded(css, "style")),
        MinifyType::Js(js) => (js, minify_embedded(js, "script")),
    };

    match minified {
        Some(out) if out.len() < input.len() => Cow::Owned(out),
        _ => Cow::Borrowed(input),
    }
}

// ============================================================================
// Internal Implementation
// ============================================================================

fn cfg() -> minify_html::Cfg {
    let mut cfg = minify_html::Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = false;
    cfg.minify_css = true;
    cfg.minify_js = true;
    cfg.remove_bangs = true;
    cfg.remove_processing_instructions = true;
    cfg
}

/// Minify HTML content using `minify_html` crate.
fn minify_html_inner(html: &[u8]) -> Vec<u8> {
    minify_html::minify(html, &cfg())
}

/// Minify css or js by wrapping it in `<tag>...</tag>`.
///
/// Returns `None` when the code could end the element early (`</tag` or
/// `<!--` inside it) or the element does not survive minification intact.
fn minify_embedded(code: &[u8], tag: &str) -> Option<Vec<u8>> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}");

    let lower = code.to_ascii_lowercase();
    if find(&lower, close.as_bytes()).is_some() || find(&lower, b"<!--").is_some() {
        return None;
    }

    let mut wrapped = Vec::with_capacity(code.len() + open.len() + close.len() + 1);
    wrapped.extend_from_slice(open.as_bytes());
    wrapped.extend_from_slice(code);
    wrapped.extend_from_slice(close.as_bytes());
    wrapped.push(b'>');

    let out = minify_html::minify(&wrapped, &cfg());

    let inner = out.strip_prefix(open.as_bytes())?.strip_suffix(b">")?;
    let inner = inner.strip_suffix(close.as_bytes())?;
    // Exactly one element in, exactly one out.
    if find(&inner.to_ascii_lowercase(), close.as_bytes()).is_some() {
        return None;
    }
    Some(inner.to_vec())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minify_html_basic() {
        let html = b"<html>\n  <head>\n  </head>\n  <body>\n    <p>Hello</p>\n  </body>\n</html>";
        let result = minify(MinifyType::Html(html));
        let result_str = String::from_utf8_lossy(&result);

        assert!(!result_str.contains("\n  "));
        assert!(result_str.contains("<p>Hello</p>"));
    }

    #[test]
    fn test_minify_css() {
        let css = b"body {\n  color: red;\n}\n\n/* note */\n.a {\n  margin: 0px;\n}\n";
        let result = minify(MinifyType::Css(css));
        let result_str = String::from_utf8_lossy(&result);

        assert!(result.len() < css.len());
        assert!(!result_str.contains("<style>"));
        assert!(!result_str.contains("note"));
        assert!(result_str.contains("red"));
    }

    #[test]
    fn test_minify_js_never_larger() {
        let js = b"function add(first, second) {\n    return first + second;\n}\n\nconsole.log(add(1, 2));\n";
        let result = minify(MinifyType::Js(js));

        assert!(result.len() <= js.len());
        assert!(!result.is_empty());
        assert!(!String::from_utf8_lossy(&result).contains("<script>"));
    }

    #[test]
    fn test_minify_already_minimal_is_borrowed() {
        let css = b"a{b:c}";
        let result = minify(MinifyType::Css(css));
        assert!(result.len() <= css.len());

        let empty = minify(MinifyType::Js(b""));
        assert!(matches!(empty, Cow::Borrowed(_)));
    }

    #[test]
    fn test_minify_js_with_closing_tag_is_kept() {
        let js = b"var tag = '</script>';\nfunction hello() {\n    return tag + 1;\n}\nconsole.log(hello());\n";
        let result = minify(MinifyType::Js(js));
        assert_eq!(&result[..], &js[..]);

        let upper = b"var tag = '</SCRIPT >';\n\n\nvar x   =   1;\n";
        assert_eq!(&minify(MinifyType::Js(upper))[..], &upper[..]);
    }

    #[test]
    fn test_minify_css_with_closing_tag_is_kept() {
        let css = b".a::after {\n  content: \"</style>\";\n}\n\n.b {\n  color: red;\n}\n";
        assert_eq!(&minify(MinifyType::Css(css))[..], &css[..]);
    }

    #[test]
    fn test_minify_js_keeps_every_statement() {
        let js = b"var first = 1;\n\nfunction hello(name) {\n    return 'hi ' + name;\n}\n\nconsole.log(hello('a'), first);\n";
        let result = String::from_utf8(minify(MinifyType::Js(js)).into_owned()).unwrap();

        assert!(result.len() <= js.len());
        assert!(result.contains("console.log"), "{result}");
        assert!(result.contains("hi "), "{result}");
    }

    #[test]
    fn test_find() {
        assert_eq!(find(b"<style>a</style>", b"<style>"), Some(0));
        assert_eq!(find(b"<style>a</style>", b"</style"), Some(8));
        assert_eq!(find(b"abc", b"<style>"), None);
    }
}
