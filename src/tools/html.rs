//! Html finalize transforms: manifest reference rewriting and inlining of
//! local html imports, stylesheets and scripts.

use globset::GlobSet;
use regex::{Captures, Regex};
use rustc_hash::FxHashSet;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

/// Characters that may appear inside a path token.
fn is_path_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-')
}

/// Rewrite every manifest key that appears as a path token in `html` to its
/// hashed name.
///
/// `css/app.css` matches in `href="/css/app.css"` and `href="../css/app.css"`
/// but not in `css/app.css.map` or `mycss/app.css`.
pub fn rewrite_references(html: &str, manifest: &BTreeMap<String, String>) -> String {
    if manifest.is_empty() {
        return html.to_owned();
    }

    let mut keys: Vec<&String> = manifest.keys().filter(|k| !k.is_empty()).collect();
    // Longest first, so `css/app.css` wins over `app.css`.
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let alternation = keys
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    let Ok(re) = Regex::new(&format!(r"(^|[^A-Za-z0-9_.\-])({alternation})")) else {
        return html.to_owned();
    };

    let bytes = html.as_bytes();
    let mut out = String::with_capacity(html.len());
    let mut last = 0;

    for caps in re.captures_iter(html) {
        let Some(key) = caps.get(2) else { continue };
        let end = key.end();

        // Trailing boundary: `app.css.map`, `app.css-old`
        let next = bytes.get(end).copied();
        let after = bytes.get(end + 1).copied();
        let continues = match next {
            Some(b'.') => after.is_some_and(is_path_char),
            Some(b) => is_path_char(b),
            None => false,
        };
        if continues {
            continue;
        }

        out.push_str(&html[last..key.start()]);
        out.push_str(&manifest[key.as_str()]);
        last = end;
    }

    out.push_str(&html[last..]);
    out
}

// ============================================================================
// Inlining
// ============================================================================

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<link[ \t\r\n][^>]*>").unwrap())
}

fn script_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<script[ \t\r\n]([^>]*)>[ \t\r\n]*</script>").unwrap())
}

fn attr_re(name: &str) -> Regex {
    Regex::new(&format!(
        r#"(^|[ \t\r\n]){name}[ \t\r\n]*=[ \t\r\n]*(?:"([^"]*)"|'([^']*)'|([^ \t\r\n"'>]+))"#
    ))
    .unwrap()
}

fn href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| attr_re("href"))
}

fn rel_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| attr_re("rel"))
}

fn src_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| attr_re("src"))
}

/// Value of an attribute matched by one of the `attr_re` patterns.
fn attr<'a>(re: &Regex, tag: &'a str) -> Option<&'a str> {
    let caps = re.captures(tag)?;
    caps.get(2)
        .or_else(|| caps.get(3))
        .or_else(|| caps.get(4))
        .map(|m| m.as_str())
}

fn is_remote(url: &str) -> bool {
    url.starts_with("http:") || url.starts_with("https:") || url.starts_with("//") || url.starts_with("data:")
}

/// Resolve a local url to a file.
///
/// Root-relative urls (`/css/app.css`) resolve against the output root,
/// others against the directory of the html file.
fn resolve_local(url: &str, html_dir: &Path, output: &Path) -> Option<PathBuf> {
    if url.is_empty() || is_remote(url) {
        return None;
    }
    let url = url.split(['?', '#']).next().unwrap_or(url);
    let path = match url.strip_prefix('/') {
        Some(rooted) => output.join(rooted),
        None => html_dir.join(url),
    };
    path.is_file().then_some(path)
}

/// Inline local html imports, `<link rel="stylesheet">` and `<script src>`
/// references.
///
/// `html_path` is where the html file is written. Imports are inlined
/// recursively, each file at most once per page; a repeated or cyclic
/// import is dropped. Remote urls, urls matching `excludes` and files that
/// do not exist are left untouched.
pub fn inline_assets(html: &str, html_path: &Path, output: &Path, excludes: &GlobSet) -> String {
    let mut inliner = Inliner {
        output,
        excludes,
        seen: FxHashSet::default(),
    };
    inliner.seen.insert(identity(html_path));
    inliner.document(html, html_path.parent().unwrap_or(output))
}

struct Inliner<'a> {
    output: &'a Path,
    excludes: &'a GlobSet,
    /// Html files already inlined into this page.
    seen: FxHashSet<PathBuf>,
}

impl Inliner<'_> {
    fn document(&mut self, html: &str, dir: &Path) -> String {
        let html = link_re().replace_all(html, |caps: &Captures| self.link(&caps[0], dir));
        script_re()
            .replace_all(&html, |caps: &Captures| self.script(caps, dir))
            .into_owned()
    }

    fn resolve(&self, url: &str, dir: &Path) -> Option<PathBuf> {
        if self.excludes.is_match(url) {
            return None;
        }
        resolve_local(url, dir, self.output)
    }

    fn link(&mut self, tag: &str, dir: &Path) -> String {
        let rel = attr(rel_re(), tag).unwrap_or_default();
        let has_rel = |name: &str| rel.split_ascii_whitespace().any(|r| r.eq_ignore_ascii_case(name));
        let (is_import, is_stylesheet) = (has_rel("import"), has_rel("stylesheet"));
        if !is_import && !is_stylesheet {
            return tag.to_owned();
        }

        let Some(path) = attr(href_re(), tag).and_then(|href| self.resolve(href, dir)) else {
            return tag.to_owned();
        };

        if is_import {
            if !self.seen.insert(identity(&path)) {
                return String::new();
            }
            return match fs::read_to_string(&path) {
                Ok(imported) => {
                    let import_dir = path.parent().unwrap_or(self.output).to_path_buf();
                    self.document(&imported, &import_dir)
                }
                Err(_) => tag.to_owned(),
            };
        }

        match fs::read_to_string(&path) {
            Ok(css) => format!("<style>{}</style>", css.trim_end().replace("</style", "<\\/style")),
            Err(_) => tag.to_owned(),
        }
    }

    fn script(&self, caps: &Captures, dir: &Path) -> String {
        let js = attr(src_re(), &caps[1])
            .and_then(|src| self.resolve(src, dir))
            .and_then(|path| fs::read_to_string(path).ok());

        match js {
            Some(js) => format!("<script>{}</script>", js.trim_end().replace("</script", "<\\/script")),
            None => caps[0].to_owned(),
        }
    }
}

/// Key for cycle detection: the canonical path when the file exists.
fn identity(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manifest(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_rewrite_references() {
        let manifest = manifest(&[
            ("css/app.css", "css/app-0123456789.min.css"),
            ("js/app.js", "js/app-abcdef0123.min.js"),
        ]);
        let html = r#"<link rel="stylesheet" href="/css/app.css"><script src="../js/app.js"></script>"#;

        assert_eq!(
            rewrite_references(html, &manifest),
            r#"<link rel="stylesheet" href="/css/app-0123456789.min.css"><script src="../js/app-abcdef0123.min.js"></script>"#
        );
    }

    #[test]
    fn test_rewrite_respects_token_boundaries() {
        let manifest = manifest(&[("css/app.css", "css/app-0123456789.min.css")]);

        let html = r#"<a href="mycss/app.css">x</a> css/app.css.map css/app.css-old css/app.css."#;
        assert_eq!(
            rewrite_references(html, &manifest),
            r#"<a href="mycss/app.css">x</a> css/app.css.map css/app.css-old css/app-0123456789.min.css."#
        );
    }

    #[test]
    fn test_rewrite_prefers_longest_key() {
        let manifest = manifest(&[
            ("app.css", "app-1111111111.min.css"),
            ("css/app.css", "css/app-2222222222.min.css"),
        ]);
        assert_eq!(
            rewrite_references("css/app.css app.css", &manifest),
            "css/app-2222222222.min.css app-1111111111.min.css"
        );
    }

    #[test]
    fn test_rewrite_empty_manifest() {
        let html = "<p>css/app.css</p>";
        assert_eq!(rewrite_references(html, &BTreeMap::new()), html);
    }

    #[test]
    fn test_inline_assets() {
        let dir = tempdir().unwrap();
        let output = dir.path();
        std::fs::create_dir_all(output.join("css")).unwrap();
        std::fs::create_dir_all(output.join("views")).unwrap();
        std::fs::write(output.join("css/app.css"), "body{color:red}\n").unwrap();
        std::fs::write(output.join("views/card.js"), "let a = 1;\n").unwrap();

        let html = concat!(
            r#"<link rel="stylesheet" href="/css/app.css">"#,
            r#"<link rel="icon" href="/css/app.css">"#,
            r#"<link rel="stylesheet" href="https://cdn.example.com/x.css">"#,
            r#"<link rel="stylesheet" href="missing.css">"#,
            r#"<script src="card.js"></script>"#,
            r#"<script src="//cdn.example.com/lib.js"></script>"#,
        );
        let out = inline_assets(html, &output.join("views/index.html"), output, &GlobSet::empty());

        assert_eq!(
            out,
            concat!(
                "<style>body{color:red}</style>",
                r#"<link rel="icon" href="/css/app.css">"#,
                r#"<link rel="stylesheet" href="https://cdn.example.com/x.css">"#,
                r#"<link rel="stylesheet" href="missing.css">"#,
                "<script>let a = 1;</script>",
                r#"<script src="//cdn.example.com/lib.js"></script>"#,
            )
        );
    }

    #[test]
    fn test_inline_escapes_closing_tag() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.js"), "document.write('</script>');").unwrap();

        let out = inline_assets(
            r#"<script src="a.js"></script>"#,
            &dir.path().join("index.html"),
            dir.path(),
            &GlobSet::empty(),
        );
        assert_eq!(out, r"<script>document.write('<\/script>');</script>");
    }

    #[test]
    fn test_inline_html_imports_recursively() {
        let dir = tempdir().unwrap();
        let output = dir.path();
        std::fs::create_dir_all(output.join("components/card")).unwrap();
        std::fs::create_dir_all(output.join("views")).unwrap();
        std::fs::write(
            output.join("components/card/card.html"),
            r#"<link rel="import" href="../shared.html"><link rel="stylesheet" href="card.css"><div class="card"></div>"#,
        )
        .unwrap();
        std::fs::write(output.join("components/card/card.css"), ".card{margin:0}\n").unwrap();
        std::fs::write(output.join("components/shared.html"), "<template>shared</template>").unwrap();

        let html = concat!(
            r#"<link rel="import" href="/components/card/card.html">"#,
            r#"<link rel="import" href="/components/shared.html">"#,
            "<card></card>",
        );
        let out = inline_assets(html, &output.join("views/index.html"), output, &GlobSet::empty());

        assert_eq!(
            out,
            concat!(
                "<template>shared</template>",
                "<style>.card{margin:0}</style>",
                r#"<div class="card"></div>"#,
                "<card></card>",
            )
        );
    }

    #[test]
    fn test_inline_cyclic_imports_terminate() {
        let dir = tempdir().unwrap();
        let output = dir.path();
        std::fs::write(output.join("a.html"), r#"<p>a</p><link rel="import" href="b.html">"#).unwrap();
        std::fs::write(output.join("b.html"), r#"<p>b</p><link rel="import" href="a.html">"#).unwrap();
        std::fs::write(output.join("index.html"), "").unwrap();

        let html = r#"<link rel="import" href="a.html"><link rel="import" href="index.html">"#;
        let out = inline_assets(html, &output.join("index.html"), output, &GlobSet::empty());

        assert_eq!(out, "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_inline_respects_excludes() {
        let dir = tempdir().unwrap();
        let output = dir.path();
        std::fs::create_dir_all(output.join("vendor")).unwrap();
        std::fs::write(output.join("vendor/lib.js"), "var lib;").unwrap();
        std::fs::write(output.join("vendor/lib.html"), "<p>lib</p>").unwrap();
        std::fs::write(output.join("app.js"), "var app;").unwrap();

        let excludes = crate::utils::glob::glob_set(&["/vendor/**", "//fonts.googleapis.com/*"]).unwrap();
        let html = concat!(
            r#"<link rel="import" href="/vendor/lib.html">"#,
            r#"<link rel="stylesheet" href="//fonts.googleapis.com/css">"#,
            r#"<script src="/vendor/lib.js"></script>"#,
            r#"<script src="/app.js"></script>"#,
        );
        let out = inline_assets(html, &output.join("index.html"), output, &excludes);

        assert_eq!(
            out,
            concat!(
                r#"<link rel="import" href="/vendor/lib.html">"#,
                r#"<link rel="stylesheet" href="//fonts.googleapis.com/css">"#,
                r#"<script src="/vendor/lib.js"></script>"#,
                "<script>var app;</script>",
            )
        );
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://a.com/x.css"));
        assert!(is_remote("//a.com/x.css"));
        assert!(!is_remote("/css/x.css"));
        assert!(!is_remote("x.css"));
    }
}
