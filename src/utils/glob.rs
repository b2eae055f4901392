//! Source pattern matching and expansion.
//!
//! Patterns are globs relative to the project root (`app/sass/**/*.scss`).
//! `*` and `?` never cross a `/`; only `**` spans directories, so `*.css`
//! names files at the root and nothing below it. A leading `!` turns a
//! pattern into an exclusion.
//!
//! # Expansion order
//!
//! ```text
//! ["app/sass/b.scss", "app/sass/*.scss"]
//!        │                   │
//!        │                   └── a.scss, c.scss   (b.scss already taken)
//!        └── b.scss
//! ```
//!
//! Patterns are expanded one after another, each one's matches sorted by
//! file name, and a file keeps the position of its first match. Bundles
//! rely on this: pattern order is concatenation order.

use globset::{Glob, GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use rustc_hash::FxHashSet;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Files to ignore during directory traversal
pub const IGNORED_FILES: &[&str] = &[".DS_Store", "Thumbs.db"];

/// Characters that make a pattern segment a glob.
const GLOB_CHARS: &[char] = &['*', '?', '[', '{'];

/// A source file found by expanding patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path of the source.
    pub path: PathBuf,
    /// Output-relative path (relative to the pattern's base directory).
    pub rel: PathBuf,
}

/// One include pattern with its literal base directory.
#[derive(Debug)]
struct Pattern {
    /// Literal directory prefix, relative to root.
    base: PathBuf,
    /// Pattern without glob characters names a single file.
    literal: Option<PathBuf>,
    matcher: GlobMatcher,
}

/// An ordered list of include patterns plus exclusions.
#[derive(Debug)]
pub struct PatternSet {
    root: PathBuf,
    include: Vec<Pattern>,
    exclude: GlobSet,
}

/// Compile one glob with path-aware wildcards.
pub fn glob(pattern: &str) -> Result<Glob, globset::Error> {
    GlobBuilder::new(pattern).literal_separator(true).build()
}

/// Compile a list of globs into one set.
pub fn glob_set<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(glob(pattern.as_ref())?);
    }
    builder.build()
}

impl PatternSet {
    /// Compile patterns relative to `root`.
    pub fn new(root: &Path, patterns: &[String]) -> Result<Self, globset::Error> {
        let mut include = Vec::new();
        let mut exclude = GlobSetBuilder::new();

        for raw in patterns {
            if let Some(negated) = raw.strip_prefix('!') {
                exclude.add(glob(clean_pattern(negated))?);
                continue;
            }

            let pattern = clean_pattern(raw);
            let literal = (!pattern.contains(GLOB_CHARS)).then(|| PathBuf::from(pattern));
            include.push(Pattern {
                base: literal_base(pattern),
                literal,
                matcher: glob(pattern)?.compile_matcher(),
            });
        }

        Ok(Self {
            root: root.to_path_buf(),
            include,
            exclude: exclude.build()?,
        })
    }

    /// Whether `path` (absolute, or relative to root) matches any include
    /// pattern and no exclusion.
    pub fn is_match(&self, path: &Path) -> bool {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        if rel.is_absolute() {
            return false;
        }
        !self.exclude.is_match(rel) && self.include.iter().any(|p| p.matcher.is_match(rel))
    }

    /// Absolute base directories of the include patterns, deduplicated.
    /// These are the directories a watcher needs to observe.
    pub fn bases(&self) -> Vec<PathBuf> {
        let mut bases: Vec<PathBuf> = Vec::new();
        for pattern in &self.include {
            let base = self.root.join(&pattern.base);
            if !bases.iter().any(|b| base.starts_with(b)) {
                bases.retain(|b| !b.starts_with(&base));
                bases.push(base);
            }
        }
        bases
    }

    /// Expand patterns into existing files, in pattern order.
    ///
    /// `base` overrides the per-pattern base directory for output paths.
    pub fn expand(&self, base: Option<&Path>) -> Vec<SourceFile> {
        let mut seen = FxHashSet::default();
        let mut files = Vec::new();

        for pattern in &self.include {
            let pattern_base = self.root.join(&pattern.base);
            let rel_base = base.unwrap_or(&pattern_base);

            let matches: Vec<PathBuf> = match &pattern.literal {
                Some(literal) => {
                    let path = self.root.join(literal);
                    if path.is_file() { vec![path] } else { vec![] }
                }
                None => WalkDir::new(&pattern_base)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .filter(|e| {
                        let name = e.file_name().to_str().unwrap_or_default();
                        !IGNORED_FILES.contains(&name)
                    })
                    .map(|e| e.into_path())
                    .filter(|path| {
                        path.strip_prefix(&self.root)
                            .is_ok_and(|rel| pattern.matcher.is_match(rel))
                    })
                    .collect(),
            };

            for path in matches {
                let Ok(rel_root) = path.strip_prefix(&self.root) else {
                    continue;
                };
                if self.exclude.is_match(rel_root) || !seen.insert(path.clone()) {
                    continue;
                }
                let rel = match path.strip_prefix(rel_base) {
                    Ok(rel) => rel.to_path_buf(),
                    Err(_) => PathBuf::from(path.file_name().unwrap_or_default()),
                };
                files.push(SourceFile { path, rel });
            }
        }

        files
    }
}

/// Strip `./` and leading `/` so patterns are always root-relative.
fn clean_pattern(pattern: &str) -> &str {
    let pattern = pattern.trim();
    let pattern = pattern.strip_prefix("./").unwrap_or(pattern);
    pattern.trim_start_matches('/')
}

/// Leading directory components without glob characters.
///
/// `app/css/**/*.scss` → `app/css`; `app/css/a.scss` → `app/css`.
fn literal_base(pattern: &str) -> PathBuf {
    let path = Path::new(pattern);
    let mut base = PathBuf::new();
    let components: Vec<_> = path.components().collect();

    for (i, component) in components.iter().enumerate() {
        let is_last = i + 1 == components.len();
        match component {
            Component::Normal(part) => {
                let part = part.to_string_lossy();
                if is_last || part.contains(GLOB_CHARS) {
                    break;
                }
                base.push(part.as_ref());
            }
            Component::CurDir => {}
            _ => break,
        }
    }
    base
}
