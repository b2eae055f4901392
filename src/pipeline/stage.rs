//! Stage execution: expand sources, apply the resolved chain, write outputs.
//!
//! Files flow through the chain as in-memory [`Artifact`]s. Recoverable
//! failures drop (compile) or empty (bundle) the affected file and are
//! collected as warnings; filesystem failures abort the Stage.

use super::{
    error::{StageError, chain},
    manifest::Manifest,
    planner::{StageInvocation, Step},
};
use crate::{
    config::AssetKind,
    log,
    tools::{ToolEnv, html},
    utils::{
        glob::{PatternSet, glob_set},
        hash::fingerprint,
    },
};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Task-wide state a Stage runs against.
#[derive(Debug)]
pub struct StageContext {
    pub env: ToolEnv,
    pub manifest: Arc<Manifest>,
    pub hash_length: usize,
    /// Output root, for resolving root-relative urls when inlining.
    pub output: PathBuf,
}

/// Outcome of one Stage invocation.
#[derive(Debug)]
pub struct StageResult {
    pub group: String,
    pub bundle: Option<String>,
    /// Every file written, in write order.
    pub outputs: Vec<PathBuf>,
    /// Recoverable errors, already logged.
    pub warnings: Vec<StageError>,
}

/// A file in flight.
#[derive(Debug)]
struct Artifact {
    /// Absolute source path; `None` once concatenated.
    source: Option<PathBuf>,
    /// Output path relative to the destination.
    rel: PathBuf,
    content: Vec<u8>,
    /// `rel` at the first write: the unminified name.
    origin: Option<PathBuf>,
}

impl Artifact {
    /// Path handed to tools as `{path}`.
    fn tool_path(&self, dest: &Path) -> PathBuf {
        self.source.clone().unwrap_or_else(|| dest.join(&self.rel))
    }
}

/// Run one Stage invocation to completion.
pub fn run(inv: &StageInvocation, ctx: &StageContext) -> Result<StageResult, StageError> {
    let label = inv.label();
    log!(&inv.group; "starting {label}...");

    let mut stage = Stage {
        inv,
        ctx,
        label: &label,
        result: StageResult {
            group: inv.group.clone(),
            bundle: inv.bundle.clone(),
            outputs: Vec::new(),
            warnings: Vec::new(),
        },
    };

    let mut files = stage.read_sources()?;
    for step in &inv.steps {
        files = stage.apply(step, files)?;
    }

    let result = stage.result;
    log!(&inv.group; "done {label}: {} files", result.outputs.len());
    Ok(result)
}

struct Stage<'a> {
    inv: &'a StageInvocation,
    ctx: &'a StageContext,
    label: &'a str,
    result: StageResult,
}

impl Stage<'_> {
    fn read_sources(&self) -> Result<Vec<Artifact>, StageError> {
        let set = PatternSet::new(&self.ctx.env.root, &self.inv.sources)?;
        set.expand(self.inv.base.as_deref())
            .into_iter()
            .map(|file| {
                let content = fs::read(&file.path).map_err(StageError::fs(&file.path))?;
                Ok(Artifact {
                    source: Some(file.path),
                    rel: file.rel,
                    content,
                    origin: None,
                })
            })
            .collect()
    }

    fn warn(&mut self, err: StageError) {
        log!("error"; "{}: {}", self.label, chain(&err));
        self.result.warnings.push(err);
    }

    fn apply(&mut self, step: &Step, files: Vec<Artifact>) -> Result<Vec<Artifact>, StageError> {
        let files = match step {
            Step::Compile => self.compile(files),
            Step::PostProcess => self.post_process(files),
            Step::Concat(name) => self.concat(name, files),
            Step::Flatten => files
                .into_iter()
                .map(|mut a| {
                    if let Some(name) = a.rel.file_name() {
                        a.rel = PathBuf::from(name);
                    }
                    a
                })
                .collect(),
            Step::RewriteRefs => {
                let entries = self.ctx.manifest.snapshot();
                map_text(files, |_, text| html::rewrite_references(text, &entries))
            }
            Step::Inline => {
                let excludes = glob_set(&self.inv.inline_exclude)?;
                let dest = &self.inv.dest;
                let output = &self.ctx.output;
                map_text(files, |rel, text| {
                    html::inline_assets(text, &dest.join(rel), output, &excludes)
                })
            }
            Step::Minify => self.shrink(files, "minify"),
            Step::Optimize => self.shrink(files, "optimize"),
            Step::RenameMin => files
                .into_iter()
                .map(|mut a| {
                    a.rel = min_name(&a.rel);
                    a
                })
                .collect(),
            Step::Hash => files
                .into_iter()
                .map(|mut a| {
                    let hash = fingerprint(&a.content, self.ctx.hash_length);
                    a.rel = hashed_name(&a.rel, &hash);
                    a
                })
                .collect(),
            Step::Write => self.write(files)?,
            Step::RecordManifest => {
                for a in &files {
                    if let Some(origin) = &a.origin {
                        let dest = &self.inv.dest;
                        self.ctx.manifest.record(&dest.join(origin), &dest.join(&a.rel));
                    }
                }
                files
            }
        };
        Ok(files)
    }

    fn compile(&mut self, files: Vec<Artifact>) -> Vec<Artifact> {
        let (inv, ctx) = (self.inv, self.ctx);
        let (tools, env) = (&inv.tools, &ctx.env);
        let mut out = Vec::with_capacity(files.len());

        for mut a in files {
            let path = a.tool_path(&inv.dest);
            let content = std::mem::take(&mut a.content);

            let compiled = match inv.kind {
                AssetKind::Css if is_partial(&path) => continue,
                AssetKind::Css => tools.compile_style(&path, content, env),
                AssetKind::Html => tools.render_template(&path, content, env),
                AssetKind::Js => match tools.bundle(&path, content, env) {
                    Ok(js) => Ok(js),
                    Err(source) => {
                        self.warn(StageError::Bundle {
                            entry: path.clone(),
                            source,
                        });
                        Ok(Vec::new())
                    }
                },
                AssetKind::Images | AssetKind::Copy => Ok(content),
            };

            match compiled {
                Ok(content) => {
                    if let Some(ext) = inv.kind.output_extension() {
                        a.rel.set_extension(ext);
                    }
                    a.content = content;
                    out.push(a);
                }
                Err(source) => self.warn(StageError::Compile {
                    step: "compile",
                    path,
                    source,
                }),
            }
        }
        out
    }

    fn post_process(&mut self, files: Vec<Artifact>) -> Vec<Artifact> {
        let (inv, ctx) = (self.inv, self.ctx);
        let mut out = Vec::with_capacity(files.len());

        for mut a in files {
            let path = a.tool_path(&inv.dest);
            match inv.tools.post_process(&path, std::mem::take(&mut a.content), &ctx.env) {
                Ok(css) => {
                    a.content = css;
                    out.push(a);
                }
                Err(source) => self.warn(StageError::Compile {
                    step: "post-process",
                    path,
                    source,
                }),
            }
        }
        out
    }

    fn concat(&mut self, name: &str, files: Vec<Artifact>) -> Vec<Artifact> {
        if files.is_empty() {
            log!(&self.inv.group; "{}: no sources for {name}", self.label);
            return files;
        }

        let mut content = Vec::new();
        for (i, a) in files.into_iter().enumerate() {
            if i > 0 && !content.ends_with(b"\n") {
                content.push(b'\n');
            }
            content.extend_from_slice(&a.content);
        }

        vec![Artifact {
            source: None,
            rel: PathBuf::from(name),
            content,
            origin: None,
        }]
    }

    /// Minify or optimize, keeping the input when the tool fails or the
    /// result is larger.
    fn shrink(&mut self, files: Vec<Artifact>, step: &'static str) -> Vec<Artifact> {
        let (inv, ctx) = (self.inv, self.ctx);
        let (tools, env) = (&inv.tools, &ctx.env);

        files
            .into_iter()
            .map(|mut a| {
                let path = a.tool_path(&inv.dest);
                let input = a.content.clone();
                let output = match step {
                    "optimize" => tools.optimize_image(&path, input, env),
                    _ => tools.minify(&path, input, env),
                };
                match output {
                    Ok(out) if out.len() <= a.content.len() => a.content = out,
                    Ok(_) => {}
                    Err(source) => self.warn(StageError::Compile { step, path, source }),
                }
                a
            })
            .collect()
    }

    fn write(&mut self, files: Vec<Artifact>) -> Result<Vec<Artifact>, StageError> {
        for a in &files {
            let path = self.inv.dest.join(&a.rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(StageError::fs(parent))?;
            }
            fs::write(&path, &a.content).map_err(StageError::fs(&path))?;
            self.result.outputs.push(path);
        }

        Ok(files
            .into_iter()
            .map(|mut a| {
                a.origin.get_or_insert_with(|| a.rel.clone());
                a
            })
            .collect())
    }
}

/// Apply a text transform to every utf-8 file; binary files pass through.
fn map_text(files: Vec<Artifact>, f: impl Fn(&Path, &str) -> String) -> Vec<Artifact> {
    files
        .into_iter()
        .map(|mut a| {
            if let Ok(text) = std::str::from_utf8(&a.content) {
                a.content = f(&a.rel, text).into_bytes();
            }
            a
        })
        .collect()
}

/// Style partials (`_variables.scss`) are imported, never emitted.
fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_'))
}

/// `css/app.css` → `css/app.min.css`
fn min_name(rel: &Path) -> PathBuf {
    let name = rel.file_name().unwrap_or_default().to_string_lossy();
    let renamed = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}.min.{ext}"),
        _ => format!("{name}.min"),
    };
    rel.with_file_name(renamed)
}

/// `css/app.min.css` → `css/app-<hash>.min.css`
fn hashed_name(rel: &Path, hash: &str) -> PathBuf {
    let name = rel.file_name().unwrap_or_default().to_string_lossy();
    let split = name
        .rfind(".min.")
        .or_else(|| name.strip_suffix(".min").map(|stem| stem.len()))
        .or_else(|| name.rfind('.').filter(|&i| i > 0))
        .unwrap_or(name.len());
    let (stem, rest) = name.split_at(split);
    rel.with_file_name(format!("{stem}-{hash}{rest}"))
}
