//! External collaborators of the pipeline.
//!
//! | Collaborator    | Group field | Fallback when unset                      |
//! |-----------------|-------------|------------------------------------------|
//! | StyleCompiler   | `compiler`  | `.css` passes through, others fail       |
//! | PostProcessor   | `post`      | pass through                             |
//! | Bundler         | `bundler`   | pass through                             |
//! | TemplateEngine  | `compiler`  | pass through                             |
//! | Minifier        | `minifier`  | built-in ([`minify`])                    |
//! | ImageOptimizer  | `optimizer` | pass through                             |
//!
//! Every tool call takes ownership of the input bytes and returns the
//! transformed bytes, so pass-through fallbacks cost nothing.

pub mod exec;
pub mod html;
pub mod minify;

pub use exec::{ExternalTool, Placeholders, ToolEnv, ToolError};

use crate::config::{AssetKind, GroupConfig};
use minify::MinifyType;
use std::path::Path;

/// The resolved tool set of one asset group.
#[derive(Debug, Clone, Default)]
pub struct GroupTools {
    kind: AssetKind,
    compiler: Option<ExternalTool>,
    post: Option<ExternalTool>,
    bundler: Option<ExternalTool>,
    minifier: Option<ExternalTool>,
    optimizer: Option<ExternalTool>,
}

impl GroupTools {
    pub fn from_config(group: &GroupConfig) -> Self {
        let tool = |cmd: &Option<Vec<String>>| cmd.as_deref().map(ExternalTool::new);
        Self {
            kind: group.kind,
            compiler: tool(&group.compiler),
            post: tool(&group.post),
            bundler: tool(&group.bundler),
            minifier: tool(&group.minifier),
            optimizer: tool(&group.optimizer),
        }
    }

    fn run(
        &self,
        tool: Option<&ExternalTool>,
        path: &Path,
        input: Vec<u8>,
        env: &ToolEnv,
    ) -> Result<Vec<u8>, ToolError> {
        match tool {
            Some(tool) => tool.run(
                &input,
                Placeholders {
                    path: Some(path),
                    kind: Some(self.kind.name()),
                },
                env,
            ),
            None => Ok(input),
        }
    }

    /// StyleCompiler: stylesheet source to css.
    pub fn compile_style(&self, path: &Path, source: Vec<u8>, env: &ToolEnv) -> Result<Vec<u8>, ToolError> {
        let is_css = path.extension().is_some_and(|ext| ext == "css");
        if self.compiler.is_none() && !is_css {
            return Err(ToolError::Missing {
                tool: "style compiler",
                path: path.to_path_buf(),
            });
        }
        self.run(self.compiler.as_ref(), path, source, env)
    }

    /// PostProcessor: css to css (e.g. vendor prefixes for `{targets}`).
    pub fn post_process(&self, path: &Path, css: Vec<u8>, env: &ToolEnv) -> Result<Vec<u8>, ToolError> {
        self.run(self.post.as_ref(), path, css, env)
    }

    /// Bundler: entry point to bundled js.
    pub fn bundle(&self, entry: &Path, source: Vec<u8>, env: &ToolEnv) -> Result<Vec<u8>, ToolError> {
        self.run(self.bundler.as_ref(), entry, source, env)
    }

    /// TemplateEngine: template to html.
    pub fn render_template(&self, path: &Path, source: Vec<u8>, env: &ToolEnv) -> Result<Vec<u8>, ToolError> {
        self.run(self.compiler.as_ref(), path, source, env)
    }

    /// ImageOptimizer: image bytes to smaller image bytes.
    pub fn optimize_image(&self, path: &Path, bytes: Vec<u8>, env: &ToolEnv) -> Result<Vec<u8>, ToolError> {
        self.run(self.optimizer.as_ref(), path, bytes, env)
    }

    /// Minifier: the configured command, or the built-in minifier for the
    /// group's kind. Kinds without a built-in minifier pass through.
    pub fn minify(&self, path: &Path, text: Vec<u8>, env: &ToolEnv) -> Result<Vec<u8>, ToolError> {
        if self.minifier.is_some() {
            return self.run(self.minifier.as_ref(), path, text, env);
        }

        let content = match self.kind {
            AssetKind::Html => MinifyType::Html(&text),
            AssetKind::Css => MinifyType::Css(&text),
            AssetKind::Js => MinifyType::Js(&text),
            AssetKind::Images | AssetKind::Copy => return Ok(text),
        };
        let minified = minify::minify(content).into_owned();
        Ok(minified)
    }
}
