//! Project initialization.
//!
//! Writes a starter `assetline.toml` and ignores the output directory.

use crate::{config::PipelineConfig, log};
use anyhow::{Context, Result};
use std::{fs, path::Path};

/// Files to write ignore patterns to
const IGNORE_FILES: &[&str] = &[".gitignore"];

/// Starter configuration. Uses built-in tools only, so it validates
/// without anything else installed.
const STARTER_CONFIG: &str = r#"[build]
output = "dist"
targets = ["last 20 versions"]

[build.manifest]
enable = true
path = "rev-manifest.json"

[groups.css]
kind = "css"
src = ["app/css/**/*.css"]
dest = "dist/css"
concat = "app.css"
# compiler = ["sass", "--stdin", "--load-path=app/css"]
# post = ["postcss", "--use", "autoprefixer"]

# [[groups.css.bundles]]
# name = "ios.css"
# src = ["app/css/base.css", "app/css/ios.css"]

[groups.js]
kind = "js"
src = ["app/js/*.js"]
dest = "dist/js"
# bundler = ["esbuild", "{path}", "--bundle"]

[groups.views]
kind = "html"
src = ["app/views/**/*.html"]
dest = "dist/views"
flatten = true
# inline = true
# inline_exclude = ["//fonts.googleapis.com/*"]

[groups.images]
kind = "images"
src = ["app/images/**/*"]
dest = "dist/images"
"#;

/// Create the starter config in the project root.
pub fn new_project(config: &PipelineConfig) -> Result<()> {
    let root = config.get_root();
    fs::create_dir_all(root).with_context(|| format!("Failed to create {}", root.display()))?;

    fs::write(&config.config_path, STARTER_CONFIG)
        .with_context(|| format!("Failed to write {}", config.config_path.display()))?;
    init_ignored_files(root, &[Path::new("/dist/")])?;

    log!("init"; "wrote {}", config.config_path.display());
    Ok(())
}

/// Initialize ignore files with the given paths, leaving existing ones alone.
fn init_ignored_files(root: &Path, paths: &[&Path]) -> Result<()> {
    let content = paths
        .iter()
        .filter_map(|p| p.to_str())
        .collect::<Vec<_>>()
        .join("\n");

    for filename in IGNORE_FILES {
        let path = root.join(filename);
        if !path.exists() {
            fs::write(&path, content.clone() + "\n")?;
        }
    }

    Ok(())
}
