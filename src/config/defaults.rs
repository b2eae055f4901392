//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#true() -> bool {
    true
}

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use std::path::PathBuf;

    pub fn root() -> Option<PathBuf> {
        None
    }

    pub fn output() -> PathBuf {
        "dist".into()
    }

    pub fn targets() -> Vec<String> {
        vec!["last 20 versions".into()]
    }

    pub fn hash_length() -> usize {
        10
    }

    pub mod manifest {
        use std::path::PathBuf;

        pub fn path() -> PathBuf {
            "rev-manifest.json".into()
        }
    }
}

// ============================================================================
// [tasks] Section Defaults
// ============================================================================

pub mod tasks {
    use super::super::task::TaskConfig;
    use std::collections::BTreeMap;

    pub const WATCH: &str = "watch";
    pub const BUILD_DEV_LITE: &str = "build-dev-lite";
    pub const BUILD_DEV: &str = "build-dev";
    pub const BUILD_PROD: &str = "build-prod";

    fn node_env(value: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("NODE_ENV".to_owned(), value.to_owned())])
    }

    /// Built-in tasks, present unless the config file overrides them.
    ///
    /// `build-dev` and `build-prod` share the same pipeline and only differ
    /// in the environment exported to external tools.
    pub fn builtin() -> BTreeMap<String, TaskConfig> {
        BTreeMap::from([
            (
                WATCH.to_owned(),
                TaskConfig {
                    watch: true,
                    optimize: false,
                    env: node_env("development"),
                    ..TaskConfig::default()
                },
            ),
            (
                BUILD_DEV_LITE.to_owned(),
                TaskConfig {
                    optimize: false,
                    env: node_env("development"),
                    ..TaskConfig::default()
                },
            ),
            (
                BUILD_DEV.to_owned(),
                TaskConfig {
                    optimize: true,
                    env: node_env("development"),
                    ..TaskConfig::default()
                },
            ),
            (
                BUILD_PROD.to_owned(),
                TaskConfig {
                    optimize: true,
                    env: node_env("production"),
                    ..TaskConfig::default()
                },
            ),
        ])
    }
}
