//! Path tables, per-profile option sets and the immutable [`BuildContext`].
//!
//! All configuration is constructed once at startup and never mutated. Tasks
//! receive a [`BuildContext`] value instead of reading shared process state,
//! so the dev/dist split is decided before the graph runs and cannot drift
//! mid-run.

use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The build profile selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Fast, readable output, written to the dev root.
    Dev,
    /// Minified output with wider browser support, written to the dist root.
    Dist,
}

impl Profile {
    pub fn is_production(self) -> bool {
        matches!(self, Profile::Dist)
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Profile::Dev => write!(f, "dev"),
            Profile::Dist => write!(f, "dist"),
        }
    }
}

/// Source and output locations for a single asset class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetPaths {
    /// Directory under the source root holding the inputs.
    pub dir: Utf8PathBuf,
    /// Glob patterns, relative to `dir`.
    pub globs: Vec<String>,
    /// Directory under the active output root receiving the results.
    pub out: Utf8PathBuf,
}

/// Locations for the script bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptPaths {
    pub dir: Utf8PathBuf,
    /// The single entry module, relative to `dir`.
    pub entry: Utf8PathBuf,
    /// Globs matching every script source, used for linting and watching.
    pub globs: Vec<String>,
    pub out: Utf8PathBuf,
    /// Name of the emitted bundle.
    pub out_file: Utf8PathBuf,
    /// Extra module resolution roots passed to the bundler.
    pub include: Vec<Utf8PathBuf>,
}

/// Locations for the icon sprite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IconPaths {
    pub dir: Utf8PathBuf,
    pub globs: Vec<String>,
    pub out: Utf8PathBuf,
    /// Name of the combined sprite document.
    pub out_file: Utf8PathBuf,
}

/// Locations for favicons. The same input directory fans out into a verbatim
/// copy of manifest files and an optimization pass over image files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaviconPaths {
    pub dir: Utf8PathBuf,
    /// Globs copied byte for byte (descriptors, text, XML).
    pub globs_copy: Vec<String>,
    /// Globs routed through image optimization.
    pub globs_image: Vec<String>,
    pub out: Utf8PathBuf,
}

/// The immutable table of project paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Project root; all other paths are relative to it.
    pub root: Utf8PathBuf,
    /// Source root under the project root.
    pub src: Utf8PathBuf,
    /// Output root for dev builds.
    pub out_dev: Utf8PathBuf,
    /// Output root for dist builds.
    pub out_dist: Utf8PathBuf,
    pub styles: AssetPaths,
    pub scripts: ScriptPaths,
    pub images: AssetPaths,
    pub icons: IconPaths,
    pub favicons: FaviconPaths,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            root: Utf8PathBuf::from("."),
            src: Utf8PathBuf::from("src"),
            out_dev: Utf8PathBuf::from("builds/dev"),
            out_dist: Utf8PathBuf::from("builds/dist"),
            styles: AssetPaths {
                dir: Utf8PathBuf::from("styles/sass"),
                globs: vec!["**/*.scss".into(), "**/*.sass".into()],
                out: Utf8PathBuf::from("styles"),
            },
            scripts: ScriptPaths {
                dir: Utf8PathBuf::from("scripts/js"),
                entry: Utf8PathBuf::from("index.js"),
                globs: vec!["**/*.js".into()],
                out: Utf8PathBuf::from("scripts"),
                out_file: Utf8PathBuf::from("bundle.js"),
                include: vec![Utf8PathBuf::from("node_modules")],
            },
            images: AssetPaths {
                dir: Utf8PathBuf::from("images"),
                globs: vec![
                    "**/*.jpg".into(),
                    "**/*.gif".into(),
                    "**/*.png".into(),
                    "**/*.svg".into(),
                ],
                out: Utf8PathBuf::from("images"),
            },
            icons: IconPaths {
                dir: Utf8PathBuf::from("icons"),
                globs: vec!["**/*.svg".into()],
                out: Utf8PathBuf::from("icons"),
                out_file: Utf8PathBuf::from("symbols.svg"),
            },
            favicons: FaviconPaths {
                dir: Utf8PathBuf::from("favicons"),
                globs_copy: vec![
                    "**/*.xml".into(),
                    "**/*.txt".into(),
                    "**/*.json".into(),
                    "**/*.webmanifest".into(),
                    "**/*.ico".into(),
                ],
                globs_image: vec!["**/*.png".into(), "**/*.svg".into(), "**/*.gif".into()],
                out: Utf8PathBuf::from("favicons"),
            },
        }
    }
}

impl Paths {
    /// Absolute-ish source directory for an asset class.
    pub fn source_dir(&self, dir: impl AsRef<Utf8Path>) -> Utf8PathBuf {
        self.root.join(&self.src).join(dir)
    }

    /// Watch patterns for an asset class, relative to the project root.
    pub fn watch_globs(&self, dir: &Utf8Path, globs: &[String]) -> Vec<String> {
        globs
            .iter()
            .map(|g| self.src.join(dir).join(g).to_string())
            .collect()
    }
}

/// Options controlling the style pipeline for one profile.
///
/// The post-processor handles vendor prefixing, syntax lowering for the
/// `browsers` matrix, rule merging and media-query collapsing as a single
/// pass; only the browser matrix and `minify` are switchable, the
/// individual transforms are not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleOptions {
    /// Emit compact output and strip comments.
    pub minify: bool,
    /// Browserslist queries controlling vendor prefixing and syntax lowering.
    pub browsers: Vec<String>,
    /// Extra Sass include paths, relative to the project root.
    pub include: Vec<Utf8PathBuf>,
}

/// A single external lint command run over the script sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintCommand {
    /// The program to invoke, resolved through `PATH`.
    pub program: String,
    /// The flag used to pass the configuration file, e.g. `--config`.
    pub config_flag: String,
    /// Path to the externally-owned configuration file.
    pub config: Utf8PathBuf,
}

/// Options controlling the script pipeline for one profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptOptions {
    /// Minify the bundle. Source maps are emitted regardless.
    pub minify: bool,
    /// Lint commands run before every bundle. Failures are reported but do
    /// not block bundling.
    pub lint: Vec<LintCommand>,
}

/// How hard the image pipeline should work for one profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PngEffort {
    /// Quick single-pass encode.
    Fast,
    /// Maximum compression.
    Best,
}

/// Options controlling the image, icon and favicon pipelines for one
/// profile. Aggressiveness is expressed through the PNG compression effort
/// and the JPEG quality; the encoder writes baseline JPEG and lossless PNG,
/// so progressive-encoding and quantization toggles do not exist here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageOptions {
    pub png: PngEffort,
    /// JPEG re-encode quality, 0-100.
    pub jpeg_quality: u8,
    /// Strip comments and blank lines from SVG sources.
    pub minify_svg: bool,
}

/// Options for the development server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeOptions {
    pub port: u16,
    /// Upstream origin to proxy, e.g. `http://localhost:3000`. When unset
    /// the server serves the active output root statically instead.
    pub proxy: Option<String>,
}

/// The full parameter bundle for one profile. Two instances exist, one for
/// dev and one for dist; both are immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionSet {
    pub styles: StyleOptions,
    pub scripts: ScriptOptions,
    pub images: ImageOptions,
    pub serve: ServeOptions,
}

impl OptionSet {
    pub fn dev() -> Self {
        Self {
            styles: StyleOptions {
                minify: false,
                browsers: vec!["last 2 versions".into(), "ie 9".into()],
                include: vec![Utf8PathBuf::from("node_modules")],
            },
            scripts: ScriptOptions {
                minify: false,
                lint: default_lint(),
            },
            images: ImageOptions {
                png: PngEffort::Fast,
                jpeg_quality: 90,
                minify_svg: false,
            },
            serve: ServeOptions {
                port: 8080,
                proxy: None,
            },
        }
    }

    pub fn dist() -> Self {
        Self {
            styles: StyleOptions {
                minify: true,
                browsers: vec!["last 10 versions".into(), "ie 9".into()],
                include: vec![Utf8PathBuf::from("node_modules")],
            },
            scripts: ScriptOptions {
                minify: true,
                lint: default_lint(),
            },
            images: ImageOptions {
                png: PngEffort::Best,
                jpeg_quality: 75,
                minify_svg: true,
            },
            serve: ServeOptions {
                port: 8080,
                proxy: None,
            },
        }
    }
}

fn default_lint() -> Vec<LintCommand> {
    vec![
        LintCommand {
            program: "jshint".into(),
            config_flag: "--config".into(),
            config: Utf8PathBuf::from(".jshintrc"),
        },
        LintCommand {
            program: "jscs".into(),
            config_flag: "--config".into(),
            config: Utf8PathBuf::from(".jscsrc"),
        },
    ]
}

/// Top-level configuration: the path table plus one option set per profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: Paths,
    pub dev: OptionSet,
    pub dist: OptionSet,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: Paths::default(),
            dev: OptionSet::dev(),
            dist: OptionSet::dist(),
        }
    }
}

impl Config {
    /// Read configuration from a JSON file, falling back to the defaults when
    /// the file does not exist. The `paths` table may be overridden field by
    /// field; `dev`/`dist` option sets are replaced as whole objects.
    pub fn load_or_default(path: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;

        Ok(config)
    }
}

/// Everything a task invocation needs to know, fixed for the whole run.
#[derive(Clone)]
pub struct BuildContext {
    pub profile: Profile,
    pub paths: Arc<Paths>,
    pub options: Arc<OptionSet>,
}

impl BuildContext {
    pub fn new(profile: Profile, config: &Config) -> Self {
        let options = match profile {
            Profile::Dev => config.dev.clone(),
            Profile::Dist => config.dist.clone(),
        };

        Self {
            profile,
            paths: Arc::new(config.paths.clone()),
            options: Arc::new(options),
        }
    }

    /// The output root selected by the profile.
    pub fn out_root(&self) -> Utf8PathBuf {
        let out = match self.profile {
            Profile::Dev => &self.paths.out_dev,
            Profile::Dist => &self.paths.out_dist,
        };

        self.paths.root.join(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_selects_matching_options_and_root() {
        let config = Config::default();

        let dev = BuildContext::new(Profile::Dev, &config);
        assert!(!dev.profile.is_production());
        assert!(!dev.options.styles.minify);
        assert!(dev.out_root().as_str().ends_with("builds/dev"));

        let dist = BuildContext::new(Profile::Dist, &config);
        assert!(dist.profile.is_production());
        assert!(dist.options.styles.minify);
        assert!(dist.options.scripts.minify);
        assert!(dist.out_root().as_str().ends_with("builds/dist"));
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = Config::load_or_default("does/not/exist.json").unwrap();
        assert_eq!(config.paths.src, Utf8PathBuf::from("src"));
        assert_eq!(config.dev.serve.port, 8080);
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bellows.json");
        std::fs::write(
            &file,
            r#"{ "paths": { "out_dist": "public", "src": "assets" } }"#,
        )
        .unwrap();

        let config =
            Config::load_or_default(Utf8PathBuf::try_from(file).unwrap()).unwrap();
        assert_eq!(config.paths.out_dist, Utf8PathBuf::from("public"));
        assert_eq!(config.paths.src, Utf8PathBuf::from("assets"));
        // untouched sections keep their defaults
        assert_eq!(config.paths.out_dev, Utf8PathBuf::from("builds/dev"));
        assert_eq!(config.dist.serve.port, 8080);
    }

    #[test]
    fn watch_globs_are_rooted_at_the_source_dir() {
        let paths = Paths::default();
        let globs = paths.watch_globs(&paths.styles.dir, &paths.styles.globs);
        assert!(globs.contains(&"src/styles/sass/**/*.scss".to_string()));
    }
}
