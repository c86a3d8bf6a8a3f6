//! The script pipeline. Bundling, minification and source maps are delegated
//! to the external `esbuild` binary, which must be available in the system
//! `PATH`. Linting runs external analyzers over all script sources before
//! every bundle; lint failures are reported through the error handler but
//! never block the bundle, a deliberate best-effort policy.

use std::process::Command;
use std::time::Instant;

use thiserror::Error;

use crate::config::BuildContext;
use crate::pipeline::{failure_reporter, glob_files};

/// Errors from the external bundler invocation.
#[derive(Debug, Error)]
pub enum BundleError {
    /// The esbuild process could not be started.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The esbuild process returned a non-zero exit code.
    #[error("esbuild exited with {0}")]
    Esbuild(std::process::ExitStatus),
}

pub fn build(ctx: &BuildContext) -> anyhow::Result<()> {
    if let Err(err) = lint(ctx) {
        failure_reporter("js:lint")(&err);
    }

    bundle(ctx)?;

    Ok(())
}

/// Run every configured lint command over all script sources, printing the
/// combined reports. Returns an error naming the linters that found
/// problems; callers decide whether that is fatal.
pub fn lint(ctx: &BuildContext) -> anyhow::Result<()> {
    let paths = &ctx.paths;
    let src_dir = paths.source_dir(&paths.scripts.dir);
    let files = glob_files(&src_dir, &paths.scripts.globs)?;

    if files.is_empty() {
        return Ok(());
    }

    let mut failed: Vec<String> = Vec::new();

    for linter in &ctx.options.scripts.lint {
        let result = Command::new(&linter.program)
            .arg(&linter.config_flag)
            .arg(paths.root.join(&linter.config).as_str())
            .args(files.iter().map(|file| file.as_str()))
            .output();

        match result {
            Ok(output) => {
                if !output.stdout.is_empty() {
                    eprintln!("{}", String::from_utf8_lossy(&output.stdout));
                }
                if !output.stderr.is_empty() {
                    eprintln!("{}", String::from_utf8_lossy(&output.stderr));
                }
                if !output.status.success() {
                    failed.push(linter.program.clone());
                }
            }
            Err(err) => {
                tracing::error!(linter = %linter.program, "couldn't run linter: {err}");
                failed.push(linter.program.clone());
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("lint reported problems: {}", failed.join(", "))
    }
}

fn bundle(ctx: &BuildContext) -> Result<(), BundleError> {
    let s = Instant::now();
    let paths = &ctx.paths;

    let resolve_paths = std::env::join_paths(
        paths
            .scripts
            .include
            .iter()
            .map(|dir| paths.root.join(dir).into_std_path_buf()),
    )
    .unwrap_or_default();

    let status = Command::new("esbuild")
        .args(bundle_args(ctx))
        .env("NODE_PATH", resolve_paths)
        .status()?;

    if !status.success() {
        return Err(BundleError::Esbuild(status));
    }

    tracing::info!(
        "bundled {} {}",
        paths.scripts.out_file,
        crate::io::as_overhead(s)
    );

    Ok(())
}

/// The esbuild argument list for the active context. Source maps are always
/// written next to the bundle; minification is dist-only.
fn bundle_args(ctx: &BuildContext) -> Vec<String> {
    let paths = &ctx.paths;
    let entry = paths.source_dir(&paths.scripts.dir).join(&paths.scripts.entry);
    let outfile = ctx
        .out_root()
        .join(&paths.scripts.out)
        .join(&paths.scripts.out_file);

    let mut args = vec![
        entry.into_string(),
        "--bundle".to_string(),
        "--sourcemap".to_string(),
        "--log-level=warning".to_string(),
        format!("--outfile={outfile}"),
    ];

    if ctx.options.scripts.minify {
        args.push("--minify".to_string());
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Profile};

    fn ctx(profile: Profile) -> BuildContext {
        BuildContext::new(profile, &Config::default())
    }

    #[test]
    fn dev_bundle_has_source_maps_but_no_minification() {
        let args = bundle_args(&ctx(Profile::Dev));

        assert!(args[0].ends_with("src/scripts/js/index.js"));
        assert!(args.contains(&"--sourcemap".to_string()));
        assert!(!args.contains(&"--minify".to_string()));
        assert!(args.iter().any(|a| a.contains("builds/dev/scripts/bundle.js")));
    }

    #[test]
    fn dist_bundle_is_minified_into_the_dist_root() {
        let args = bundle_args(&ctx(Profile::Dist));

        assert!(args.contains(&"--minify".to_string()));
        assert!(args.contains(&"--sourcemap".to_string()));
        assert!(args.iter().any(|a| a.contains("builds/dist/scripts/bundle.js")));
    }

    #[test]
    fn lint_with_no_sources_is_a_no_op() {
        // Default paths point nowhere in the test environment, so the glob
        // finds no files and no external command runs.
        assert!(lint(&ctx(Profile::Dev)).is_ok());
    }
}
