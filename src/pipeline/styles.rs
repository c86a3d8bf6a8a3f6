//! The style pipeline: Sass sources are compiled to CSS with `grass`, then
//! post-processed with `lightningcss` according to the active option set
//! (vendor prefixing and syntax lowering for the configured browser matrix,
//! minification on dist).
//!
//! A file that fails to compile is reported and dropped; the remaining files
//! still produce output.

use std::time::Instant;

use camino::Utf8Path;
use lightningcss::printer::PrinterOptions;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};

use crate::config::{BuildContext, StyleOptions};
use crate::io::write_if_changed;
use crate::pipeline::{failure_reporter, glob_files};

pub fn build(ctx: &BuildContext) -> anyhow::Result<()> {
    let s = Instant::now();
    let opts = &ctx.options.styles;
    let paths = &ctx.paths;

    let src_dir = paths.source_dir(&paths.styles.dir);
    let out_dir = ctx.out_root().join(&paths.styles.out);
    let report = failure_reporter("styles");

    let mut emitted = 0usize;
    for path in glob_files(&src_dir, &paths.styles.globs)? {
        // Underscore-prefixed files are Sass partials, reachable only
        // through @use/@import.
        if path.file_name().is_some_and(|name| name.starts_with('_')) {
            continue;
        }

        let rel = path.strip_prefix(&src_dir).unwrap_or(&path);
        let out = out_dir.join(rel).with_extension("css");

        match compile(&path, &paths.root, opts) {
            Ok(css) => {
                write_if_changed(&out, css.as_bytes())?;
                emitted += 1;
            }
            Err(err) => report(&err.context(path)),
        }
    }

    tracing::info!("compiled {emitted} stylesheets {}", crate::io::as_overhead(s));

    Ok(())
}

/// Compile one Sass entry file and post-process the result.
fn compile(path: &Utf8Path, root: &Utf8Path, opts: &StyleOptions) -> anyhow::Result<String> {
    let mut grass_opts = grass::Options::default().style(grass::OutputStyle::Expanded);

    for include in &opts.include {
        grass_opts = grass_opts.load_path(root.join(include).as_std_path());
    }

    let css = grass::from_path(path.as_std_path(), &grass_opts)
        .map_err(|err| anyhow::anyhow!("{err}"))?;

    postprocess(&css, opts)
}

fn postprocess(css: &str, opts: &StyleOptions) -> anyhow::Result<String> {
    let browsers = browser_targets(&opts.browsers)?;
    let targets = Targets {
        browsers,
        ..Targets::default()
    };

    let mut stylesheet = StyleSheet::parse(css, ParserOptions::default())
        .map_err(|err| anyhow::anyhow!("css parse error: {err}"))?;

    stylesheet
        .minify(MinifyOptions {
            targets: targets.clone(),
            ..MinifyOptions::default()
        })
        .map_err(|err| anyhow::anyhow!("css transform error: {err}"))?;

    let output = stylesheet
        .to_css(PrinterOptions {
            minify: opts.minify,
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|err| anyhow::anyhow!("css print error: {err}"))?;

    Ok(output.code)
}

fn browser_targets(queries: &[String]) -> anyhow::Result<Option<Browsers>> {
    Browsers::from_browserslist(queries.iter().map(String::as_str))
        .map_err(|err| anyhow::anyhow!("invalid browser targets: {err}"))
}
