//! The standard task set: the named tasks recognized on the command line,
//! wired into a dependency graph.
//!
//! Every pipeline task depends on `clean`, so the first build of a run
//! starts from an empty output root; the runner's completion memoization
//! guarantees the wipe happens only once no matter how many tasks list it.

use crate::config::Paths;
use crate::error::GraphError;
use crate::graph::TaskGraph;
use crate::pipeline;

/// Build the default graph. Watch patterns are derived from the path table
/// so watch mode re-runs exactly the pipeline owning a changed file.
pub fn standard(paths: &Paths) -> Result<TaskGraph, GraphError> {
    let mut graph = TaskGraph::new();

    graph.add_task("clean", &[], |ctx| {
        crate::io::clean(&ctx.out_root())?;
        Ok(())
    })?;

    graph.add_task("sass", &["clean"], pipeline::styles::build)?;
    graph.add_task("js", &["clean"], pipeline::scripts::build)?;
    graph.add_task("js:lint", &[], pipeline::scripts::lint)?;
    graph.add_task("imagemin", &["clean"], pipeline::images::build)?;
    graph.add_task("svg", &["clean"], pipeline::icons::build)?;
    graph.add_task("favicons", &["clean"], pipeline::favicons::build)?;

    graph.add_composite("styles", &["sass"])?;
    graph.add_composite("scripts", &["js"])?;
    graph.add_composite("images", &["imagemin"])?;
    graph.add_composite("icons", &["svg", "favicons"])?;
    // placeholder, kept so `build` has a stable dependency list
    graph.add_composite("templates", &[])?;

    graph.add_composite(
        "build",
        &["styles", "scripts", "images", "icons", "templates"],
    )?;

    graph.watch(
        "sass",
        &paths.watch_globs(&paths.styles.dir, &paths.styles.globs),
    )?;
    graph.watch(
        "js",
        &paths.watch_globs(&paths.scripts.dir, &paths.scripts.globs),
    )?;
    graph.watch(
        "imagemin",
        &paths.watch_globs(&paths.images.dir, &paths.images.globs),
    )?;
    graph.watch(
        "svg",
        &paths.watch_globs(&paths.icons.dir, &paths.icons.globs),
    )?;
    graph.watch(
        "favicons",
        &paths.watch_globs(&paths.favicons.dir, &paths.favicons.globs_copy),
    )?;
    graph.watch(
        "favicons",
        &paths.watch_globs(&paths.favicons.dir, &paths.favicons.globs_image),
    )?;

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;

    #[test]
    fn standard_graph_is_acyclic_and_complete() {
        let graph = standard(&Paths::default()).unwrap();
        graph.validate().unwrap();

        let names: Vec<_> = graph.task_names().collect();
        for expected in [
            "clean", "sass", "js", "js:lint", "imagemin", "svg", "favicons", "styles",
            "scripts", "images", "icons", "templates", "build",
        ] {
            assert!(names.contains(&expected), "missing task '{expected}'");
        }
    }

    #[test]
    fn build_closure_reaches_every_pipeline_and_clean() {
        let graph = standard(&Paths::default()).unwrap();
        let build = graph.resolve("build").unwrap();
        let closure = graph.closure(build);

        for name in ["clean", "sass", "js", "imagemin", "svg", "favicons"] {
            assert!(closure.contains(&graph.resolve(name).unwrap()));
        }
        // lint-only task is not part of the build
        assert!(!closure.contains(&graph.resolve("js:lint").unwrap()));
    }

    #[test]
    fn style_changes_dirty_only_the_sass_task() {
        let graph = standard(&Paths::default()).unwrap();
        let dirty = graph.dirtied_by(Utf8Path::new("src/styles/sass/base/_reset.scss"));

        assert_eq!(dirty.len(), 1);
        assert!(dirty.contains(&graph.resolve("sass").unwrap()));
    }
}
