//! The asset pipelines: one module per asset class, each a task body reading
//! from the [`BuildContext`](crate::config::BuildContext).

pub mod favicons;
pub mod icons;
pub mod images;
pub mod scripts;
pub mod styles;

use camino::{Utf8Path, Utf8PathBuf};

/// Returns the error handler for a task label.
///
/// A transform error degrades to "task aborted, run continues": the error is
/// written to the log, a prominent red line tells the user where to look, and
/// control returns to the caller so sibling files and tasks are unaffected.
pub(crate) fn failure_reporter(task: &'static str) -> impl Fn(&anyhow::Error) {
    move |err| {
        tracing::error!(task, "{err:#}");
        eprintln!(
            "{}",
            console::style(format!("{task} failed, check the logs.."))
                .red()
                .bold()
        );
    }
}

/// Expand glob patterns relative to `dir` into a sorted list of files.
pub(crate) fn glob_files(dir: &Utf8Path, globs: &[String]) -> anyhow::Result<Vec<Utf8PathBuf>> {
    let mut files = Vec::new();

    for pattern in globs {
        for entry in glob::glob(dir.join(pattern).as_str())? {
            let path = Utf8PathBuf::try_from(entry?)?;
            if path.is_file() {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_files_matches_nested_sources() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        std::fs::create_dir_all(root.join("base")).unwrap();
        std::fs::write(root.join("app.scss"), "").unwrap();
        std::fs::write(root.join("base/reset.scss"), "").unwrap();
        std::fs::write(root.join("notes.txt"), "").unwrap();

        let files = glob_files(root, &["**/*.scss".to_string()]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension() == Some("scss")));
    }
}
