//! The icon pipeline: every SVG under the icon directory becomes a `<symbol>`
//! in a single sprite document. The symbol identifier is the source file's
//! directory-joined basename (path separators replaced with hyphens,
//! lower-cased) so the directory context survives the merge.
//!
//! Duplicate identifiers are a hard error rather than last-write-wins:
//! silently dropping an icon is worse than failing the task.

use std::collections::HashMap;
use std::fs;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::config::BuildContext;
use crate::io::write_if_changed;
use crate::pipeline::{failure_reporter, glob_files};

#[derive(Debug, Error)]
pub enum SpriteError {
    #[error("duplicate sprite symbol '{id}' from {first} and {second}")]
    DuplicateSymbol {
        id: String,
        first: Utf8PathBuf,
        second: Utf8PathBuf,
    },

    #[error("missing or unclosed <svg> root element")]
    Malformed,
}

pub fn build(ctx: &BuildContext) -> anyhow::Result<()> {
    let s = Instant::now();
    let paths = &ctx.paths;

    let src_dir = paths.source_dir(&paths.icons.dir);
    let out = ctx
        .out_root()
        .join(&paths.icons.out)
        .join(&paths.icons.out_file);
    let report = failure_reporter("icons");

    let mut seen: HashMap<String, Utf8PathBuf> = HashMap::new();
    let mut symbols: Vec<String> = Vec::new();

    for path in glob_files(&src_dir, &paths.icons.globs)? {
        let rel = path.strip_prefix(&src_dir).unwrap_or(&path);
        let id = flatten(rel);

        if let Some(first) = seen.get(&id) {
            return Err(SpriteError::DuplicateSymbol {
                id,
                first: first.clone(),
                second: path.clone(),
            }
            .into());
        }

        // Claim the id even if conversion fails below, so a later file with
        // the same flattened name still collides.
        seen.insert(id.clone(), path.clone());

        let text = fs::read_to_string(&path)?;
        let text = if ctx.options.images.minify_svg {
            super::images::minify_svg(&text)
        } else {
            text
        };

        match to_symbol(&id, &text) {
            Ok(symbol) => symbols.push(symbol),
            Err(err) => report(&anyhow::Error::new(err).context(path)),
        }
    }

    write_if_changed(&out, assemble(&symbols).as_bytes())?;

    tracing::info!(
        "assembled {} icons into {} {}",
        symbols.len(),
        paths.icons.out_file,
        crate::io::as_overhead(s)
    );

    Ok(())
}

/// `a/b/icon.svg` becomes `a-b-icon`; a top-level `icon.svg` stays `icon`.
fn flatten(rel: &Utf8Path) -> String {
    let stem = rel.file_stem().unwrap_or("icon");

    let mut parts: Vec<&str> = rel
        .parent()
        .map(|dir| dir.components().map(|c| c.as_str()).collect())
        .unwrap_or_default();
    parts.push(stem);

    parts.join("-").to_lowercase()
}

/// Rewrap one SVG document as a `<symbol>` with the given identifier,
/// carrying over the `viewBox` attribute when present.
fn to_symbol(id: &str, svg: &str) -> Result<String, SpriteError> {
    let start = svg.find("<svg").ok_or(SpriteError::Malformed)?;
    let open_end = svg[start..].find('>').ok_or(SpriteError::Malformed)? + start;
    let attrs = &svg[start + 4..open_end];

    let inner = if attrs.trim_end().ends_with('/') {
        ""
    } else {
        let close = svg.rfind("</svg>").ok_or(SpriteError::Malformed)?;
        if close < open_end {
            return Err(SpriteError::Malformed);
        }
        svg[open_end + 1..close].trim()
    };

    Ok(match extract_attr(attrs, "viewBox") {
        Some(view_box) => {
            format!("<symbol id=\"{id}\" viewBox=\"{view_box}\">{inner}</symbol>")
        }
        None => format!("<symbol id=\"{id}\">{inner}</symbol>"),
    })
}

fn extract_attr(attrs: &str, name: &str) -> Option<String> {
    let key = format!("{name}=\"");
    let start = attrs.find(&key)? + key.len();
    let end = attrs[start..].find('"')? + start;
    Some(attrs[start..end].to_string())
}

fn assemble(symbols: &[String]) -> String {
    let mut doc =
        String::from("<svg xmlns=\"http://www.w3.org/2000/svg\" style=\"display:none\">\n");

    for symbol in symbols {
        doc.push_str(symbol);
        doc.push('\n');
    }

    doc.push_str("</svg>\n");
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::{Config, Profile};

    #[test]
    fn flatten_joins_directories_and_lowercases() {
        assert_eq!(flatten(Utf8Path::new("a/b/icon.svg")), "a-b-icon");
        assert_eq!(flatten(Utf8Path::new("icon.svg")), "icon");
        assert_eq!(flatten(Utf8Path::new("Social/Twitter.svg")), "social-twitter");
    }

    #[test]
    fn symbol_keeps_the_view_box() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24"><path d="M0 0"/></svg>"#;
        let symbol = to_symbol("a-b-icon", svg).unwrap();
        assert_eq!(
            symbol,
            r#"<symbol id="a-b-icon" viewBox="0 0 24 24"><path d="M0 0"/></symbol>"#
        );
    }

    #[test]
    fn symbol_without_view_box() {
        let symbol = to_symbol("dot", "<svg><circle r=\"1\"/></svg>").unwrap();
        assert_eq!(symbol, "<symbol id=\"dot\"><circle r=\"1\"/></symbol>");
    }

    #[test]
    fn not_an_svg_is_malformed() {
        assert!(matches!(
            to_symbol("x", "<div></div>"),
            Err(SpriteError::Malformed)
        ));
    }

    #[test]
    fn sprite_contains_flattened_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        let icons = root.join("src/icons");
        fs::create_dir_all(icons.join("a/b")).unwrap();
        fs::write(icons.join("icon.svg"), "<svg viewBox=\"0 0 8 8\"><rect/></svg>").unwrap();
        fs::write(
            icons.join("a/b/icon.svg"),
            "<svg viewBox=\"0 0 16 16\"><path/></svg>",
        )
        .unwrap();

        let mut config = Config::default();
        config.paths.root = root.clone();
        let ctx = BuildContext::new(Profile::Dev, &config);

        build(&ctx).unwrap();

        let sprite =
            fs::read_to_string(ctx.out_root().join("icons/symbols.svg")).unwrap();
        assert!(sprite.contains("id=\"a-b-icon\""));
        assert!(sprite.contains("id=\"icon\""));
        assert!(sprite.starts_with("<svg "));
    }

    #[test]
    fn duplicate_flattened_names_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        let icons = root.join("src/icons");
        fs::create_dir_all(icons.join("Menu")).unwrap();
        fs::write(icons.join("menu-close.svg"), "<svg/>").unwrap();
        fs::write(icons.join("Menu/close.svg"), "<svg/>").unwrap();

        let mut config = Config::default();
        config.paths.root = root;
        let ctx = BuildContext::new(Profile::Dev, &config);

        let err = build(&ctx).unwrap_err();
        assert!(err.to_string().contains("duplicate sprite symbol"));
    }

    #[test]
    fn duplicate_of_a_malformed_icon_is_still_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        let icons = root.join("src/icons");
        fs::create_dir_all(icons.join("Menu")).unwrap();
        // Sorts first and fails conversion; the id must be claimed anyway.
        fs::write(icons.join("Menu/close.svg"), "<div></div>").unwrap();
        fs::write(icons.join("menu-close.svg"), "<svg/>").unwrap();

        let mut config = Config::default();
        config.paths.root = root;
        let ctx = BuildContext::new(Profile::Dev, &config);

        let err = build(&ctx).unwrap_err();
        assert!(err.to_string().contains("duplicate sprite symbol"));
    }
}
