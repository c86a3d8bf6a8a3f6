//! The image pipeline: raster and vector assets are re-encoded with an
//! aggressiveness set by the active option set and written to the output
//! root, mirroring the source subpath structure.
//!
//! The favicon pipeline reuses [`optimize_into`] for its image fan-out.

use std::fs;
use std::time::Instant;

use camino::Utf8Path;
use image::ImageReader;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, PngEncoder};

use crate::config::{BuildContext, ImageOptions, PngEffort};
use crate::io::{copy_verbatim, write_if_changed};
use crate::pipeline::{failure_reporter, glob_files};

pub fn build(ctx: &BuildContext) -> anyhow::Result<()> {
    let s = Instant::now();
    let paths = &ctx.paths;

    let src_dir = paths.source_dir(&paths.images.dir);
    let out_dir = ctx.out_root().join(&paths.images.out);

    let written = optimize_into("images", ctx, &src_dir, &paths.images.globs, &out_dir)?;

    tracing::info!("optimized {written} images {}", crate::io::as_overhead(s));

    Ok(())
}

/// Optimize every file matching `globs` under `src_dir` into `out_dir`,
/// keeping relative subpaths. A file that fails to process is reported under
/// `task` and skipped; the rest of the set is unaffected.
pub(crate) fn optimize_into(
    task: &'static str,
    ctx: &BuildContext,
    src_dir: &Utf8Path,
    globs: &[String],
    out_dir: &Utf8Path,
) -> anyhow::Result<usize> {
    let report = failure_reporter(task);
    let opts = &ctx.options.images;

    let mut written = 0usize;
    for path in glob_files(src_dir, globs)? {
        let rel = path.strip_prefix(src_dir).unwrap_or(&path);
        let out = out_dir.join(rel);

        match optimize_file(&path, &out, opts) {
            Ok(()) => written += 1,
            Err(err) => report(&err.context(path)),
        }
    }

    Ok(written)
}

fn optimize_file(path: &Utf8Path, out: &Utf8Path, opts: &ImageOptions) -> anyhow::Result<()> {
    match path.extension() {
        Some("png") => {
            let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
            let mut buffer = Vec::new();

            let compression = match opts.png {
                PngEffort::Fast => CompressionType::Fast,
                PngEffort::Best => CompressionType::Best,
            };
            image.write_with_encoder(PngEncoder::new_with_quality(
                &mut buffer,
                compression,
                image::codecs::png::FilterType::Adaptive,
            ))?;

            write_if_changed(out, &buffer)?;
        }
        Some("jpg") | Some("jpeg") => {
            let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
            let mut buffer = Vec::new();

            image.write_with_encoder(JpegEncoder::new_with_quality(
                &mut buffer,
                opts.jpeg_quality,
            ))?;

            write_if_changed(out, &buffer)?;
        }
        Some("svg") => {
            let text = fs::read_to_string(path)?;
            let text = if opts.minify_svg {
                minify_svg(&text)
            } else {
                text
            };

            write_if_changed(out, text.as_bytes())?;
        }
        // Re-encoding would flatten animated GIFs, so they pass through.
        Some("gif") => copy_verbatim(path, out)?,
        _ => anyhow::bail!("unsupported image format: {path}"),
    }

    Ok(())
}

/// Conservative SVG minification: strips XML comments, indentation and blank
/// lines. Markup structure is left untouched.
pub(crate) fn minify_svg(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("<!--") {
        stripped.push_str(&rest[..start]);
        match rest[start..].find("-->") {
            Some(end) => rest = &rest[start + end + 3..],
            None => {
                rest = "";
                break;
            }
        }
    }
    stripped.push_str(rest);

    stripped
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    use crate::config::{Config, Profile};

    fn test_ctx(root: &Utf8Path, profile: Profile) -> BuildContext {
        let mut config = Config::default();
        config.paths.root = root.to_path_buf();
        BuildContext::new(profile, &config)
    }

    fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        (dir, path)
    }

    #[test]
    fn png_is_reencoded_with_same_dimensions() {
        let (_guard, root) = temp_root();
        let src = root.join("src/images/pixel/red.png");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        image::RgbaImage::from_pixel(4, 4, image::Rgba([255, 0, 0, 255]))
            .save(src.as_std_path())
            .unwrap();

        let ctx = test_ctx(&root, Profile::Dist);
        build(&ctx).unwrap();

        let out = ctx.out_root().join("images/pixel/red.png");
        let decoded = ImageReader::open(out.as_std_path())
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 4));
    }

    #[test]
    fn broken_image_is_skipped_not_fatal() {
        let (_guard, root) = temp_root();
        let dir = root.join("src/images");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("junk.png"), b"not a png").unwrap();
        image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 255, 255]))
            .save(dir.join("ok.png").as_std_path())
            .unwrap();

        let ctx = test_ctx(&root, Profile::Dev);
        build(&ctx).unwrap();

        let out = ctx.out_root().join("images");
        assert!(out.join("ok.png").exists());
        assert!(!out.join("junk.png").exists());
    }

    #[test]
    fn svg_minification_strips_comments_and_indentation() {
        let svg = "<!-- generated -->\n<svg>\n    <path d=\"M0 0\"/>\n\n</svg>\n";
        let min = minify_svg(svg);
        assert_eq!(min, "<svg>\n<path d=\"M0 0\"/>\n</svg>");
    }

    #[test]
    fn gif_passes_through_byte_identical() {
        let (_guard, root) = temp_root();
        let dir = root.join("src/images");
        fs::create_dir_all(&dir).unwrap();
        // Not a decodable GIF; pass-through must not care.
        fs::write(dir.join("anim.gif"), b"GIF89a-fake").unwrap();

        let ctx = test_ctx(&root, Profile::Dist);
        build(&ctx).unwrap();

        assert_eq!(
            fs::read(ctx.out_root().join("images/anim.gif")).unwrap(),
            b"GIF89a-fake"
        );
    }
}
