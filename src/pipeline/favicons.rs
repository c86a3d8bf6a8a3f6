//! The favicon pipeline: two independent fan-outs from the same input
//! directory into the same output directory. Manifest files (descriptors,
//! text, XML, `.ico`) are copied byte for byte; image files go through the
//! same optimization pass as the image pipeline.

use std::time::Instant;

use crate::config::BuildContext;
use crate::io::copy_verbatim;
use crate::pipeline::{failure_reporter, glob_files};

pub fn build(ctx: &BuildContext) -> anyhow::Result<()> {
    let s = Instant::now();
    let paths = &ctx.paths;

    let src_dir = paths.source_dir(&paths.favicons.dir);
    let out_dir = ctx.out_root().join(&paths.favicons.out);
    let report = failure_reporter("favicons");

    let mut copied = 0usize;
    for path in glob_files(&src_dir, &paths.favicons.globs_copy)? {
        let rel = path.strip_prefix(&src_dir).unwrap_or(&path);

        match copy_verbatim(&path, &out_dir.join(rel)) {
            Ok(()) => copied += 1,
            Err(err) => report(&anyhow::Error::new(err).context(path)),
        }
    }

    let optimized = super::images::optimize_into(
        "favicons",
        ctx,
        &src_dir,
        &paths.favicons.globs_image,
        &out_dir,
    )?;

    tracing::info!(
        "favicons: copied {copied}, optimized {optimized} {}",
        crate::io::as_overhead(s)
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use camino::{Utf8Path, Utf8PathBuf};

    use crate::config::{Config, Profile};

    fn test_ctx(root: &Utf8Path) -> BuildContext {
        let mut config = Config::default();
        config.paths.root = root.to_path_buf();
        BuildContext::new(Profile::Dist, &config)
    }

    #[test]
    fn manifests_are_copied_and_images_optimized_into_the_same_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        let favicons = root.join("src/favicons");
        fs::create_dir_all(&favicons).unwrap();

        let manifest = br#"{"name":"site","icons":[]}"#;
        fs::write(favicons.join("manifest.json"), manifest).unwrap();
        fs::write(favicons.join("browserconfig.xml"), b"<browserconfig/>").unwrap();
        image::RgbaImage::from_pixel(16, 16, image::Rgba([0, 0, 0, 255]))
            .save(favicons.join("favicon-16.png").as_std_path())
            .unwrap();

        let ctx = test_ctx(&root);
        build(&ctx).unwrap();

        let out = ctx.out_root().join("favicons");
        // byte-identical copy
        assert_eq!(fs::read(out.join("manifest.json")).unwrap(), manifest);
        assert_eq!(
            fs::read(out.join("browserconfig.xml")).unwrap(),
            b"<browserconfig/>"
        );
        // optimized image lands next to the manifests and still decodes
        let png = image::ImageReader::open(out.join("favicon-16.png").as_std_path())
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!((png.width(), png.height()), (16, 16));
    }
}
