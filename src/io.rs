//! Filesystem helpers shared by the pipelines: wiping the output root,
//! change-aware writes and timing output.

use std::fmt::Display;
use std::fs;
use std::time::Instant;

use camino::Utf8Path;
use console::Style;

use crate::error::CleanError;

const ANSI_BLUE: Style = Style::new().blue();

/// Formats the time elapsed since `s` as a dim suffix for log lines.
pub fn as_overhead(s: Instant) -> impl Display {
    let e = Instant::now();
    let f = format!("(+{}ms)", e.duration_since(s).as_millis());
    ANSI_BLUE.apply_to(f)
}

/// A 32-byte BLAKE3 content hash, used to detect unchanged outputs.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct Hash32([u8; 32]);

impl Hash32 {
    pub(crate) fn hash(buffer: impl AsRef<[u8]>) -> Self {
        Hash32(
            blake3::Hasher::new()
                .update(buffer.as_ref())
                .finalize()
                .into(),
        )
    }

    pub(crate) fn hash_file(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        Ok(Hash32(
            blake3::Hasher::new().update_mmap(path)?.finalize().into(),
        ))
    }
}

/// Delete the active output root recursively and recreate it empty.
///
/// The runner memoizes task completion, so within a run this executes at
/// most once no matter how many tasks depend on `clean`.
pub fn clean(out_root: &Utf8Path) -> Result<(), CleanError> {
    let s = Instant::now();

    if fs::metadata(out_root).is_ok() {
        fs::remove_dir_all(out_root)?;
    }

    fs::create_dir_all(out_root)?;

    tracing::info!("cleaned build directory {} {}", out_root, as_overhead(s));

    Ok(())
}

/// Write `data` to `path`, creating parent directories as needed. Returns
/// `false` without touching the file when the content is already identical,
/// so watch mode does not push reloads for no-op rebuilds.
pub fn write_if_changed(path: &Utf8Path, data: &[u8]) -> std::io::Result<bool> {
    if path.exists() && Hash32::hash_file(path)? == Hash32::hash(data) {
        return Ok(false);
    }

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    fs::write(path, data)?;

    Ok(true)
}

/// Copy a file byte for byte, creating parent directories as needed.
pub fn copy_verbatim(src: &Utf8Path, dst: &Utf8Path) -> std::io::Result<()> {
    if let Some(dir) = dst.parent() {
        fs::create_dir_all(dir)?;
    }

    fs::copy(src, dst)?;

    Ok(())
}
