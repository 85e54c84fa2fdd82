//! Filesystem primitives behind [`Action`](super::Action).
use anyhow::{Context as _, Result};
use std::fs::{self, File, Permissions};
use std::io::{self, Read as _, Write};
use std::os::unix::fs::{FileTypeExt as _, MetadataExt as _, PermissionsExt as _};
use std::path::{Path, PathBuf};

const ARCHIVE_EXTENSION: &str = "tar.bz2";
const COMPARE_CHUNK: usize = 64 * 1024;

/// Create a single directory and set its permission bits explicitly, so the
/// process umask does not leak into the result.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or chmodded.
pub fn create_dir_with_mode(path: &Path, mode: u32) -> Result<()> {
    fs::create_dir(path).with_context(|| format!("create directory: {}", path.display()))?;
    set_mode(path, mode)
}

/// Set the permission bits of `path`.
///
/// # Errors
///
/// Returns an error if the permissions cannot be changed.
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, Permissions::from_mode(mode))
        .with_context(|| format!("set permissions: {}", path.display()))
}

/// Change the owning uid and/or gid of `path`; `None` leaves that id as is.
///
/// # Errors
///
/// Returns an error if the ownership cannot be changed.
pub fn set_owner(path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
    std::os::unix::fs::chown(path, uid, gid)
        .with_context(|| format!("change ownership: {}", path.display()))
}

/// Whether `dir` contains at least one entry.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed.
pub fn has_entries(dir: &Path) -> Result<bool> {
    let mut entries =
        fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))?;
    Ok(entries.next().is_some())
}

/// First free archive path for `source` inside `trash`:
/// `<trash>/<name>.tar.bz2`, then `<name>_1.tar.bz2`, `<name>_2.tar.bz2`, ...
#[must_use]
pub fn free_archive_path(trash: &Path, source: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map_or_else(|| "archive".into(), |n| n.to_string_lossy().into_owned());
    let mut candidate = trash.join(format!("{name}.{ARCHIVE_EXTENSION}"));
    let mut suffix = 0u64;
    while candidate.symlink_metadata().is_ok() {
        suffix += 1;
        candidate = trash.join(format!("{name}_{suffix}.{ARCHIVE_EXTENSION}"));
    }
    candidate
}

/// Archive `source` into a bzip2-compressed tarball inside `trash` and set
/// the archive's permission bits to `mode`.
///
/// Entries are stored under the directory's base name. Symbolic links are
/// archived as links, never followed, and sockets are left out. On failure
/// the partly written archive is removed again.
///
/// # Errors
///
/// Returns an error if the archive cannot be written or chmodded.
pub fn archive_directory(source: &Path, trash: &Path, mode: u32) -> Result<PathBuf> {
    let destination = free_archive_path(trash, source);
    let file = File::options()
        .write(true)
        .create_new(true)
        .open(&destination)
        .with_context(|| format!("create archive: {}", destination.display()))?;

    let written = write_archive(file, source)
        .with_context(|| format!("archive {}", source.display()))
        .and_then(|()| set_mode(&destination, mode));
    if let Err(e) = written {
        return Err(match fs::remove_file(&destination) {
            Ok(()) => e,
            Err(cleanup) => e.context(format!(
                "partial archive {} left behind: {cleanup}",
                destination.display()
            )),
        });
    }
    Ok(destination)
}

fn write_archive(file: File, source: &Path) -> Result<()> {
    let encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    let name = Path::new(source.file_name().unwrap_or(source.as_os_str()));
    append_tree(&mut builder, source, name)?;
    builder
        .into_inner()
        .and_then(bzip2::write::BzEncoder::finish)
        .context("finish archive")?;
    Ok(())
}

/// Append `dir` as `name`, then its entries sorted by file name.
fn append_tree<W: Write>(builder: &mut tar::Builder<W>, dir: &Path, name: &Path) -> Result<()> {
    builder
        .append_dir(name, dir)
        .with_context(|| format!("add {}", dir.display()))?;
    let mut entries = fs::read_dir(dir)
        .and_then(Iterator::collect::<io::Result<Vec<_>>>)
        .with_context(|| format!("listing {}", dir.display()))?;
    entries.sort_by_key(fs::DirEntry::file_name);
    for entry in entries {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("inspecting {}", path.display()))?;
        let entry_name = name.join(entry.file_name());
        if file_type.is_socket() {
            continue;
        }
        if file_type.is_dir() {
            append_tree(builder, &path, &entry_name)?;
        } else {
            builder
                .append_path_with_name(&path, &entry_name)
                .with_context(|| format!("add {}", path.display()))?;
        }
    }
    Ok(())
}

/// Remove a directory tree.
///
/// # Errors
///
/// Returns an error if any entry cannot be removed.
pub fn remove_tree(path: &Path) -> Result<()> {
    fs::remove_dir_all(path).with_context(|| format!("remove directory: {}", path.display()))
}

/// Remove an existing file or symlink at `path`, including broken symlinks.
///
/// Does nothing if `path` does not exist.
///
/// # Errors
///
/// Returns an error if the path exists but cannot be removed.
pub fn remove_existing(path: &Path) -> Result<()> {
    if path.symlink_metadata().is_ok() {
        fs::remove_file(path).with_context(|| format!("remove existing: {}", path.display()))?;
    }
    Ok(())
}

/// Whether `destination` is a regular file with exactly the bytes of
/// `source`. Symlinks at `destination` are not followed.
///
/// # Errors
///
/// Returns an error if `source` cannot be read.
pub fn files_identical(source: &Path, destination: &Path) -> Result<bool> {
    let src_meta =
        fs::metadata(source).with_context(|| format!("read source: {}", source.display()))?;
    let dst_meta = match destination.symlink_metadata() {
        Ok(meta) if meta.file_type().is_file() => meta,
        _ => return Ok(false),
    };
    if src_meta.len() != dst_meta.len() {
        return Ok(false);
    }

    let mut src = File::open(source).with_context(|| format!("open {}", source.display()))?;
    let mut dst =
        File::open(destination).with_context(|| format!("open {}", destination.display()))?;
    let mut src_buf = vec![0u8; COMPARE_CHUNK];
    let mut dst_buf = vec![0u8; COMPARE_CHUNK];
    loop {
        let read = read_full(&mut src, &mut src_buf)
            .with_context(|| format!("read {}", source.display()))?;
        let dst_read = read_full(&mut dst, &mut dst_buf)
            .with_context(|| format!("read {}", destination.display()))?;
        if read != dst_read || src_buf.get(..read) != dst_buf.get(..read) {
            return Ok(false);
        }
        if read == 0 {
            return Ok(true);
        }
    }
}

fn read_full(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let Some(rest) = buf.get_mut(filled..) else {
            break;
        };
        match file.read(rest)? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Copy `source` to `destination` preserving content, permission bits,
/// access/modification times and, when permitted, ownership.
///
/// An existing file or symlink at `destination` is removed first. Symlinks
/// at `source` are dereferenced.
///
/// # Errors
///
/// Returns an error if the copy or timestamp update fails, or if changing
/// ownership fails for a reason other than missing privileges.
pub fn copy_preserving(source: &Path, destination: &Path) -> Result<()> {
    remove_existing(destination)?;
    fs::copy(source, destination).with_context(|| {
        format!("copy {} to {}", source.display(), destination.display())
    })?;

    let meta =
        fs::metadata(source).with_context(|| format!("read source: {}", source.display()))?;
    filetime::set_file_times(
        destination,
        filetime::FileTime::from_last_access_time(&meta),
        filetime::FileTime::from_last_modification_time(&meta),
    )
    .with_context(|| format!("set times: {}", destination.display()))?;

    match std::os::unix::fs::chown(destination, Some(meta.uid()), Some(meta.gid())) {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Ok(()),
        other => other.with_context(|| format!("change ownership: {}", destination.display())),
    }
}
