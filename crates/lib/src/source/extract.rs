//! Archive extraction.
//!
//! Supports:
//! - `.tar`
//! - `.tar.gz` / `.tgz`
//! - `.tar.xz` / `.txz`
//! - `.zip`
//!
//! The leading `strip` path components of every entry are dropped, the way
//! release tarballs wrap their tree in a `name-version/` directory. Entries
//! that would land outside the destination are rejected, including writes
//! through a symlink unpacked by an earlier entry.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;
use tracing::debug;
use xz2::read::XzDecoder;

#[derive(Debug, Error)]
pub enum ExtractError {
  #[error("unsupported archive format: {0}")]
  Unsupported(String),

  #[error("archive entry escapes the destination: {0}")]
  UnsafePath(PathBuf),

  #[error("invalid zip archive: {0}")]
  Zip(String),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

/// Archive container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
  Tar,
  TarGz,
  TarXz,
  Zip,
}

impl ArchiveFormat {
  /// Detect the format from a file name.
  pub fn from_name(name: &str) -> Option<Self> {
    let name = name.to_ascii_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
      Some(Self::TarGz)
    } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
      Some(Self::TarXz)
    } else if name.ends_with(".tar") {
      Some(Self::Tar)
    } else if name.ends_with(".zip") {
      Some(Self::Zip)
    } else {
      None
    }
  }
}

/// Unpack `archive` into `dest`, named `name` for format detection.
pub fn extract_archive(archive: &Path, name: &str, dest: &Path, strip: usize) -> Result<(), ExtractError> {
  let format = ArchiveFormat::from_name(name).ok_or_else(|| ExtractError::Unsupported(name.to_string()))?;
  fs::create_dir_all(dest)?;

  let file = BufReader::new(File::open(archive)?);
  match format {
    ArchiveFormat::Tar => unpack_tar(file, dest, strip)?,
    ArchiveFormat::TarGz => unpack_tar(GzDecoder::new(file), dest, strip)?,
    ArchiveFormat::TarXz => unpack_tar(XzDecoder::new(file), dest, strip)?,
    ArchiveFormat::Zip => unpack_zip(archive, dest, strip)?,
  }

  debug!(archive = %archive.display(), dest = %dest.display(), strip, "extracted archive");
  Ok(())
}

/// Drop the first `strip` components; `None` when nothing remains.
fn strip_path(path: &Path, strip: usize) -> Result<Option<PathBuf>, ExtractError> {
  let mut out = PathBuf::new();
  for component in path.components().filter(|c| !matches!(c, Component::CurDir)).skip(strip) {
    match component {
      Component::Normal(part) => out.push(part),
      _ => return Err(ExtractError::UnsafePath(path.to_path_buf())),
    }
  }
  Ok(if out.as_os_str().is_empty() { None } else { Some(out) })
}

/// Fail if a directory between `dest` and `relative` is a symlink.
fn check_no_symlink_parents(dest: &Path, relative: &Path) -> Result<(), ExtractError> {
  let mut current = dest.to_path_buf();
  let parents = relative.parent().into_iter().flat_map(|p| p.components());
  for component in parents {
    current.push(component);
    match fs::symlink_metadata(&current) {
      Ok(meta) if meta.file_type().is_symlink() => return Err(ExtractError::UnsafePath(relative.to_path_buf())),
      Ok(_) => {}
      Err(_) => break,
    }
  }
  Ok(())
}

/// Resolve where an entry lands, creating its parent and replacing a symlink at the target.
fn prepare_target(dest: &Path, relative: &Path) -> Result<PathBuf, ExtractError> {
  check_no_symlink_parents(dest, relative)?;
  let target = dest.join(relative);
  if fs::symlink_metadata(&target).is_ok_and(|m| m.file_type().is_symlink()) {
    fs::remove_file(&target)?;
  }
  if let Some(parent) = target.parent() {
    fs::create_dir_all(parent)?;
  }
  Ok(target)
}

fn unpack_tar<R: Read>(reader: R, dest: &Path, strip: usize) -> Result<(), ExtractError> {
  let mut archive = Archive::new(reader);
  archive.set_preserve_permissions(true);

  for entry in archive.entries()? {
    let mut entry = entry?;
    let path = entry.path()?.into_owned();
    let Some(stripped) = strip_path(&path, strip)? else {
      continue;
    };
    let target = prepare_target(dest, &stripped)?;

    // Hard link names are archive paths; `unpack` would resolve them against the cwd.
    if entry.header().entry_type().is_hard_link() {
      let link = entry
        .link_name()?
        .ok_or_else(|| ExtractError::UnsafePath(path.clone()))?
        .into_owned();
      if link.is_absolute() {
        return Err(ExtractError::UnsafePath(link));
      }
      let original = strip_path(&link, strip)?.ok_or_else(|| ExtractError::UnsafePath(path.clone()))?;
      check_no_symlink_parents(dest, &original)?;
      let original = dest.join(original);
      if fs::symlink_metadata(&original).is_ok_and(|m| m.file_type().is_symlink()) {
        return Err(ExtractError::UnsafePath(path));
      }
      fs::hard_link(&original, &target)?;
      continue;
    }

    entry.unpack(&target)?;
  }
  Ok(())
}

fn unpack_zip(archive_path: &Path, dest: &Path, strip: usize) -> Result<(), ExtractError> {
  let file = File::open(archive_path)?;
  let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| ExtractError::Zip(e.to_string()))?;

  for i in 0..archive.len() {
    let mut file = archive.by_index(i).map_err(|e| ExtractError::Zip(e.to_string()))?;
    let path = file
      .enclosed_name()
      .ok_or_else(|| ExtractError::UnsafePath(PathBuf::from(file.name())))?;
    let Some(stripped) = strip_path(&path, strip)? else {
      continue;
    };

    let dest_path = prepare_target(dest, &stripped)?;
    if file.is_dir() {
      fs::create_dir_all(&dest_path)?;
      continue;
    }
    let mut outfile = File::create(&dest_path)?;
    std::io::copy(&mut file, &mut outfile)?;

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      if let Some(mode) = file.unix_mode() {
        fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode))?;
      }
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;
  use crate::util::testutil::write_tar_gz;
  use tempfile::TempDir;

  #[test]
  fn detects_formats() {
    assert_eq!(ArchiveFormat::from_name("a-1.0.tar.gz"), Some(ArchiveFormat::TarGz));
    assert_eq!(ArchiveFormat::from_name("a.TGZ"), Some(ArchiveFormat::TarGz));
    assert_eq!(ArchiveFormat::from_name("a.tar.xz"), Some(ArchiveFormat::TarXz));
    assert_eq!(ArchiveFormat::from_name("a.tar"), Some(ArchiveFormat::Tar));
    assert_eq!(ArchiveFormat::from_name("a.zip"), Some(ArchiveFormat::Zip));
    assert_eq!(ArchiveFormat::from_name("a.rar"), None);
  }

  #[test]
  fn tar_gz_strips_top_directory() {
    let temp = TempDir::new().unwrap();
    let archive = write_tar_gz(
      &temp.path().join("foo-1.0.tar.gz"),
      "foo-1.0",
      &[("configure", "#!/bin/sh\n"), ("src/main.c", "int main;")],
    );
    let dest = temp.path().join("out");

    extract_archive(&archive, "foo-1.0.tar.gz", &dest, 1).unwrap();
    assert!(dest.join("configure").is_file());
    assert_eq!(fs::read_to_string(dest.join("src/main.c")).unwrap(), "int main;");
  }

  #[test]
  fn strip_zero_keeps_top_directory() {
    let temp = TempDir::new().unwrap();
    let archive = write_tar_gz(&temp.path().join("a.tar.gz"), "top", &[("f", "x")]);
    let dest = temp.path().join("out");

    extract_archive(&archive, "a.tar.gz", &dest, 0).unwrap();
    assert!(dest.join("top/f").is_file());
  }

  #[test]
  fn tar_xz_is_supported() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a.tar.xz");
    {
      let encoder = xz2::write::XzEncoder::new(File::create(&path).unwrap(), 6);
      let mut builder = tar::Builder::new(encoder);
      let mut header = tar::Header::new_gnu();
      header.set_size(5);
      header.set_mode(0o644);
      header.set_cksum();
      builder.append_data(&mut header, "pkg/README", &b"hello"[..]).unwrap();
      builder.into_inner().unwrap().finish().unwrap();
    }
    let dest = temp.path().join("out");

    extract_archive(&path, "a.tar.xz", &dest, 1).unwrap();
    assert_eq!(fs::read_to_string(dest.join("README")).unwrap(), "hello");
  }

  #[test]
  fn zip_is_supported() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a.zip");
    {
      let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
      let options = zip::write::SimpleFileOptions::default();
      writer.start_file("pkg/bin/tool", options).unwrap();
      writer.write_all(b"tool").unwrap();
      writer.finish().unwrap();
    }
    let dest = temp.path().join("out");

    extract_archive(&path, "a.zip", &dest, 1).unwrap();
    assert_eq!(fs::read_to_string(dest.join("bin/tool")).unwrap(), "tool");
  }

  #[test]
  fn unsupported_format_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a.rar");
    fs::write(&path, "x").unwrap();
    assert!(matches!(
      extract_archive(&path, "a.rar", temp.path(), 1),
      Err(ExtractError::Unsupported(_))
    ));
  }

  /// A `.tar` with the given `(path, kind)` entries, written without path checks.
  fn raw_tar(path: &Path, entries: &[(&str, tar::EntryType, &str)]) {
    let mut builder = tar::Builder::new(File::create(path).unwrap());
    for (name, kind, payload) in entries {
      let mut header = tar::Header::new_gnu();
      header.set_entry_type(*kind);
      header.set_mode(0o644);
      if kind.is_file() {
        header.set_size(payload.len() as u64);
      } else {
        header.set_size(0);
        header.set_link_name(payload).unwrap();
      }
      header.set_path(name).unwrap();
      header.set_cksum();
      let data: &[u8] = if kind.is_file() { payload.as_bytes() } else { &[] };
      builder.append(&header, data).unwrap();
    }
    builder.into_inner().unwrap().flush().unwrap();
  }

  #[cfg(unix)]
  #[test]
  fn write_through_unpacked_symlink_is_rejected() {
    let temp = TempDir::new().unwrap();
    let outside = temp.path().join("outside");
    fs::create_dir_all(&outside).unwrap();
    let archive = temp.path().join("evil.tar");
    raw_tar(
      &archive,
      &[
        ("pkg/link", tar::EntryType::Symlink, outside.to_str().unwrap()),
        ("pkg/link/owned", tar::EntryType::Regular, "gotcha"),
      ],
    );

    let err = extract_archive(&archive, "evil.tar", &temp.path().join("out"), 1).unwrap_err();
    assert!(matches!(err, ExtractError::UnsafePath(_)));
    assert!(!outside.join("owned").exists());
  }

  #[cfg(unix)]
  #[test]
  fn relative_symlinks_and_hard_links_stay_inside() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("libs.tar");
    raw_tar(
      &archive,
      &[
        ("pkg/lib/libfoo.so.1", tar::EntryType::Regular, "elf"),
        ("pkg/lib/libfoo.so", tar::EntryType::Symlink, "libfoo.so.1"),
        ("pkg/lib/libfoo-copy.so", tar::EntryType::Link, "pkg/lib/libfoo.so.1"),
      ],
    );
    let dest = temp.path().join("out");

    extract_archive(&archive, "libs.tar", &dest, 1).unwrap();
    assert_eq!(fs::read_link(dest.join("lib/libfoo.so")).unwrap(), PathBuf::from("libfoo.so.1"));
    assert_eq!(fs::read_to_string(dest.join("lib/libfoo-copy.so")).unwrap(), "elf");
  }

  #[test]
  fn hard_link_to_outside_path_is_rejected() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("link.tar");
    raw_tar(&archive, &[("pkg/passwd", tar::EntryType::Link, "/etc/passwd")]);

    let err = extract_archive(&archive, "link.tar", &temp.path().join("out"), 1).unwrap_err();
    assert!(matches!(err, ExtractError::UnsafePath(_)));
  }

  #[test]
  fn strip_path_rejects_parent_components() {
    assert!(matches!(
      strip_path(Path::new("top/../../etc/passwd"), 1),
      Err(ExtractError::UnsafePath(_))
    ));
    assert_eq!(strip_path(Path::new("top"), 1).unwrap(), None);
    assert_eq!(
      strip_path(Path::new("./top/a/b"), 1).unwrap(),
      Some(PathBuf::from("a/b"))
    );
  }
}
