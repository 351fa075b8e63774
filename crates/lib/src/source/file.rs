//! File sources: one verified file copied into the tree, never extracted.

use std::path::Path;

use tracing::debug;

use super::SourceError;
use super::archive::{Fetcher, url_to_filename};
use crate::build::BuildContext;
use crate::manifest::{FileSource, Location};
use crate::util::hash::hash_file;

pub async fn apply_file(
  source: &FileSource,
  ctx: &BuildContext,
  fetcher: &Fetcher,
  base_dir: &Path,
) -> Result<(), SourceError> {
  let (verified, default_name) = match &source.location {
    Location::Url(url) => (fetcher.fetch_verified(url, &source.checksum).await?, url_to_filename(url)),
    Location::Path(path) => {
      let path = base_dir.join(path);
      let algorithm = source.checksum.algorithm;
      let hashed = path.clone();
      let actual = tokio::task::spawn_blocking(move || hash_file(&hashed, algorithm))
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?
        .map_err(|e| SourceError::Fetch {
          url: path.display().to_string(),
          message: e.to_string(),
        })?;
      if !source.checksum.matches(&actual) {
        return Err(SourceError::Integrity {
          url: path.display().to_string(),
          expected: source.checksum.clone(),
          actual,
        });
      }
      let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| url_to_filename(&path.display().to_string()));
      (path, name)
    }
  };

  let dir = ctx.source_dir(source.dest.as_deref());
  tokio::fs::create_dir_all(&dir).await?;
  let target = dir.join(source.dest_filename.as_deref().unwrap_or(&default_name));
  tokio::fs::copy(&verified, &target).await?;
  debug!(module = %ctx.module(), target = %target.display(), "copied file source");
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;
  use std::time::Duration;

  use super::*;
  use crate::manifest::Module;
  use crate::util::hash::{Checksum, DigestAlgorithm};
  use crate::util::testutil::{WRONG_SHA256, file_url, sha256_of};
  use tempfile::TempDir;

  fn setup(temp: &TempDir) -> (BuildContext, Fetcher) {
    let ctx =
      BuildContext::create(&temp.path().join("build"), &temp.path().join("p"), "a", &Module::named("m")).unwrap();
    let fetcher = Fetcher::new(temp.path().join("dl"), temp.path().join("git"), Duration::from_secs(5)).unwrap();
    (ctx, fetcher)
  }

  #[tokio::test]
  async fn url_file_is_copied_with_dest_filename() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("data.bin");
    std::fs::write(&src, "payload").unwrap();
    let (ctx, fetcher) = setup(&temp);
    let source = FileSource {
      location: Location::Url(file_url(&src)),
      checksum: Checksum::parse(DigestAlgorithm::Sha256, &sha256_of(&src)).unwrap(),
      dest_filename: Some("renamed.bin".to_string()),
      dest: Some("assets".to_string()),
    };

    apply_file(&source, &ctx, &fetcher, temp.path()).await.unwrap();
    assert_eq!(
      std::fs::read_to_string(ctx.work_dir().join("assets/renamed.bin")).unwrap(),
      "payload"
    );
  }

  #[tokio::test]
  async fn local_path_is_verified() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("app.desktop"), "[Desktop Entry]").unwrap();
    let (ctx, fetcher) = setup(&temp);
    let source = FileSource {
      location: Location::Path(PathBuf::from("app.desktop")),
      checksum: Checksum::parse(DigestAlgorithm::Sha256, WRONG_SHA256).unwrap(),
      dest_filename: None,
      dest: None,
    };

    let err = apply_file(&source, &ctx, &fetcher, temp.path()).await.unwrap_err();
    assert!(matches!(err, SourceError::Integrity { .. }));
    assert!(!ctx.work_dir().join("app.desktop").exists());

    let source = FileSource {
      checksum: Checksum::parse(DigestAlgorithm::Sha256, &sha256_of(&temp.path().join("app.desktop"))).unwrap(),
      ..source
    };
    apply_file(&source, &ctx, &fetcher, temp.path()).await.unwrap();
    assert!(ctx.work_dir().join("app.desktop").is_file());
  }
}
