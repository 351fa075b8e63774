//! Verified downloads and archive sources.
//!
//! Every remote byte a build consumes goes through [`Fetcher::fetch_verified`]:
//! the content is streamed into a temporary file next to the download cache
//! while its digest is computed, compared against the declared checksum, and
//! only promoted into the cache on a match. A mismatching file is deleted
//! before anything reads it.
//!
//! # Cache structure
//!
//! `<downloads>/<algorithm>/<hex>/<filename>`. A cached file is re-hashed
//! before reuse; a corrupted entry is discarded and fetched again.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::SourceError;
use super::extract::extract_archive;
use crate::build::BuildContext;
use crate::consts::APP_NAME;
use crate::manifest::ArchiveSource;
use crate::platform::paths;
use crate::util::hash::{Checksum, ContentHash, DigestAlgorithm, StreamHasher, hash_bytes, hash_file};

const READ_CHUNK: usize = 64 * 1024;

/// Downloads sources and owns the caches they are kept in.
#[derive(Debug, Clone)]
pub struct Fetcher {
  client: reqwest::Client,
  downloads_dir: PathBuf,
  git_cache_dir: PathBuf,
}

impl Fetcher {
  pub fn new(downloads_dir: PathBuf, git_cache_dir: PathBuf, timeout: Duration) -> Result<Self, SourceError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("flatbuild/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| SourceError::Fetch {
        url: String::new(),
        message: format!("failed to create HTTP client: {}", e),
      })?;
    Ok(Self {
      client,
      downloads_dir,
      git_cache_dir,
    })
  }

  /// A fetcher using the default cache directories.
  pub fn from_env(timeout: Duration) -> Result<Self, SourceError> {
    Self::new(paths::downloads_dir(), paths::git_cache_dir(), timeout)
  }

  pub fn git_cache_dir(&self) -> &Path {
    &self.git_cache_dir
  }

  /// Fetch `url` and return the path of a cached file whose digest equals `checksum`.
  pub async fn fetch_verified(&self, url: &str, checksum: &Checksum) -> Result<PathBuf, SourceError> {
    let cache_dir = self
      .downloads_dir
      .join(checksum.algorithm.field())
      .join(&checksum.hex);
    let cached = cache_dir.join(url_to_filename(url));

    if cached.exists() {
      debug!(path = %cached.display(), "checking cached file");
      let algorithm = checksum.algorithm;
      let path = cached.clone();
      let actual = tokio::task::spawn_blocking(move || hash_file(&path, algorithm))
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))??;
      if checksum.matches(&actual) {
        info!(url, path = %cached.display(), "using cached download");
        return Ok(cached);
      }
      warn!(path = %cached.display(), actual = %actual, "cached download is corrupt, fetching again");
      tokio::fs::remove_file(&cached).await?;
    }

    tokio::fs::create_dir_all(&cache_dir).await?;
    let (temp, actual) = self.download(url, checksum.algorithm, &cache_dir).await?;

    if !checksum.matches(&actual) {
      // Dropping the temp file deletes the unverified content.
      drop(temp);
      return Err(SourceError::Integrity {
        url: url.to_string(),
        expected: checksum.clone(),
        actual,
      });
    }

    temp.persist(&cached).map_err(|e| SourceError::Io(e.error))?;
    info!(url, path = %cached.display(), "download verified");
    Ok(cached)
  }

  /// Fetch `url` and hash it without any expectation; used when re-pinning.
  pub async fn fetch_and_hash(&self, url: &str, algorithm: DigestAlgorithm) -> Result<ContentHash, SourceError> {
    let scratch = self.downloads_dir.join("tmp");
    tokio::fs::create_dir_all(&scratch).await?;
    let (_temp, hash) = self.download(url, algorithm, &scratch).await?;
    Ok(hash)
  }

  /// Stream `url` into a temporary file inside `dir`, hashing on the way.
  async fn download(
    &self,
    url: &str,
    algorithm: DigestAlgorithm,
    dir: &Path,
  ) -> Result<(tempfile::NamedTempFile, ContentHash), SourceError> {
    let temp = tempfile::Builder::new().prefix(".partial-").tempfile_in(dir)?;
    let mut out = tokio::fs::File::from_std(temp.reopen()?);
    let mut hasher = StreamHasher::new(algorithm);
    let mut size = 0usize;

    if let Some(path) = local_path(url) {
      info!(url, "reading local file");
      let mut input = tokio::fs::File::open(&path).await.map_err(|e| SourceError::Fetch {
        url: url.to_string(),
        message: e.to_string(),
      })?;
      let mut buf = vec![0u8; READ_CHUNK];
      loop {
        let n = input.read(&mut buf).await?;
        if n == 0 {
          break;
        }
        hasher.update(&buf[..n]);
        out.write_all(&buf[..n]).await?;
        size += n;
      }
    } else {
      info!(url, "downloading");
      let fetch_err = |e: reqwest::Error| SourceError::Fetch {
        url: url.to_string(),
        message: e.to_string(),
      };
      let mut response = self.client.get(url).send().await.map_err(fetch_err)?;
      if !response.status().is_success() {
        return Err(SourceError::Fetch {
          url: url.to_string(),
          message: format!("HTTP {}", response.status()),
        });
      }
      while let Some(chunk) = response.chunk().await.map_err(fetch_err)? {
        hasher.update(&chunk);
        out.write_all(&chunk).await?;
        size += chunk.len();
      }
    }

    out.flush().await?;
    let hash = hasher.finish();
    debug!(url, size, hash = %hash, "fetched content");
    Ok((temp, hash))
  }
}

/// Fetch, verify and extract an archive source into the module tree.
pub async fn apply_archive(source: &ArchiveSource, ctx: &BuildContext, fetcher: &Fetcher) -> Result<(), SourceError> {
  let file = fetcher.fetch_verified(&source.url, &source.checksum).await?;
  let dest = ctx.source_dir(source.dest.as_deref());
  let name = url_to_filename(&source.url);
  let strip = source.strip_components;

  tokio::task::spawn_blocking(move || extract_archive(&file, &name, &dest, strip))
    .await
    .map_err(|e| std::io::Error::other(e.to_string()))??;
  Ok(())
}

/// Local path behind a `file://` URL.
pub(crate) fn local_path(url: &str) -> Option<PathBuf> {
  url.strip_prefix("file://").map(PathBuf::from)
}

/// Convert a URL to a safe filename.
///
/// Takes the last path component and sanitizes it. Falls back to a hash of
/// the URL if no suitable filename can be extracted.
pub fn url_to_filename(url: &str) -> String {
  if let Some(filename) = url.rsplit('/').next() {
    let filename = filename.split(['?', '#']).next().unwrap_or(filename);

    let sanitized: String = filename
      .chars()
      .map(|c| {
        if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
          c
        } else {
          '_'
        }
      })
      .collect();

    if !sanitized.is_empty() && sanitized != "." && sanitized != ".." {
      return sanitized;
    }
  }

  let digest = hash_bytes(url.as_bytes(), DigestAlgorithm::Sha256);
  format!("{}_download_{}", APP_NAME, &digest.0[..16])
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::source::SourceError;
  use crate::util::testutil::{WRONG_SHA256, file_url, sha256_of};
  use proptest::prelude::*;
  use tempfile::TempDir;
  use tracing_test::traced_test;

  fn fetcher(temp: &TempDir) -> Fetcher {
    Fetcher::new(
      temp.path().join("downloads"),
      temp.path().join("git"),
      Duration::from_secs(5),
    )
    .unwrap()
  }

  fn sha256(hex: &str) -> Checksum {
    Checksum::parse(DigestAlgorithm::Sha256, hex).unwrap()
  }

  #[test]
  fn url_to_filename_simple() {
    assert_eq!(url_to_filename("https://example.com/file.tar.gz"), "file.tar.gz");
  }

  #[test]
  fn url_to_filename_with_query() {
    assert_eq!(url_to_filename("https://example.com/file.tar.gz?token=abc"), "file.tar.gz");
  }

  #[test]
  fn url_to_filename_sanitizes_special_chars() {
    assert_eq!(url_to_filename("https://example.com/file name.tar.gz"), "file_name.tar.gz");
  }

  #[test]
  fn url_to_filename_fallback_for_empty() {
    assert!(url_to_filename("https://example.com/").starts_with("flatbuild_download_"));
  }

  #[tokio::test]
  async fn fetch_verified_caches_matching_file() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("foo-1.0.tar.gz");
    std::fs::write(&src, b"archive bytes").unwrap();
    let checksum = sha256(&sha256_of(&src));
    let fetcher = fetcher(&temp);

    let cached = fetcher.fetch_verified(&file_url(&src), &checksum).await.unwrap();
    assert!(cached.starts_with(temp.path().join("downloads/sha256")));
    assert_eq!(std::fs::read(&cached).unwrap(), b"archive bytes");

    // A second fetch is served from the cache even if the origin is gone.
    std::fs::remove_file(&src).unwrap();
    let again = fetcher.fetch_verified(&file_url(&src), &checksum).await.unwrap();
    assert_eq!(again, cached);
  }

  #[tokio::test]
  async fn mismatch_is_integrity_error_and_leaves_nothing_behind() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("foo.tar.gz");
    std::fs::write(&src, b"archive bytes").unwrap();
    let actual = sha256_of(&src);

    let err = fetcher(&temp)
      .fetch_verified(&file_url(&src), &sha256(WRONG_SHA256))
      .await
      .unwrap_err();
    match err {
      SourceError::Integrity { expected, actual: computed, .. } => {
        assert_eq!(expected.hex, WRONG_SHA256);
        assert_eq!(computed.0, actual);
      }
      other => panic!("unexpected error: {other}"),
    }

    let leftovers: Vec<_> = walkdir::WalkDir::new(temp.path().join("downloads"))
      .into_iter()
      .filter_map(Result::ok)
      .filter(|e| e.file_type().is_file())
      .collect();
    assert!(leftovers.is_empty(), "unverified content kept: {:?}", leftovers);
  }

  #[tokio::test]
  #[traced_test]
  async fn corrupted_cache_entry_is_refetched() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("foo.tar.gz");
    std::fs::write(&src, b"good").unwrap();
    let checksum = sha256(&sha256_of(&src));
    let fetcher = fetcher(&temp);

    let cached = fetcher.fetch_verified(&file_url(&src), &checksum).await.unwrap();
    std::fs::write(&cached, b"tampered").unwrap();

    let again = fetcher.fetch_verified(&file_url(&src), &checksum).await.unwrap();
    assert_eq!(std::fs::read(again).unwrap(), b"good");
    assert!(logs_contain("cached download is corrupt"));
  }

  #[tokio::test]
  async fn missing_local_file_is_fetch_error() {
    let temp = TempDir::new().unwrap();
    let err = fetcher(&temp)
      .fetch_verified("file:///nonexistent/foo.tar.gz", &sha256(WRONG_SHA256))
      .await
      .unwrap_err();
    assert!(matches!(err, SourceError::Fetch { .. }));
  }

  #[tokio::test]
  async fn http_download_is_verified() {
    let mut server = mockito::Server::new_async().await;
    let body = b"remote archive".to_vec();
    let mock = server
      .mock("GET", "/foo-1.0.tar.gz")
      .with_status(200)
      .with_body(body.clone())
      .create_async()
      .await;
    let temp = TempDir::new().unwrap();
    let checksum = sha256(&hash_bytes(&body, DigestAlgorithm::Sha256).0);

    let url = format!("{}/foo-1.0.tar.gz", server.url());
    let cached = fetcher(&temp).fetch_verified(&url, &checksum).await.unwrap();
    assert_eq!(std::fs::read(cached).unwrap(), body);
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn http_error_status_is_fetch_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server.mock("GET", "/missing.tar.gz").with_status(404).create_async().await;
    let temp = TempDir::new().unwrap();

    let url = format!("{}/missing.tar.gz", server.url());
    let err = fetcher(&temp).fetch_verified(&url, &sha256(WRONG_SHA256)).await.unwrap_err();
    assert!(matches!(err, SourceError::Fetch { message, .. } if message.contains("404")));
  }

  proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn any_single_byte_mutation_fails_verification(
      content in proptest::collection::vec(any::<u8>(), 1..256),
      index in any::<prop::sample::Index>(),
      flip in 1u8..=255,
    ) {
      let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
      let temp = TempDir::new().unwrap();
      let src = temp.path().join("blob.tar");
      let checksum = sha256(&hash_bytes(&content, DigestAlgorithm::Sha256).0);

      let mut mutated = content.clone();
      let i = index.index(mutated.len());
      mutated[i] ^= flip;
      std::fs::write(&src, &mutated).unwrap();

      let result = rt.block_on(fetcher(&temp).fetch_verified(&file_url(&src), &checksum));
      let rejected = matches!(result, Err(SourceError::Integrity { .. }));
      prop_assert!(rejected, "mutated byte {} was accepted", i);

      std::fs::write(&src, &content).unwrap();
      let result = rt.block_on(fetcher(&temp).fetch_verified(&file_url(&src), &checksum));
      prop_assert!(result.is_ok());
    }
  }
}
