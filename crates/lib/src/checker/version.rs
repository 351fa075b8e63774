//! Version strings: ordering and extraction from pinned URLs.
//!
//! Versions are split on `.`. Segments that are all digits compare
//! numerically, anything else lexically; when one version is a prefix of the
//! other the shorter sorts first. A leading `v` is ignored.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

/// Compare two version strings.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
  let a = segments(a);
  let b = segments(b);
  for (x, y) in a.iter().zip(&b) {
    let ordering = compare_segment(x, y);
    if ordering != Ordering::Equal {
      return ordering;
    }
  }
  a.len().cmp(&b.len())
}

/// Whether `candidate` sorts strictly after `current`.
pub fn is_newer(candidate: &str, current: &str) -> bool {
  compare_versions(candidate, current) == Ordering::Greater
}

fn segments(version: &str) -> Vec<&str> {
  let version = version.trim();
  let version = version
    .strip_prefix('v')
    .or_else(|| version.strip_prefix('V'))
    .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
    .unwrap_or(version);
  version.split('.').collect()
}

fn compare_segment(a: &str, b: &str) -> Ordering {
  let numeric = |s: &str| !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit());
  if numeric(a) && numeric(b) {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    // Equal-length digit strings without leading zeros order like their values.
    return a.len().cmp(&b.len()).then_with(|| a.cmp(b));
  }
  a.cmp(b)
}

static URL_VERSION: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?:^|[-_/v])(\d+(?:\.\d+)+(?:[-.][0-9A-Za-z]+)*?)(?:\.tar(?:\.[a-z0-9]+)?|\.t[gx]z|\.zip|\.tbz2?)?$")
    .expect("version pattern is valid")
});

/// Extract the version embedded in a source URL's last path segment.
///
/// `https://example.com/foo-1.2.3.tar.gz` yields `1.2.3`. Falls back to the
/// version-looking directory segment (`.../releases/download/2022.07.18/app.zip`).
pub fn version_from_url(url: &str) -> Option<String> {
  let path = url.split(['?', '#']).next().unwrap_or(url);
  let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

  segments.iter().rev().find_map(|segment| {
    URL_VERSION
      .captures(segment)
      .and_then(|c| c.get(1))
      .map(|m| m.as_str().to_string())
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  #[test]
  fn documented_orderings() {
    assert_eq!(compare_versions("1.9.0", "1.10.0"), Ordering::Less);
    assert_eq!(compare_versions("1.10.0", "2.0"), Ordering::Less);
    assert_eq!(compare_versions("1.9.0", "2.0"), Ordering::Less);
    assert_eq!(compare_versions("10.3", "10.3.1"), Ordering::Less);
  }

  #[test]
  fn equal_and_prefixed_versions() {
    assert_eq!(compare_versions("1.2.3", "1.2.3"), Ordering::Equal);
    assert_eq!(compare_versions("v1.2.3", "1.2.3"), Ordering::Equal);
    assert_eq!(compare_versions("1.02", "1.2"), Ordering::Equal);
  }

  #[test]
  fn non_numeric_segments_compare_lexically() {
    assert_eq!(compare_versions("1.0.rc1", "1.0.rc2"), Ordering::Less);
    assert_eq!(compare_versions("2022.08.01", "2022.07.18"), Ordering::Greater);
    assert!(is_newer("2022.08.01", "2022.07.18"));
    assert!(!is_newer("2022.07.18", "2022.07.18"));
  }

  #[test]
  fn huge_numeric_segments_do_not_overflow() {
    assert_eq!(
      compare_versions("1.99999999999999999999999", "1.100000000000000000000000"),
      Ordering::Less
    );
  }

  #[test]
  fn extracts_version_from_url() {
    assert_eq!(
      version_from_url("https://example.com/foo-1.2.3.tar.gz").as_deref(),
      Some("1.2.3")
    );
    assert_eq!(
      version_from_url("https://download.gnome.org/sources/glib/2.72/glib-2.72.3.tar.xz").as_deref(),
      Some("2.72.3")
    );
    assert_eq!(
      version_from_url("https://github.com/o/r/archive/v2022.07.18.tar.gz").as_deref(),
      Some("2022.07.18")
    );
    assert_eq!(
      version_from_url("https://github.com/o/r/releases/download/2022.07.18/app-linux.zip").as_deref(),
      Some("2022.07.18")
    );
    assert_eq!(version_from_url("https://example.com/latest.tar.gz"), None);
  }

  proptest! {
    #[test]
    fn ordering_is_antisymmetric(a in "[0-9]{1,3}(\\.[0-9a-c]{1,3}){0,3}", b in "[0-9]{1,3}(\\.[0-9a-c]{1,3}){0,3}") {
      prop_assert_eq!(compare_versions(&a, &b), compare_versions(&b, &a).reverse());
    }

    #[test]
    fn appending_a_segment_makes_newer(base in "[0-9]{1,3}(\\.[0-9]{1,3}){0,3}", extra in 0u32..1000) {
      let longer = format!("{}.{}", base, extra);
      prop_assert!(is_newer(&longer, &base));
    }
  }
}
