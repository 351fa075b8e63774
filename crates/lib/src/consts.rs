//! Crate-wide constants.

pub const APP_NAME: &str = "flatbuild";

/// Environment variable overriding the state directory (build dirs, default prefix, bundle output).
pub const STATE_DIR_ENV: &str = "FLATBUILD_STATE_DIR";

/// Environment variable overriding the cache directory (downloads, git mirrors).
pub const CACHE_DIR_ENV: &str = "FLATBUILD_CACHE_DIR";

/// Default number of leading path components stripped from archives and patches.
pub const DEFAULT_STRIP_COMPONENTS: usize = 1;

/// Name of the out-of-tree build directory used by meson, cmake and `builddir` autotools modules.
pub const BUILD_SUBDIR: &str = "_build";

/// `SOURCE_DATE_EPOCH` passed to every build command (January 1, 1980 00:00:00 UTC, the ZIP epoch).
pub const SOURCE_DATE_EPOCH: &str = "315532800";

/// Placeholder replaced by the discovered version in checker URL templates.
pub const VERSION_PLACEHOLDER: &str = "$version";
