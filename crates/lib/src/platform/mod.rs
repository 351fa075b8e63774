pub mod arch;
pub mod paths;

pub use arch::Arch;

/// Returns the architecture name used for `only-arches` matching, or `"unknown"`.
pub fn current_arch_name() -> &'static str {
  Arch::current().map(|a| a.as_str()).unwrap_or("unknown")
}
