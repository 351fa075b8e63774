use std::fmt;

/// CPU architectures a module can be restricted to with `only-arches` / `skip-arches`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  X86_64,
  Aarch64,
  I386,
  Arm,
}

impl Arch {
  /// Detect the current CPU architecture at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::X86_64),
      "aarch64" => Some(Self::Aarch64),
      "x86" => Some(Self::I386),
      "arm" => Some(Self::Arm),
      _ => None,
    }
  }

  /// Parse a manifest architecture name.
  pub fn parse(name: &str) -> Option<Self> {
    match name {
      "x86_64" => Some(Self::X86_64),
      "aarch64" => Some(Self::Aarch64),
      "i386" => Some(Self::I386),
      "arm" => Some(Self::Arm),
      _ => None,
    }
  }

  /// Returns the manifest string identifier for this architecture
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::Aarch64 => "aarch64",
      Self::I386 => "i386",
      Self::Arm => "arm",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
