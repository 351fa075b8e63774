//! Module sequencing.
//!
//! Build order is the manifest's declaration order, never computed from a
//! dependency graph. Nested modules are flattened depth first so that every
//! child builds before its parent, siblings keeping their declared order.
//! Disabled modules (with their children) and modules excluded for the
//! current architecture are dropped from the sequence.

use thiserror::Error;
use tracing::debug;

use crate::manifest::{Manifest, Module};

/// Two modules in the flattened sequence share a name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("duplicate module name '{name}' (positions {first} and {second})")]
pub struct DuplicateModuleError {
  pub name: String,
  pub first: usize,
  pub second: usize,
}

/// Return the modules to build, in order, for the given architecture.
///
/// Names must be unique across every declared module, including ones that are
/// disabled or excluded for `arch`.
pub fn sequence_modules<'a>(manifest: &'a Manifest, arch: &str) -> Result<Vec<&'a Module>, DuplicateModuleError> {
  let declared = declared_modules(manifest);

  for (i, module) in declared.iter().enumerate() {
    if let Some(first) = declared[..i].iter().position(|m| m.name == module.name) {
      return Err(DuplicateModuleError {
        name: module.name.clone(),
        first,
        second: i,
      });
    }
  }

  let ordered: Vec<&Module> = declared
    .into_iter()
    .filter(|module| {
      let enabled = module.enabled_for_arch(arch);
      if !enabled {
        debug!(module = %module.name, arch, "skipping module");
      }
      enabled
    })
    .collect();

  debug!(
    count = ordered.len(),
    order = ?ordered.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
    "sequenced modules"
  );
  Ok(ordered)
}

/// Every declared module in build order, including disabled ones.
pub fn declared_modules(manifest: &Manifest) -> Vec<&Module> {
  let mut declared = Vec::new();
  flatten(&manifest.modules, &mut declared);
  declared
}

/// Depth-first flattening; a disabled parent also drops its children.
fn flatten<'a>(modules: &'a [Module], out: &mut Vec<&'a Module>) {
  for module in modules {
    if module.disabled {
      out.push(module);
      continue;
    }
    flatten(&module.modules, out);
    out.push(module);
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use super::*;

  fn manifest(modules: Vec<Module>) -> Manifest {
    Manifest {
      app_id: "org.example.App".to_string(),
      runtime: "r".to_string(),
      runtime_version: None,
      sdk: None,
      command: "app".to_string(),
      finish_args: vec![],
      cleanup: vec![],
      cleanup_commands: vec![],
      modules,
      base_dir: PathBuf::from("."),
    }
  }

  fn names<'a>(modules: &[&'a Module]) -> Vec<&'a str> {
    modules.iter().map(|m| m.name.as_str()).collect()
  }

  #[test]
  fn keeps_declaration_order() {
    let m = manifest(vec![Module::named("c"), Module::named("a"), Module::named("b")]);
    assert_eq!(names(&sequence_modules(&m, "x86_64").unwrap()), vec!["c", "a", "b"]);
  }

  #[test]
  fn rejects_duplicates() {
    let m = manifest(vec![Module::named("a"), Module::named("b"), Module::named("a")]);
    let err = sequence_modules(&m, "x86_64").unwrap_err();
    assert_eq!(
      err,
      DuplicateModuleError {
        name: "a".to_string(),
        first: 0,
        second: 2
      }
    );
  }

  #[test]
  fn nested_modules_build_before_parent() {
    let mut parent = Module::named("parent");
    parent.modules = vec![Module::named("child-1"), Module::named("child-2")];
    let m = manifest(vec![Module::named("first"), parent, Module::named("last")]);

    assert_eq!(
      names(&sequence_modules(&m, "x86_64").unwrap()),
      vec!["first", "child-1", "child-2", "parent", "last"]
    );
  }

  #[test]
  fn duplicates_across_nesting_are_rejected() {
    let mut parent = Module::named("parent");
    parent.modules = vec![Module::named("shared")];
    let m = manifest(vec![Module::named("shared"), parent]);
    assert_eq!(sequence_modules(&m, "x86_64").unwrap_err().name, "shared");
  }

  #[test]
  fn disabled_and_arch_excluded_modules_are_dropped() {
    let mut disabled = Module::named("disabled");
    disabled.disabled = true;
    let mut arm_only = Module::named("arm-only");
    arm_only.only_arches = vec!["aarch64".to_string()];
    let m = manifest(vec![disabled, arm_only, Module::named("kept")]);

    assert_eq!(names(&sequence_modules(&m, "x86_64").unwrap()), vec!["kept"]);
    assert_eq!(names(&sequence_modules(&m, "aarch64").unwrap()), vec!["arm-only", "kept"]);
  }

  #[test]
  fn disabled_module_name_still_counts_as_duplicate() {
    let mut disabled = Module::named("a");
    disabled.disabled = true;
    let m = manifest(vec![disabled, Module::named("a")]);
    assert_eq!(sequence_modules(&m, "x86_64").unwrap_err().name, "a");
  }

  #[test]
  fn disabled_parent_drops_children() {
    let mut parent = Module::named("parent");
    parent.disabled = true;
    parent.modules = vec![Module::named("child")];
    let m = manifest(vec![parent, Module::named("app")]);
    assert_eq!(names(&sequence_modules(&m, "x86_64").unwrap()), vec!["app"]);
  }
}
