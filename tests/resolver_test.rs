//! Integration tests for dependency resolution
//!
//! Sources are written to a temporary project and scanned from disk.

mod common;

use common::{TestProject, CORE_ALU, CYCLE_A, CYCLE_B, TB_TOP, UTIL_PKG};
use hdlbuild::core::catalog::{Catalog, SourceAttributes};
use hdlbuild::core::resolver::resolve;
use hdlbuild::error::ResolverError;

fn file_names(plan: &hdlbuild::core::plan::BuildPlan) -> Vec<String> {
    plan.files()
        .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

/// Test: a package provider is compiled before its consumer in the same library
#[test]
fn test_package_ordered_before_consumer() {
    let project = TestProject::new();
    project.create_file(
        "src/comp.vhd",
        "use work.pkg.all;\nentity comp is\nend entity;\n",
    );
    project.create_file("src/pkg.vhd", "package pkg is\nend package pkg;\n");

    let mut catalog = Catalog::new(project.path());
    catalog.register("src/comp.vhd", "L1", SourceAttributes::new()).unwrap();
    catalog.register("src/pkg.vhd", "L1", SourceAttributes::new()).unwrap();

    let plan = resolve(&catalog).unwrap();
    assert_eq!(plan.libraries(), vec!["l1"]);
    assert_eq!(file_names(&plan), vec!["pkg.vhd", "comp.vhd"]);
}

/// Test: Latin-1 bytes in comments do not stop the scan
#[test]
fn test_latin1_source_still_scanned() {
    let project = TestProject::new();
    project.create_file(
        "src/comp.vhd",
        "use work.pkg.all;\nentity comp is\nend entity;\n",
    );
    let mut pkg = b"-- Autor: J".to_vec();
    pkg.push(0xFC);
    pkg.extend_from_slice(b"rgen\npackage pkg is\nend package pkg;\n");
    project.create_bytes("src/pkg.vhd", &pkg);

    let mut catalog = Catalog::new(project.path());
    catalog.register("src/comp.vhd", "L1", SourceAttributes::new()).unwrap();
    catalog.register("src/pkg.vhd", "L1", SourceAttributes::new()).unwrap();

    let plan = resolve(&catalog).unwrap();
    assert_eq!(file_names(&plan), vec!["pkg.vhd", "comp.vhd"]);
}

/// Test: libraries requiring each other are rejected, naming both
#[test]
fn test_mutual_library_requirement_is_cycle() {
    let project = TestProject::new();
    project.create_file("a/pkg_a.vhd", CYCLE_A);
    project.create_file("b/pkg_b.vhd", CYCLE_B);

    let mut catalog = Catalog::new(project.path());
    catalog.register("a/pkg_a.vhd", "A", SourceAttributes::new()).unwrap();
    catalog.register("b/pkg_b.vhd", "B", SourceAttributes::new()).unwrap();

    let err = resolve(&catalog).unwrap_err();
    let ResolverError::CyclicDependency { libraries } = err else {
        panic!("expected a cycle, got {err:?}");
    };
    assert_eq!(libraries, vec!["a".to_string(), "b".to_string()]);
}

/// Test: libraries follow their `library x;` clauses regardless of declaration order
#[test]
fn test_libraries_ordered_by_requirements() {
    let project = TestProject::new();
    project.create_file("tb/tb_top.vhd", TB_TOP);
    project.create_file("core/alu.vhd", CORE_ALU);
    project.create_file("util/util_pkg.vhd", UTIL_PKG);

    let mut catalog = Catalog::new(project.path());
    catalog.register("tb/tb_top.vhd", "tb", SourceAttributes::new()).unwrap();
    catalog.register("core/alu.vhd", "core", SourceAttributes::new()).unwrap();
    catalog.register("util/util_pkg.vhd", "util", SourceAttributes::new()).unwrap();

    let plan = resolve(&catalog).unwrap();
    assert_eq!(plan.libraries(), vec!["util", "core", "tb"]);
    assert_eq!(plan.len(), 3);
}

/// Test: a registered file missing on disk is reported by path
#[test]
fn test_missing_source_reported() {
    let project = TestProject::new();
    let mut catalog = Catalog::new(project.path());
    catalog.register("gone.vhd", "lib", SourceAttributes::new()).unwrap();

    let err = resolve(&catalog).unwrap_err();
    assert!(
        matches!(err, ResolverError::MissingSource { ref path, .. } if path.ends_with("gone.vhd")),
        "unexpected error: {err:?}"
    );
}

/// Test: non-VHDL files are ordered without being scanned
#[test]
fn test_unscannable_files_kept_in_declaration_order() {
    let project = TestProject::new();
    project.create_file("lib/b.v", "module b; endmodule");
    project.create_file("lib/a.v", "module a; endmodule");

    let mut catalog = Catalog::new(project.path());
    catalog.register("lib/b.v", "lib", SourceAttributes::new()).unwrap();
    catalog.register("lib/a.v", "lib", SourceAttributes::new()).unwrap();

    let plan = resolve(&catalog).unwrap();
    assert_eq!(file_names(&plan), vec!["b.v", "a.v"]);
}
