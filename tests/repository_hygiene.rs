//! ---
//! syros_section: "15-testing-qa"
//! syros_subsection: "integration-tests"
//! syros_type: "source"
//! syros_scope: "code"
//! syros_description: "Workspace conventions enforced across source and manifests."
//! syros_version: "v0.0.0-prealpha"
//! syros_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..")
}

fn workspace_files(extension: &str) -> Vec<PathBuf> {
    let root = workspace_root();
    ["crates", "bin", "tests", "configs"]
        .iter()
        .flat_map(|dir| WalkDir::new(root.join(dir)).into_iter().filter_map(Result::ok))
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some(extension))
        .filter(|path| !path.components().any(|c| c.as_os_str() == "target"))
        .collect()
}

#[test]
fn rust_sources_carry_frontmatter() {
    let sources = workspace_files("rs");
    assert!(!sources.is_empty());
    for path in sources {
        let content = fs::read_to_string(&path).unwrap();
        assert!(
            content.starts_with("//! ---\n//! syros_section:"),
            "{} must start with the syros frontmatter header",
            path.display()
        );
    }
}

#[test]
fn manifests_and_configs_carry_frontmatter() {
    for path in workspace_files("toml") {
        let content = fs::read_to_string(&path).unwrap();
        assert!(
            content.starts_with("# ---\n# syros_section:"),
            "{} must start with the syros frontmatter header",
            path.display()
        );
    }
}
