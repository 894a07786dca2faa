//! Test fixture loading utilities

use std::path::PathBuf;

/// Get the path to a fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("test_fixtures")
        .join(name)
}

/// Load a fixture file as a string
#[allow(dead_code)]
pub fn load_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name))
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", name))
}

/// Path of a BibTeX fixture
#[allow(dead_code)]
pub fn bibtex_fixture_path(name: &str) -> PathBuf {
    fixture_path(&format!("bibtex/{}", name))
}

/// Load a mock API response fixture
#[allow(dead_code)]
pub fn load_response_fixture(name: &str) -> String {
    load_fixture(&format!("responses/{}", name))
}

/// Copy a BibTeX fixture into `dir` so tests can modify it
#[allow(dead_code)]
pub fn copy_bibtex_fixture(name: &str, dir: &std::path::Path) -> PathBuf {
    let target = dir.join(name);
    std::fs::copy(bibtex_fixture_path(name), &target)
        .unwrap_or_else(|_| panic!("Failed to copy fixture: {}", name));
    target
}
