//! Shared test utilities for rmerge-cli integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;

/// Get a Command for the rmerge binary, isolated from the user's config
/// and environment.
///
/// # Panics
///
/// Panics if the rmerge binary cannot be found.
#[allow(deprecated)]
pub fn rmerge_cmd(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("rmerge").expect("rmerge binary should exist");
    cmd.env("HOME", home)
        .env("RMERGE_CONFIG", home.join("config.yaml"))
        .env("NO_COLOR", "1")
        .env_remove("RMERGE_WORKSPACE")
        .env_remove("RMERGE_GOLDEN_PATTERN")
        .env_remove("RMERGE_FRAGMENT_PATTERN")
        .env_remove("RMERGE_VERBOSE")
        .env_remove("RMERGE_QUIET");
    cmd
}

/// Lay out `<root>/src/{proj-golden,fragment-alpha}`.
///
/// The golden carries a `.git` directory with an origin remote; the
/// fragment has one extra file.
pub fn create_source_tree(root: &Path) -> PathBuf {
    let src = root.join("src");
    let golden = src.join("proj-golden");
    fs::create_dir_all(golden.join(".git")).expect("create golden");
    fs::write(
        golden.join(".git/config"),
        "[remote \"origin\"]\n\turl = https://example.com/acme/widget.git\n",
    )
    .expect("write git config");
    fs::write(golden.join("README.md"), "widget").expect("write readme");

    let fragment = src.join("fragment-alpha");
    fs::create_dir_all(&fragment).expect("create fragment");
    fs::write(fragment.join("README.md"), "widget").expect("write readme");
    fs::write(fragment.join("notes.txt"), "recovered notes").expect("write notes");
    src
}
