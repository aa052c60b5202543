// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=STREAM_COMPOSITOR_VERSION");

    // Packagers can pin the version instead of asking git
    let version = std::env::var("STREAM_COMPOSITOR_VERSION").unwrap_or_else(|_| describe_version());
    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
}

/// `<tag>-<hash>` at a tag, `<tag>-dirty-<hash>` past it, crate version without git
fn describe_version() -> String {
    let package = env!("CARGO_PKG_VERSION");
    let Some(hash) = git(&["rev-parse", "--short", "HEAD"]) else {
        return package.to_string();
    };

    match git(&["describe", "--tags", "--abbrev=0", "--match", "v*"]) {
        Some(tag) => {
            let base = tag.strip_prefix('v').unwrap_or(&tag).to_string();
            let exact = git(&["describe", "--tags", "--exact-match", "--match", "v*"]).is_some();
            if exact {
                format!("{}-{}", base, hash)
            } else {
                format!("{}-dirty-{}", base, hash)
            }
        }
        None => format!("{}-{}", package, hash),
    }
}
