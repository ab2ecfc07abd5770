use std::env;
use std::process::Command;

/// `ZBM_NIGHTLY=1|true` marks a nightly package build
fn nightly() -> bool {
    env::var("ZBM_NIGHTLY").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Short commit id from git, or `GIT_SHA` when building from a source tarball
fn commit() -> Option<String> {
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .or_else(|| env::var("GIT_SHA").ok())
        .filter(|sha| !sha.is_empty())
}

fn main() {
    let base = env!("CARGO_PKG_VERSION");
    let version = match (nightly(), commit()) {
        (true, Some(sha)) => format!("{}-nightly+{}", base, sha),
        (true, None) => format!("{}-nightly", base),
        (false, _) => base.to_string(),
    };
    println!("cargo:rustc-env=APP_VERSION={}", version);

    // Venus OS packages are cross-built; the target ends up in the startup log
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=APP_TARGET={}", target);

    println!("cargo:rerun-if-env-changed=ZBM_NIGHTLY");
    println!("cargo:rerun-if-env-changed=GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
}
