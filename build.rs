use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    // Git hash (short)
    let git_hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .and_then(|o| {
            if o.status.success() {
                Some(String::from_utf8_lossy(&o.stdout).trim().to_string())
            } else {
                None
            }
        });
    if let Some(h) = git_hash {
        println!("cargo:rustc-env=TUTORCC_GIT_HASH={}", h);
    }
    let dirty = Command::new("git")
        .args(["diff", "--quiet"])
        .status()
        .map(|s| if s.success() { "clean" } else { "dirty" })
        .unwrap_or("unknown");
    println!("cargo:rustc-env=TUTORCC_GIT_DIRTY={}", dirty);
    // Seconds since the epoch; 0 if the clock is before it.
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=TUTORCC_BUILD_UNIX={}", ts);
    println!("cargo:rerun-if-changed=build.rs");
}
