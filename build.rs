use std::process::Command;

/// Stamp the binary with `HOMEKEEPER_VERSION` for the run header of the log
/// file. Packagers set the variable; checkouts fall back to `git describe`,
/// and without either the crate version is used at runtime.
fn main() {
    let stamp = std::env::var("HOMEKEEPER_VERSION").ok().or_else(|| {
        Command::new("git")
            .args(["describe", "--tags", "--always", "--dirty"])
            .output()
            .ok()
            .filter(|output| output.status.success())
            .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
    });
    if let Some(version) = stamp {
        println!("cargo:rustc-env=HOMEKEEPER_VERSION={version}");
    }

    println!("cargo:rerun-if-env-changed=HOMEKEEPER_VERSION");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
