use std::process::Command;

/// Embeds `git describe` output as GIT_HASH for `--version`.
fn main() {
    let described = Command::new("git")
        .args(["describe", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string());

    println!(
        "cargo:rustc-env=GIT_HASH={}",
        described.as_deref().unwrap_or("unknown")
    );
    println!("cargo:rerun-if-changed=.git/HEAD");
}
