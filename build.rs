use std::process::Command;

fn main() {
    let timestamp = build_timestamp();
    println!("cargo:rustc-env=BUILD_TIMESTAMP={timestamp}");

    // Short SHA, with -dirty when the tree has local changes
    let git_sha = match stdout_of("git", &["rev-parse", "--short", "HEAD"]) {
        Some(sha) => {
            let dirty = stdout_of("git", &["status", "--porcelain", "--untracked-files=no"])
                .is_some_and(|s| !s.is_empty());
            if dirty {
                format!("{sha}-dirty")
            } else {
                sha
            }
        }
        None => "unknown".into(),
    };
    println!("cargo:rustc-env=BUILD_GIT_SHA={git_sha}");

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
}

/// UTC build time. `SOURCE_DATE_EPOCH` pins it for reproducible builds.
fn build_timestamp() -> String {
    if let Ok(epoch) = std::env::var("SOURCE_DATE_EPOCH") {
        if let Some(ts) = stdout_of("date", &["-u", "-d", &format!("@{epoch}"), "+%Y-%m-%dT%H:%M:%SZ"]) {
            return ts;
        }
    }
    stdout_of("date", &["-u", "+%Y-%m-%dT%H:%M:%SZ"])
        .or_else(|| {
            stdout_of(
                "powershell",
                &[
                    "-Command",
                    "(Get-Date).ToUniversalTime().ToString('yyyy-MM-ddTHH:mm:ssZ')",
                ],
            )
        })
        .unwrap_or_else(|| "unknown".into())
}

fn stdout_of(program: &str, args: &[&str]) -> Option<String> {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
}
