fn main() {
    // Re-run when HEAD moves or the index changes (commits, checkouts, staging)
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
    println!("cargo:rerun-if-changed=.git/index");

    let git = |args: &[&str]| {
        std::process::Command::new("git")
            .args(args)
            .output()
            .ok()
            .filter(|o| o.status.success())
            .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
    };

    let hash = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_default();
    let dirty = git(&["status", "--porcelain", "--untracked-files=no"])
        .is_some_and(|status| !status.is_empty());
    let on_tag = !dirty && git(&["describe", "--exact-match", "--tags", "HEAD"]).is_some();

    let build_id = match (hash.is_empty(), dirty) {
        (true, _) => String::new(),
        (false, true) => format!("{hash}+dirty"),
        (false, false) => hash,
    };

    println!("cargo:rustc-env=MARKWIKI_BUILD_ID={build_id}");
    println!("cargo:rustc-env=MARKWIKI_ON_RELEASE_TAG={on_tag}");
}
