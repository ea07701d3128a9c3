use std::env;
use std::path::PathBuf;

const LIBRARY_DIR_VARIABLE: &str = "GSTBRIDGE_LIB_DIR";

fn main() {
    // Make sure the build script is re-run if our env variables are changed.
    println!("cargo:rerun-if-env-changed={}", LIBRARY_DIR_VARIABLE);
    println!("cargo:rerun-if-env-changed=GSTREAMER_1_0_ROOT_MSVC_X86_64");
    println!("cargo:rerun-if-env-changed=GSTREAMER_1_0_ROOT_X86_64");

    // Nothing to link against unless the native entry point was requested.
    if env::var("CARGO_FEATURE_NATIVE_FUNCTIONS").is_err() {
        return;
    }

    let windows = env::var("TARGET")
        .map(|target| target.contains("windows"))
        .unwrap_or(false);

    // Library directory override or the default dirs on windows.
    if let Ok(dir) = env::var(LIBRARY_DIR_VARIABLE) {
        println!("cargo:rustc-link-search=native={}", dir);
    } else if windows {
        for dir in default_library_dirs() {
            println!("cargo:rustc-link-search=native={}", dir);
        }
    }

    println!("cargo:rustc-link-lib=gstbridge");
}

// Returns the library dirs of the GStreamer runtime installers on Windows.
fn default_library_dirs() -> impl Iterator<Item = String> {
    ["GSTREAMER_1_0_ROOT_MSVC_X86_64", "GSTREAMER_1_0_ROOT_X86_64"]
        .into_iter()
        .filter_map(|variable| env::var(variable).ok())
        .filter_map(|root| {
            let mut path = PathBuf::from(root);
            path.push("lib");
            path.to_str().map(|s| s.to_owned())
        })
}
