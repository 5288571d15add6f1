use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=FPS_KSM_LIB_DIR");
    println!("cargo:rerun-if-env-changed=FPS_KSM_LIB_NAME");

    // The vendor key payload library is only needed with the `ksm` feature.
    if env::var_os("CARGO_FEATURE_KSM").is_none() {
        return;
    }

    if let Some(dir) = env::var_os("FPS_KSM_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir.to_string_lossy());
    } else {
        println!("cargo:warning=FPS_KSM_LIB_DIR is not set, relying on the default linker search path");
    }

    let name = env::var("FPS_KSM_LIB_NAME").unwrap_or_else(|_| "fpscrypto".to_string());
    println!("cargo:rustc-link-lib={}", name);
}
