fn main() {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "windows" {
        println!("cargo:rerun-if-changed=src/sys/helpers.c");
        cc::Build::new()
            .file("src/sys/helpers.c")
            .compile("cove-sys-helpers");
    }
}
