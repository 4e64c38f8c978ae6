// build.rs: link the bare-metal image at the fixed base from linker.ld
use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=linker.ld");

    let target = env::var("TARGET").unwrap_or_default();
    if target != "x86_64-unknown-none" {
        println!("cargo:warning=Skipping linker script for non-kernel target: {target}");
        return;
    }

    let dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_default();
    println!("cargo:rustc-link-arg-bins=-T{dir}/linker.ld");
}
