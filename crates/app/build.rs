use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use walkdir::WalkDir;

fn main() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let shader_dir: PathBuf = Path::new(&manifest_dir).join("../../shaders");

    println!("cargo:rerun-if-changed={}", shader_dir.display());
    println!("cargo:rerun-if-changed=build.rs");

    if !shader_dir.is_dir() {
        println!(
            "cargo:warning=No shader directory at {}, skipping shader compilation",
            shader_dir.display()
        );
        return;
    }

    let sources: Vec<PathBuf> = WalkDir::new(&shader_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| matches!(p.extension().and_then(|s| s.to_str()), Some("vert" | "frag")))
        .collect();

    for source in sources {
        println!("cargo:rerun-if-changed={}", source.display());

        // texture.vert -> texture.vert.spv
        let mut output = source.clone().into_os_string();
        output.push(".spv");

        match Command::new("glslc").arg(&source).arg("-o").arg(&output).status() {
            Ok(status) if status.success() => {}
            Ok(status) => panic!(
                "glslc failed for {} with exit code {:?}",
                source.display(),
                status.code()
            ),
            Err(e) => {
                println!(
                    "cargo:warning=glslc unavailable ({}), using existing SPIR-V for {}",
                    e,
                    source.display()
                );
            }
        }
    }
}
