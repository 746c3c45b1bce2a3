use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const ENV_PREFIX: &str = "BOXD_";

fn rust_sources(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            rust_sources(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            out.push(path);
        }
    }
    Ok(())
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'
}

/// Every `BOXD_NAME` token in `source` that is not the tail of a longer identifier.
fn env_keys_in(source: &str) -> impl Iterator<Item = String> + '_ {
    source.match_indices(ENV_PREFIX).filter_map(move |(start, _)| {
        let glued = source[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_');
        let name: String = source[start + ENV_PREFIX.len()..]
            .chars()
            .take_while(|&c| is_key_char(c))
            .collect();
        (!glued && !name.is_empty()).then(|| format!("{ENV_PREFIX}{name}"))
    })
}

fn allowlist_source(keys: &BTreeSet<String>) -> String {
    let mut out = String::from("pub const GENERATED_BOXD_ENV_ALLOWLIST: &[&str] = &[\n");
    for key in keys {
        out.push_str(&format!("    \"{key}\",\n"));
    }
    out.push_str("];\n");
    out
}

fn build_id() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(now) => format!("{:x}-{:x}", now.as_secs(), now.subsec_nanos()),
        Err(_) => format!("clock-unset-{}", env::var("CARGO_PKG_VERSION").unwrap_or_default()),
    }
}

fn main() -> io::Result<()> {
    let mut sources = Vec::new();
    rust_sources(Path::new("src"), &mut sources)?;

    let mut keys = BTreeSet::new();
    for file in sources {
        let text = fs::read_to_string(&file)?;
        keys.extend(env_keys_in(&text));
    }

    let out_dir = env::var_os("OUT_DIR")
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "OUT_DIR not set"))?;
    fs::write(
        Path::new(&out_dir).join("boxd_env_allowlist.rs"),
        allowlist_source(&keys),
    )?;

    // Stamped into the sync lock so `status` can tell which build holds it.
    println!("cargo:rustc-env=BUILD_UUID={}", build_id());
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
    Ok(())
}
