use std::sync::LazyLock;

/// Version of the software: the Cargo package version, followed by the git
/// commit when `LINESTREAM_GIT_HASH` was set at build time.
pub static VERSION: LazyLock<String> = LazyLock::new(|| match option_env!("LINESTREAM_GIT_HASH") {
    Some(hash) if !hash.is_empty() => format!("{}-{hash}", env!("CARGO_PKG_VERSION")),
    _ => env!("CARGO_PKG_VERSION").to_string(),
});
