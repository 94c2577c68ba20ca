//! Output path resolution.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

/// Used when neither the server nor the URL suggests a name.
pub const FALLBACK_FILENAME: &str = "download.bin";

/// Reduce an untrusted name to a single safe path component.
///
/// Directory parts (either separator) are dropped; empty names, `.` and
/// `..` are rejected.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next()?.trim();
    match last {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

/// Last path segment of `url`, without query or fragment.
///
/// ```
/// use tessera_fetch::core::filename_from_url;
///
/// assert_eq!(filename_from_url("https://host/dl/archive.tar.gz?token=1").as_deref(), Some("archive.tar.gz"));
/// assert_eq!(filename_from_url("https://host/").as_deref(), None);
/// ```
pub fn filename_from_url(url: &str) -> Option<String> {
    let segment = match Url::parse(url) {
        Ok(parsed) => parsed.path_segments()?.last()?.to_string(),
        Err(_) => {
            let path = url.split(['?', '#']).next().unwrap_or_default();
            path.rsplit('/').next().unwrap_or_default().to_string()
        }
    };
    let decoded = percent_decode_str(&segment).decode_utf8_lossy();
    sanitize_filename(&decoded)
}

/// Choose the file a run writes to.
///
/// An existing directory receives the server-suggested name, else the URL's
/// last path segment, else [`FALLBACK_FILENAME`]. Any other path is used as
/// given.
pub fn resolve_output(output: &Path, output_is_dir: bool, server_name: Option<&str>, url: &str) -> PathBuf {
    if !output_is_dir {
        return output.to_path_buf();
    }
    let name = server_name
        .and_then(sanitize_filename)
        .or_else(|| filename_from_url(url))
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string());
    output.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("file.iso").as_deref(), Some("file.iso"));
        assert_eq!(sanitize_filename("a/b/c.txt").as_deref(), Some("c.txt"));
        assert_eq!(sanitize_filename(r"C:\temp\x.exe").as_deref(), Some("x.exe"));
        assert_eq!(sanitize_filename("dir/"), None);
        assert_eq!(sanitize_filename(".."), None);
        assert_eq!(sanitize_filename("  "), None);
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(filename_from_url("http://h/a/b/file.bin").as_deref(), Some("file.bin"));
        assert_eq!(filename_from_url("http://h/my%20file.txt").as_deref(), Some("my file.txt"));
        assert_eq!(filename_from_url("http://h/a/..%2F..%2Fx").as_deref(), Some("x"));
        assert_eq!(filename_from_url("http://h"), None);
        assert_eq!(filename_from_url("not a url/f.zip?x=1").as_deref(), Some("f.zip"));
    }

    #[test]
    fn test_resolve_output_literal_path() {
        let out = resolve_output(Path::new("/tmp/out.bin"), false, Some("server.bin"), "http://h/u.bin");
        assert_eq!(out, PathBuf::from("/tmp/out.bin"));
    }

    #[test]
    fn test_resolve_output_directory_precedence() {
        let dir = Path::new("/downloads");
        assert_eq!(
            resolve_output(dir, true, Some("server.bin"), "http://h/u.bin?q=1"),
            dir.join("server.bin")
        );
        assert_eq!(resolve_output(dir, true, None, "http://h/u.bin?q=1"), dir.join("u.bin"));
        assert_eq!(resolve_output(dir, true, Some("../"), "http://h/"), dir.join(FALLBACK_FILENAME));
    }
}
