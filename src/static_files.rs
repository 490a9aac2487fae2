//! Static file serving for the built SPA bundle
//!
//! Resolves request paths under a fixed root directory with SPA fallback
//! routing: unknown paths serve the entry document so client-side routing can
//! take over. Traversal outside the root is rejected lexically, before any
//! filesystem access.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Entry document served for `/`, `/index.html` and SPA fallback
const ENTRY_FILE: &str = "index.html";

/// Outcome of a static lookup, mapped to an HTTP response by the front door
#[derive(Debug)]
pub enum StaticReply {
    /// File found and read
    File {
        bytes: Vec<u8>,
        content_type: &'static str,
        /// Whether the asset may be cached long-term (everything but HTML)
        cacheable: bool,
    },
    /// Path resolves outside the static root
    Forbidden,
    /// The entry document itself is missing
    NotFound,
    /// Unexpected filesystem error, reported with its kind
    Error(String),
}

/// Serves files from the configured static root
pub struct StaticServer {
    root: PathBuf,
}

impl StaticServer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve and read a request path, falling back to the entry document
    /// when the asset does not exist.
    pub async fn serve(&self, raw_path: &str) -> StaticReply {
        let Some(resolved) = resolve_path(&self.root, raw_path) else {
            warn!(path = raw_path, "Rejected path resolving outside static root");
            return StaticReply::Forbidden;
        };

        match tokio::fs::read(&resolved).await {
            Ok(bytes) => StaticReply::File {
                content_type: content_type_for(&resolved),
                cacheable: !is_html(&resolved),
                bytes,
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = raw_path, "Asset not found, serving SPA entry");
                self.serve_entry().await
            }
            Err(e) => {
                warn!(path = %resolved.display(), error = %e, "Failed to read static file");
                StaticReply::Error(format!("{:?}", e.kind()))
            }
        }
    }

    /// Serve the SPA entry document directly
    pub async fn serve_entry(&self) -> StaticReply {
        let entry = self.root.join(ENTRY_FILE);
        match tokio::fs::read(&entry).await {
            Ok(bytes) => StaticReply::File {
                bytes,
                content_type: "text/html",
                cacheable: false,
            },
            Err(e) if e.kind() == ErrorKind::NotFound => StaticReply::NotFound,
            Err(e) => {
                warn!(path = %entry.display(), error = %e, "Failed to read entry document");
                StaticReply::Error(format!("{:?}", e.kind()))
            }
        }
    }
}

/// Lexically resolve a request path under the root.
///
/// Returns None when `..` components would escape the root. No filesystem
/// access happens here, so a forbidden path is rejected before any read.
fn resolve_path(root: &Path, raw: &str) -> Option<PathBuf> {
    let relative = raw.trim_start_matches('/');
    let mut resolved = root.to_path_buf();
    let mut depth: usize = 0;

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                resolved.pop();
                depth -= 1;
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(resolved)
}

fn is_html(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("html")
    )
}

/// Content type by file extension
fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "html" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "webmanifest" => "application/manifest+json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_plain_path() {
        let root = Path::new("/srv/dist");
        assert_eq!(
            resolve_path(root, "/assets/app.js"),
            Some(PathBuf::from("/srv/dist/assets/app.js"))
        );
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let root = Path::new("/srv/dist");
        assert_eq!(resolve_path(root, "/../../etc/passwd"), None);
        assert_eq!(resolve_path(root, "/.."), None);
        assert_eq!(resolve_path(root, "/assets/../../secret"), None);
    }

    #[test]
    fn test_resolve_allows_internal_parent_dirs() {
        let root = Path::new("/srv/dist");
        assert_eq!(
            resolve_path(root, "/assets/../index.html"),
            Some(PathBuf::from("/srv/dist/index.html"))
        );
    }

    #[test]
    fn test_resolve_ignores_current_dir() {
        let root = Path::new("/srv/dist");
        assert_eq!(
            resolve_path(root, "/./assets/./logo.svg"),
            Some(PathBuf::from("/srv/dist/assets/logo.svg"))
        );
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("index.html")), "text/html");
        assert_eq!(content_type_for(Path::new("app.CSS")), "text/css");
        assert_eq!(
            content_type_for(Path::new("bundle.js")),
            "application/javascript"
        );
        assert_eq!(content_type_for(Path::new("logo.svg")), "image/svg+xml");
        assert_eq!(content_type_for(Path::new("font.woff2")), "font/woff2");
        assert_eq!(
            content_type_for(Path::new("unknown.bin")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_html_is_not_cacheable() {
        assert!(is_html(Path::new("index.html")));
        assert!(!is_html(Path::new("app.js")));
    }

    #[tokio::test]
    async fn test_serve_reads_existing_asset() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("app.js"), "console.log('hi')").expect("write");

        let server = StaticServer::new(dir.path().to_path_buf());
        match server.serve("/app.js").await {
            StaticReply::File {
                bytes,
                content_type,
                cacheable,
            } => {
                assert_eq!(bytes, b"console.log('hi')");
                assert_eq!(content_type, "application/javascript");
                assert!(cacheable);
            }
            other => panic!("expected file, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_serve_falls_back_to_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("index.html"), "<html>portfolio</html>").expect("write");

        let server = StaticServer::new(dir.path().to_path_buf());
        match server.serve("/some/client/route").await {
            StaticReply::File {
                bytes,
                content_type,
                cacheable,
            } => {
                assert_eq!(bytes, b"<html>portfolio</html>");
                assert_eq!(content_type, "text/html");
                assert!(!cacheable);
            }
            other => panic!("expected entry fallback, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_serve_missing_entry_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let server = StaticServer::new(dir.path().to_path_buf());
        assert!(matches!(
            server.serve("/anything").await,
            StaticReply::NotFound
        ));
    }

    #[tokio::test]
    async fn test_serve_traversal_is_forbidden_without_read() {
        // Root does not even exist; a traversal must be rejected before any
        // filesystem access, so no error from the missing directory.
        let server = StaticServer::new(PathBuf::from("/nonexistent-root"));
        assert!(matches!(
            server.serve("/../../etc/passwd").await,
            StaticReply::Forbidden
        ));
    }
}
