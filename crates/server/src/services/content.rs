use apilab_api::v1::content::ContentError;
use std::path::{Component, Path, PathBuf};

/// Reads lesson content from a content directory.
///
/// Paths are always resolved relative to the content directory; absolute
/// paths and parent components are rejected. Symbolic links are followed
/// only while their target stays within the content directory.
#[derive(Clone, Debug)]
pub struct ContentReader {
    root: PathBuf,
}

impl ContentReader {
    /// Creates a new content reader for the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The content directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a relative file path within the content directory.
    pub fn resolve(&self, file: &str) -> Result<PathBuf, ContentError> {
        if file.trim().is_empty() {
            return Err(ContentError::MissingPath);
        }

        let mut path = self.root.clone();
        for component in Path::new(file).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(ContentError::InvalidPath(file.to_string()));
                }
            }
        }

        if path == self.root {
            return Err(ContentError::InvalidPath(file.to_string()));
        }

        Ok(path)
    }

    /// Reads the text contents of the given file.
    pub async fn read(&self, file: &str) -> Result<String, ContentError> {
        let path = self.resolve(file)?;
        let not_found = |e: std::io::Error| {
            tracing::warn!(
                "failed to read content file `{path}`: {e}",
                path = path.display()
            );
            ContentError::NotFound(file.to_string())
        };

        let root = tokio::fs::canonicalize(&self.root).await.map_err(not_found)?;
        let target = tokio::fs::canonicalize(&path).await.map_err(not_found)?;
        if !target.starts_with(&root) {
            tracing::warn!(
                "content file `{path}` links outside the content directory",
                path = path.display()
            );
            return Err(ContentError::InvalidPath(file.to_string()));
        }

        tokio::fs::read_to_string(&target).await.map_err(not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn resolves_relative_paths() {
        let reader = ContentReader::new("/srv/lessons");
        assert_eq!(
            reader.resolve("content/01-http/intro.html").unwrap(),
            Path::new("/srv/lessons/content/01-http/intro.html")
        );
        assert_eq!(
            reader.resolve("./intro.html").unwrap(),
            Path::new("/srv/lessons/intro.html")
        );
    }

    #[test]
    fn rejects_paths_outside_the_content_directory() {
        let reader = ContentReader::new("/srv/lessons");
        for file in ["../secrets.txt", "content/../../etc/passwd", "/etc/passwd", "."] {
            assert!(
                matches!(reader.resolve(file), Err(ContentError::InvalidPath(_))),
                "{file} should be rejected"
            );
        }
        assert!(matches!(reader.resolve(""), Err(ContentError::MissingPath)));
    }

    #[tokio::test]
    async fn reads_existing_files_and_reports_missing_ones() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lessons")).unwrap();
        fs::write(dir.path().join("lessons/intro.html"), "<h1>HTTP</h1>").unwrap();

        let reader = ContentReader::new(dir.path());
        assert_eq!(
            reader.read("lessons/intro.html").await.unwrap(),
            "<h1>HTTP</h1>"
        );

        let err = reader.read("lessons/missing.html").await.unwrap_err();
        assert!(matches!(err, ContentError::NotFound(_)));
        assert_eq!(err.status(), 404);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn does_not_follow_links_out_of_the_content_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("lessons");
        fs::create_dir_all(&root).unwrap();
        fs::write(dir.path().join("secret.txt"), "secret").unwrap();
        fs::write(root.join("intro.html"), "<h1>HTTP</h1>").unwrap();
        std::os::unix::fs::symlink(dir.path().join("secret.txt"), root.join("leak.txt")).unwrap();
        std::os::unix::fs::symlink(root.join("intro.html"), root.join("alias.html")).unwrap();

        let reader = ContentReader::new(&root);
        let err = reader.read("leak.txt").await.unwrap_err();
        assert!(matches!(err, ContentError::InvalidPath(_)));
        assert_eq!(err.status(), 400);

        assert_eq!(reader.read("alias.html").await.unwrap(), "<h1>HTTP</h1>");
    }
}
