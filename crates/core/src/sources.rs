use crate::{IngestError, SkipReason, SkippedSource, Source};
use reqwest::Client;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;
use url::Url;
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Local(PathBuf),
    Remote(Url),
}

impl SourceLocation {
    pub fn parse(raw: &str) -> Result<Self, IngestError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IngestError::InvalidArgument(
                "empty source location".to_string(),
            ));
        }

        let lowered = trimmed.to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            let url = Url::parse(trimmed)
                .map_err(|error| IngestError::InvalidArgument(format!("{trimmed}: {error}")))?;
            return Ok(Self::Remote(url));
        }

        if lowered.starts_with("file://") {
            let path = Url::parse(trimmed)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .ok_or_else(|| {
                    IngestError::InvalidArgument(format!("not a local file url: {trimmed}"))
                })?;
            return Ok(Self::Local(path));
        }

        Ok(Self::Local(PathBuf::from(trimmed)))
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => f.write_str(url.as_str()),
        }
    }
}

/// A location that resolved to exactly one readable unit; bytes are not loaded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub location: SourceLocation,
    pub file_name: String,
}

/// Files found under a directory plus the entries the walk could not read.
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<PathBuf>,
    pub unreadable: Vec<SkippedSource>,
}

pub fn discover_files(folder: &Path, extensions: &[String]) -> Discovery {
    let mut discovery = Discovery::default();

    for item in WalkDir::new(folder).follow_links(true) {
        let entry = match item {
            Ok(entry) => entry,
            Err(error) => {
                let path = error.path().unwrap_or(folder).display().to_string();
                warn!(%path, %error, "unable to walk directory entry");
                discovery.unreadable.push(SkippedSource {
                    location: path,
                    reason: SkipReason::Unavailable(error.to_string()),
                });
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let wanted = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                extensions
                    .iter()
                    .any(|wanted| wanted.eq_ignore_ascii_case(ext))
            });

        if wanted {
            discovery.files.push(entry.path().to_path_buf());
        }
    }

    discovery.files.sort_unstable();
    discovery
}

/// Outcome of expanding one location: sources to load and entries skipped on the way.
#[derive(Debug, Default)]
pub struct Resolution {
    pub sources: Vec<ResolvedSource>,
    pub skipped: Vec<SkippedSource>,
}

/// Expands one configured location. An `Err` means the whole location is unusable.
pub fn resolve(
    location: &SourceLocation,
    extensions: &[String],
) -> Result<Resolution, IngestError> {
    match location {
        SourceLocation::Local(path) => {
            let metadata = std::fs::metadata(path).map_err(|error| {
                IngestError::SourceUnavailable(format!("{}: {error}", path.display()))
            })?;

            if !metadata.is_dir() {
                let file_name = file_name_of(path)?;
                return Ok(Resolution {
                    sources: vec![ResolvedSource {
                        location: location.clone(),
                        file_name,
                    }],
                    skipped: Vec::new(),
                });
            }

            let discovery = discover_files(path, extensions);
            if discovery.files.is_empty() && discovery.unreadable.is_empty() {
                return Err(IngestError::SourceUnavailable(format!(
                    "{}: no files with extensions [{}]",
                    path.display(),
                    extensions.join(", ")
                )));
            }

            let mut resolution = Resolution {
                sources: Vec::new(),
                skipped: discovery.unreadable,
            };

            for file in discovery.files {
                match file_name_of(&file) {
                    Ok(file_name) => resolution.sources.push(ResolvedSource {
                        location: SourceLocation::Local(file),
                        file_name,
                    }),
                    Err(error) => {
                        let location = file.display().to_string();
                        warn!(%location, %error, "skipping file with unusable name");
                        resolution.skipped.push(SkippedSource {
                            location,
                            reason: SkipReason::Unavailable(error.to_string()),
                        });
                    }
                }
            }

            Ok(resolution)
        }
        SourceLocation::Remote(url) => {
            let file_name = url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|segment| !segment.is_empty())
                .or_else(|| url.host_str())
                .unwrap_or("remote")
                .to_string();

            Ok(Resolution {
                sources: vec![ResolvedSource {
                    location: location.clone(),
                    file_name,
                }],
                skipped: Vec::new(),
            })
        }
    }
}

fn file_name_of(path: &Path) -> Result<String, IngestError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))
}

/// Reads the full content once. Every failure here is reported as `SourceUnavailable`.
pub async fn read_source(
    resolved: &ResolvedSource,
    client: &Client,
) -> Result<Source, IngestError> {
    let content = match &resolved.location {
        SourceLocation::Local(path) => tokio::fs::read(path).await.map_err(|error| {
            IngestError::SourceUnavailable(format!("{}: {error}", path.display()))
        })?,
        SourceLocation::Remote(url) => fetch(client, url)
            .await
            .map_err(|error| IngestError::SourceUnavailable(format!("{url}: {error}")))?,
    };

    Ok(Source {
        location: resolved.location.to_string(),
        file_name: resolved.file_name.clone(),
        content,
    })
}

async fn fetch(client: &Client, url: &Url) -> Result<Vec<u8>, reqwest::Error> {
    let response = client.get(url.clone()).send().await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn text_extensions() -> Vec<String> {
        vec!["txt".to_string(), "md".to_string()]
    }

    #[test]
    fn parse_distinguishes_paths_and_urls() -> Result<(), IngestError> {
        assert_eq!(
            SourceLocation::parse(" data/input.txt ")?,
            SourceLocation::Local(PathBuf::from("data/input.txt"))
        );
        assert!(matches!(
            SourceLocation::parse("https://example.com/books/intro.txt")?,
            SourceLocation::Remote(_)
        ));
        assert!(SourceLocation::parse("   ").is_err());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn file_urls_become_local_paths() -> Result<(), IngestError> {
        assert_eq!(
            SourceLocation::parse("file:///srv/data/input.txt")?,
            SourceLocation::Local(PathBuf::from("/srv/data/input.txt"))
        );
        Ok(())
    }

    #[test]
    fn directories_expand_recursively_with_extension_filter(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let nested = dir.path().join("nested");
        fs::create_dir(&nested)?;
        fs::write(dir.path().join("b.txt"), "b")?;
        fs::write(nested.join("a.MD"), "a")?;
        fs::write(dir.path().join("image.png"), [0u8, 1, 2])?;

        let resolved = resolve(
            &SourceLocation::Local(dir.path().to_path_buf()),
            &text_extensions(),
        )?;

        let names: Vec<_> = resolved
            .sources
            .iter()
            .map(|source| source.file_name.as_str())
            .collect();
        assert_eq!(names, vec!["b.txt", "a.MD"]);
        assert!(resolved.skipped.is_empty());
        Ok(())
    }

    #[test]
    fn explicit_file_is_resolved_regardless_of_extension(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.log");
        fs::write(&path, "line")?;

        let resolved = resolve(&SourceLocation::Local(path), &text_extensions())?;
        assert_eq!(resolved.sources.len(), 1);
        assert_eq!(resolved.sources[0].file_name, "notes.log");
        Ok(())
    }

    #[test]
    fn missing_path_is_unavailable() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = resolve(
            &SourceLocation::Local(dir.path().join("missing.txt")),
            &text_extensions(),
        );
        assert!(matches!(result, Err(IngestError::SourceUnavailable(_))));
        Ok(())
    }

    #[test]
    fn remote_file_name_comes_from_last_segment() -> Result<(), IngestError> {
        let location = SourceLocation::parse("https://example.com/corpus/article-1.txt")?;
        let resolved = resolve(&location, &text_extensions())?;
        assert_eq!(resolved.sources[0].file_name, "article-1.txt");
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn undecodable_file_name_is_skipped_alone() -> Result<(), Box<dyn std::error::Error>> {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempdir()?;
        fs::write(dir.path().join("good.txt"), "good content")?;
        fs::write(dir.path().join(OsStr::from_bytes(b"bad\xff.txt")), "bad name")?;

        let resolved = resolve(
            &SourceLocation::Local(dir.path().to_path_buf()),
            &text_extensions(),
        )?;

        assert_eq!(resolved.sources.len(), 1);
        assert_eq!(resolved.sources[0].file_name, "good.txt");
        assert_eq!(resolved.skipped.len(), 1);
        assert!(matches!(resolved.skipped[0].reason, SkipReason::Unavailable(_)));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn dangling_link_is_reported_not_dropped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("kept.txt"), "still here")?;
        let link = dir.path().join("dangling.txt");
        std::os::unix::fs::symlink(dir.path().join("gone.txt"), &link)?;

        let discovery = discover_files(dir.path(), &text_extensions());

        assert_eq!(discovery.files, vec![dir.path().join("kept.txt")]);
        assert_eq!(discovery.unreadable.len(), 1);
        assert_eq!(discovery.unreadable[0].location, link.display().to_string());
        assert!(matches!(
            discovery.unreadable[0].reason,
            SkipReason::Unavailable(_)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn read_source_loads_bytes_once() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("input.txt");
        fs::write(&path, "hello\nworld\n")?;

        let resolved = ResolvedSource {
            location: SourceLocation::Local(path.clone()),
            file_name: "input.txt".to_string(),
        };
        let source = read_source(&resolved, &Client::new()).await?;
        assert_eq!(source.content, b"hello\nworld\n");
        assert_eq!(source.location, path.display().to_string());

        fs::remove_file(&path)?;
        assert!(matches!(
            read_source(&resolved, &Client::new()).await,
            Err(IngestError::SourceUnavailable(_))
        ));
        Ok(())
    }
}
