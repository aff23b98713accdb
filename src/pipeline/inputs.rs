//! Input expansion
//!
//! Turns command line arguments into input items. Directories are
//! walked recursively and only image files are kept from them.

use anyhow::{Context, Result};
use log::debug;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::{InputItem, InputSource};

/// Extensions picked up when walking directories
const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff", "ico", "pnm", "ppm", "pgm", "tga",
    "qoi",
];

/// Name used for piped standard input
pub const STDIN_NAME: &str = "<stdin>";

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Recursively collect image files below `dir`, sorted by path
fn walk_dir(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            walk_dir(&path, out)?;
        } else if is_image_file(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn read_stdin<R: Read>(stdin: &mut Option<R>) -> Result<InputItem> {
    let mut reader = stdin
        .take()
        .context("Standard input is not available or was already used")?;
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .context("Failed to read image data from standard input")?;
    debug!("Read {} bytes from stdin", data.len());
    Ok(InputItem::new(InputSource::Bytes {
        name: STDIN_NAME.to_string(),
        data,
    }))
}

/// Expand arguments into input items, preserving argument order.
///
/// `stdin` is `Some` when standard input is piped; it is read when
/// an argument is `-` or when there are no arguments at all.
pub fn expand<R: Read>(args: &[String], mut stdin: Option<R>) -> Result<Vec<InputItem>> {
    let mut items = Vec::new();

    if args.is_empty() {
        if stdin.is_some() {
            items.push(read_stdin(&mut stdin)?);
        }
        return Ok(items);
    }

    for arg in args {
        if arg == "-" {
            items.push(read_stdin(&mut stdin)?);
            continue;
        }

        let path = Path::new(arg);
        let meta = std::fs::metadata(path)
            .with_context(|| format!("Failed to access {}", path.display()))?;
        if meta.is_dir() {
            let mut found = Vec::new();
            walk_dir(path, &mut found)?;
            debug!("{}: {} images", path.display(), found.len());
            items.extend(found.into_iter().map(|p| InputItem::new(InputSource::Path(p))));
        } else {
            items.push(InputItem::new(InputSource::Path(path.to_path_buf())));
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn no_stdin() -> Option<&'static [u8]> {
        None
    }

    #[test]
    fn test_expand_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.png"), b"x").unwrap();
        fs::write(dir.path().join("a.JPG"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/c.gif"), b"x").unwrap();

        let args = vec![dir.path().to_string_lossy().to_string()];
        let items = expand(&args, no_stdin()).unwrap();
        let names: Vec<String> = items
            .iter()
            .map(|i| match &i.source {
                InputSource::Path(p) => p.file_name().unwrap().to_string_lossy().to_string(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.png", "c.gif"]);
    }

    #[test]
    fn test_explicit_file_kept_regardless_of_extension() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("picture.data");
        fs::write(&file, b"x").unwrap();
        let items = expand(&[file.to_string_lossy().to_string()], no_stdin()).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");
        assert!(expand(&[missing.to_string_lossy().to_string()], no_stdin()).is_err());
    }

    #[test]
    fn test_stdin() {
        let data: &[u8] = b"\x89PNG";
        let items = expand(&[], Some(data)).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source.to_string(), STDIN_NAME);

        assert!(expand(&[], no_stdin()).unwrap().is_empty());
        assert!(expand(&["-".to_string()], no_stdin()).is_err());
    }
}
