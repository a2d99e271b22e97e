use utilities::error::FsError;

pub const ROOT: &str = "/";

/// Rejects empty, relative and non-canonical paths. A single trailing `/` is tolerated.
pub fn validate(path: &str) -> Result<(), FsError> {
    if path.is_empty() {
        return Err(FsError::BadPath("path is empty".to_owned()));
    }
    if !path.starts_with('/') {
        return Err(FsError::BadPath(format!("{path} is not absolute")));
    }
    if path == ROOT {
        return Ok(());
    }
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    for component in trimmed[1..].split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(FsError::BadPath(format!("{path} has an invalid component")));
        }
    }
    Ok(())
}

/// Trie key of a directory: the path with exactly one trailing `/`.
pub fn dir_key(path: &str) -> Result<String, FsError> {
    validate(path)?;
    if path.ends_with('/') {
        Ok(path.to_owned())
    } else {
        Ok(format!("{path}/"))
    }
}

/// Splits a non-root path into its parent directory key and base name.
/// `/a/b` and `/a/b/` both give `("/a/", "b")`.
pub fn split(path: &str) -> Result<(String, String), FsError> {
    validate(path)?;
    if path == ROOT {
        return Err(FsError::BadPath("the root has no parent".to_owned()));
    }
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    // validated paths start with '/', so there is always a separator
    let index = trimmed.rfind('/').unwrap_or(0);
    Ok((
        trimmed[..=index].to_owned(),
        trimmed[index + 1..].to_owned(),
    ))
}

/// Like `split` but for file paths, which may not end with `/`.
pub fn split_file(path: &str) -> Result<(String, String), FsError> {
    if path.ends_with('/') {
        return Err(FsError::BadPath(format!("{path} names a directory")));
    }
    split(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation() {
        assert!(validate("/").is_ok());
        assert!(validate("/a/b").is_ok());
        assert!(validate("/a/b/").is_ok());
        assert!(validate("/ü/日本").is_ok());
        for bad in ["", "a/b", "//", "/a//b", "/a/./b", "/a/..", "/a/b//"] {
            assert!(matches!(validate(bad), Err(FsError::BadPath(_))), "{bad}");
        }
    }

    #[test]
    fn keys_and_splits() {
        assert_eq!(dir_key("/").unwrap(), "/");
        assert_eq!(dir_key("/a/b").unwrap(), "/a/b/");
        assert_eq!(dir_key("/a/b/").unwrap(), "/a/b/");
        assert_eq!(split("/a").unwrap(), ("/".to_owned(), "a".to_owned()));
        assert_eq!(split("/a/b/").unwrap(), ("/a/".to_owned(), "b".to_owned()));
        assert!(split("/").is_err());
        assert_eq!(
            split_file("/a/f.txt").unwrap(),
            ("/a/".to_owned(), "f.txt".to_owned())
        );
        assert!(split_file("/a/").is_err());
    }
}
