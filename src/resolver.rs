use crate::dentry::DentryId;
use crate::error::{FsError, FsResult};
use crate::fs::Fs;
use crate::path;
use crate::perm;

/// Resolves `path` (absolute or relative to the context's cwd) to a
/// `DentryId`, applying the `X_OK` gate on every directory entered along
/// the way. This is the one canonical lookup; every other operation goes
/// through it rather than re-walking the tree itself.
pub fn resolve(fs: &Fs, path: &str) -> FsResult<DentryId> {
    let norm = path::normalize(path);
    if norm.is_empty() {
        return Err(FsError::NotFound(path.to_string()));
    }

    let absolute = norm.starts_with('/');
    if absolute && norm == "/" {
        return Ok(fs.root());
    }

    let mut cur = if absolute { fs.root() } else { fs.cwd() };
    let body: &str = if absolute { &norm[1..] } else { &norm };

    for tok in path::tokenize(body) {
        match tok {
            "." => continue,
            ".." => {
                let parent = fs.dentry(cur).parent;
                let inode = fs.inode_of(parent);
                if !inode.is_dir() {
                    return Err(FsError::NotADir(path.to_string()));
                }
                if !perm::check(inode, fs.uid(), fs.gid(), perm::X_OK) {
                    return Err(FsError::PermDenied(path.to_string()));
                }
                cur = parent;
            }
            name => {
                let inode = fs.inode_of(cur);
                if !inode.is_dir() {
                    return Err(FsError::NotADir(path.to_string()));
                }
                if !perm::check(inode, fs.uid(), fs.gid(), perm::X_OK) {
                    return Err(FsError::PermDenied(path.to_string()));
                }
                cur = fs
                    .find_child(cur, name)
                    .ok_or_else(|| FsError::NotFound(path.to_string()))?;
            }
        }
    }

    Ok(cur)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolves_absolute_and_relative_paths() {
        let mut fs = Fs::new().unwrap();
        fs.mkdir("/a").unwrap();
        fs.mkdir("/a/b").unwrap();
        assert!(resolve(&fs, "/a/b").is_ok());
        fs.cd("/a").unwrap();
        assert!(resolve(&fs, "b").is_ok());
        assert!(resolve(&fs, "../a/b").is_ok());
    }

    #[test]
    fn missing_segment_is_not_found() {
        let fs = Fs::new().unwrap();
        assert!(matches!(resolve(&fs, "/nope"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn blocks_traversal_without_x_permission() {
        let mut fs = Fs::new().unwrap();
        fs.mkdir("/a").unwrap();
        fs.mkdir("/a/b").unwrap();
        fs.set_uid(0);
        fs.chmod("/a", 0o600).unwrap(); // only root may chmod
        fs.set_uid(1000);
        fs.set_gid(1000);
        assert!(matches!(
            resolve(&fs, "/a/b"),
            Err(FsError::PermDenied(_))
        ));
    }
}
