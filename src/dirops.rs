use crate::dentry::{Dentry, DentryId};
use crate::error::{FsError, FsResult};
use crate::fs::Fs;
use crate::inode::{Inode, InodeType, IFMT};
use crate::perm;
use crate::util::now;

pub struct LongEntry {
    pub mode_string: String,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub mtime: u64,
    pub name: String,
}

impl Fs {
    pub fn mkdir(&mut self, path: &str) -> FsResult<()> {
        let (parent_id, name) = self.resolve_parent_and_leaf(path)?;
        if name.is_empty() {
            return Err(FsError::Invalid(format!("'{path}': empty name")));
        }
        let parent_inode = self.inode_of(parent_id).clone();
        if !parent_inode.is_dir() {
            return Err(FsError::NotADir(path.to_string()));
        }
        if !self.perm_check(&parent_inode, perm::W_OK | perm::X_OK) {
            return Err(FsError::PermDenied(path.to_string()));
        }
        if self.find_child(parent_id, &name).is_some() {
            return Err(FsError::Exists(path.to_string()));
        }

        let ino_num = self.next_ino();
        let inode = Inode::new_dir(ino_num, self.uid(), self.gid(), now());
        let inode_id = self.alloc_inode(inode);
        let dentry = Dentry {
            name,
            parent: parent_id,
            inode: inode_id,
            child: None,
            sibling: None,
        };
        let dentry_id = self.alloc_dentry(dentry);
        self.add_child(parent_id, dentry_id)?;
        Ok(())
    }

    pub fn rmdir(&mut self, path: &str) -> FsResult<()> {
        let target = self.resolve(path)?;
        if target == self.root() {
            return Err(FsError::Invalid("cannot remove root".into()));
        }
        let parent = self.dentry(target).parent;
        if parent == target {
            return Err(FsError::Invalid("cannot remove root".into()));
        }
        let parent_inode = self.inode_of(parent).clone();
        if !self.perm_check(&parent_inode, perm::W_OK | perm::X_OK) {
            return Err(FsError::PermDenied(path.to_string()));
        }
        if !self.inode_of(target).is_dir() {
            return Err(FsError::NotADir(path.to_string()));
        }
        if self.dentry(target).child.is_some() {
            return Err(FsError::Invalid(format!("'{path}': directory not empty")));
        }
        self.remove_child(parent, target)?;
        let inode_id = self.dentry(target).inode;
        self.dispose_inode(inode_id);
        self.dispose_dentry(target);
        Ok(())
    }

    pub fn ls(&self) -> Vec<String> {
        self.ls_dentry(self.cwd())
    }

    pub fn ls_path(&self, path: &str) -> FsResult<Vec<String>> {
        let target = self.resolve(path)?;
        if !self.inode_of(target).is_dir() {
            return Err(FsError::NotADir(path.to_string()));
        }
        Ok(self.ls_dentry(target))
    }

    fn ls_dentry(&self, dir: DentryId) -> Vec<String> {
        let mut out = Vec::new();
        let mut cur = self.dentry(dir).child;
        while let Some(c) = cur {
            out.push(self.dentry(c).name.clone());
            cur = self.dentry(c).sibling;
        }
        out
    }

    pub fn ls_long(&self) -> FsResult<Vec<LongEntry>> {
        self.ls_long_dentry(self.cwd())
    }

    pub fn ls_long_path(&self, path: &str) -> FsResult<Vec<LongEntry>> {
        let target = self.resolve(path)?;
        self.ls_long_dentry(target)
    }

    fn ls_long_dentry(&self, dir: DentryId) -> FsResult<Vec<LongEntry>> {
        let dir_inode = self.inode_of(dir);
        if !dir_inode.is_dir() {
            return Err(FsError::NotADir("ls -l target".into()));
        }
        if !self.perm_check(dir_inode, perm::R_OK) {
            return Err(FsError::PermDenied("ls -l target".into()));
        }
        let mut out = Vec::new();
        let mut cur = self.dentry(dir).child;
        while let Some(c) = cur {
            let inode = self.inode_of(c);
            out.push(LongEntry {
                mode_string: inode.mode_string(),
                nlink: inode.nlink,
                uid: inode.uid,
                gid: inode.gid,
                size: inode.size,
                mtime: inode.mtime,
                name: self.dentry(c).name.clone(),
            });
            cur = self.dentry(c).sibling;
        }
        Ok(out)
    }

    pub fn cd(&mut self, path: &str) -> FsResult<()> {
        let target = self.resolve(path)?;
        let inode = self.inode_of(target).clone();
        if !inode.is_dir() {
            return Err(FsError::NotADir(path.to_string()));
        }
        if !self.perm_check(&inode, perm::X_OK) {
            return Err(FsError::PermDenied(path.to_string()));
        }
        self.set_cwd(target);
        Ok(())
    }

    /// Root-only; preserves the inode's full type-bit group (`IFDIR`/
    /// `IFREG`) and overwrites the permission bits with `mode`.
    pub fn chmod(&mut self, path: &str, mode: u16) -> FsResult<()> {
        if self.uid() != 0 {
            return Err(FsError::PermDenied("chmod: only root may do this".into()));
        }
        let target = self.resolve(path)?;
        let inode_id = self.dentry(target).inode;
        let inode = self.inode_mut(inode_id);
        inode.mode = (inode.mode & IFMT) | (mode & 0o777);
        inode.mtime = now();
        Ok(())
    }

    pub fn tree(&self, path: Option<&str>) -> FsResult<String> {
        let start = match path {
            Some(p) => self.resolve(p)?,
            None => self.cwd(),
        };
        if !self.inode_of(start).is_dir() {
            return Err(FsError::NotADir(path.unwrap_or("").to_string()));
        }
        let mut out = String::new();
        self.tree_rec(start, 0, &mut out);
        Ok(out)
    }

    fn tree_rec(&self, dir: DentryId, level: usize, out: &mut String) {
        let mut cur = self.dentry(dir).child;
        while let Some(c) = cur {
            for _ in 0..level {
                out.push_str("|   ");
            }
            out.push_str("|-- ");
            out.push_str(&self.dentry(c).name);
            out.push('\n');
            if self.inode_of(c).is_dir() {
                self.tree_rec(c, level + 1, out);
            }
            cur = self.dentry(c).sibling;
        }
    }

    pub fn get_cwd_path(&self) -> String {
        if self.cwd() == self.root() {
            return "/".to_string();
        }
        let mut names = Vec::new();
        let mut cur = self.cwd();
        while cur != self.root() {
            names.push(self.dentry(cur).name.clone());
            cur = self.dentry(cur).parent;
        }
        names.reverse();
        format!("/{}", names.join("/"))
    }

    pub fn stat(&self, path: &str) -> FsResult<StatInfo> {
        let target = self.resolve(path)?;
        let inode = self.inode_of(target);
        Ok(StatInfo {
            path: path.to_string(),
            size: inode.size,
            blocks: inode.blocks_in_use(),
            kind: inode.kind,
            ino: inode.ino,
            nlink: inode.nlink,
            mode: inode.mode,
            uid: inode.uid,
            gid: inode.gid,
            mtime: inode.mtime,
        })
    }
}

pub struct StatInfo {
    pub path: String,
    pub size: u32,
    pub blocks: usize,
    pub kind: InodeType,
    pub ino: u64,
    pub nlink: u32,
    pub mode: u16,
    pub uid: u32,
    pub gid: u32,
    pub mtime: u64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mkdir_then_ls_lists_lifo() {
        let mut fs = Fs::new().unwrap();
        fs.mkdir("/a").unwrap();
        fs.mkdir("/b").unwrap();
        assert_eq!(fs.ls(), vec!["b", "a"]);
    }

    #[test]
    fn mkdir_rejects_duplicate_name() {
        let mut fs = Fs::new().unwrap();
        fs.mkdir("/a").unwrap();
        assert!(matches!(fs.mkdir("/a"), Err(FsError::Exists(_))));
    }

    #[test]
    fn rmdir_rejects_non_empty() {
        let mut fs = Fs::new().unwrap();
        fs.mkdir("/a").unwrap();
        fs.mkdir("/a/b").unwrap();
        assert!(fs.rmdir("/a").is_err());
        fs.rmdir("/a/b").unwrap();
        fs.rmdir("/a").unwrap();
    }

    #[test]
    fn cd_and_get_cwd_path_round_trip() {
        let mut fs = Fs::new().unwrap();
        fs.mkdir("/a").unwrap();
        fs.mkdir("/a/b").unwrap();
        fs.cd("/a/b").unwrap();
        assert_eq!(fs.get_cwd_path(), "/a/b");
        fs.cd("..").unwrap();
        assert_eq!(fs.get_cwd_path(), "/a");
    }

    #[test]
    fn chmod_requires_root_and_preserves_type_bits() {
        let mut fs = Fs::new().unwrap();
        fs.mkdir("/a").unwrap();
        assert!(fs.chmod("/a", 0o700).is_err());
        fs.set_uid(0);
        fs.chmod("/a", 0o700).unwrap();
        let st = fs.stat("/a").unwrap();
        assert_eq!(st.mode & 0o777, 0o700);
        assert_eq!(st.mode & IFMT, crate::inode::IFDIR);
    }

    #[test]
    fn tree_nests_by_depth() {
        let mut fs = Fs::new().unwrap();
        fs.mkdir("/a").unwrap();
        fs.mkdir("/a/b").unwrap();
        let out = fs.tree(None).unwrap();
        assert!(out.contains("|-- a"));
        assert!(out.contains("|   |-- b"));
    }
}
