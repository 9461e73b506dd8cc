use std::fs as host_fs;
use std::path::Path;

use crate::dentry::Dentry;
use crate::error::{FsError, FsResult};
use crate::fs::Fs;
use crate::inode::{Inode, DIRECT_BLOCKS};
use crate::perm;
use crate::util::{ceil_division, now};

impl Fs {
    pub fn create_file(&mut self, path: &str) -> FsResult<()> {
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
        let inode = Inode::new_file(ino_num, self.uid(), self.gid(), now());
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

    /// Overwrites a file's entire content. Buffers the old blocks' bytes
    /// before freeing them and attempting the new allocation, so that on
    /// any failure the exact prior blocks/size/mtime are restored
    /// byte-for-byte instead of leaving the inode half-updated.
    pub fn write_all(&mut self, path: &str, data: &[u8]) -> FsResult<()> {
        let target = self.resolve(path)?;
        let inode_id = self.dentry(target).inode;
        {
            let inode = self.inode(inode_id);
            if !inode.is_file() {
                return Err(FsError::NotAFile(path.to_string()));
            }
            if !self.perm_check(inode, perm::W_OK) {
                return Err(FsError::PermDenied(path.to_string()));
            }
        }

        let block_size = self.device.block_size();
        let need = ceil_division(data.len(), block_size);
        if need > DIRECT_BLOCKS {
            return Err(FsError::NoSpace);
        }

        let old_blocks = self.inode(inode_id).blocks;
        let old_size = self.inode(inode_id).size as usize;
        let old_mtime = self.inode(inode_id).mtime;

        let mut old_data = vec![0u8; old_size];
        for (i, &b) in old_blocks.iter().enumerate() {
            if b < 0 {
                break;
            }
            let mut buf = vec![0u8; block_size];
            self.device.read(b as usize, &mut buf)?;
            let offset = i * block_size;
            let wlen = (old_size - offset).min(block_size);
            old_data[offset..offset + wlen].copy_from_slice(&buf[..wlen]);
        }

        for b in old_blocks {
            if b >= 0 {
                self.device.free(b as usize);
            }
        }
        self.inode_mut(inode_id).blocks = [-1; DIRECT_BLOCKS];

        let mut allocated = Vec::new();
        let result = (|| -> FsResult<()> {
            for i in 0..need {
                let blk = self.device.alloc()?;
                allocated.push(blk);
                self.inode_mut(inode_id).blocks[i] = blk as i32;
                let offset = i * block_size;
                let wlen = (data.len() - offset).min(block_size);
                let mut buf = vec![0u8; block_size];
                buf[..wlen].copy_from_slice(&data[offset..offset + wlen]);
                self.device.write(blk, &buf)?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                let inode = self.inode_mut(inode_id);
                inode.size = data.len() as u32;
                inode.mtime = now();
                Ok(())
            }
            Err(e) => {
                for blk in allocated {
                    self.device.free(blk);
                }
                // The blocks we just freed above are the only thing that
                // moved since we freed `old_blocks`; re-reserving those
                // exact indices and rewriting their buffered content
                // restores the pre-call state exactly, not just its size.
                for (i, &b) in old_blocks.iter().enumerate() {
                    if b < 0 {
                        break;
                    }
                    self.device.reserve(b as usize)?;
                    let offset = i * block_size;
                    let wlen = (old_size - offset).min(block_size);
                    let mut buf = vec![0u8; block_size];
                    buf[..wlen].copy_from_slice(&old_data[offset..offset + wlen]);
                    self.device.write(b as usize, &buf)?;
                }
                let inode = self.inode_mut(inode_id);
                inode.blocks = old_blocks;
                inode.size = old_size as u32;
                inode.mtime = old_mtime;
                Err(e)
            }
        }
    }

    /// Streams a file's raw bytes to `out`. Never appends a trailing
    /// newline — that's a shell display nicety `rvfs` adds on top, not
    /// part of the file's content, which matters since `cp`/`export`
    /// reuse this internally.
    pub fn cat<W: std::io::Write>(&self, path: &str, out: &mut W) -> FsResult<()> {
        let target = self.resolve(path)?;
        let inode = self.inode_of(target);
        if !inode.is_file() {
            return Err(FsError::NotAFile(path.to_string()));
        }
        if !self.perm_check(inode, perm::R_OK) {
            return Err(FsError::PermDenied(path.to_string()));
        }
        let block_size = self.device.block_size();
        let mut remain = inode.size as usize;
        for &b in inode.blocks.iter() {
            if remain == 0 || b < 0 {
                break;
            }
            let mut buf = vec![0u8; block_size];
            self.device.read(b as usize, &mut buf)?;
            let n = remain.min(block_size);
            out.write_all(&buf[..n]).map_err(FsError::Io)?;
            remain -= n;
        }
        Ok(())
    }

    fn read_all(&self, path: &str) -> FsResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.cat(path, &mut buf)?;
        Ok(buf)
    }

    pub fn rm(&mut self, path: &str) -> FsResult<()> {
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
        let inode_id = self.dentry(target).inode;
        if !self.inode(inode_id).is_file() {
            return Err(FsError::NotAFile(path.to_string()));
        }
        self.remove_child(parent, target)?;
        for b in self.inode(inode_id).blocks {
            if b >= 0 {
                self.device.free(b as usize);
            }
        }
        self.dispose_inode(inode_id);
        self.dispose_dentry(target);
        Ok(())
    }

    /// Copies `src`'s content into `dst`, creating `dst` if it doesn't
    /// exist. A zero-length source naturally truncates `dst` to empty
    /// since `write_all` is called with an empty payload either way.
    pub fn cp(&mut self, src: &str, dst: &str) -> FsResult<()> {
        let src_id = self.resolve(src)?;
        if !self.inode_of(src_id).is_file() {
            return Err(FsError::NotAFile(src.to_string()));
        }
        let data = self.read_all(src)?;

        match self.resolve(dst) {
            Ok(dst_id) => {
                if !self.inode_of(dst_id).is_file() {
                    return Err(FsError::NotAFile(dst.to_string()));
                }
            }
            Err(FsError::NotFound(_)) => self.create_file(dst)?,
            Err(e) => return Err(e),
        }
        self.write_all(dst, &data)
    }

    /// Imports a host file into the vfs tree. If `vpath` resolves to an
    /// existing directory, the host file's basename is appended to it
    /// (`vfs_import`'s behavior); otherwise `vpath` is the destination
    /// file itself, created if missing.
    pub fn import(&mut self, host_path: &Path, vpath: &str) -> FsResult<()> {
        let data = host_fs::read(host_path).map_err(FsError::Io)?;
        let max_len = DIRECT_BLOCKS * self.device.block_size();
        if data.len() > max_len {
            return Err(FsError::NoSpace);
        }

        let mut target = vpath.to_string();
        if let Ok(existing) = self.resolve(&target) {
            if self.inode_of(existing).is_dir() {
                let base = host_basename(host_path);
                target = join_vfs_path(&target, &base);
            }
        }

        match self.resolve(&target) {
            Ok(id) => {
                if !self.inode_of(id).is_file() {
                    return Err(FsError::NotAFile(target));
                }
            }
            Err(FsError::NotFound(_)) => self.create_file(&target)?,
            Err(e) => return Err(e),
        }
        self.write_all(&target, &data)
    }

    pub fn export(&self, vpath: &str, host_path: &Path) -> FsResult<()> {
        let data = self.read_all(vpath)?;
        host_fs::write(host_path, &data).map_err(FsError::Io)
    }
}

fn host_basename(path: &Path) -> String {
    let s = path.to_string_lossy();
    match s.rfind(['/', '\\']) {
        Some(i) => s[i + 1..].to_string(),
        None => s.to_string(),
    }
}

fn join_vfs_path(dir: &str, base: &str) -> String {
    if dir.is_empty() {
        base.to_string()
    } else if dir == "/" {
        format!("/{base}")
    } else if dir.ends_with('/') {
        format!("{dir}{base}")
    } else {
        format!("{dir}/{base}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn buf(fs: &Fs, path: &str) -> Vec<u8> {
        let mut v = Vec::new();
        fs.cat(path, &mut v).unwrap();
        v
    }

    #[test]
    fn write_then_cat_round_trips() {
        let mut fs = Fs::new().unwrap();
        fs.create_file("/x").unwrap();
        fs.write_all("/x", b"hello").unwrap();
        assert_eq!(buf(&fs, "/x"), b"hello");
        let st = fs.stat("/x").unwrap();
        assert_eq!(st.size, 5);
    }

    #[test]
    fn write_all_is_idempotent() {
        let mut fs = Fs::new().unwrap();
        fs.create_file("/x").unwrap();
        fs.write_all("/x", b"hello world").unwrap();
        let blocks1 = fs.stat("/x").unwrap().blocks;
        fs.write_all("/x", b"hello world").unwrap();
        let st = fs.stat("/x").unwrap();
        assert_eq!(st.blocks, blocks1);
        assert_eq!(buf(&fs, "/x"), b"hello world");
    }

    #[test]
    fn write_all_rejects_oversize_payload() {
        let mut fs = Fs::new().unwrap();
        fs.create_file("/x").unwrap();
        let too_big = vec![b'a'; DIRECT_BLOCKS * fs.device.block_size() + 1];
        assert!(matches!(fs.write_all("/x", &too_big), Err(FsError::NoSpace)));
        let st = fs.stat("/x").unwrap();
        assert_eq!(st.size, 0);
    }

    #[test]
    fn write_all_rolls_back_on_exhausted_device() {
        let mut fs = Fs::new().unwrap();
        fs.create_file("/x").unwrap();
        fs.write_all("/x", b"abc").unwrap();
        let before = fs.stat("/x").unwrap();
        let before_data = buf(&fs, "/x");

        // Exhaust every remaining free block so a bigger rewrite fails.
        let block_size = fs.device.block_size();
        let mut filler = Vec::new();
        loop {
            fs.create_file(&format!("/filler{}", filler.len())).unwrap();
            let name = format!("/filler{}", filler.len());
            if fs
                .write_all(&name, &vec![b'x'; block_size])
                .is_err()
            {
                break;
            }
            filler.push(name);
            if filler.len() > 2000 {
                break;
            }
        }

        let big = vec![b'z'; block_size * 2];
        assert!(fs.write_all("/x", &big).is_err());
        let after = fs.stat("/x").unwrap();
        assert_eq!(after.size, before.size);
        assert_eq!(after.mtime, before.mtime);
        assert_eq!(buf(&fs, "/x"), before_data);
    }

    #[test]
    fn cp_zero_length_truncates_destination() {
        let mut fs = Fs::new().unwrap();
        fs.create_file("/src").unwrap();
        fs.create_file("/dst").unwrap();
        fs.write_all("/dst", b"old content").unwrap();
        fs.cp("/src", "/dst").unwrap();
        let st = fs.stat("/dst").unwrap();
        assert_eq!(st.size, 0);
        assert_eq!(buf(&fs, "/dst"), b"");
    }

    #[test]
    fn cp_creates_destination_when_missing() {
        let mut fs = Fs::new().unwrap();
        fs.create_file("/src").unwrap();
        fs.write_all("/src", b"payload").unwrap();
        fs.cp("/src", "/dst").unwrap();
        assert_eq!(buf(&fs, "/dst"), b"payload");
    }

    #[test]
    fn rm_frees_blocks() {
        let mut fs = Fs::new().unwrap();
        fs.create_file("/x").unwrap();
        fs.write_all("/x", b"hello").unwrap();
        let used_before = fs.device.used_blocks();
        fs.rm("/x").unwrap();
        assert!(fs.device.used_blocks() < used_before);
        assert!(fs.resolve("/x").is_err());
    }

    #[test]
    fn join_vfs_path_handles_root_and_nested() {
        assert_eq!(join_vfs_path("/", "a.txt"), "/a.txt");
        assert_eq!(join_vfs_path("/dir", "a.txt"), "/dir/a.txt");
    }
}
