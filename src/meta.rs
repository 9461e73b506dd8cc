use crate::dentry::{Dentry, DentryId};
use crate::error::FsResult;
use crate::fs::Fs;
use crate::inode::{Inode, InodeType, DIRECT_BLOCKS, IFDIR, IFREG};
use crate::util::{ceil_division, now};

const META_MAGIC: u32 = 0x4D45_5441; // 'META'
const META_VER: u32 = 1;
const META_BLK_HEADER: usize = 0;
const META_BLK_ENTRIES_START: usize = 1;
const META_MAX_ENTRIES: usize = 1024;
const NAME_MAX: usize = 60;

/// `used(1) + type(1) + reserved(2) + size(4) + blocks(4*12) + parent(4) +
/// name(60)` = 120 bytes, packed with no padding.
const ENTRY_SIZE: usize = 1 + 1 + 2 + 4 + 4 * DIRECT_BLOCKS + 4 + NAME_MAX;

struct MetaEntry {
    used: bool,
    kind: u8,
    size: u32,
    blocks: [i32; DIRECT_BLOCKS],
    parent: i32,
    name: [u8; NAME_MAX],
}

impl MetaEntry {
    fn encode(&self, out: &mut [u8]) {
        out[0] = self.used as u8;
        out[1] = self.kind;
        out[2..4].copy_from_slice(&0u16.to_le_bytes());
        out[4..8].copy_from_slice(&self.size.to_le_bytes());
        let mut off = 8;
        for b in self.blocks {
            out[off..off + 4].copy_from_slice(&b.to_le_bytes());
            off += 4;
        }
        out[off..off + 4].copy_from_slice(&self.parent.to_le_bytes());
        off += 4;
        out[off..off + NAME_MAX].copy_from_slice(&self.name);
    }

    fn decode(buf: &[u8]) -> Self {
        let used = buf[0] != 0;
        let kind = buf[1];
        let size = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let mut blocks = [-1i32; DIRECT_BLOCKS];
        let mut off = 8;
        for b in blocks.iter_mut() {
            *b = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            off += 4;
        }
        let parent = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let mut name = [0u8; NAME_MAX];
        name.copy_from_slice(&buf[off..off + NAME_MAX]);
        Self {
            used,
            kind,
            size,
            blocks,
            parent,
            name,
        }
    }

    fn name_str(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_MAX);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

impl Fs {
    /// Depth-first walk of the dentry tree into a flat `meta_entry_t`
    /// list, written starting at block 1 (block 0 holds the header), with
    /// entries never straddling a block boundary.
    pub fn meta_save(&mut self) -> FsResult<()> {
        let mut entries: Vec<MetaEntry> = Vec::new();
        let root = self.root();
        let mut cur = self.dentry(root).child;
        while let Some(c) = cur {
            self.save_dentry_recursive(c, -1, &mut entries);
            cur = self.dentry(c).sibling;
        }

        let block_size = self.device.block_size();

        self.device.reserve(META_BLK_HEADER)?;
        let entry_bytes = entries.len() * ENTRY_SIZE;
        let entry_blocks = ceil_division(entry_bytes, block_size);
        for b in 0..entry_blocks {
            self.device.reserve(META_BLK_ENTRIES_START + b)?;
        }

        let mut header = vec![0u8; block_size];
        header[0..4].copy_from_slice(&META_MAGIC.to_le_bytes());
        header[4..8].copy_from_slice(&META_VER.to_le_bytes());
        header[8..12].copy_from_slice(&(entries.len() as u32).to_le_bytes());
        self.device.write(META_BLK_HEADER, &header)?;

        let mut blkno = META_BLK_ENTRIES_START;
        let mut offset = 0;
        let mut buf = vec![0u8; block_size];
        for entry in &entries {
            if offset + ENTRY_SIZE > block_size {
                self.device.write(blkno, &buf)?;
                blkno += 1;
                offset = 0;
                buf = vec![0u8; block_size];
            }
            entry.encode(&mut buf[offset..offset + ENTRY_SIZE]);
            offset += ENTRY_SIZE;
        }
        if !entries.is_empty() {
            self.device.write(blkno, &buf)?;
        }
        Ok(())
    }

    fn save_dentry_recursive(&self, d: DentryId, parent_idx: i32, entries: &mut Vec<MetaEntry>) {
        if entries.len() >= META_MAX_ENTRIES {
            log::warn!("meta_save: entry count exceeds META_MAX_ENTRIES, truncating tree");
            return;
        }
        let dentry = self.dentry(d);
        let inode = self.inode(dentry.inode);
        let my_idx = entries.len() as i32;

        let mut name = [0u8; NAME_MAX];
        let bytes = dentry.name.as_bytes();
        let n = bytes.len().min(NAME_MAX - 1);
        name[..n].copy_from_slice(&bytes[..n]);

        entries.push(MetaEntry {
            used: true,
            kind: if inode.is_dir() { 2 } else { 1 },
            size: inode.size,
            blocks: inode.blocks,
            parent: parent_idx,
            name,
        });

        let mut cur = dentry.child;
        while let Some(c) = cur {
            self.save_dentry_recursive(c, my_idx, entries);
            cur = self.dentry(c).sibling;
        }
    }

    /// Loads a previously-saved tree. A missing or mismatched magic/version
    /// is treated as "no metadata yet" (an empty filesystem), not an
    /// error. This format doesn't persist mode/uid/gid, so reloaded
    /// inodes default to owner `0:0`, mode `0755`/`0644`.
    pub fn meta_load(&mut self) -> FsResult<()> {
        let block_size = self.device.block_size();
        let mut header = vec![0u8; block_size];
        self.device.read(META_BLK_HEADER, &mut header)?;
        let magic = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let ver = u32::from_le_bytes(header[4..8].try_into().unwrap());
        if magic != META_MAGIC || ver != META_VER {
            return Ok(());
        }
        let entry_count =
            (u32::from_le_bytes(header[8..12].try_into().unwrap()) as usize).min(META_MAX_ENTRIES);

        self.device.reserve(META_BLK_HEADER)?;
        let entry_bytes = entry_count * ENTRY_SIZE;
        let entry_blocks = ceil_division(entry_bytes, block_size);
        for b in 0..entry_blocks {
            self.device.reserve(META_BLK_ENTRIES_START + b)?;
        }
        if entry_count == 0 {
            return Ok(());
        }

        let mut entries = Vec::with_capacity(entry_count);
        let mut blkno = META_BLK_ENTRIES_START;
        let mut offset = 0;
        let mut buf = vec![0u8; block_size];
        self.device.read(blkno, &mut buf)?;
        for _ in 0..entry_count {
            if offset + ENTRY_SIZE > block_size {
                blkno += 1;
                offset = 0;
                self.device.read(blkno, &mut buf)?;
            }
            entries.push(MetaEntry::decode(&buf[offset..offset + ENTRY_SIZE]));
            offset += ENTRY_SIZE;
        }

        // Pass 1: materialize inode + dentry for every used entry, but
        // don't link into the tree yet (a child might be read before its
        // parent).
        let mut dentry_ids: Vec<Option<DentryId>> = vec![None; entry_count];
        for (i, e) in entries.iter().enumerate() {
            if !e.used {
                continue;
            }
            let kind = if e.kind == 2 {
                InodeType::Dir
            } else {
                InodeType::File
            };
            let mode = if kind == InodeType::Dir {
                IFDIR | 0o755
            } else {
                IFREG | 0o644
            };
            let ino_num = self.next_ino();
            let inode = Inode {
                ino: ino_num,
                kind,
                mode,
                uid: 0,
                gid: 0,
                nlink: 1,
                size: e.size,
                mtime: now(),
                blocks: e.blocks,
            };
            for &b in e.blocks.iter() {
                if b >= 0 {
                    self.device.reserve(b as usize)?;
                }
            }
            let inode_id = self.alloc_inode(inode);
            let dentry = Dentry {
                name: e.name_str(),
                parent: self.root(),
                inode: inode_id,
                child: None,
                sibling: None,
            };
            dentry_ids[i] = Some(self.alloc_dentry(dentry));
        }

        // Pass 2: link each entry under its recorded parent, falling back
        // to root for `-1` or a broken/out-of-range parent index.
        for (i, e) in entries.iter().enumerate() {
            if !e.used {
                continue;
            }
            let Some(id) = dentry_ids[i] else {
                continue;
            };
            let parent_id = if e.parent < 0 {
                self.root()
            } else {
                let p = e.parent as usize;
                if p < entry_count {
                    dentry_ids[p].unwrap_or_else(|| self.root())
                } else {
                    self.root()
                }
            };
            self.add_child(parent_id, id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn save_then_load_rebuilds_tree_and_content() {
        let mut fs = Fs::new().unwrap();
        fs.mkdir("/a").unwrap();
        fs.mkdir("/a/b").unwrap();
        fs.create_file("/a/f").unwrap();
        fs.write_all("/a/f", b"hello").unwrap();
        fs.meta_save().unwrap();

        let mut fs2 = Fs::new().unwrap();
        // load_image would normally populate the device before meta_load;
        // here we just hand the same device bytes across directly.
        fs2.device = std::mem::replace(&mut fs.device, crate::block::BlockDevice::new());
        fs2.meta_load().unwrap();

        assert!(fs2.resolve("/a").is_ok());
        assert!(fs2.resolve("/a/b").is_ok());
        let mut buf = Vec::new();
        fs2.cat("/a/f", &mut buf).unwrap();
        assert_eq!(buf, b"hello");
    }

    #[test]
    fn load_on_fresh_image_is_a_noop() {
        let mut fs = Fs::new().unwrap();
        fs.meta_load().unwrap();
        assert!(fs.ls().is_empty());
    }

    #[test]
    fn broken_parent_index_falls_back_to_root() {
        let mut fs = Fs::new().unwrap();
        let mut entries = Vec::new();
        let mut name = [0u8; NAME_MAX];
        name[..7].copy_from_slice(b"orphan2");
        entries.push(MetaEntry {
            used: true,
            kind: 2,
            size: 0,
            blocks: [-1; DIRECT_BLOCKS],
            parent: 99, // out of range
            name,
        });

        let block_size = fs.device.block_size();
        let mut header = vec![0u8; block_size];
        header[0..4].copy_from_slice(&META_MAGIC.to_le_bytes());
        header[4..8].copy_from_slice(&META_VER.to_le_bytes());
        header[8..12].copy_from_slice(&1u32.to_le_bytes());
        fs.device.write(META_BLK_HEADER, &header).unwrap();
        let mut buf = vec![0u8; block_size];
        entries[0].encode(&mut buf[0..ENTRY_SIZE]);
        fs.device.write(META_BLK_ENTRIES_START, &buf).unwrap();

        fs.meta_load().unwrap();
        assert!(fs.resolve("/orphan2").is_ok());
    }
}
