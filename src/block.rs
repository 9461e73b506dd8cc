use std::fs::File;
use std::io::{Read, Write};
use std::ops::Range;
use std::path::Path;

use crate::error::{FsError, FsResult};

pub const BLOCK_SIZE: usize = 512;
pub const BLOCK_COUNT: usize = 1024;

const IMG_MAGIC: u32 = 0x5646_5331; // 'VFS1'
const IMG_HEADER_LEN: usize = 16;

/// A fixed-size RAM-backed block device with a bitmap allocator.
///
/// `alloc`/`free`/`reserve` never touch anything but the bitmap and the
/// block's own bytes; callers (the inode/meta layers) are responsible for
/// keeping block indices consistent with whatever references them.
pub struct BlockDevice {
    block_size: usize,
    block_count: usize,
    bitmap: Vec<u8>,
    data: Vec<u8>,
}

impl BlockDevice {
    pub fn new() -> Self {
        Self::with_geometry(BLOCK_SIZE, BLOCK_COUNT)
    }

    pub fn with_geometry(block_size: usize, block_count: usize) -> Self {
        Self {
            block_size,
            block_count,
            bitmap: vec![0; block_count],
            data: vec![0; block_size * block_count],
        }
    }

    /// Zeroes the bitmap and all block contents.
    pub fn init(&mut self) {
        self.bitmap.iter_mut().for_each(|b| *b = 0);
        self.data.iter_mut().for_each(|b| *b = 0);
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    fn range(&self, index: usize) -> Range<usize> {
        index * self.block_size..(index + 1) * self.block_size
    }

    fn check_index(&self, index: usize) -> FsResult<()> {
        if index >= self.block_count {
            return Err(FsError::Invalid(format!(
                "block index {index} out of range (0..{})",
                self.block_count
            )));
        }
        Ok(())
    }

    /// First-fit allocation of a free block; the returned block is zeroed.
    pub fn alloc(&mut self) -> FsResult<usize> {
        let index = self
            .bitmap
            .iter()
            .position(|&b| b == 0)
            .ok_or(FsError::NoSpace)?;
        self.bitmap[index] = 1;
        let r = self.range(index);
        self.data[r].fill(0);
        Ok(index)
    }

    /// Marks `index` free and zeroes its contents. Out-of-range or
    /// already-free indices are ignored, matching the allocator's
    /// "can't double-free what isn't tracked" behavior.
    pub fn free(&mut self, index: usize) {
        if index >= self.block_count || self.bitmap[index] == 0 {
            return;
        }
        self.bitmap[index] = 0;
        let r = self.range(index);
        self.data[r].fill(0);
    }

    /// Marks `index` used without touching its contents, for the
    /// persistence layer reserving blocks it is about to overwrite or has
    /// just reloaded data into.
    pub fn reserve(&mut self, index: usize) -> FsResult<()> {
        self.check_index(index)?;
        self.bitmap[index] = 1;
        Ok(())
    }

    pub fn read(&self, index: usize, buf: &mut [u8]) -> FsResult<()> {
        self.check_index(index)?;
        let r = self.range(index);
        buf[..self.block_size].copy_from_slice(&self.data[r]);
        Ok(())
    }

    pub fn write(&mut self, index: usize, buf: &[u8]) -> FsResult<()> {
        self.check_index(index)?;
        let r = self.range(index);
        self.data[r].copy_from_slice(&buf[..self.block_size]);
        Ok(())
    }

    pub fn total_blocks(&self) -> usize {
        self.block_count
    }

    pub fn used_blocks(&self) -> usize {
        self.bitmap.iter().filter(|&&b| b != 0).count()
    }

    pub fn free_blocks(&self) -> usize {
        self.total_blocks() - self.used_blocks()
    }

    pub fn total_size(&self) -> usize {
        self.block_count * self.block_size
    }

    pub fn used_size(&self) -> usize {
        self.used_blocks() * self.block_size
    }

    pub fn free_size(&self) -> usize {
        self.free_blocks() * self.block_size
    }

    /// Writes the image header (`VFS1` magic, geometry) followed by the
    /// bitmap and the raw block data.
    pub fn save_image<P: AsRef<Path>>(&self, path: P) -> FsResult<()> {
        let mut f = File::create(path)?;
        f.write_all(&IMG_MAGIC.to_le_bytes())?;
        f.write_all(&(self.block_size as u32).to_le_bytes())?;
        f.write_all(&(self.block_count as u32).to_le_bytes())?;
        f.write_all(&0u32.to_le_bytes())?;
        f.write_all(&self.bitmap)?;
        f.write_all(&self.data)?;
        Ok(())
    }

    /// Loads an image previously written by `save_image`. The geometry
    /// must match exactly; there is no support for resizing on load.
    pub fn load_image<P: AsRef<Path>>(&mut self, path: P) -> FsResult<()> {
        let mut f = File::open(path)?;
        let mut header = [0u8; IMG_HEADER_LEN];
        f.read_exact(&mut header)?;
        let magic = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let block_size = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
        let block_count = u32::from_le_bytes(header[8..12].try_into().unwrap()) as usize;
        if magic != IMG_MAGIC {
            return Err(FsError::BadImage("bad magic".into()));
        }
        if block_size != self.block_size || block_count != self.block_count {
            return Err(FsError::BadImage(format!(
                "geometry mismatch: image is {block_count}x{block_size}, expected {}x{}",
                self.block_count, self.block_size
            )));
        }
        let mut bitmap = vec![0u8; block_count];
        f.read_exact(&mut bitmap)?;
        let mut data = vec![0u8; block_count * block_size];
        f.read_exact(&mut data)?;
        self.bitmap = bitmap;
        self.data = data;
        Ok(())
    }
}

impl Default for BlockDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn alloc_marks_used_and_zeroes() {
        let mut dev = BlockDevice::new();
        let b = dev.alloc().unwrap();
        dev.write(b, &[7u8; BLOCK_SIZE]).unwrap();
        assert_eq!(dev.used_blocks(), 1);
        dev.free(b);
        assert_eq!(dev.used_blocks(), 0);
        let mut buf = vec![0u8; BLOCK_SIZE];
        // re-alloc: first-fit should hand back the same (now-zeroed) block
        let b2 = dev.alloc().unwrap();
        dev.read(b2, &mut buf).unwrap();
        assert!(buf.iter().all(|&x| x == 0));
    }

    #[test]
    fn alloc_exhausts_and_reports_no_space() {
        let mut dev = BlockDevice::with_geometry(BLOCK_SIZE, 4);
        for _ in 0..4 {
            dev.alloc().unwrap();
        }
        assert!(matches!(dev.alloc(), Err(FsError::NoSpace)));
    }

    #[test]
    fn reserve_sets_bitmap_without_zeroing() {
        let mut dev = BlockDevice::new();
        let b = dev.alloc().unwrap();
        dev.write(b, &[9u8; BLOCK_SIZE]).unwrap();
        dev.free(b);
        dev.reserve(b).unwrap();
        let mut buf = vec![0u8; BLOCK_SIZE];
        dev.read(b, &mut buf).unwrap();
        assert!(buf.iter().all(|&x| x == 0), "free() already zeroed it");
        assert_eq!(dev.used_blocks(), 1);
    }

    #[test]
    fn save_and_load_image_round_trips() {
        let dir = std::env::temp_dir().join(format!("rvfs-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("disk.img");

        let mut dev = BlockDevice::new();
        let b = dev.alloc().unwrap();
        let mut payload = vec![0u8; BLOCK_SIZE];
        payload[..5].copy_from_slice(b"hello");
        dev.write(b, &payload).unwrap();
        dev.save_image(&path).unwrap();

        let mut reloaded = BlockDevice::new();
        reloaded.load_image(&path).unwrap();
        assert_eq!(reloaded.used_blocks(), 1);
        let mut buf = vec![0u8; BLOCK_SIZE];
        reloaded.read(b, &mut buf).unwrap();
        assert_eq!(&buf[..5], b"hello");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_image_rejects_geometry_mismatch() {
        let dir = std::env::temp_dir().join(format!("rvfs-test-geo-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("disk.img");

        let small = BlockDevice::with_geometry(BLOCK_SIZE, 4);
        small.save_image(&path).unwrap();

        let mut dev = BlockDevice::new();
        assert!(matches!(dev.load_image(&path), Err(FsError::BadImage(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
