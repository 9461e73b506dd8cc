//! In-process virtual filesystem backed by a fixed-size RAM block device,
//! with Unix-like permissions and a persistent on-disk image.

pub mod block;
pub mod dentry;
pub mod dirops;
pub mod error;
pub mod fileops;
pub mod fs;
pub mod inode;
pub mod meta;
pub mod path;
pub mod perm;
pub mod resolver;
pub mod user;
pub mod util;

pub use dirops::{LongEntry, StatInfo};
pub use error::{FsError, FsResult};
pub use fs::{Fs, SudoGuard};
pub use inode::InodeType;
