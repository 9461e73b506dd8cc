use std::ops::{Deref, DerefMut};

use crate::block::BlockDevice;
use crate::dentry::{Dentry, DentryArena, DentryId, ROOT_DENTRY};
use crate::error::FsResult;
use crate::inode::{Inode, InodeArena, InodeId};
use crate::perm;
use crate::resolver;
use crate::user::{self, User};
use crate::util::now;

/// The filesystem: block device, the two arenas backing the dentry/inode
/// tree, and the current identity/cwd context. There is exactly one of
/// these per process; all operations are single-threaded and synchronous.
pub struct Fs {
    pub device: BlockDevice,
    dentries: DentryArena,
    inodes: InodeArena,
    next_ino: u64,
    cwd: DentryId,
    uid: u32,
    gid: u32,
    users: Vec<User>,
}

impl Fs {
    /// Fresh filesystem: empty root directory, identity `uid=1000, gid=1000`.
    pub fn new() -> FsResult<Self> {
        let mut device = BlockDevice::new();
        device.init();

        let mut inodes = InodeArena::default();
        let mut dentries = DentryArena::default();

        let root_inode = Inode::new_dir(0, 0, 0, now());
        let root_inode_id = inodes.alloc(root_inode);
        let root_dentry = Dentry {
            name: "/".into(),
            parent: ROOT_DENTRY,
            inode: root_inode_id,
            child: None,
            sibling: None,
        };
        let root_dentry_id = dentries.alloc(root_dentry);
        debug_assert_eq!(root_dentry_id, ROOT_DENTRY);

        Ok(Self {
            device,
            dentries,
            inodes,
            next_ino: 1,
            cwd: ROOT_DENTRY,
            uid: 1000,
            gid: 1000,
            users: user::default_users()?,
        })
    }

    pub fn root(&self) -> DentryId {
        ROOT_DENTRY
    }

    pub fn cwd(&self) -> DentryId {
        self.cwd
    }

    pub(crate) fn set_cwd(&mut self, id: DentryId) {
        self.cwd = id;
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    pub fn set_uid(&mut self, uid: u32) {
        self.uid = uid;
    }

    pub fn set_gid(&mut self, gid: u32) {
        self.gid = gid;
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn authenticate(&self, name: &str, password: &str) -> bool {
        user::authenticate(&self.users, name, password)
    }

    /// Switches to `name`'s identity after a successful password check.
    pub fn switch_user(&mut self, name: &str, password: &str) -> FsResult<()> {
        if !self.authenticate(name, password) {
            return Err(crate::error::FsError::PermDenied(
                "authentication failed".into(),
            ));
        }
        let u = user::find(&self.users, name).expect("authenticate just matched this name");
        self.uid = u.uid;
        self.gid = u.gid;
        Ok(())
    }

    /// Elevates to `uid=0, gid=0` for the returned guard's lifetime,
    /// restoring the previous identity when it drops — a structural
    /// guarantee that the elevation never outlives one command.
    pub fn sudo(&mut self) -> SudoGuard<'_> {
        let old_uid = self.uid;
        let old_gid = self.gid;
        self.uid = 0;
        self.gid = 0;
        SudoGuard {
            fs: self,
            old_uid,
            old_gid,
        }
    }

    pub fn resolve(&self, path: &str) -> FsResult<DentryId> {
        resolver::resolve(self, path)
    }

    pub(crate) fn dentry(&self, id: DentryId) -> &Dentry {
        self.dentries.get(id)
    }

    pub(crate) fn dentry_mut(&mut self, id: DentryId) -> &mut Dentry {
        self.dentries.get_mut(id)
    }

    pub(crate) fn inode(&self, id: InodeId) -> &Inode {
        self.inodes.get(id)
    }

    pub(crate) fn inode_mut(&mut self, id: InodeId) -> &mut Inode {
        self.inodes.get_mut(id)
    }

    pub(crate) fn inode_of(&self, dentry: DentryId) -> &Inode {
        self.inode(self.dentry(dentry).inode)
    }

    pub(crate) fn find_child(&self, parent: DentryId, name: &str) -> Option<DentryId> {
        self.dentries.find_child(parent, name)
    }

    pub(crate) fn add_child(&mut self, parent: DentryId, child: DentryId) -> FsResult<()> {
        self.dentries.add_child(parent, child)
    }

    pub(crate) fn remove_child(&mut self, parent: DentryId, child: DentryId) -> FsResult<()> {
        self.dentries.remove_child(parent, child)
    }

    pub(crate) fn alloc_inode(&mut self, inode: Inode) -> InodeId {
        self.inodes.alloc(inode)
    }

    pub(crate) fn alloc_dentry(&mut self, d: Dentry) -> DentryId {
        self.dentries.alloc(d)
    }

    pub(crate) fn dispose_inode(&mut self, id: InodeId) {
        self.inodes.dispose(id);
    }

    pub(crate) fn dispose_dentry(&mut self, id: DentryId) {
        self.dentries.dispose(id);
    }

    pub(crate) fn next_ino(&mut self) -> u64 {
        let v = self.next_ino;
        self.next_ino += 1;
        v
    }

    pub(crate) fn perm_check(&self, inode: &Inode, need: u8) -> bool {
        perm::check(inode, self.uid, self.gid, need)
    }

    /// Splits a path into its resolved parent directory and leaf name,
    /// the common first step of `mkdir`/`touch`/`import`: split on the
    /// last `/`, resolve everything before it, keep everything after it
    /// as the new name.
    pub(crate) fn resolve_parent_and_leaf(&self, path: &str) -> FsResult<(DentryId, String)> {
        let norm = crate::path::normalize(path);
        if norm.is_empty() || norm == "/" {
            return Err(crate::error::FsError::Invalid(format!(
                "'{path}': not a valid file name"
            )));
        }
        match norm.rfind('/') {
            None => Ok((self.cwd(), norm)),
            Some(0) => Ok((self.root(), norm[1..].to_string())),
            Some(idx) => {
                let dir_part = &norm[..idx];
                let leaf = norm[idx + 1..].to_string();
                let parent = self.resolve(dir_part)?;
                Ok((parent, leaf))
            }
        }
    }
}

pub struct SudoGuard<'a> {
    fs: &'a mut Fs,
    old_uid: u32,
    old_gid: u32,
}

impl<'a> Drop for SudoGuard<'a> {
    fn drop(&mut self) {
        self.fs.uid = self.old_uid;
        self.fs.gid = self.old_gid;
    }
}

impl<'a> Deref for SudoGuard<'a> {
    type Target = Fs;
    fn deref(&self) -> &Fs {
        self.fs
    }
}

impl<'a> DerefMut for SudoGuard<'a> {
    fn deref_mut(&mut self) -> &mut Fs {
        self.fs
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn new_fs_starts_as_non_root_user_at_root_cwd() {
        let fs = Fs::new().unwrap();
        assert_eq!(fs.uid(), 1000);
        assert_eq!(fs.gid(), 1000);
        assert_eq!(fs.cwd(), fs.root());
    }

    #[test]
    fn sudo_guard_restores_identity_on_drop() {
        let mut fs = Fs::new().unwrap();
        {
            let guard = fs.sudo();
            assert_eq!(guard.uid(), 0);
            assert_eq!(guard.gid(), 0);
        }
        assert_eq!(fs.uid(), 1000);
        assert_eq!(fs.gid(), 1000);
    }

    #[test]
    fn switch_user_requires_correct_password() {
        let mut fs = Fs::new().unwrap();
        assert!(fs.switch_user("root", "wrong").is_err());
        assert_eq!(fs.uid(), 1000);
        fs.switch_user("root", "root").unwrap();
        assert_eq!(fs.uid(), 0);
        assert_eq!(fs.gid(), 0);
    }
}
