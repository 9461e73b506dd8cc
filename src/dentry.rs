use crate::error::{FsError, FsResult};
use crate::inode::InodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DentryId(pub u32);

/// The root is always the first dentry allocated; its own `parent` is
/// itself, so `..` at `/` is a no-op instead of a special case.
pub const ROOT_DENTRY: DentryId = DentryId(0);

#[derive(Clone, Debug)]
pub struct Dentry {
    pub name: String,
    pub parent: DentryId,
    pub inode: InodeId,
    pub child: Option<DentryId>,
    pub sibling: Option<DentryId>,
}

#[derive(Default)]
pub struct DentryArena {
    slots: Vec<Option<Dentry>>,
    free: Vec<u32>,
}

impl DentryArena {
    pub fn alloc(&mut self, d: Dentry) -> DentryId {
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(d);
            DentryId(idx)
        } else {
            self.slots.push(Some(d));
            DentryId((self.slots.len() - 1) as u32)
        }
    }

    pub fn get(&self, id: DentryId) -> &Dentry {
        self.slots[id.0 as usize]
            .as_ref()
            .expect("dangling DentryId")
    }

    pub fn get_mut(&mut self, id: DentryId) -> &mut Dentry {
        self.slots[id.0 as usize]
            .as_mut()
            .expect("dangling DentryId")
    }

    pub fn dispose(&mut self, id: DentryId) {
        self.slots[id.0 as usize] = None;
        self.free.push(id.0);
    }

    /// Links `child` as the new head of `parent`'s child list (LIFO order:
    /// the most recently added child lists first).
    pub fn add_child(&mut self, parent: DentryId, child: DentryId) -> FsResult<()> {
        let old_head = self.get(parent).child;
        {
            let c = self.get_mut(child);
            c.parent = parent;
            c.sibling = old_head;
        }
        self.get_mut(parent).child = Some(child);
        Ok(())
    }

    /// Unlinks `child` from `parent`'s sibling chain.
    pub fn remove_child(&mut self, parent: DentryId, child: DentryId) -> FsResult<()> {
        let mut cur = self.get(parent).child;
        let mut prev: Option<DentryId> = None;
        while let Some(c) = cur {
            if c == child {
                let next = self.get(c).sibling;
                match prev {
                    None => self.get_mut(parent).child = next,
                    Some(p) => self.get_mut(p).sibling = next,
                }
                return Ok(());
            }
            prev = Some(c);
            cur = self.get(c).sibling;
        }
        Err(FsError::NotFound(format!(
            "dentry {} is not a child of {}",
            child.0, parent.0
        )))
    }

    pub fn find_child(&self, parent: DentryId, name: &str) -> Option<DentryId> {
        let mut cur = self.get(parent).child;
        while let Some(c) = cur {
            if self.get(c).name == name {
                return Some(c);
            }
            cur = self.get(c).sibling;
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::inode::InodeId;

    fn leaf(name: &str, parent: DentryId) -> Dentry {
        Dentry {
            name: name.into(),
            parent,
            inode: InodeId(0),
            child: None,
            sibling: None,
        }
    }

    #[test]
    fn add_child_lists_lifo() {
        let mut arena = DentryArena::default();
        let root = arena.alloc(leaf("/", ROOT_DENTRY));
        let a = arena.alloc(leaf("a", root));
        let b = arena.alloc(leaf("b", root));
        arena.add_child(root, a).unwrap();
        arena.add_child(root, b).unwrap();

        let mut names = Vec::new();
        let mut cur = arena.get(root).child;
        while let Some(c) = cur {
            names.push(arena.get(c).name.clone());
            cur = arena.get(c).sibling;
        }
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn remove_child_unlinks_from_middle() {
        let mut arena = DentryArena::default();
        let root = arena.alloc(leaf("/", ROOT_DENTRY));
        let a = arena.alloc(leaf("a", root));
        let b = arena.alloc(leaf("b", root));
        let c = arena.alloc(leaf("c", root));
        arena.add_child(root, a).unwrap();
        arena.add_child(root, b).unwrap();
        arena.add_child(root, c).unwrap();

        arena.remove_child(root, b).unwrap();
        assert!(arena.find_child(root, "b").is_none());
        assert!(arena.find_child(root, "a").is_some());
        assert!(arena.find_child(root, "c").is_some());
    }

    #[test]
    fn remove_child_rejects_non_child() {
        let mut arena = DentryArena::default();
        let root = arena.alloc(leaf("/", ROOT_DENTRY));
        let a = arena.alloc(leaf("a", root));
        assert!(arena.remove_child(root, a).is_err());
    }
}
