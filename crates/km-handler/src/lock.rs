//! Lock list, lowered to an arena with small integer indices in place
//! of the reference implementation's pointer-linked list, per
//! `spec.md` §9's recommendation.

use km_wire::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Shared,
    Exclusive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    pub handle: Handle,
    pub access: AccessMode,
    pub parent: Handle,
    /// Set when the next `EXAMINE_NEXT` on this lock must rewind the
    /// directory iterator first (set by `EXAMINE_OBJECT`, cleared
    /// after the first `EXAMINE_NEXT`).
    pub rewind_pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockId(pub usize);

#[derive(Debug, Default)]
pub struct LockTable {
    slots: Vec<Option<Lock>>,
    free: Vec<usize>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, lock: Lock) -> LockId {
        if let Some(index) = self.free.pop() {
            self.slots[index] = Some(lock);
            LockId(index)
        } else {
            self.slots.push(Some(lock));
            LockId(self.slots.len() - 1)
        }
    }

    /// Arbitrates against every existing lock on `lock.handle`, the way
    /// the reference `CreateLock` scans the volume's lock list: an
    /// exclusive request conflicts with any existing lock on the same
    /// handle, a shared request only with an existing exclusive one.
    /// Returns the lock back on conflict so the caller can close the
    /// handle it was about to hold.
    pub fn insert_checked(&mut self, lock: Lock) -> Result<LockId, Lock> {
        let conflict = self.iter().any(|(_, existing)| {
            existing.handle == lock.handle
                && (lock.access == AccessMode::Exclusive || existing.access == AccessMode::Exclusive)
        });
        if conflict {
            Err(lock)
        } else {
            Ok(self.insert(lock))
        }
    }

    pub fn get(&self, id: LockId) -> Option<&Lock> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: LockId) -> Option<&mut Lock> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Remove a lock, returning it if it was present. The caller is
    /// responsible for closing the underlying remote handle.
    pub fn remove(&mut self, id: LockId) -> Option<Lock> {
        let slot = self.slots.get_mut(id.0)?;
        let lock = slot.take()?;
        self.free.push(id.0);
        Some(lock)
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every live lock, for teardown sweeps (`VOLMGR` closing a
    /// volume walks this in one pass per `spec.md` §9).
    pub fn iter(&self) -> impl Iterator<Item = (LockId, &Lock)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|lock| (LockId(i), lock)))
    }
}
