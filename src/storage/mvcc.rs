//! Multi-version visibility primitives.
//!
//! Every record in the store is a chain of immutable versions. A version
//! carries a creation stamp and, once superseded or deleted, an expiry
//! stamp. Stamps record the writing transaction, the command counter at
//! write time, and the commit id assigned when that transaction committed.

use crate::storage::StorageError;

/// Monotonic identifier assigned to every transaction at begin.
pub type TransactionId = u64;
/// Per-transaction command counter; advanced explicitly between pipeline
/// segments so earlier writes become readable.
pub type CommandId = u64;
/// Monotonic identifier assigned to every transaction at commit.
pub type CommitId = u64;

/// Origin of a write: who wrote it, when within the transaction, and
/// whether that transaction has committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    pub tx: TransactionId,
    pub command: CommandId,
    /// `None` while the writing transaction is live.
    pub commit: Option<CommitId>,
}

impl Stamp {
    pub fn new(tx: TransactionId, command: CommandId) -> Self {
        Self {
            tx,
            command,
            commit: None,
        }
    }
}

/// A transaction's view of the store: its own id, the current command
/// counter, and the newest commit visible at begin.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    pub tx: TransactionId,
    pub command: CommandId,
    pub last_commit: CommitId,
}

/// Own-transaction writes at the current command are readable for update
/// lookups but hidden from reads until the command counter advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Read,
    Update,
}

impl Stamp {
    /// Whether a write with this stamp is visible under `snap`.
    pub fn visible(&self, snap: &Snapshot, vis: Visibility) -> bool {
        if self.tx == snap.tx {
            match vis {
                Visibility::Read => self.command < snap.command,
                Visibility::Update => self.command <= snap.command,
            }
        } else {
            matches!(self.commit, Some(commit) if commit <= snap.last_commit)
        }
    }
}

/// One immutable version of a record.
#[derive(Debug, Clone)]
pub struct Version<T> {
    pub created: Stamp,
    pub expired: Option<Stamp>,
    pub data: T,
}

impl<T> Version<T> {
    fn visible(&self, snap: &Snapshot, vis: Visibility) -> bool {
        if !self.created.visible(snap, vis) {
            return false;
        }
        match &self.expired {
            Some(stamp) => !stamp.visible(snap, vis),
            None => true,
        }
    }
}

/// Version chain for a single record, newest version last.
#[derive(Debug, Clone, Default)]
pub struct Chain<T> {
    versions: Vec<Version<T>>,
}

impl<T: Clone> Chain<T> {
    pub fn starting_with(data: T, stamp: Stamp) -> Self {
        Self {
            versions: vec![Version {
                created: stamp,
                expired: None,
                data,
            }],
        }
    }

    /// The newest version visible under `snap`, if any.
    pub fn visible(&self, snap: &Snapshot, vis: Visibility) -> Option<&Version<T>> {
        self.versions.iter().rev().find(|v| v.visible(snap, vis))
    }

    pub fn is_visible(&self, snap: &Snapshot, vis: Visibility) -> bool {
        self.visible(snap, vis).is_some()
    }

    /// First-updater-wins conflict check: refuses to touch a record whose
    /// newest version was written by a live foreign transaction or by one
    /// that committed after our snapshot.
    pub fn check_update(&self, snap: &Snapshot) -> Result<(), StorageError> {
        let Some(newest) = self.versions.last() else {
            return Ok(());
        };
        for stamp in std::iter::once(&newest.created).chain(newest.expired.iter()) {
            if stamp.tx == snap.tx {
                continue;
            }
            match stamp.commit {
                None => {
                    return Err(StorageError::Conflict(format!(
                        "record is being written by transaction {}",
                        stamp.tx
                    )))
                }
                Some(commit) if commit > snap.last_commit => {
                    return Err(StorageError::Conflict(format!(
                        "record was changed by a transaction committed at {commit}"
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Expires the current version and appends a new one with `data`.
    pub fn push_update(&mut self, data: T, snap: &Snapshot) -> Result<(), StorageError> {
        self.check_update(snap)?;
        let stamp = Stamp::new(snap.tx, snap.command);
        match self
            .versions
            .iter_mut()
            .rev()
            .find(|v| v.visible(snap, Visibility::Update))
        {
            Some(version) => version.expired = Some(stamp.clone()),
            None => return Err(StorageError::RecordGone("record")),
        }
        self.versions.push(Version {
            created: stamp,
            expired: None,
            data,
        });
        Ok(())
    }

    /// Expires the current version without a replacement (logical delete).
    pub fn expire(&mut self, snap: &Snapshot) -> Result<(), StorageError> {
        self.check_update(snap)?;
        match self
            .versions
            .iter_mut()
            .rev()
            .find(|v| v.visible(snap, Visibility::Update))
        {
            Some(version) => {
                version.expired = Some(Stamp::new(snap.tx, snap.command));
                Ok(())
            }
            None => Err(StorageError::RecordGone("record")),
        }
    }

    /// Stamps the commit id into every stamp this transaction left behind.
    pub fn seal(&mut self, tx: TransactionId, commit: CommitId) {
        for version in &mut self.versions {
            if version.created.tx == tx && version.created.commit.is_none() {
                version.created.commit = Some(commit);
            }
            if let Some(expired) = &mut version.expired {
                if expired.tx == tx && expired.commit.is_none() {
                    expired.commit = Some(commit);
                }
            }
        }
    }

    /// Reverts every change this transaction made; returns `true` when the
    /// chain is left empty and should be dropped.
    pub fn unseal(&mut self, tx: TransactionId) -> bool {
        self.versions
            .retain(|v| !(v.created.tx == tx && v.created.commit.is_none()));
        for version in &mut self.versions {
            let undo = matches!(&version.expired, Some(s) if s.tx == tx && s.commit.is_none());
            if undo {
                version.expired = None;
            }
        }
        self.versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(tx: TransactionId, command: CommandId, last_commit: CommitId) -> Snapshot {
        Snapshot {
            tx,
            command,
            last_commit,
        }
    }

    #[test]
    fn own_writes_hidden_until_command_advances() {
        let chain = Chain::starting_with(1u32, Stamp::new(7, 1));
        assert!(!chain.is_visible(&snap(7, 1, 0), Visibility::Read));
        assert!(chain.is_visible(&snap(7, 1, 0), Visibility::Update));
        assert!(chain.is_visible(&snap(7, 2, 0), Visibility::Read));
    }

    #[test]
    fn foreign_writes_visible_only_after_commit_within_snapshot() {
        let mut chain = Chain::starting_with(1u32, Stamp::new(7, 1));
        assert!(!chain.is_visible(&snap(8, 1, 0), Visibility::Read));
        chain.seal(7, 5);
        assert!(chain.is_visible(&snap(8, 1, 5), Visibility::Read));
        assert!(!chain.is_visible(&snap(8, 1, 4), Visibility::Read));
    }

    #[test]
    fn update_conflicts_with_live_foreign_writer() {
        let chain = Chain::starting_with(1u32, Stamp::new(7, 1));
        let err = chain.check_update(&snap(8, 1, 0)).unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[test]
    fn update_conflicts_with_commit_after_snapshot() {
        let mut chain = Chain::starting_with(1u32, Stamp::new(7, 1));
        chain.seal(7, 9);
        assert!(chain.check_update(&snap(8, 1, 4)).is_err());
        assert!(chain.check_update(&snap(8, 1, 9)).is_ok());
    }

    #[test]
    fn unseal_reverts_expiry_and_drops_own_versions() {
        let mut chain = Chain::starting_with(1u32, Stamp::new(7, 1));
        chain.seal(7, 2);
        let writer = snap(9, 1, 2);
        chain.push_update(2u32, &writer).unwrap();
        assert_eq!(chain.visible(&snap(9, 2, 2), Visibility::Read).unwrap().data, 2);
        assert!(!chain.unseal(9));
        let reader = snap(10, 1, 2);
        assert_eq!(chain.visible(&reader, Visibility::Read).unwrap().data, 1);
    }

    #[test]
    fn unseal_drops_fully_owned_chain() {
        let mut chain = Chain::starting_with(1u32, Stamp::new(7, 1));
        assert!(chain.unseal(7));
    }
}
