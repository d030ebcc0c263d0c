//! Duplicate detection over the full record set.
//!
//! Records sharing an identity key (`normalized name|normalized address`) form a group.
//! Within a group the earliest record by input order is retained; every later member is
//! flagged as a duplicate. This is a positional policy, not a quality judgment: group
//! membership does not depend on record order, but which member is "first" does.
//!
//! The index is built by a single writer ([`DuplicateIndexBuilder`]) and frozen with
//! [`DuplicateIndexBuilder::finish`]. Rule evaluation only accepts a frozen
//! [`DuplicateIndex`], so no record can be judged before membership is final.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::domain::RecordId;
use crate::pipeline::processing::normalize::NormalizedRecord;

pub type GroupId = usize;

/// Records sharing one identity key, in input order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub id: GroupId,
    /// `None` for singleton groups of records that have no identity key
    pub key: Option<String>,
    pub members: Vec<RecordId>,
}

impl DuplicateGroup {
    /// The retained (non-duplicate) member
    pub fn retained(&self) -> Option<&RecordId> {
        self.members.first()
    }
}

/// Group membership of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub group: GroupId,
    pub is_duplicate: bool,
}

/// Single-writer, streaming builder of the duplicate index
#[derive(Debug, Default)]
pub struct DuplicateIndexBuilder {
    enabled: bool,
    key_to_group: HashMap<String, GroupId>,
    groups: Vec<DuplicateGroup>,
    memberships: Vec<Membership>,
}

impl DuplicateIndexBuilder {
    /// With `enabled = false` every record becomes its own group and nothing is flagged
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    /// Observe the next record in input order and return its (provisional) membership
    pub fn observe(&mut self, record: &NormalizedRecord) -> Membership {
        let key = if self.enabled { record.identity_key() } else { None };

        let membership = match key {
            Some(key) => match self.key_to_group.get(&key) {
                Some(&group) => {
                    self.groups[group].members.push(record.id.clone());
                    Membership { group, is_duplicate: true }
                }
                None => {
                    let group = self.new_group(Some(key.clone()), record);
                    self.key_to_group.insert(key, group);
                    Membership { group, is_duplicate: false }
                }
            },
            None => Membership {
                group: self.new_group(None, record),
                is_duplicate: false,
            },
        };

        self.memberships.push(membership);
        membership
    }

    fn new_group(&mut self, key: Option<String>, record: &NormalizedRecord) -> GroupId {
        let id = self.groups.len();
        self.groups.push(DuplicateGroup {
            id,
            key,
            members: vec![record.id.clone()],
        });
        id
    }

    /// Freeze the index. After this point membership is final and read-only.
    pub fn finish(self) -> DuplicateIndex {
        let duplicates = self.memberships.iter().filter(|m| m.is_duplicate).count();
        debug!(
            records = self.memberships.len(),
            groups = self.groups.len(),
            duplicates,
            "Duplicate index finalized"
        );
        DuplicateIndex {
            groups: self.groups,
            memberships: self.memberships,
        }
    }
}

/// Read-only duplicate index, addressed by input position
#[derive(Debug, Clone, Default)]
pub struct DuplicateIndex {
    groups: Vec<DuplicateGroup>,
    memberships: Vec<Membership>,
}

impl DuplicateIndex {
    /// Build the index over a complete, ordered record set
    pub fn build(records: &[NormalizedRecord], enabled: bool) -> Self {
        let mut builder = DuplicateIndexBuilder::new(enabled);
        for record in records {
            builder.observe(record);
        }
        builder.finish()
    }

    pub fn membership(&self, position: usize) -> Option<Membership> {
        self.memberships.get(position).copied()
    }

    pub fn is_duplicate(&self, position: usize) -> bool {
        self.membership(position).is_some_and(|m| m.is_duplicate)
    }

    pub fn group(&self, id: GroupId) -> Option<&DuplicateGroup> {
        self.groups.get(id)
    }

    pub fn groups(&self) -> &[DuplicateGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.memberships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memberships.is_empty()
    }

    pub fn duplicate_count(&self) -> usize {
        self.memberships.iter().filter(|m| m.is_duplicate).count()
    }
}
