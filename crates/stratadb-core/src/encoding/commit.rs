//! Binary encoding of commit records.
//!
//! Format: `[root_id 32][parent_count u8][parents 32 each][generation u64]
//! [timestamp u64]`. Parents are stored in semantic order (the base first);
//! the commit id itself hashes them sorted, see
//! [`Commit::from_content`](crate::types::Commit::from_content).

use crate::error::CoreError;
use crate::types::{Commit, CommitId, ObjectId};

/// Serialize a commit record for storage under `C/<id>`.
#[must_use]
pub fn encode_commit(commit: &Commit) -> Vec<u8> {
    let mut out = Vec::with_capacity(33 + commit.parents.len() * 32 + 16);
    out.extend_from_slice(commit.root_id.as_bytes());
    out.push(commit.parents.len() as u8);
    for parent in &commit.parents {
        out.extend_from_slice(parent.as_bytes());
    }
    out.extend_from_slice(&commit.generation.to_be_bytes());
    out.extend_from_slice(&commit.timestamp.to_be_bytes());
    out
}

/// Deserialize a commit record stored under the given id.
///
/// # Errors
///
/// Returns [`CoreError::Encoding`] if the bytes are truncated, the parent
/// count is out of range, or trailing bytes remain.
pub fn decode_commit(id: CommitId, bytes: &[u8]) -> Result<Commit, CoreError> {
    let take = |bytes: &mut &[u8], len: usize| -> Result<Vec<u8>, CoreError> {
        if bytes.len() < len {
            return Err(CoreError::Encoding("truncated commit record".into()));
        }
        let (head, tail) = bytes.split_at(len);
        *bytes = tail;
        Ok(head.to_vec())
    };

    let mut rest = bytes;
    let root_id = ObjectId::from_slice(&take(&mut rest, ObjectId::LEN)?)
        .ok_or_else(|| CoreError::Encoding("bad root id".into()))?;
    let parent_count = take(&mut rest, 1)?[0] as usize;
    if parent_count == 0 || parent_count > 2 {
        return Err(CoreError::Encoding(format!("bad parent count: {parent_count}")));
    }
    let mut parents = Vec::with_capacity(parent_count);
    for _ in 0..parent_count {
        let parent = ObjectId::from_slice(&take(&mut rest, ObjectId::LEN)?)
            .ok_or_else(|| CoreError::Encoding("bad parent id".into()))?;
        parents.push(CommitId::from_object_id(parent));
    }
    let generation = u64::from_be_bytes(take(&mut rest, 8)?.try_into().unwrap());
    let timestamp = u64::from_be_bytes(take(&mut rest, 8)?.try_into().unwrap());
    if !rest.is_empty() {
        return Err(CoreError::Encoding("trailing bytes after commit record".into()));
    }
    Ok(Commit { id, root_id, parents, generation, timestamp })
}
