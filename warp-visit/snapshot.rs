use smallvec::SmallVec;

/// Clones a children slice at the moment of entry so a pass can insert or remove siblings
/// while the snapshot is iterated without disturbing the iteration itself. New chunks a pass
/// inserts mid-traversal are simply not part of this snapshot and are not visited in the same
/// pass; chunks the snapshot still names but that were removed are skipped by the caller (see
/// `warp_visit::visitor`, which re-checks existence before visiting each entry).
#[must_use]
pub fn snapshot<T: Copy>(children: &[T]) -> SmallVec<[T; 8]> {
   SmallVec::from_slice(children)
}
