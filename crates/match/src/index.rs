use rustc_hash::FxHashMap;

use signature::FileSignature;

/// Two-level lookup from weak checksums to candidate blocks.
///
/// The first level buckets on the low 16 bits of the weak checksum; the
/// second level is the bucket's block indices in ascending order, so a
/// collision always resolves to the earliest block. Full weak equality and
/// the strong digest are confirmed by the scan, not here.
#[derive(Debug)]
pub struct DeltaSignatureIndex {
    buckets: FxHashMap<u16, Vec<u32>>,
}

impl DeltaSignatureIndex {
    /// Builds the index for a block set; `None` for the empty set.
    #[must_use]
    pub fn from_signature(signature: &FileSignature) -> Option<Self> {
        if signature.is_empty() {
            return None;
        }
        let mut buckets: FxHashMap<u16, Vec<u32>> = FxHashMap::default();
        for block in signature.blocks() {
            buckets
                .entry((block.weak & 0xffff) as u16)
                .or_default()
                .push(block.index);
        }
        // Entries are inserted in file order, so each bucket is already
        // sorted; assert the invariant the matcher relies on.
        debug_assert!(
            buckets
                .values()
                .all(|indices| indices.is_sorted()),
            "bucket indices must be ascending for earliest-match wins"
        );
        Some(Self { buckets })
    }

    /// Candidate block indices for a weak checksum, earliest first.
    #[must_use]
    pub fn candidates(&self, weak: u32) -> &[u32] {
        self.buckets
            .get(&((weak & 0xffff) as u16))
            .map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_signature_has_no_index() {
        assert!(DeltaSignatureIndex::from_signature(&FileSignature::empty()).is_none());
    }

    #[test]
    fn candidates_come_back_in_block_order() {
        // Two blocks of identical content share a weak checksum and land in
        // the same bucket.
        let data = [vec![9u8; 700], vec![9u8; 700]].concat();
        let signature = FileSignature::from_bytes(&data, 1);
        let index = DeltaSignatureIndex::from_signature(&signature).expect("non-empty");

        let weak = signature.blocks()[0].weak;
        assert_eq!(index.candidates(weak), &[0, 1]);
    }

    #[test]
    fn unknown_checksum_yields_no_candidates() {
        let signature = FileSignature::from_bytes(b"some basis bytes", 1);
        let index = DeltaSignatureIndex::from_signature(&signature).expect("non-empty");
        let absent = signature.blocks()[0].weak ^ 0xffff_ffff;
        assert!(index.candidates(absent).is_empty());
    }
}
