#[cfg(test)]
mod tests {
    use crate::lsm::block::{BlockBuilder, BlockIterator};
    use crate::lsm::format::RecordType;

    fn append(builder: &mut BlockBuilder, key: &[u8], seq: u64, value: &[u8]) -> bool {
        builder.append(key, seq, RecordType::Value, value)
    }

    #[test]
    fn iterate_in_insertion_order() {
        let mut builder = BlockBuilder::new(4096);
        assert!(append(&mut builder, b"a", 3, b"v1"));
        assert!(append(&mut builder, b"b", 2, b"v2"));
        assert!(append(&mut builder, b"c", 1, b"v3"));

        let count = builder.count();
        let block = builder.finish();
        let mut iter = BlockIterator::new(&block, count);

        let mut seen = Vec::new();
        while iter.valid() {
            let rec = iter.current().unwrap();
            seen.push((rec.user_key.to_vec(), rec.seq, rec.value.to_vec()));
            iter.next();
        }
        assert_eq!(
            seen,
            vec![
                (b"a".to_vec(), 3, b"v1".to_vec()),
                (b"b".to_vec(), 2, b"v2".to_vec()),
                (b"c".to_vec(), 1, b"v3".to_vec()),
            ]
        );
    }

    #[test]
    fn fullness_counts_offset_slot() {
        // One record: 4 (ksize) + 1 (key) + 8 (seq) + 1 (type) + 4 (vsize)
        // + 1 (value) = 19 bytes, plus a 4-byte offset slot = 23.
        let mut builder = BlockBuilder::new(46);
        assert!(append(&mut builder, b"a", 1, b"x"));
        assert!(append(&mut builder, b"b", 1, b"y"));
        assert!(!append(&mut builder, b"c", 1, b"z"));
        assert_eq!(builder.count(), 2);
        assert_eq!(builder.size(), 46);
    }

    #[test]
    fn first_record_always_accepted() {
        let mut builder = BlockBuilder::new(8);
        assert!(append(&mut builder, b"oversized-key", 1, b"oversized-value"));
        assert!(!append(&mut builder, b"b", 1, b"y"));
    }

    #[test]
    fn seek_lands_on_first_at_or_past_target() {
        // Internal order within one key is newest-first.
        let mut builder = BlockBuilder::new(4096);
        assert!(append(&mut builder, b"a", 5, b"v5"));
        assert!(append(&mut builder, b"a", 3, b"v3"));
        assert!(append(&mut builder, b"b", 9, b"w9"));

        let count = builder.count();
        let block = builder.finish();

        let mut iter = BlockIterator::new(&block, count);
        iter.seek(b"a", 4);
        let rec = iter.current().unwrap();
        assert_eq!((rec.user_key, rec.seq), (b"a".as_slice(), 3));

        let mut iter = BlockIterator::new(&block, count);
        iter.seek(b"a", 9);
        let rec = iter.current().unwrap();
        assert_eq!((rec.user_key, rec.seq), (b"a".as_slice(), 5));

        let mut iter = BlockIterator::new(&block, count);
        iter.seek(b"b", 1);
        assert!(!iter.valid());
    }

    #[test]
    fn valid_is_false_past_the_offset_array() {
        let mut builder = BlockBuilder::new(4096);
        assert!(append(&mut builder, b"k", 1, b"v"));
        let count = builder.count();
        let block = builder.finish();

        let mut iter = BlockIterator::new(&block, count);
        assert!(iter.valid());
        iter.next();
        assert!(!iter.valid());
        assert!(iter.current().is_none());
    }

    #[test]
    fn tombstones_round_trip() {
        let mut builder = BlockBuilder::new(4096);
        assert!(builder.append(b"k", 7, RecordType::Deletion, b""));
        let count = builder.count();
        let block = builder.finish();

        let mut iter = BlockIterator::new(&block, count);
        let rec = iter.current().unwrap();
        assert_eq!(rec.ty, RecordType::Deletion);
        assert!(rec.value.is_empty());
    }
}
