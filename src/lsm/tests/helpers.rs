//! Shared helpers for LSM unit tests.

use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::Subscriber;

use crate::lsm::format::{Record, SeqNum, SstInfo};
use crate::lsm::level::SortedRun;
use crate::lsm::sst::{SSTable, SstBuilder};

pub fn init_tracing() {
    let _ = Subscriber::builder()
        .with_max_level(Level::DEBUG)
        .try_init();
}

pub fn put(user_key: &[u8], seq: SeqNum, value: &[u8]) -> Record {
    Record::put(user_key.to_vec(), seq, value.to_vec())
}

pub fn del(user_key: &[u8], seq: SeqNum) -> Record {
    Record::tombstone(user_key.to_vec(), seq)
}

/// Builds an SSTable from internal-key-ordered records.
pub fn build_sst(
    dir: &Path,
    sst_id: u64,
    block_size: usize,
    records: &[Record],
) -> SstInfo {
    let path = dir.join(format!("{sst_id:06}.sst"));
    let mut builder = SstBuilder::new(path, sst_id, block_size, 10).unwrap();
    for record in records {
        builder.append(record.key.clone(), &record.value).unwrap();
    }
    builder.finish().unwrap()
}

/// Builds and opens a single-run SSTable set.
pub fn build_run(
    dir: &Path,
    first_id: u64,
    block_size: usize,
    groups: &[&[Record]],
) -> Arc<SortedRun> {
    let mut ssts = Vec::new();
    for (i, records) in groups.iter().enumerate() {
        let info = build_sst(dir, first_id + i as u64, block_size, records);
        ssts.push(Arc::new(SSTable::open(info).unwrap()));
    }
    Arc::new(SortedRun::new(ssts))
}
