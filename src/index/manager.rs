//! Index manager: owner of the live segment set.
//!
//! The current [`SegmentSet`] is held in an [`ArcSwap`]. Queries load it
//! without taking any lock; every mutation builds a new set under a short
//! [`parking_lot::Mutex`] and swaps it in, so concurrent register, retire
//! and delete operations never lose each other's updates.
//!
//! Segments removed from the set are retired: their files are deleted once
//! the last snapshot referencing them is dropped.

use std::fmt;
use std::sync::Arc;

use ahash::AHashSet;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::document::DocId;
use crate::error::{LexisError, Result};
use crate::index::manifest::{MANIFEST_FILE, Manifest};
use crate::index::segment_set::{LiveSegment, SegmentSet, Snapshot};
use crate::merge::merger::{MergeResult, MergeStats, SegmentMerger};
use crate::merge::policy::{MergeCandidate, MergePolicy};
use crate::segment::format::DELETION_EXTENSION;
use crate::segment::types::DeletionRef;
use crate::segment::{
    DeletionBitmap, Segment, SegmentId, SegmentMeta, deletion_file_name, parse_segment_file_name,
    segment_file_name,
};
use crate::storage::{Storage, is_temp_file};

/// Upper bound on policy merges run back to back.
const MAX_MERGES_PER_RUN: usize = 64;

#[derive(Debug)]
struct ManagerState {
    generation: u64,
    next_segment_id: SegmentId,
    quarantined: Vec<SegmentMeta>,
}

/// Owns the segment set and its lifecycle.
pub struct IndexManager {
    storage: Arc<dyn Storage>,
    current: ArcSwap<SegmentSet>,
    state: Mutex<ManagerState>,
    merge_lock: Mutex<()>,
}

impl fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set = self.current.load();
        f.debug_struct("IndexManager")
            .field("version", &set.version())
            .field("segments", &set.len())
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl IndexManager {
    /// Start an empty index in `storage`.
    pub fn create(storage: Arc<dyn Storage>) -> Result<Self> {
        if Manifest::exists(&storage) {
            return Err(LexisError::index("an index already exists in this storage"));
        }
        let manifest = Manifest {
            generation: 1,
            next_segment_id: 1,
            ..Default::default()
        };
        manifest.write(&storage)?;
        info!("created empty index");

        Ok(IndexManager {
            storage,
            current: ArcSwap::from_pointee(SegmentSet::default()),
            state: Mutex::new(ManagerState {
                generation: manifest.generation,
                next_segment_id: manifest.next_segment_id,
                quarantined: Vec::new(),
            }),
            merge_lock: Mutex::new(()),
        })
    }

    /// Load the segment set recorded in the manifest.
    ///
    /// Segments that fail validation are quarantined: they are left on disk,
    /// excluded from every snapshot and reported by
    /// [`corrupt_segments`](Self::corrupt_segments).
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        let manifest = Manifest::read(&storage)?;

        let mut live = Vec::with_capacity(manifest.segments.len());
        let mut quarantined = manifest.quarantined.clone();
        for meta in &manifest.segments {
            match open_segment(&storage, meta) {
                Ok(entry) => live.push(entry),
                Err(err) if err.is_corruption() || err.is_not_found() => {
                    warn!(segment = meta.id, error = %err, "excluding corrupt segment");
                    quarantined.push(meta.clone());
                }
                Err(err) => return Err(err),
            }
        }

        let newly_quarantined = quarantined.len() != manifest.quarantined.len();
        let excluded = quarantined.iter().map(|m| m.id).collect();
        let manager = IndexManager {
            storage,
            current: ArcSwap::from_pointee(SegmentSet::new(1, live, excluded)),
            state: Mutex::new(ManagerState {
                generation: manifest.generation,
                next_segment_id: manifest.next_segment_id,
                quarantined,
            }),
            merge_lock: Mutex::new(()),
        };

        if newly_quarantined {
            let mut state = manager.state.lock();
            let current = manager.current.load_full();
            manager.commit(&mut state, &current, current.segments().to_vec())?;
        }
        manager.remove_orphans()?;

        let set = manager.current.load();
        info!(
            segments = set.len(),
            docs = set.live_doc_count(),
            quarantined = set.excluded().len(),
            "opened index"
        );
        drop(set);
        Ok(manager)
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// A consistent view of the current segment set.
    pub fn current_snapshot(&self) -> Snapshot {
        Snapshot::new(self.current.load_full())
    }

    /// Reserve an id for a new segment.
    pub fn allocate_segment_id(&self) -> SegmentId {
        let mut state = self.state.lock();
        let id = state.next_segment_id;
        state.next_segment_id += 1;
        id
    }

    /// Segments excluded because they failed validation.
    pub fn corrupt_segments(&self) -> Vec<SegmentId> {
        self.state.lock().quarantined.iter().map(|m| m.id).collect()
    }

    /// Generation of the last manifest written.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Append a newly flushed segment to the set.
    pub fn register_segment(&self, segment: Arc<Segment>) -> Result<()> {
        self.register_segment_replacing(segment, &[])
    }

    /// Append a newly flushed segment and, in the same set version,
    /// tombstone the published copies of the `superseded` documents it
    /// replaces. No snapshot sees both copies, or neither.
    pub fn register_segment_replacing(
        &self,
        segment: Arc<Segment>,
        superseded: &[DocId],
    ) -> Result<()> {
        let mut state = self.state.lock();
        let current = self.current.load_full();
        if current.get(segment.id()).is_some() {
            return Err(LexisError::index(format!(
                "segment {} is already registered",
                segment.id()
            )));
        }

        let mut segments = current.segments().to_vec();
        let replaced = match tombstone(&mut segments, superseded) {
            Ok(replaced) => replaced,
            Err(err) => {
                segment.retire();
                return Err(err);
            }
        };
        segments.push(LiveSegment::new(Arc::clone(&segment)));
        if let Err(err) = self.commit(&mut state, &current, segments) {
            segment.retire();
            return Err(err);
        }
        info!(
            segment = segment.id(),
            docs = segment.doc_count(),
            bytes = segment.size_bytes(),
            replaced,
            "registered segment"
        );
        Ok(())
    }

    /// Remove segments from the set. Their files are reclaimed once no
    /// snapshot references them.
    pub fn retire_segments(&self, ids: &[SegmentId]) -> Result<()> {
        let mut state = self.state.lock();
        let current = self.current.load_full();
        let (removed, kept): (Vec<LiveSegment>, Vec<LiveSegment>) = current
            .segments()
            .iter()
            .cloned()
            .partition(|s| ids.contains(&s.id()));
        if removed.is_empty() {
            return Ok(());
        }

        self.commit(&mut state, &current, kept)?;
        for entry in &removed {
            entry.segment.retire();
        }
        info!(segments = ?ids, "retired segments");
        Ok(())
    }

    /// Atomically put the output of a merge in place of its inputs.
    ///
    /// Deletions made while the merge was running are carried over to the
    /// merged segment.
    pub fn replace_segments(&self, result: &MergeResult) -> Result<()> {
        let outcome = self.try_replace(result);
        if outcome.is_err() {
            if let Some(segment) = &result.segment {
                segment.retire();
            }
        }
        outcome
    }

    fn try_replace(&self, result: &MergeResult) -> Result<()> {
        let mut state = self.state.lock();
        let current = self.current.load_full();

        let ids: Vec<SegmentId> = result.remaps.iter().map(|r| r.segment).collect();
        let first = find_run(&current, &ids).ok_or_else(|| {
            LexisError::index("merge inputs are no longer a contiguous run of the segment set")
        })?;
        let inputs = &current.segments()[first..first + ids.len()];

        let mut merged = result.segment.as_ref().map(|s| LiveSegment::new(Arc::clone(s)));
        let mut carried = 0;
        if let Some(entry) = merged.as_mut() {
            let mut bitmap: Option<DeletionBitmap> = None;
            for (live, remap) in inputs.iter().zip(&result.remaps) {
                if Arc::ptr_eq(&live.deletions, &remap.deletions) {
                    continue;
                }
                for local in live.deletions.deleted_docs() {
                    if remap.deletions.is_deleted(local) {
                        continue;
                    }
                    if let Some(new) = remap.get(local) {
                        bitmap
                            .get_or_insert_with(|| (*entry.deletions).clone())
                            .delete(new)?;
                        carried += 1;
                    }
                }
            }
            if let Some(bitmap) = bitmap {
                entry.deletions = Arc::new(bitmap);
                entry.dirty = true;
            }
        }

        let mut segments = Vec::with_capacity(current.len() + 1 - ids.len());
        segments.extend_from_slice(&current.segments()[..first]);
        segments.extend(merged);
        segments.extend_from_slice(&current.segments()[first + ids.len()..]);
        self.commit(&mut state, &current, segments)?;

        for entry in inputs {
            entry.segment.retire();
        }
        info!(
            inputs = ?ids,
            merged = result.segment.as_ref().map(|s| s.id()),
            carried_deletions = carried,
            "replaced merged segments"
        );
        Ok(())
    }

    /// Tombstone every live copy of the given documents.
    ///
    /// The new deletions are visible to every snapshot taken after this
    /// returns; they are made durable by the next [`persist`](Self::persist)
    /// or set change. Returns the number of documents deleted.
    pub fn delete_documents(&self, doc_ids: &[DocId]) -> Result<usize> {
        let _state = self.state.lock();
        let current = self.current.load_full();

        let mut segments = current.segments().to_vec();
        let deleted = tombstone(&mut segments, doc_ids)?;
        if deleted > 0 {
            self.current.store(Arc::new(SegmentSet::new(
                current.version() + 1,
                segments,
                current.excluded().to_vec(),
            )));
            debug!(deleted, "deleted documents");
        }
        Ok(deleted)
    }

    /// Write pending deletion sidecars and the manifest.
    pub fn persist(&self) -> Result<()> {
        let mut state = self.state.lock();
        let current = self.current.load_full();
        if current.segments().iter().any(|s| s.dirty) {
            self.commit(&mut state, &current, current.segments().to_vec())?;
        }
        Ok(())
    }

    /// Run the merges proposed by `policy` until it proposes none.
    ///
    /// Returns the number of merges performed.
    pub fn run_merges(&self, merger: &SegmentMerger, policy: &dyn MergePolicy) -> Result<usize> {
        let mut performed = 0;
        for _ in 0..MAX_MERGES_PER_RUN {
            let infos: Vec<_> = self
                .current
                .load()
                .segments()
                .iter()
                .map(LiveSegment::merge_info)
                .collect();
            let Some(candidate) = policy.find_merges(&infos).into_iter().next() else {
                break;
            };
            match self.merge(merger, &candidate)? {
                Some(_) => performed += 1,
                None => break,
            }
        }
        Ok(performed)
    }

    /// Merge every segment into one.
    pub fn force_merge(&self, merger: &SegmentMerger) -> Result<Option<MergeStats>> {
        let infos: Vec<_> = self
            .current
            .load()
            .segments()
            .iter()
            .map(LiveSegment::merge_info)
            .collect();
        match MergeCandidate::forced(&infos) {
            Some(candidate) => self.merge(merger, &candidate),
            None => Ok(None),
        }
    }

    /// Merge one candidate. Returns `None` if the candidate no longer
    /// matches the segment set.
    pub fn merge(
        &self,
        merger: &SegmentMerger,
        candidate: &MergeCandidate,
    ) -> Result<Option<MergeStats>> {
        let _merging = self.merge_lock.lock();

        let current = self.current.load_full();
        let Some(first) = find_run(&current, &candidate.segments) else {
            debug!(segments = ?candidate.segments, "skipping stale merge candidate");
            return Ok(None);
        };
        let inputs = current.segments()[first..first + candidate.segments.len()].to_vec();
        drop(current);

        let new_id = self.allocate_segment_id();
        info!(
            segment = new_id,
            inputs = ?candidate.segments,
            reason = ?candidate.reason,
            "merging segments"
        );
        let result = merger.merge(&inputs, new_id)?;
        self.replace_segments(&result)?;
        Ok(Some(result.stats))
    }

    /// Publish `segments` as the next set version after writing dirty
    /// sidecars and the manifest. Nothing is swapped if writing fails.
    fn commit(
        &self,
        state: &mut ManagerState,
        current: &SegmentSet,
        mut segments: Vec<LiveSegment>,
    ) -> Result<()> {
        let generation = state.generation + 1;

        let mut stale = Vec::new();
        let mut written: Vec<String> = Vec::new();
        for entry in segments.iter_mut().filter(|s| s.dirty) {
            let name = deletion_file_name(entry.id(), generation);
            if let Err(err) = entry.deletions.write_sidecar(&self.storage, &name, entry.id()) {
                for name in &written {
                    let _ = self.storage.delete_file(name);
                }
                return Err(err);
            }
            written.push(name);
            if let Some(old) = &entry.persisted {
                stale.push(deletion_file_name(entry.id(), old.generation));
            }
            entry.persisted = Some(DeletionRef {
                generation,
                deleted_count: entry.deletions.deleted_count(),
            });
            entry.dirty = false;
        }

        let manifest = Manifest {
            generation,
            next_segment_id: state.next_segment_id,
            segments: segments.iter().map(LiveSegment::meta).collect(),
            quarantined: state.quarantined.clone(),
        };
        if let Err(err) = manifest.write(&self.storage) {
            for name in &written {
                let _ = self.storage.delete_file(name);
            }
            return Err(err);
        }
        state.generation = generation;

        // Sidecars of segments leaving the set are no longer referenced.
        for entry in current.segments() {
            if let Some(old) = &entry.persisted {
                if !segments.iter().any(|s| s.id() == entry.id()) {
                    stale.push(deletion_file_name(entry.id(), old.generation));
                }
            }
        }

        let excluded = state.quarantined.iter().map(|m| m.id).collect();
        self.current.store(Arc::new(SegmentSet::new(
            current.version() + 1,
            segments,
            excluded,
        )));

        for name in stale {
            if let Err(err) = self.storage.delete_file(&name) {
                warn!(file = %name, error = %err, "failed to delete stale sidecar");
            }
        }
        Ok(())
    }

    /// Delete temp files and segment files the manifest does not reference.
    fn remove_orphans(&self) -> Result<()> {
        let state = self.state.lock();
        let current = self.current.load();

        let mut referenced = AHashSet::new();
        referenced.insert(MANIFEST_FILE.to_string());
        for meta in current
            .segments()
            .iter()
            .map(LiveSegment::meta)
            .chain(state.quarantined.iter().cloned())
        {
            referenced.insert(segment_file_name(meta.id));
            if let Some(del) = &meta.deletions {
                referenced.insert(deletion_file_name(meta.id, del.generation));
            }
        }

        let deletion_suffix = format!(".{DELETION_EXTENSION}");
        for name in self.storage.list_files()? {
            let orphan = is_temp_file(&name)
                || ((parse_segment_file_name(&name).is_some()
                    || (name.starts_with("seg_") && name.ends_with(&deletion_suffix)))
                    && !referenced.contains(&name));
            if orphan {
                debug!(file = %name, "removing orphan file");
                self.storage.delete_file(&name)?;
            }
        }
        Ok(())
    }
}

/// Position of `ids` as a contiguous run of `set`.
fn find_run(set: &SegmentSet, ids: &[SegmentId]) -> Option<usize> {
    let first = set.position(*ids.first()?)?;
    let run = set.segments().get(first..first + ids.len())?;
    run.iter()
        .zip(ids)
        .all(|(entry, &id)| entry.id() == id)
        .then_some(first)
}

fn open_segment(storage: &Arc<dyn Storage>, meta: &SegmentMeta) -> Result<LiveSegment> {
    let segment = Segment::open(Arc::clone(storage), meta.id)?;
    let file_name = segment_file_name(meta.id);
    if segment.doc_count() != meta.doc_count {
        return Err(LexisError::corruption(
            file_name,
            format!(
                "holds {} documents, manifest says {}",
                segment.doc_count(),
                meta.doc_count
            ),
        ));
    }

    let mut entry = LiveSegment::new(segment);
    if let Some(del) = &meta.deletions {
        let name = deletion_file_name(meta.id, del.generation);
        let bitmap = DeletionBitmap::read_sidecar(storage, &name, meta.id).map_err(|err| {
            if err.is_not_found() {
                LexisError::corruption(&file_name, format!("deletion sidecar {name} is missing"))
            } else {
                err
            }
        })?;
        if bitmap.doc_count() != meta.doc_count || bitmap.deleted_count() != del.deleted_count {
            return Err(LexisError::corruption(
                &name,
                "sidecar does not match the manifest",
            ));
        }
        entry.deletions = Arc::new(bitmap);
        entry.persisted = Some(del.clone());
    }
    Ok(entry)
}

/// Tombstone the live copies of `doc_ids`, copying the bitmaps it touches.
fn tombstone(segments: &mut [LiveSegment], doc_ids: &[DocId]) -> Result<usize> {
    let mut deleted = 0;
    for entry in segments.iter_mut() {
        let mut bitmap: Option<DeletionBitmap> = None;
        for &doc_id in doc_ids {
            for local in entry.segment.lookup(doc_id) {
                if entry.is_deleted(local) {
                    continue;
                }
                let copy = bitmap.get_or_insert_with(|| (*entry.deletions).clone());
                if copy.delete(local)? {
                    deleted += 1;
                }
            }
        }
        if let Some(bitmap) = bitmap {
            entry.deletions = Arc::new(bitmap);
            entry.dirty = true;
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::PerFieldAnalyzer;
    use crate::config::{FieldConfig, IndexConfig};
    use crate::document::Document;
    use crate::merge::policy::{MergePolicyConfig, TieredMergePolicy};
    use crate::segment::SegmentBuilder;
    use crate::segment::format::write_segment;
    use crate::storage::memory::MemoryStorage;
    use crate::util::retry::RetryConfig;

    fn storage() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new_default())
    }

    fn flush(manager: &IndexManager, docs: &[(u64, &str)]) -> SegmentId {
        let config = IndexConfig::with_fields(vec![FieldConfig::text("body")]);
        let mut builder = SegmentBuilder::new(Arc::new(PerFieldAnalyzer::new(&config).unwrap()));
        for &(id, text) in docs {
            builder
                .add_document(&Document::builder(id).add_text("body", text).build())
                .unwrap();
        }
        let id = manager.allocate_segment_id();
        write_segment(manager.storage(), &builder.build_parts(id).unwrap().unwrap()).unwrap();
        manager
            .register_segment(Segment::open(Arc::clone(manager.storage()), id).unwrap())
            .unwrap();
        id
    }

    fn ids(snapshot: &Snapshot) -> Vec<SegmentId> {
        snapshot.segments().iter().map(LiveSegment::id).collect()
    }

    #[test]
    fn test_register_and_snapshot() {
        let manager = IndexManager::create(storage()).unwrap();
        let empty = manager.current_snapshot();

        let a = flush(&manager, &[(1, "a")]);
        let b = flush(&manager, &[(2, "b"), (3, "c")]);

        let snapshot = manager.current_snapshot();
        assert_eq!(ids(&snapshot), vec![a, b]);
        assert_eq!(snapshot.global_doc(1, 1), 2);
        assert_eq!(snapshot.live_doc_count(), 3);
        assert!(empty.segments().is_empty());
        assert!(IndexManager::create(Arc::clone(manager.storage())).is_err());
    }

    #[test]
    fn test_retired_file_outlives_snapshot() {
        let manager = IndexManager::create(storage()).unwrap();
        let a = flush(&manager, &[(1, "a")]);

        let snapshot = manager.current_snapshot();
        manager.retire_segments(&[a]).unwrap();
        assert!(manager.current_snapshot().segments().is_empty());
        assert!(manager.storage().file_exists(&segment_file_name(a)));

        drop(snapshot);
        assert!(!manager.storage().file_exists(&segment_file_name(a)));
    }

    #[test]
    fn test_delete_is_copy_on_write() {
        let manager = IndexManager::create(storage()).unwrap();
        flush(&manager, &[(1, "a"), (2, "b")]);

        let before = manager.current_snapshot();
        assert_eq!(manager.delete_documents(&[2, 99]).unwrap(), 1);
        assert_eq!(manager.delete_documents(&[2]).unwrap(), 0);

        assert!(before.contains(2));
        let after = manager.current_snapshot();
        assert!(!after.contains(2));
        assert!(after.contains(1));
        assert_eq!(after.live_doc_count(), 1);
    }

    #[test]
    fn test_reopen_restores_set_and_deletions() {
        let storage = storage();
        let (a, b) = {
            let manager = IndexManager::create(Arc::clone(&storage)).unwrap();
            let a = flush(&manager, &[(1, "a"), (2, "b")]);
            let b = flush(&manager, &[(3, "c")]);
            manager.delete_documents(&[1]).unwrap();
            manager.persist().unwrap();
            (a, b)
        };

        let manager = IndexManager::open(storage).unwrap();
        let snapshot = manager.current_snapshot();
        assert_eq!(ids(&snapshot), vec![a, b]);
        assert!(!snapshot.contains(1));
        assert!(snapshot.contains(2));
        assert!(manager.allocate_segment_id() > b);
    }

    #[test]
    fn test_failed_persist_keeps_deletions_pending() {
        let memory = Arc::new(MemoryStorage::new_default());
        let storage: Arc<dyn Storage> = memory.clone();
        let manager = IndexManager::create(Arc::clone(&storage)).unwrap();
        flush(&manager, &[(1, "a"), (2, "b")]);
        flush(&manager, &[(3, "c")]);
        manager.delete_documents(&[1, 3]).unwrap();

        memory.fail_next_closes(1);
        assert!(manager.persist().is_err());
        let sidecars = |storage: &Arc<dyn Storage>| {
            storage
                .list_files()
                .unwrap()
                .into_iter()
                .filter(|name| name.ends_with(DELETION_EXTENSION))
                .count()
        };
        assert_eq!(sidecars(&storage), 0);
        assert!(manager.current_snapshot().segments().iter().all(|s| s.dirty));

        manager.persist().unwrap();
        assert_eq!(sidecars(&storage), 2);
        drop(manager);

        let reopened = IndexManager::open(storage).unwrap();
        let snapshot = reopened.current_snapshot();
        assert!(!snapshot.contains(1));
        assert!(snapshot.contains(2));
        assert!(!snapshot.contains(3));
    }

    #[test]
    fn test_corrupt_segment_is_quarantined() {
        let memory = Arc::new(MemoryStorage::new_default());
        let storage: Arc<dyn Storage> = memory.clone();
        let (a, b) = {
            let manager = IndexManager::create(Arc::clone(&storage)).unwrap();
            (flush(&manager, &[(1, "a")]), flush(&manager, &[(2, "b")]))
        };

        let name = segment_file_name(a);
        let mut bytes = storage.read_all(&name).unwrap().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        memory.put_file(&name, bytes);

        let manager = IndexManager::open(Arc::clone(&storage)).unwrap();
        let snapshot = manager.current_snapshot();
        assert_eq!(ids(&snapshot), vec![b]);
        assert!(snapshot.is_partial());
        assert_eq!(manager.corrupt_segments(), vec![a]);
        assert!(storage.file_exists(&name));

        drop(manager);
        let reopened = IndexManager::open(storage).unwrap();
        assert_eq!(reopened.corrupt_segments(), vec![a]);
    }

    #[test]
    fn test_open_removes_orphans() {
        let memory = Arc::new(MemoryStorage::new_default());
        let storage: Arc<dyn Storage> = memory.clone();
        IndexManager::create(Arc::clone(&storage)).unwrap();
        memory.put_file("seg_00000000000000ff.lxs", vec![1, 2, 3]);
        memory.put_file("seg_00000000000000ff.lxs.1.tmp", vec![1]);
        memory.put_file("index.json", b"{}".to_vec());

        IndexManager::open(Arc::clone(&storage)).unwrap();
        assert_eq!(
            storage.list_files().unwrap(),
            vec![MANIFEST_FILE.to_string(), "index.json".to_string()]
        );
    }

    #[test]
    fn test_merge_carries_concurrent_deletions() {
        let manager = IndexManager::create(storage()).unwrap();
        flush(&manager, &[(1, "x"), (2, "x")]);
        flush(&manager, &[(3, "x")]);

        let inputs = manager.current_snapshot().segments().to_vec();
        let merger = SegmentMerger::new(Arc::clone(manager.storage()), RetryConfig::no_retry());
        let result = merger.merge(&inputs, manager.allocate_segment_id()).unwrap();

        // A deletion lands between the merge and its publication.
        manager.delete_documents(&[2]).unwrap();
        manager.replace_segments(&result).unwrap();

        let snapshot = manager.current_snapshot();
        assert_eq!(snapshot.segments().len(), 1);
        assert!(!snapshot.contains(2));
        assert!(snapshot.contains(1));
        assert!(snapshot.contains(3));
        assert!(!snapshot.segments()[0].dirty);
    }

    #[test]
    fn test_run_merges_with_policy() {
        let manager = IndexManager::create(storage()).unwrap();
        for i in 0..5 {
            flush(&manager, &[(i, "word")]);
        }
        let policy = TieredMergePolicy::new(MergePolicyConfig {
            max_small_segments: 2,
            max_merge_width: 3,
            ..Default::default()
        });
        let merger = SegmentMerger::new(Arc::clone(manager.storage()), RetryConfig::no_retry());
        let merged = manager.run_merges(&merger, &policy).unwrap();
        assert_eq!(merged, 2);

        let snapshot = manager.current_snapshot();
        assert_eq!(snapshot.live_doc_count(), 5);
        for i in 0..5 {
            assert!(snapshot.contains(i));
        }

        assert_eq!(snapshot.segments().len(), 1);
        assert!(manager.force_merge(&merger).unwrap().is_none());
    }
}
