//! Batched pipeline queue.
//!
//! An ordered, arena-backed linked list of contiguous height ranges, each a
//! three-track (headers / receipts / bodies) fetch state machine. The queue
//! dispenses at-most-once in-flight jobs per track, validates every delivery
//! against the hash chain and the roots the owning headers commit to, and
//! releases completed contiguous prefixes to the caller.
//!
//! A single mutex guards every operation, structural reads included. Hold
//! times are short and bounded; no I/O happens under the lock.

mod batch;

use batch::Batch;
pub use batch::{BodiesJob, CompletedBatch, HeadersJob, Job, ReceiptsJob, TrackState};

use crate::error::QueueError;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use stratus_common::types::{
    BlockBody, BlockHash, BlockHeader, BlockNumber, Receipt, validate_block_body,
    validate_receipts,
};
use tracing::trace;

/// Maximum number of blocks a single batch may span.
pub const MAX_BATCH: u64 = 100;

pub struct BatchQueue {
    inner: Mutex<QueueInner>,
}

struct QueueInner {
    /// Slab arena owning the batches. `prev`/`next` are slot indices, which
    /// keeps the doubly linked structure free of ownership cycles and makes
    /// the splice on split O(1).
    slots: Vec<Option<Batch>>,
    free: Vec<usize>,
    by_id: HashMap<u32, usize>,
    front: Option<usize>,
    back: Option<usize>,
    /// Hash of the tip already accepted into the local chain. Only mutated
    /// under the queue lock, when a completed prefix is released.
    head_hash: BlockHash,
    next_id: u32,
}

impl BatchQueue {
    /// Creates a queue whose first batch starts at `next_block`, on top of
    /// the local tip identified by `head_hash`.
    ///
    /// The initial insert sets `front` and `back` together; appends past the
    /// tail therefore always have a tail to link to.
    pub fn new(head_hash: BlockHash, next_block: BlockNumber) -> Self {
        let mut inner = QueueInner {
            slots: Vec::new(),
            free: Vec::new(),
            by_id: HashMap::new(),
            front: None,
            back: None,
            head_hash,
            next_id: 0,
        };
        let first = inner.new_batch(next_block);
        let slot = inner.alloc(first);
        inner.front = Some(slot);
        inner.back = Some(slot);
        Self {
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Hands out the next job, or `None` when no track is waiting.
    ///
    /// The scan walks the list from the front and picks the first batch with
    /// a waiting track. Tail batches and ranges wider than [`MAX_BATCH`] are
    /// split first, so every dispensed job covers a bounded height range.
    /// Within a batch the priority is headers, then receipts, then bodies.
    pub fn dequeue(&self) -> Option<Job> {
        let mut inner = self.lock();

        let mut cursor = inner.front;
        let mut eligible = None;
        while let Some(idx) = cursor {
            let batch = inner.batch(idx);
            if batch.has_waiting_track() {
                eligible = Some(idx);
                break;
            }
            cursor = batch.next;
        }
        let idx = eligible?;

        let needs_split = match inner.batch(idx).next {
            None => true,
            Some(next) => inner.batch(next).start - inner.batch(idx).start > MAX_BATCH,
        };
        if needs_split {
            inner.split_after(idx);
        }

        let len = inner.batch_len(idx);
        let batch = inner.batch_mut(idx);
        if batch.headers_state == TrackState::Waiting {
            batch.headers_state = TrackState::Pending;
            let offset = batch.headers.len() as u64;
            return Some(Job::Headers(HeadersJob {
                batch_id: batch.id,
                start: batch.start + offset,
                count: len - offset,
            }));
        }
        if batch.receipts_state == TrackState::Waiting {
            batch.receipts_state = TrackState::Pending;
            let offset = batch.receipts.len();
            return Some(Job::Receipts(ReceiptsJob {
                batch_id: batch.id,
                headers: batch.receipt_headers[offset..].to_vec(),
            }));
        }
        if batch.bodies_state == TrackState::Waiting {
            batch.bodies_state = TrackState::Pending;
            let offset = batch.bodies.len();
            return Some(Job::Bodies(BodiesJob {
                batch_id: batch.id,
                headers: batch.body_headers[offset..].to_vec(),
            }));
        }
        None
    }

    /// Accepts a header delivery for batch `id`.
    ///
    /// Validation is transactional: on error nothing is committed and the
    /// track keeps the state it had on entry. An empty delivery means the
    /// peer had nothing for us this round; the track goes back to `Waiting`
    /// so the job can be re-dispensed elsewhere.
    pub fn deliver_headers(
        &self,
        id: u32,
        headers: Vec<BlockHeader>,
    ) -> Result<(), QueueError> {
        let mut inner = self.lock();
        let slot = inner.slot_of(id)?;

        if inner.batch(slot).headers_state == TrackState::Completed {
            return Err(QueueError::AlreadyCompleted { id, track: "headers" });
        }
        if headers.is_empty() {
            inner.batch_mut(slot).headers_state = TrackState::Waiting;
            return Ok(());
        }

        let len = inner.batch_len(slot) as usize;
        let buffered = inner.batch(slot).headers.len();
        let room = len - buffered;
        if headers.len() > room {
            return Err(QueueError::TooManyItems {
                id,
                track: "headers",
                got: headers.len(),
                room,
            });
        }

        // Backward linkage: the first delivered header must chain on the last
        // buffered header, the previous batch's last header, or the queue
        // head when this is the first batch. A previous batch that has not
        // completed its headers yet defers the check to its own fill.
        let expected_parent: Option<BlockHash> = if buffered > 0 {
            inner.batch(slot).last_header().map(BlockHeader::hash)
        } else {
            match inner.batch(slot).prev {
                None => Some(inner.head_hash),
                Some(prev_idx) => {
                    let prev = inner.batch(prev_idx);
                    if prev.headers_state == TrackState::Completed {
                        prev.last_header().map(BlockHeader::hash)
                    } else {
                        None
                    }
                }
            }
        };
        let first = &headers[0];
        if let Some(expected) = expected_parent {
            if first.parent_hash != expected {
                return Err(QueueError::BadLinkage {
                    number: first.number,
                    expected,
                    got: first.parent_hash,
                });
            }
        }

        // The chunk itself must be internally chained.
        for pair in headers.windows(2) {
            let expected = pair[0].hash();
            if pair[1].parent_hash != expected {
                return Err(QueueError::BadLinkage {
                    number: pair[1].number,
                    expected,
                    got: pair[1].parent_hash,
                });
            }
        }

        let fills = headers.len() == room;
        if fills {
            // Forward linkage against an already-completed successor.
            if let Some(next_idx) = inner.batch(slot).next {
                let next = inner.batch(next_idx);
                if next.headers_state == TrackState::Completed {
                    if let (Some(next_first), Some(last)) =
                        (next.headers.first(), headers.last())
                    {
                        if next_first.parent_hash != last.hash() {
                            return Err(QueueError::BadLinkage {
                                number: next_first.number,
                                expected: last.hash(),
                                got: next_first.parent_hash,
                            });
                        }
                    }
                }
            }
        }

        let batch = inner.batch_mut(slot);
        batch.headers.extend(headers);
        if fills {
            batch.headers_state = TrackState::Completed;
            batch.body_headers = batch
                .headers
                .iter()
                .filter(|header| header.has_body())
                .cloned()
                .collect();
            batch.receipt_headers = batch
                .headers
                .iter()
                .filter(|header| header.has_receipts())
                .cloned()
                .collect();
            // Only payload-bearing batches get demoted back to fetchable.
            if !batch.body_headers.is_empty() {
                batch.bodies_state = TrackState::Waiting;
            }
            if !batch.receipt_headers.is_empty() {
                batch.receipts_state = TrackState::Waiting;
            }
            trace!(
                batch = batch.id,
                bodies = batch.body_headers.len(),
                receipts = batch.receipt_headers.len(),
                "headers track completed"
            );
        } else {
            batch.headers_state = TrackState::Waiting;
        }
        Ok(())
    }

    /// Accepts a body delivery for batch `id`. Each body is validated against
    /// the roots committed by the header owning its slot.
    pub fn deliver_bodies(&self, id: u32, bodies: Vec<BlockBody>) -> Result<(), QueueError> {
        let mut inner = self.lock();
        let slot = inner.slot_of(id)?;
        let batch = inner.batch_mut(slot);

        if batch.bodies_state == TrackState::Completed {
            return Err(QueueError::AlreadyCompleted { id, track: "bodies" });
        }
        if bodies.is_empty() {
            batch.bodies_state = TrackState::Waiting;
            return Ok(());
        }
        let room = batch.body_headers.len() - batch.bodies.len();
        if bodies.len() > room {
            return Err(QueueError::TooManyItems {
                id,
                track: "bodies",
                got: bodies.len(),
                room,
            });
        }
        for (i, body) in bodies.iter().enumerate() {
            let header = &batch.body_headers[batch.bodies.len() + i];
            validate_block_body(header, body).map_err(|source| QueueError::RootMismatch {
                id,
                number: header.number,
                source,
            })?;
        }

        batch.bodies.extend(bodies);
        batch.bodies_state = if batch.bodies.len() == batch.body_headers.len() {
            TrackState::Completed
        } else {
            TrackState::Waiting
        };
        Ok(())
    }

    /// Accepts a receipts delivery for batch `id`. Each receipt list is
    /// validated against the receipts root of the header owning its slot.
    pub fn deliver_receipts(
        &self,
        id: u32,
        receipts: Vec<Vec<Receipt>>,
    ) -> Result<(), QueueError> {
        let mut inner = self.lock();
        let slot = inner.slot_of(id)?;
        let batch = inner.batch_mut(slot);

        if batch.receipts_state == TrackState::Completed {
            return Err(QueueError::AlreadyCompleted { id, track: "receipts" });
        }
        if receipts.is_empty() {
            batch.receipts_state = TrackState::Waiting;
            return Ok(());
        }
        let room = batch.receipt_headers.len() - batch.receipts.len();
        if receipts.len() > room {
            return Err(QueueError::TooManyItems {
                id,
                track: "receipts",
                got: receipts.len(),
                room,
            });
        }
        for (i, block_receipts) in receipts.iter().enumerate() {
            let header = &batch.receipt_headers[batch.receipts.len() + i];
            validate_receipts(header, block_receipts).map_err(|source| {
                QueueError::RootMismatch {
                    id,
                    number: header.number,
                    source,
                }
            })?;
        }

        batch.receipts.extend(receipts);
        batch.receipts_state = if batch.receipts.len() == batch.receipt_headers.len() {
            TrackState::Completed
        } else {
            TrackState::Waiting
        };
        Ok(())
    }

    /// Detaches and returns the maximal completed prefix starting at the
    /// front. When non-empty, the queue head advances to the hash of the last
    /// returned header.
    pub fn fetch_completed_data(&self) -> Vec<CompletedBatch> {
        let mut inner = self.lock();
        let mut completed = Vec::new();
        while let Some(idx) = inner.front {
            if !inner.batch(idx).is_completed() {
                break;
            }
            let batch = inner.detach_front(idx);
            completed.push(CompletedBatch {
                start: batch.start,
                headers: batch.headers,
                bodies: batch.bodies,
                receipts: batch.receipts,
            });
        }
        if let Some(last_hash) = completed
            .last()
            .and_then(|batch| batch.headers.last())
            .map(BlockHeader::hash)
        {
            inner.head_hash = last_hash;
        }
        completed
    }

    /// Number of batches a [`BatchQueue::fetch_completed_data`] call would
    /// return right now.
    pub fn num_completed_batches(&self) -> usize {
        let inner = self.lock();
        let mut count = 0;
        let mut cursor = inner.front;
        while let Some(idx) = cursor {
            let batch = inner.batch(idx);
            if !batch.is_completed() {
                break;
            }
            count += 1;
            cursor = batch.next;
        }
        count
    }

    /// Hash of the tip already accepted into the local chain.
    pub fn head_hash(&self) -> BlockHash {
        self.lock().head_hash
    }

    /// Number of batches currently tracked, completed or not.
    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QueueInner {
    fn new_batch(&mut self, start: BlockNumber) -> Batch {
        let id = self.next_id;
        self.next_id += 1;
        Batch::new(id, start)
    }

    fn alloc(&mut self, batch: Batch) -> usize {
        let id = batch.id;
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(batch);
                slot
            }
            None => {
                self.slots.push(Some(batch));
                self.slots.len() - 1
            }
        };
        self.by_id.insert(id, slot);
        slot
    }

    fn slot_of(&self, id: u32) -> Result<usize, QueueError> {
        self.by_id
            .get(&id)
            .copied()
            .ok_or(QueueError::UnknownBatch(id))
    }

    fn batch(&self, idx: usize) -> &Batch {
        match &self.slots[idx] {
            Some(batch) => batch,
            None => unreachable!("arena slot {idx} is free"),
        }
    }

    fn batch_mut(&mut self, idx: usize) -> &mut Batch {
        match &mut self.slots[idx] {
            Some(batch) => batch,
            None => unreachable!("arena slot {idx} is free"),
        }
    }

    /// Height span of the batch; tail batches are capped at [`MAX_BATCH`].
    fn batch_len(&self, idx: usize) -> u64 {
        let batch = self.batch(idx);
        match batch.next {
            Some(next) => self.batch(next).start - batch.start,
            None => MAX_BATCH,
        }
    }

    /// Inserts a fresh batch at `start + MAX_BATCH` right after `idx`, giving
    /// `idx` a span of exactly [`MAX_BATCH`].
    fn split_after(&mut self, idx: usize) {
        let start = self.batch(idx).start + MAX_BATCH;
        let old_next = self.batch(idx).next;
        let mut fresh = self.new_batch(start);
        fresh.prev = Some(idx);
        fresh.next = old_next;
        let slot = self.alloc(fresh);
        match old_next {
            Some(next_idx) => self.batch_mut(next_idx).prev = Some(slot),
            None => self.back = Some(slot),
        }
        self.batch_mut(idx).next = Some(slot);
        trace!(start, "batch split");
    }

    /// Unlinks the front batch and frees its slot.
    fn detach_front(&mut self, idx: usize) -> Batch {
        let batch = match self.slots[idx].take() {
            Some(batch) => batch,
            None => unreachable!("arena slot {idx} is free"),
        };
        self.free.push(idx);
        self.by_id.remove(&batch.id);
        self.front = batch.next;
        match batch.next {
            Some(next_idx) => self.batch_mut(next_idx).prev = None,
            None => self.back = None,
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{header_chain, payload_chain, variant_header_chain};
    use stratus_common::H256;
    use stratus_common::types::compute_receipts_root;

    const HEAD: H256 = H256::repeat_byte(0xfe);

    fn headers_job(queue: &BatchQueue) -> HeadersJob {
        match queue.dequeue() {
            Some(Job::Headers(job)) => job,
            other => panic!("expected a headers job, got {other:?}"),
        }
    }

    fn receipts_job(queue: &BatchQueue) -> ReceiptsJob {
        match queue.dequeue() {
            Some(Job::Receipts(job)) => job,
            other => panic!("expected a receipts job, got {other:?}"),
        }
    }

    fn bodies_job(queue: &BatchQueue) -> BodiesJob {
        match queue.dequeue() {
            Some(Job::Bodies(job)) => job,
            other => panic!("expected a bodies job, got {other:?}"),
        }
    }

    #[test]
    fn dequeue_splits_the_tail_and_bounds_the_job() {
        let queue = BatchQueue::new(HEAD, 1);
        let job = headers_job(&queue);
        assert_eq!(job.start, 1);
        assert_eq!(job.count, MAX_BATCH);
        // The split left a fresh tail behind.
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn consecutive_dequeues_cover_contiguous_ranges() {
        let queue = BatchQueue::new(HEAD, 1);
        let first = headers_job(&queue);
        let second = headers_job(&queue);
        let third = headers_job(&queue);
        assert_eq!(first.start, 1);
        assert_eq!(second.start, 1 + MAX_BATCH);
        assert_eq!(third.start, 1 + 2 * MAX_BATCH);
        assert!(first.batch_id != second.batch_id && second.batch_id != third.batch_id);
    }

    #[test]
    fn pending_tracks_are_not_redispensed() {
        let queue = BatchQueue::new(HEAD, 1);
        let first = headers_job(&queue);
        let second = headers_job(&queue);
        // Both in-flight header jobs cover distinct batches; nothing else is
        // waiting besides the freshly split tail.
        assert_ne!(first.batch_id, second.batch_id);
    }

    #[test]
    fn empty_delivery_requeues_the_job() {
        let queue = BatchQueue::new(HEAD, 1);
        let job = headers_job(&queue);
        queue.deliver_headers(job.batch_id, vec![]).expect("empty delivery is accepted");
        let again = headers_job(&queue);
        assert_eq!(again.batch_id, job.batch_id);
        assert_eq!(again.start, job.start);
    }

    #[test]
    fn delivery_to_unknown_batch_is_reported() {
        let queue = BatchQueue::new(HEAD, 1);
        assert_eq!(
            queue.deliver_headers(42, vec![]),
            Err(QueueError::UnknownBatch(42))
        );
    }

    #[test]
    fn oversize_delivery_is_rejected() {
        let queue = BatchQueue::new(HEAD, 1);
        let job = headers_job(&queue);
        let headers = header_chain(HEAD, 1, MAX_BATCH as usize + 1);
        assert!(matches!(
            queue.deliver_headers(job.batch_id, headers),
            Err(QueueError::TooManyItems { track: "headers", .. })
        ));
    }

    #[test]
    fn first_chunk_must_chain_on_the_queue_head() {
        let queue = BatchQueue::new(HEAD, 1);
        let job = headers_job(&queue);
        let unlinked = header_chain(H256::repeat_byte(0xbb), 1, 10);
        let err = queue
            .deliver_headers(job.batch_id, unlinked)
            .expect_err("delivery must be rejected");
        assert!(matches!(err, QueueError::BadLinkage { number: 1, .. }));

        // The failed delivery committed nothing: a correct one still works.
        let headers = header_chain(HEAD, 1, MAX_BATCH as usize);
        queue.deliver_headers(job.batch_id, headers).expect("relinked delivery");
    }

    #[test]
    fn chunks_must_be_internally_chained() {
        let queue = BatchQueue::new(HEAD, 1);
        let job = headers_job(&queue);
        let mut headers = header_chain(HEAD, 1, 10);
        headers[5].parent_hash = H256::repeat_byte(0xcc);
        assert!(matches!(
            queue.deliver_headers(job.batch_id, headers),
            Err(QueueError::BadLinkage { number: 6, .. })
        ));
    }

    #[test]
    fn partial_deliveries_resume_at_the_offset() {
        let queue = BatchQueue::new(HEAD, 1);
        let job = headers_job(&queue);
        let headers = header_chain(HEAD, 1, MAX_BATCH as usize);

        queue
            .deliver_headers(job.batch_id, headers[..40].to_vec())
            .expect("first chunk");
        let resumed = headers_job(&queue);
        assert_eq!(resumed.batch_id, job.batch_id);
        assert_eq!(resumed.start, 41);
        assert_eq!(resumed.count, MAX_BATCH - 40);

        // A chunk that does not chain on the buffered prefix is rejected.
        assert!(matches!(
            queue.deliver_headers(job.batch_id, headers[41..60].to_vec()),
            Err(QueueError::BadLinkage { .. })
        ));
        queue
            .deliver_headers(job.batch_id, headers[40..].to_vec())
            .expect("second chunk");
        assert_eq!(queue.num_completed_batches(), 1);
    }

    #[test]
    fn completed_headers_reject_further_deliveries() {
        let queue = BatchQueue::new(HEAD, 1);
        let job = headers_job(&queue);
        let headers = header_chain(HEAD, 1, MAX_BATCH as usize);
        queue.deliver_headers(job.batch_id, headers.clone()).expect("fill");
        assert_eq!(
            queue.deliver_headers(job.batch_id, headers),
            Err(QueueError::AlreadyCompleted { id: job.batch_id, track: "headers" })
        );
    }

    #[test]
    fn empty_root_headers_complete_without_payload_jobs() {
        let queue = BatchQueue::new(HEAD, 1);
        let job = headers_job(&queue);
        let headers = header_chain(HEAD, 1, MAX_BATCH as usize);
        queue.deliver_headers(job.batch_id, headers).expect("fill");

        // No receipts or bodies job for the completed batch; the next job
        // belongs to the tail.
        let next = headers_job(&queue);
        assert_ne!(next.batch_id, job.batch_id);
        assert_eq!(queue.num_completed_batches(), 1);
    }

    #[test]
    fn payload_batches_demote_receipts_then_bodies() {
        let queue = BatchQueue::new(HEAD, 1);
        let job = headers_job(&queue);
        let blocks = payload_chain(HEAD, 1, MAX_BATCH as usize);
        let headers: Vec<_> = blocks.iter().map(|b| b.header.clone()).collect();
        queue.deliver_headers(job.batch_id, headers.clone()).expect("fill");

        // Receipts outrank bodies.
        let receipts = receipts_job(&queue);
        assert_eq!(receipts.batch_id, job.batch_id);
        assert_eq!(receipts.headers, headers);
        let bodies = bodies_job(&queue);
        assert_eq!(bodies.batch_id, job.batch_id);
        assert_eq!(bodies.headers, headers);
        assert_eq!(queue.num_completed_batches(), 0);
    }

    #[test]
    fn body_delivery_is_validated_per_slot() {
        let queue = BatchQueue::new(HEAD, 1);
        let job = headers_job(&queue);
        let blocks = payload_chain(HEAD, 1, MAX_BATCH as usize);
        let headers: Vec<_> = blocks.iter().map(|b| b.header.clone()).collect();
        queue.deliver_headers(job.batch_id, headers).expect("fill");
        let _ = receipts_job(&queue);
        let _ = bodies_job(&queue);

        // Swapping two bodies breaks the committed transactions root.
        let mut bodies: Vec<_> = blocks.iter().map(|b| b.body.clone()).collect();
        bodies.swap(0, 1);
        assert!(matches!(
            queue.deliver_bodies(job.batch_id, bodies),
            Err(QueueError::RootMismatch { number: 1, .. })
        ));

        let bodies: Vec<_> = blocks.iter().map(|b| b.body.clone()).collect();
        queue.deliver_bodies(job.batch_id, bodies).expect("valid bodies");
    }

    #[test]
    fn partial_body_delivery_resumes_at_the_offset() {
        let queue = BatchQueue::new(HEAD, 1);
        let job = headers_job(&queue);
        let blocks = payload_chain(HEAD, 1, MAX_BATCH as usize);
        let headers: Vec<_> = blocks.iter().map(|b| b.header.clone()).collect();
        queue.deliver_headers(job.batch_id, headers.clone()).expect("fill");
        let _ = receipts_job(&queue);
        let _ = bodies_job(&queue);

        let bodies: Vec<_> = blocks.iter().map(|b| b.body.clone()).collect();
        queue
            .deliver_bodies(job.batch_id, bodies[..30].to_vec())
            .expect("first chunk");
        let resumed = bodies_job(&queue);
        assert_eq!(resumed.headers, headers[30..].to_vec());
        queue
            .deliver_bodies(job.batch_id, bodies[30..].to_vec())
            .expect("second chunk");
    }

    #[test]
    fn receipts_delivery_is_validated_per_slot() {
        let queue = BatchQueue::new(HEAD, 1);
        let job = headers_job(&queue);
        let blocks = payload_chain(HEAD, 1, MAX_BATCH as usize);
        let headers: Vec<_> = blocks.iter().map(|b| b.header.clone()).collect();
        queue.deliver_headers(job.batch_id, headers).expect("fill");
        let _ = receipts_job(&queue);

        let mut receipts: Vec<_> = blocks.iter().map(|b| b.receipts.clone()).collect();
        receipts[0][0].cumulative_gas_used += 1;
        assert!(matches!(
            queue.deliver_receipts(job.batch_id, receipts),
            Err(QueueError::RootMismatch { number: 1, .. })
        ));

        let receipts: Vec<_> = blocks.iter().map(|b| b.receipts.clone()).collect();
        queue.deliver_receipts(job.batch_id, receipts).expect("valid receipts");
    }

    #[test]
    fn fetch_completed_data_releases_the_prefix_and_advances_the_head() {
        let queue = BatchQueue::new(HEAD, 1);
        let first = headers_job(&queue);
        let second = headers_job(&queue);
        let headers = header_chain(HEAD, 1, 2 * MAX_BATCH as usize);

        // Complete the second batch first: nothing is released while the
        // front batch is incomplete.
        queue
            .deliver_headers(second.batch_id, headers[MAX_BATCH as usize..].to_vec())
            .expect("second range");
        assert_eq!(queue.num_completed_batches(), 0);
        assert!(queue.fetch_completed_data().is_empty());

        queue
            .deliver_headers(first.batch_id, headers[..MAX_BATCH as usize].to_vec())
            .expect("first range");
        assert_eq!(queue.num_completed_batches(), 2);

        let released = queue.fetch_completed_data();
        assert_eq!(released.len(), 2);
        assert_eq!(released[0].start, 1);
        assert_eq!(released[1].start, 1 + MAX_BATCH);
        // Heights are contiguous across the released prefix.
        let numbers: Vec<_> = released
            .iter()
            .flat_map(|batch| batch.headers.iter().map(|h| h.number))
            .collect();
        assert_eq!(numbers, (1..=2 * MAX_BATCH).collect::<Vec<_>>());
        // The head advanced to the hash of the last released header.
        let last_hash = headers[headers.len() - 1].hash();
        assert_eq!(queue.head_hash(), last_hash);
        assert_eq!(queue.num_completed_batches(), 0);
    }

    #[test]
    fn released_headers_chain_back_to_the_original_head() {
        let queue = BatchQueue::new(HEAD, 1);
        let first = headers_job(&queue);
        let headers = header_chain(HEAD, 1, MAX_BATCH as usize);
        queue.deliver_headers(first.batch_id, headers).expect("fill");

        let released = queue.fetch_completed_data();
        let batch = &released[0];
        assert_eq!(batch.headers[0].parent_hash, HEAD);
        for pair in batch.headers.windows(2) {
            assert_eq!(pair[1].parent_hash, pair[0].hash());
        }
    }

    #[test]
    fn out_of_order_fill_checks_forward_linkage() {
        let queue = BatchQueue::new(HEAD, 1);
        let first = headers_job(&queue);
        let second = headers_job(&queue);
        let headers = header_chain(HEAD, 1, 2 * MAX_BATCH as usize);

        // The second batch fills while the first is still empty; its backward
        // check is deferred.
        queue
            .deliver_headers(second.batch_id, headers[MAX_BATCH as usize..].to_vec())
            .expect("second range accepted with deferred check");

        // A chain that links from the head but ends on a different hash must
        // now fail the forward check against the completed successor.
        let imposter = variant_header_chain(HEAD, 1, MAX_BATCH as usize, b"imposter");
        assert!(matches!(
            queue.deliver_headers(first.batch_id, imposter),
            Err(QueueError::BadLinkage { .. })
        ));

        queue
            .deliver_headers(first.batch_id, headers[..MAX_BATCH as usize].to_vec())
            .expect("true chain accepted");
        assert_eq!(queue.num_completed_batches(), 2);
    }

    #[test]
    fn no_job_is_dispensed_for_fully_completed_batches() {
        let queue = BatchQueue::new(HEAD, 1);
        let job = headers_job(&queue);
        let headers = header_chain(HEAD, 1, MAX_BATCH as usize);
        queue.deliver_headers(job.batch_id, headers).expect("fill");

        // Every further job belongs to a batch that still has waiting work.
        for _ in 0..4 {
            let next = headers_job(&queue);
            assert_ne!(next.batch_id, job.batch_id);
        }
    }

    #[test]
    fn receipt_job_headers_carry_the_committed_roots() {
        let queue = BatchQueue::new(HEAD, 1);
        let job = headers_job(&queue);
        let blocks = payload_chain(HEAD, 1, MAX_BATCH as usize);
        let headers: Vec<_> = blocks.iter().map(|b| b.header.clone()).collect();
        queue.deliver_headers(job.batch_id, headers).expect("fill");

        let receipts = receipts_job(&queue);
        for (slot, block) in receipts.headers.iter().zip(&blocks) {
            assert_eq!(slot.receipts_root, compute_receipts_root(&block.receipts));
        }
    }
}
