use stratus_common::types::{Block, BlockBody, BlockHeader, BlockNumber, Receipt};

/// Progress of one fetch dimension within a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    /// Has work to hand out.
    Waiting,
    /// A job for this track is in flight; at most one at a time.
    Pending,
    /// The track buffer is full and every item validated.
    Completed,
}

/// Work unit dispensed by [`super::BatchQueue::dequeue`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Job {
    Headers(HeadersJob),
    Receipts(ReceiptsJob),
    Bodies(BodiesJob),
}

impl Job {
    pub fn batch_id(&self) -> u32 {
        match self {
            Job::Headers(job) => job.batch_id,
            Job::Receipts(job) => job.batch_id,
            Job::Bodies(job) => job.batch_id,
        }
    }
}

/// Fetch `count` headers from height `start` upwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadersJob {
    pub batch_id: u32,
    pub start: BlockNumber,
    pub count: u64,
}

/// Fetch the receipts committed by `headers`, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiptsJob {
    pub batch_id: u32,
    pub headers: Vec<BlockHeader>,
}

/// Fetch the bodies committed by `headers`, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BodiesJob {
    pub batch_id: u32,
    pub headers: Vec<BlockHeader>,
}

/// One contiguous height range `[start, start + len)` fetched and validated
/// as a unit.
///
/// The three tracks progress independently. Headers start `Waiting`; bodies
/// and receipts start `Completed` and are demoted to `Waiting` only once the
/// headers track fills and at least one header commits to the corresponding
/// payload. Track offsets are the buffer lengths: a track's buffer is always
/// a validated prefix of the work it covers.
#[derive(Debug)]
pub(super) struct Batch {
    pub id: u32,
    /// First height covered by the batch.
    pub start: BlockNumber,

    pub headers_state: TrackState,
    pub headers: Vec<BlockHeader>,

    pub bodies_state: TrackState,
    pub bodies: Vec<BlockBody>,
    /// Headers of this batch that commit to a non-empty body, in height
    /// order. Populated when the headers track completes.
    pub body_headers: Vec<BlockHeader>,

    pub receipts_state: TrackState,
    pub receipts: Vec<Vec<Receipt>>,
    /// Headers of this batch that commit to receipts, in height order.
    pub receipt_headers: Vec<BlockHeader>,

    /// Arena slot of the neighbouring batches; indices, not owning pointers,
    /// so the doubly linked structure carries no reference cycle.
    pub prev: Option<usize>,
    pub next: Option<usize>,
}

impl Batch {
    pub fn new(id: u32, start: BlockNumber) -> Self {
        Self {
            id,
            start,
            headers_state: TrackState::Waiting,
            headers: Vec::new(),
            bodies_state: TrackState::Completed,
            bodies: Vec::new(),
            body_headers: Vec::new(),
            receipts_state: TrackState::Completed,
            receipts: Vec::new(),
            receipt_headers: Vec::new(),
            prev: None,
            next: None,
        }
    }

    pub fn last_header(&self) -> Option<&BlockHeader> {
        self.headers.last()
    }

    pub fn has_waiting_track(&self) -> bool {
        self.headers_state == TrackState::Waiting
            || self.receipts_state == TrackState::Waiting
            || self.bodies_state == TrackState::Waiting
    }

    pub fn is_completed(&self) -> bool {
        self.headers_state == TrackState::Completed
            && self.bodies_state == TrackState::Completed
            && self.receipts_state == TrackState::Completed
    }
}

/// A fully fetched batch handed back to the caller by
/// [`super::BatchQueue::fetch_completed_data`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedBatch {
    pub start: BlockNumber,
    pub headers: Vec<BlockHeader>,
    /// Bodies for the headers that commit to one, in height order.
    pub bodies: Vec<BlockBody>,
    /// Receipt lists for the headers that commit to receipts, in height
    /// order.
    pub receipts: Vec<Vec<Receipt>>,
}

impl CompletedBatch {
    /// Assembles the full blocks of the range, giving headers without a body
    /// commitment an empty body.
    pub fn into_blocks(self) -> Vec<Block> {
        let mut bodies = self.bodies.into_iter();
        self.headers
            .into_iter()
            .map(|header| {
                let body = if header.has_body() {
                    bodies.next().unwrap_or_default()
                } else {
                    BlockBody::empty()
                };
                Block::new(header, body)
            })
            .collect()
    }
}
