//! Synchronization vocabulary shared with the downstream runtime.

/// The two collective directions of the sync runtime.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncKind {
    /// Mirrors push their partial values to the master.
    Reduce,
    /// The master pushes its value out to mirrors.
    Broadcast,
}

/// Where the computation wrote the field being synchronized.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WriteLocation {
    Source,
    Destination,
    Any,
}

/// Where the computation will read the field being synchronized.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReadLocation {
    Source,
    Destination,
    Any,
}

/// Caller-supplied validity flags for a sync bitvector. During a broadcast
/// the communication predicates record here which endpoint's copy goes
/// stale because it is not communicated on.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BitVectorStatus {
    pub src_invalid: bool,
    pub dst_invalid: bool,
}

impl BitVectorStatus {
    pub fn make_src_invalid(&mut self) {
        self.src_invalid = true;
    }

    pub fn make_dst_invalid(&mut self) {
        self.dst_invalid = true;
    }
}
