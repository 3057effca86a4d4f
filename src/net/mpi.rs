//! MPI-backed [`Fabric`].
//!
//! Chunks enqueued by the buffered layer become immediate MPI sends under a
//! single fixed MPI tag (collective demultiplexing happens one layer up via
//! the phase tag inside the frame). Send buffers are leaked into `'static`
//! requests and reclaimed once the request completes; the barrier drains all
//! in-flight sends first so no chunk can straddle a phase bump.

use core::ptr::NonNull;

use mpi::collective::CommunicatorCollectives;
use mpi::datatype::Equivalence;
use mpi::environment::Universe;
use mpi::point_to_point::{Destination, Source};
use mpi::request::StaticScope;
use mpi::topology::{Communicator as _, SimpleCommunicator};
use parking_lot::Mutex;

use crate::net::transport::Fabric;

/// MPI point-to-point tag carrying all buffered-net traffic.
const FABRIC_TAG: i32 = 0x6C7;

pub struct MpiFabric {
    _universe: Universe,
    world: SimpleCommunicator,
    rank: usize,
    size: usize,
    inflight: Mutex<Vec<InflightSend>>,
}

unsafe impl Send for MpiFabric {}
unsafe impl Sync for MpiFabric {}

struct InflightSend {
    req: Option<mpi::request::Request<'static, [u8], StaticScope>>,
    buf: Option<NonNull<[u8]>>,
}

impl InflightSend {
    fn complete(&mut self) {
        if let Some(ptr) = self.buf.take() {
            unsafe {
                drop(Box::from_raw(ptr.as_ptr()));
            }
        }
    }
}

impl Default for MpiFabric {
    fn default() -> Self {
        let universe = mpi::initialize().expect("MPI initialization failed");
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Self {
            _universe: universe,
            world,
            rank,
            size,
            inflight: Mutex::new(Vec::new()),
        }
    }
}

impl MpiFabric {
    /// Reap completed sends; with `wait` set, block until all are done.
    fn reap_sends(&self, wait: bool) {
        let mut inflight = self.inflight.lock();
        inflight.retain_mut(|s| {
            if let Some(req) = s.req.take() {
                if wait {
                    let _ = req.wait();
                } else {
                    match req.test() {
                        Ok(_) => {}
                        Err(req) => {
                            s.req = Some(req);
                            return true;
                        }
                    }
                }
            }
            s.complete();
            false
        });
    }
}

impl Fabric for MpiFabric {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn enqueue(&self, dest: usize, bytes: Vec<u8>) {
        let raw: *mut [u8] = Box::into_raw(bytes.into_boxed_slice());
        let slice: &'static [u8] = unsafe { &*raw };
        let req = self
            .world
            .process_at_rank(dest as i32)
            .immediate_send_with_tag(StaticScope, slice, FABRIC_TAG);
        self.inflight.lock().push(InflightSend {
            req: Some(req),
            buf: Some(unsafe { NonNull::new_unchecked(raw) }),
        });
        self.reap_sends(false);
    }

    fn dequeue(&self) -> Option<(usize, Vec<u8>)> {
        self.reap_sends(false);
        let (msg, status) = self
            .world
            .any_process()
            .immediate_matched_probe_with_tag(FABRIC_TAG)?;
        let count = status.count(u8::equivalent_datatype()) as usize;
        let mut buf = vec![0u8; count];
        msg.matched_receive_into(&mut buf[..]);
        Some((status.source_rank() as usize, buf))
    }

    fn barrier(&self) {
        self.reap_sends(true);
        self.world.barrier();
    }
}
