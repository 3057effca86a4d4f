//! Buffered tagged message service over a raw [`Fabric`].
//!
//! Wire format: each message is framed as
//!
//! ```text
//! u32 len                  byte length of everything after this field
//! u64 tag                  phase tag of the collective the message belongs to
//! u8  payload[len - 10]
//! u16 handler              receive dispatcher selector
//! ```
//!
//! Outbound messages accumulate per destination and a pending buffer is
//! handed to the fabric when one of three triggers fires: an explicit
//! [`flush`](BufferedNet::flush), accumulated size above [`COMM_MIN`]
//! (slightly smaller than an ethernet packet), or [`COMM_DELAY`] elapsed
//! since the buffer's first byte. Pumping is cooperative: sends, receives
//! and flushes all give pending buffers a chance to go out.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::net::phase::PhaseCounter;
use crate::net::transport::Fabric;

/// Transmit threshold in bytes.
pub const COMM_MIN: usize = 1400;
/// Transmit threshold in elapsed time.
pub const COMM_DELAY: Duration = Duration::from_micros(100);

/// Handler tag of the partitioning-phase receive dispatcher.
pub const HANDLER_PARTITION: u16 = 1;

const FRAME_OVERHEAD: usize = 8 + 2; // tag + trailing handler

#[derive(Default)]
struct SendAccum {
    data: Vec<u8>,
    since: Option<Instant>,
    urgent: bool,
}

impl SendAccum {
    fn ready(&self) -> bool {
        if self.data.is_empty() {
            return false;
        }
        if self.urgent || self.data.len() > COMM_MIN {
            return true;
        }
        match self.since {
            Some(t) => t.elapsed() > COMM_DELAY,
            None => false,
        }
    }
}

struct RecvState {
    /// Partially reassembled byte stream per sender.
    streams: Vec<Vec<u8>>,
    /// Fully decoded messages: (sender, tag, payload).
    ready: VecDeque<(usize, u64, Vec<u8>)>,
}

/// Tagged message service with send-side buffering and a phase counter.
pub struct BufferedNet<F: Fabric> {
    fabric: F,
    send: Vec<Mutex<SendAccum>>,
    recv: Mutex<RecvState>,
    phase: PhaseCounter,
}

impl<F: Fabric> BufferedNet<F> {
    pub fn new(fabric: F) -> Self {
        let size = fabric.size();
        Self {
            fabric,
            send: (0..size).map(|_| Mutex::new(SendAccum::default())).collect(),
            recv: Mutex::new(RecvState {
                streams: vec![Vec::new(); size],
                ready: VecDeque::new(),
            }),
            phase: PhaseCounter::new(),
        }
    }

    pub fn rank(&self) -> usize {
        self.fabric.rank()
    }

    pub fn size(&self) -> usize {
        self.fabric.size()
    }

    /// Current collective phase; used as the tag of in-flight messages.
    pub fn phase(&self) -> u64 {
        self.phase.current()
    }

    /// Flush, wait for every rank, then bump the phase. One call per rank
    /// per collective.
    pub fn advance_phase(&self) {
        self.flush();
        self.fabric.barrier();
        self.phase.bump();
    }

    /// Queue `payload` for `dest` under `tag`.
    pub fn send_tagged(&self, dest: usize, tag: u64, payload: Vec<u8>) {
        debug_assert!(dest < self.size());
        {
            let mut acc = self.send[dest].lock();
            if acc.data.is_empty() {
                acc.since = Some(Instant::now());
            }
            let len = (payload.len() + FRAME_OVERHEAD) as u32;
            acc.data.extend_from_slice(&len.to_le_bytes());
            acc.data.extend_from_slice(&tag.to_le_bytes());
            acc.data.extend_from_slice(&payload);
            acc.data.extend_from_slice(&HANDLER_PARTITION.to_le_bytes());
        }
        self.pump_one(dest);
    }

    /// Non-blocking receive of the next message carrying `tag`, from any
    /// sender. Messages under other tags stay queued.
    pub fn try_recv_tagged(&self, tag: u64) -> Option<(usize, Vec<u8>)> {
        self.pump_all();
        let mut rs = self.recv.lock();
        while let Some((src, chunk)) = self.fabric.dequeue() {
            rs.streams[src].extend_from_slice(&chunk);
        }
        self.decode_streams(&mut rs);
        let idx = rs.ready.iter().position(|&(_, t, _)| t == tag)?;
        rs.ready
            .remove(idx)
            .map(|(src, _, payload)| (src, payload))
    }

    /// Mark every pending buffer urgent and pump.
    pub fn flush(&self) {
        for dest in 0..self.size() {
            self.send[dest].lock().urgent = true;
        }
        self.pump_all();
    }

    pub fn barrier(&self) {
        self.fabric.barrier();
    }

    fn pump_all(&self) {
        for dest in 0..self.size() {
            self.pump_one(dest);
        }
    }

    fn pump_one(&self, dest: usize) {
        let bytes = {
            let mut acc = self.send[dest].lock();
            if !acc.ready() {
                return;
            }
            acc.urgent = false;
            acc.since = None;
            std::mem::take(&mut acc.data)
        };
        self.fabric.enqueue(dest, bytes);
    }

    fn decode_streams(&self, rs: &mut RecvState) {
        for src in 0..rs.streams.len() {
            loop {
                let stream = &rs.streams[src];
                if stream.len() < 4 {
                    break;
                }
                let len = u32::from_le_bytes(stream[0..4].try_into().unwrap()) as usize;
                if stream.len() < 4 + len {
                    break;
                }
                debug_assert!(len >= FRAME_OVERHEAD, "frame shorter than its envelope");
                let tag = u64::from_le_bytes(stream[4..12].try_into().unwrap());
                let payload = stream[12..4 + len - 2].to_vec();
                let handler =
                    u16::from_le_bytes(stream[4 + len - 2..4 + len].try_into().unwrap());
                debug_assert_eq!(handler, HANDLER_PARTITION, "unknown receive dispatcher");
                rs.streams[src].drain(..4 + len);
                rs.ready.push_back((src, tag, payload));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::transport::LocalFabric;

    fn pair() -> (BufferedNet<LocalFabric>, BufferedNet<LocalFabric>) {
        let mut fabrics = LocalFabric::cluster(2);
        let f1 = fabrics.pop().unwrap();
        let f0 = fabrics.pop().unwrap();
        (BufferedNet::new(f0), BufferedNet::new(f1))
    }

    #[test]
    fn flush_delivers_small_messages() {
        let (a, b) = pair();
        a.send_tagged(1, 1, vec![0xAB; 16]);
        a.flush();
        let (src, payload) = b.try_recv_tagged(1).expect("message after flush");
        assert_eq!(src, 0);
        assert_eq!(payload, vec![0xAB; 16]);
    }

    #[test]
    fn size_trigger_fires_without_flush() {
        let (a, b) = pair();
        a.send_tagged(1, 1, vec![0u8; COMM_MIN + 1]);
        let got = b.try_recv_tagged(1).expect("oversized message sent eagerly");
        assert_eq!(got.1.len(), COMM_MIN + 1);
    }

    #[test]
    fn batched_frames_split_back_apart() {
        let (a, b) = pair();
        a.send_tagged(1, 7, vec![1, 2, 3]);
        a.send_tagged(1, 7, vec![4, 5]);
        a.flush();
        assert_eq!(b.try_recv_tagged(7).unwrap().1, vec![1, 2, 3]);
        assert_eq!(b.try_recv_tagged(7).unwrap().1, vec![4, 5]);
        assert!(b.try_recv_tagged(7).is_none());
    }

    #[test]
    fn tag_demux_leaves_other_phases_queued() {
        let (a, b) = pair();
        a.send_tagged(1, 2, vec![2]);
        a.send_tagged(1, 1, vec![1]);
        a.flush();
        assert_eq!(b.try_recv_tagged(1).unwrap().1, vec![1]);
        assert_eq!(b.try_recv_tagged(2).unwrap().1, vec![2]);
    }

    #[test]
    fn delay_trigger_fires() {
        let (a, b) = pair();
        a.send_tagged(1, 1, vec![9]);
        std::thread::sleep(Duration::from_millis(1));
        // any later net activity pumps the expired buffer out
        assert_eq!(a.try_recv_tagged(1), None);
        assert_eq!(b.try_recv_tagged(1).unwrap().1, vec![9]);
    }

    #[test]
    fn framing_layout_is_stable() {
        let (a, b) = pair();
        a.send_tagged(1, 0x0102_0304_0506_0708, vec![0xEE]);
        a.flush();
        let chunk = {
            let mut raw = Vec::new();
            // peek at the raw chunk through a second fabric pair
            let fabrics = LocalFabric::cluster(2);
            let net = BufferedNet::new(fabrics[0].clone());
            net.send_tagged(1, 0x0102_0304_0506_0708, vec![0xEE]);
            net.flush();
            if let Some((_, bytes)) = fabrics[1].dequeue() {
                raw = bytes;
            }
            raw
        };
        // len = tag (8) + payload (1) + handler (2)
        assert_eq!(&chunk[0..4], &11u32.to_le_bytes());
        assert_eq!(&chunk[4..12], &0x0102_0304_0506_0708u64.to_le_bytes());
        assert_eq!(chunk[12], 0xEE);
        assert_eq!(&chunk[13..15], &HANDLER_PARTITION.to_le_bytes());
        // and the framed copy still decodes
        assert_eq!(
            b.try_recv_tagged(0x0102_0304_0506_0708).unwrap().1,
            vec![0xEE]
        );
    }

    #[test]
    fn phase_advances_collectively() {
        let (a, b) = pair();
        assert_eq!(a.phase(), 1);
        let t = std::thread::spawn(move || {
            b.advance_phase();
            b.phase()
        });
        a.advance_phase();
        assert_eq!(a.phase(), 2);
        assert_eq!(t.join().unwrap(), 2);
    }
}
