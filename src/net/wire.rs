//! Little-endian payload codecs for the exchange collectives.
//!
//! All multi-byte integers on the wire are LE fixed width (u16/u32 framing
//! fields, u64 ids and counts). Vectors are length-prefixed with a u64
//! element count. Pod payload slices are carried as raw LE bytes; the
//! zero-sized payload writes nothing, so edgeless and payload-carrying
//! graphs share one framing.

use bytemuck::Pod;

use crate::error::GridCutError;

/// Append-only payload builder.
#[derive(Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the accumulated bytes, leaving the writer empty for reuse.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn push_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn push_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn push_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn push_u32_slice(&mut self, v: &[u32]) {
        self.push_u64(v.len() as u64);
        for &x in v {
            self.buf.extend_from_slice(&x.to_le_bytes());
        }
    }

    pub fn push_u64_slice(&mut self, v: &[u64]) {
        self.push_u64(v.len() as u64);
        for &x in v {
            self.buf.extend_from_slice(&x.to_le_bytes());
        }
    }

    /// Count-prefixed Pod slice; writes only the count when `T` is
    /// zero-sized.
    pub fn push_pod_slice<T: Pod>(&mut self, v: &[T]) {
        self.push_u64(v.len() as u64);
        if std::mem::size_of::<T>() > 0 && !v.is_empty() {
            self.buf.extend_from_slice(bytemuck::cast_slice(v));
        }
    }
}

/// Cursor over a received payload; every accessor fails on truncation.
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], GridCutError> {
        if self.remaining() < n {
            return Err(GridCutError::Protocol(format!(
                "truncated payload: wanted {n} bytes, {} left",
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn u16(&mut self) -> Result<u16, GridCutError> {
        Ok(u16::from_le_bytes(self.bytes(2)?.try_into().unwrap()))
    }

    pub fn u32(&mut self) -> Result<u32, GridCutError> {
        Ok(u32::from_le_bytes(self.bytes(4)?.try_into().unwrap()))
    }

    pub fn u64(&mut self) -> Result<u64, GridCutError> {
        Ok(u64::from_le_bytes(self.bytes(8)?.try_into().unwrap()))
    }

    pub fn u32_vec(&mut self) -> Result<Vec<u32>, GridCutError> {
        let n = self.u64()? as usize;
        let raw = self.bytes(n * 4)?;
        Ok(raw
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect())
    }

    pub fn u64_vec(&mut self) -> Result<Vec<u64>, GridCutError> {
        let n = self.u64()? as usize;
        let raw = self.bytes(n * 8)?;
        Ok(raw
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect())
    }

    /// Counterpart of [`PayloadWriter::push_pod_slice`].
    pub fn pod_vec<T: Pod>(&mut self) -> Result<Vec<T>, GridCutError> {
        let n = self.u64()? as usize;
        if std::mem::size_of::<T>() == 0 || n == 0 {
            return Ok(vec![T::zeroed(); n]);
        }
        let raw = self.bytes(n * std::mem::size_of::<T>())?;
        let mut out = vec![T::zeroed(); n];
        bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(raw);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_scalars_and_vecs() {
        let mut w = PayloadWriter::new();
        w.push_u16(7);
        w.push_u64(0xDEAD_BEEF_u64);
        w.push_u64_slice(&[1, 2, 3]);
        w.push_u32_slice(&[9, 8]);
        let bytes = w.into_vec();

        let mut r = PayloadReader::new(&bytes);
        assert_eq!(r.u16().unwrap(), 7);
        assert_eq!(r.u64().unwrap(), 0xDEAD_BEEF);
        assert_eq!(r.u64_vec().unwrap(), vec![1, 2, 3]);
        assert_eq!(r.u32_vec().unwrap(), vec![9, 8]);
        assert!(r.is_empty());
    }

    #[test]
    fn pod_slice_zero_sized() {
        let mut w = PayloadWriter::new();
        w.push_pod_slice::<()>(&[(), (), ()]);
        let bytes = w.into_vec();
        assert_eq!(bytes.len(), 8);
        let mut r = PayloadReader::new(&bytes);
        assert_eq!(r.pod_vec::<()>().unwrap().len(), 3);
    }

    #[test]
    fn pod_slice_payloads() {
        let mut w = PayloadWriter::new();
        w.push_pod_slice::<u32>(&[11, 22, 33]);
        let bytes = w.into_vec();
        let mut r = PayloadReader::new(&bytes);
        assert_eq!(r.pod_vec::<u32>().unwrap(), vec![11, 22, 33]);
    }

    #[test]
    fn truncation_is_an_error() {
        let mut w = PayloadWriter::new();
        w.push_u64_slice(&[1, 2, 3]);
        let mut bytes = w.into_vec();
        bytes.truncate(bytes.len() - 1);
        let mut r = PayloadReader::new(&bytes);
        assert!(r.u64_vec().is_err());
    }
}
