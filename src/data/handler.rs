//! `DataHandler`: a typed, count-prefixed collection that packs and exchanges itself.
//!
//! Wire layout of one collection:
//!
//! ```text
//! [ count: i32 LE ][ element_0 ] ... [ element_{count-1} ]
//! ```
//!
//! every element occupying exactly `codec.encoded_size(ctx)` bytes. The
//! receiver learns the message length from a probe, not from the prefix.
//!
//! A handler owns its data exclusively or shares it read-only through an
//! `Arc<[T]>`. Decoding never writes through a shared slice: it swaps in a
//! freshly owned `Vec`, so other holders keep their view.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::algs::communicator::{CommTag, Communicator, Envelope};
use crate::algs::wire::{self, Position};
use crate::data::codec::{ElementCodec, ScalarCodec, TypeTag};
use crate::mesh_error::MeshExchangeError;

/// Backing storage of a [`DataHandler`].
#[derive(Clone, Debug)]
pub enum Collection<T> {
    /// No data was ever attached.
    Absent,
    /// Owned, mutable storage.
    Exclusive(Vec<T>),
    /// Read-only storage shared with other holders.
    Shared(Arc<[T]>),
}

/// Ownership tag of a [`Collection`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ownership {
    Absent,
    Exclusive,
    Shared,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Collection::Absent
    }
}

impl<T> Collection<T> {
    pub fn as_slice(&self) -> Option<&[T]> {
        match self {
            Collection::Absent => None,
            Collection::Exclusive(v) => Some(v),
            Collection::Shared(s) => Some(s),
        }
    }

    pub fn ownership(&self) -> Ownership {
        match self {
            Collection::Absent => Ownership::Absent,
            Collection::Exclusive(_) => Ownership::Exclusive,
            Collection::Shared(_) => Ownership::Shared,
        }
    }
}

/// Outcome of [`DataHandler::receive`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Received {
    /// Envelope of the consumed message.
    pub envelope: Envelope,
    /// Element count decoded from the prefix.
    pub count: usize,
}

static SEND_UNAVAILABLE: OnceCell<()> = OnceCell::new();
static RECV_UNAVAILABLE: OnceCell<()> = OnceCell::new();

fn unavailable(op: &'static str, announced: &OnceCell<()>) -> MeshExchangeError {
    announced.get_or_init(|| {
        log::info!("{op} only available with a message-passing backend (enable `mpi-support`)");
    });
    MeshExchangeError::TransportUnavailable { op }
}

/// Typed exchange handler over a collection of `T`, packed by codec `K`.
#[derive(Clone, Debug)]
pub struct DataHandler<T, K = ScalarCodec<T>> {
    data: Collection<T>,
    codec: K,
}

impl<T, K: ElementCodec<T>> Default for DataHandler<T, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, K: ElementCodec<T>> DataHandler<T, K> {
    /// Handler with no data attached; decode or receive to fill it.
    pub fn new() -> Self {
        Self::with_codec(K::default())
    }

    /// Handler with no data and an explicitly configured codec.
    pub fn with_codec(codec: K) -> Self {
        Self {
            data: Collection::Absent,
            codec,
        }
    }

    /// Take exclusive ownership of `data`.
    pub fn from_vec(data: Vec<T>) -> Self {
        Self {
            data: Collection::Exclusive(data),
            codec: K::default(),
        }
    }

    /// Share `data` read-only with other holders, without copying.
    pub fn from_shared(data: Arc<[T]>) -> Self {
        Self {
            data: Collection::Shared(data),
            codec: K::default(),
        }
    }

    /// Copy `data` into an exclusively owned collection.
    pub fn from_slice(data: &[T]) -> Self
    where
        T: Clone,
    {
        Self::from_vec(data.to_vec())
    }

    /// Replace the owned data.
    pub fn set_data(&mut self, data: Vec<T>) {
        self.data = Collection::Exclusive(data);
    }

    /// The attached data, or `None` if nothing was ever attached.
    pub fn data(&self) -> Option<&[T]> {
        self.data.as_slice()
    }

    /// Copy the attached data into `out`. Leaves `out` untouched when no data
    /// is attached.
    pub fn get_data(&self, out: &mut Vec<T>)
    where
        T: Clone,
    {
        if let Some(items) = self.data() {
            out.clear();
            out.extend_from_slice(items);
        }
    }

    /// Consume the handler, returning its data (empty if none was attached).
    pub fn into_vec(self) -> Vec<T>
    where
        T: Clone,
    {
        match self.data {
            Collection::Absent => Vec::new(),
            Collection::Exclusive(v) => v,
            Collection::Shared(s) => s.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.data().map_or(0, <[T]>::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ownership(&self) -> Ownership {
        self.data.ownership()
    }

    pub fn codec(&self) -> &K {
        &self.codec
    }

    pub fn type_tag(&self) -> TypeTag {
        self.codec.type_tag()
    }

    /// Exact bytes needed to encode the attached collection under `ctx`.
    pub fn buffer_size<C: Communicator + ?Sized>(
        &self,
        ctx: &C,
    ) -> Result<usize, MeshExchangeError> {
        self.buffer_size_for(self.len(), ctx)
    }

    /// Exact bytes needed to encode `n` elements under `ctx`.
    ///
    /// `CountOverflow` if `n` does not fit the count prefix or the total does
    /// not fit a `usize`.
    pub fn buffer_size_for<C: Communicator + ?Sized>(
        &self,
        n: usize,
        ctx: &C,
    ) -> Result<usize, MeshExchangeError> {
        if i32::try_from(n).is_err() {
            return Err(MeshExchangeError::CountOverflow(n));
        }
        n.checked_mul(self.codec.encoded_size(ctx))
            .and_then(|body| body.checked_add(wire::count_prefix_size(ctx)))
            .ok_or(MeshExchangeError::CountOverflow(n))
    }

    /// Write the count prefix and every element, in order, at `pos`.
    ///
    /// An absent collection encodes as `count == 0`. If `buf` has fewer than
    /// [`buffer_size`](Self::buffer_size) bytes left after `pos`, nothing is
    /// written and `BufferTooSmall` is returned; a collection too large to
    /// size is `CountOverflow`.
    pub fn encode_collection<C: Communicator + ?Sized>(
        &self,
        pos: &mut Position,
        buf: &mut [u8],
        ctx: &C,
    ) -> Result<(), MeshExchangeError> {
        let needed = self.buffer_size(ctx)?;
        wire::ensure_room(buf.len(), *pos, needed)?;

        let items = self.data().unwrap_or(&[]);
        let start = *pos;
        wire::pack_count(items.len(), pos, buf, ctx)?;
        for item in items {
            self.codec.encode(item, pos, buf, ctx);
        }

        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if pos.get() - start.get() != needed {
            return Err(MeshExchangeError::InvariantViolation(format!(
                "codec {} wrote {} bytes for {} elements, expected {needed}",
                self.type_tag(),
                pos.get() - start.get(),
                items.len(),
            )));
        }
        #[cfg(not(any(debug_assertions, feature = "check-invariants")))]
        let _ = start;
        Ok(())
    }

    /// Read a count prefix and that many elements at `pos`, replacing the
    /// attached data. Returns the decoded count.
    ///
    /// A negative count (`CorruptedCount`), a count whose size overflows
    /// (`CountOverflow`) or a buffer too short for the announced elements
    /// (`BufferTooSmall`) leaves both the data and `pos` untouched.
    pub fn decode_collection<C: Communicator + ?Sized>(
        &mut self,
        buf: &[u8],
        pos: &mut Position,
        ctx: &C,
    ) -> Result<usize, MeshExchangeError> {
        wire::ensure_room(buf.len(), *pos, wire::count_prefix_size(ctx))?;
        let mut cursor = *pos;
        let raw = wire::unpack_count(buf, &mut cursor, ctx);
        let count = usize::try_from(raw).map_err(|_| {
            log::warn!("rejecting collection with negative count prefix {raw} at {pos}");
            MeshExchangeError::CorruptedCount(raw)
        })?;

        let body = count
            .checked_mul(self.codec.encoded_size(ctx))
            .ok_or(MeshExchangeError::CountOverflow(count))?;
        wire::ensure_room(buf.len(), cursor, body)?;

        let mut items = match std::mem::take(&mut self.data) {
            Collection::Exclusive(mut v) => {
                v.clear();
                v
            }
            _ => Vec::new(),
        };
        items.reserve_exact(count);
        for _ in 0..count {
            items.push(self.codec.decode(buf, &mut cursor, ctx));
        }
        self.data = Collection::Exclusive(items);
        *pos = cursor;
        Ok(count)
    }

    /// Encode the collection into an exactly sized buffer and send it to `dest`.
    ///
    /// Transport failures are returned as-is, never retried.
    pub fn send<C: Communicator + ?Sized>(
        &self,
        dest: usize,
        tag: CommTag,
        ctx: &C,
    ) -> Result<(), MeshExchangeError> {
        if ctx.is_no_comm() {
            return Err(unavailable("send", &SEND_UNAVAILABLE));
        }
        let num_bytes = self.buffer_size(ctx)?;
        let mut buf = vec![0u8; num_bytes];
        let mut pos = Position::default();
        self.encode_collection(&mut pos, &mut buf, ctx)?;
        log::debug!(
            "[rank {}] send {} x type {} ({num_bytes} bytes) to {dest}, tag {tag}",
            ctx.rank(),
            self.len(),
            self.type_tag(),
        );
        ctx.send(dest, tag, &buf)
    }

    /// Probe for a message from `source`, receive exactly its length, and
    /// decode it into this handler.
    pub fn receive<C: Communicator + ?Sized>(
        &mut self,
        source: usize,
        tag: CommTag,
        ctx: &C,
    ) -> Result<Received, MeshExchangeError> {
        if ctx.is_no_comm() {
            return Err(unavailable("receive", &RECV_UNAVAILABLE));
        }
        let probed = ctx.probe(source, tag)?;
        let mut buf = vec![0u8; probed.len];
        let envelope = ctx.recv(source, tag, &mut buf)?;

        let mut pos = Position::default();
        let count = self.decode_collection(&buf[..envelope.len], &mut pos, ctx)?;
        if pos.get() != envelope.len {
            log::warn!(
                "[rank {}] message from {source} (tag {tag}) has {} trailing bytes after {count} x type {}",
                ctx.rank(),
                envelope.len - pos.get(),
                self.type_tag(),
            );
        }
        log::debug!(
            "[rank {}] received {count} x type {} ({} bytes) from {source}, tag {tag}",
            ctx.rank(),
            self.type_tag(),
            envelope.len,
        );
        Ok(Received { envelope, count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{LocalComm, NoComm};
    use crate::data::codec::ArrayCodec;

    fn encode<T, K: ElementCodec<T>>(h: &DataHandler<T, K>) -> Vec<u8> {
        let mut buf = vec![0u8; h.buffer_size(&NoComm).unwrap()];
        let mut pos = Position::default();
        h.encode_collection(&mut pos, &mut buf, &NoComm).unwrap();
        assert_eq!(pos.get(), buf.len());
        buf
    }

    #[test]
    fn buffer_size_is_prefix_plus_elements() {
        let h = DataHandler::<f64>::new();
        assert_eq!(h.buffer_size(&NoComm), Ok(4));
        assert_eq!(h.buffer_size_for(0, &NoComm), Ok(4));
        assert_eq!(h.buffer_size_for(10, &NoComm), Ok(4 + 80));

        let h = DataHandler::<i32>::from_vec(vec![1, 2, 3]);
        assert_eq!(h.buffer_size(&NoComm), Ok(16));
    }

    #[test]
    fn wire_layout_is_count_then_elements() {
        let h = DataHandler::<i32>::from_vec(vec![7, -1]);
        let bytes = encode(&h);
        assert_eq!(bytes, [2, 0, 0, 0, 7, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn absent_data_encodes_empty() {
        let h = DataHandler::<u16>::new();
        assert_eq!(h.ownership(), Ownership::Absent);
        assert_eq!(encode(&h), [0, 0, 0, 0]);
    }

    #[test]
    fn decode_replaces_contents() {
        let src = DataHandler::<[f64; 3], ArrayCodec<f64, 3>>::from_vec(vec![
            [0.0, 1.0, 2.0],
            [3.0, 4.0, 5.0],
        ]);
        let bytes = encode(&src);

        let mut dst =
            DataHandler::<[f64; 3], ArrayCodec<f64, 3>>::from_vec(vec![[9.0; 3]; 5]);
        let mut pos = Position::default();
        let n = dst.decode_collection(&bytes, &mut pos, &NoComm).unwrap();
        assert_eq!(n, 2);
        assert_eq!(pos.get(), bytes.len());
        assert_eq!(dst.data(), src.data());
        assert_eq!(dst.ownership(), Ownership::Exclusive);
    }

    #[test]
    fn negative_count_is_rejected_without_side_effects() {
        let mut bytes = (-1i32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 8]);
        let mut h = DataHandler::<i32>::from_vec(vec![5, 6]);
        let mut pos = Position::default();
        let err = h.decode_collection(&bytes, &mut pos, &NoComm).unwrap_err();
        assert_eq!(err, MeshExchangeError::CorruptedCount(-1));
        assert_eq!(pos.get(), 0);
        assert_eq!(h.data(), Some(&[5, 6][..]));
    }

    #[test]
    fn short_body_is_rejected_without_side_effects() {
        // announces 3 i32s but carries 2
        let mut bytes = 3i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 8]);
        let mut h = DataHandler::<i32>::new();
        let mut pos = Position::default();
        let err = h.decode_collection(&bytes, &mut pos, &NoComm).unwrap_err();
        assert_eq!(
            err,
            MeshExchangeError::BufferTooSmall {
                needed: 12,
                available: 8
            }
        );
        assert_eq!(h.ownership(), Ownership::Absent);
        assert_eq!(pos.get(), 0);
    }

    #[test]
    fn encode_into_short_buffer_writes_nothing() {
        let h = DataHandler::<u32>::from_vec(vec![1, 2, 3]);
        let mut buf = vec![0xAAu8; 12];
        let mut pos = Position::default();
        let err = h.encode_collection(&mut pos, &mut buf, &NoComm).unwrap_err();
        assert_eq!(
            err,
            MeshExchangeError::BufferTooSmall {
                needed: 16,
                available: 12
            }
        );
        assert!(buf.iter().all(|&b| b == 0xAA));
        assert_eq!(pos.get(), 0);
    }

    #[test]
    fn shared_data_is_not_mutated_by_decode() {
        let shared: Arc<[i64]> = Arc::from(vec![10i64, 20, 30]);
        let reader = DataHandler::<i64>::from_shared(Arc::clone(&shared));
        let mut writer = DataHandler::<i64>::from_shared(Arc::clone(&shared));
        assert_eq!(writer.ownership(), Ownership::Shared);

        let bytes = encode(&DataHandler::<i64>::from_vec(vec![1]));
        let mut pos = Position::default();
        writer.decode_collection(&bytes, &mut pos, &NoComm).unwrap();

        assert_eq!(writer.data(), Some(&[1i64][..]));
        assert_eq!(writer.ownership(), Ownership::Exclusive);
        assert_eq!(reader.data(), Some(&[10i64, 20, 30][..]));
        assert_eq!(&*shared, &[10, 20, 30]);
    }

    #[test]
    fn handlers_pack_back_to_back() {
        let a = DataHandler::<i32>::from_vec(vec![1, 2]);
        let b = DataHandler::<f32>::from_vec(vec![0.5]);
        let mut buf = vec![0u8; a.buffer_size(&NoComm).unwrap() + b.buffer_size(&NoComm).unwrap()];
        let mut pos = Position::default();
        a.encode_collection(&mut pos, &mut buf, &NoComm).unwrap();
        b.encode_collection(&mut pos, &mut buf, &NoComm).unwrap();
        assert_eq!(pos.get(), buf.len());

        let mut ra = DataHandler::<i32>::new();
        let mut rb = DataHandler::<f32>::new();
        let mut pos = Position::default();
        assert_eq!(ra.decode_collection(&buf, &mut pos, &NoComm), Ok(2));
        assert_eq!(rb.decode_collection(&buf, &mut pos, &NoComm), Ok(1));
        assert_eq!(ra.data(), Some(&[1, 2][..]));
        assert_eq!(rb.data(), Some(&[0.5f32][..]));
    }

    #[test]
    fn get_data_copies_out() {
        let h = DataHandler::<u8>::from_slice(&[1, 2, 3]);
        let mut out = vec![9];
        h.get_data(&mut out);
        assert_eq!(out, [1, 2, 3]);

        let mut untouched = vec![9];
        DataHandler::<u8>::new().get_data(&mut untouched);
        assert_eq!(untouched, [9]);
    }

    #[test]
    fn send_and_receive_without_transport() {
        let mut h = DataHandler::<i32>::from_vec(vec![1]);
        assert_eq!(
            h.send(0, CommTag::new(1), &NoComm),
            Err(MeshExchangeError::TransportUnavailable { op: "send" })
        );
        assert_eq!(
            h.receive(0, CommTag::new(1), &NoComm),
            Err(MeshExchangeError::TransportUnavailable { op: "receive" })
        );
        assert_eq!(h.data(), Some(&[1][..]));
    }

    #[test]
    fn send_receive_over_local_comm() {
        let comms = LocalComm::world(2);
        let tag = CommTag::new(0x0D47);
        DataHandler::<u64>::from_vec(vec![3, 1, 4, 1, 5])
            .send(1, tag, &comms[0])
            .unwrap();

        let mut h = DataHandler::<u64>::new();
        let got = h.receive(0, tag, &comms[1]).unwrap();
        assert_eq!(got.count, 5);
        assert_eq!(got.envelope.len, 4 + 5 * 8);
        assert_eq!(h.data(), Some(&[3, 1, 4, 1, 5][..]));
    }

    #[test]
    fn transport_failure_is_propagated() {
        let comms = LocalComm::world(2);
        let err = DataHandler::<i32>::from_vec(vec![1])
            .send(2, CommTag::new(1), &comms[0])
            .unwrap_err();
        assert!(matches!(err, MeshExchangeError::TransportFailure { peer: 2, .. }));
    }

    #[test]
    fn trailing_bytes_after_collection_are_tolerated() {
        let comms = LocalComm::world(2);
        let tag = CommTag::new(0x7A11);
        comms[0]
            .send(1, tag, &[1, 0, 0, 0, 7, 0, 0, 0, 0xEE, 0xEE])
            .unwrap();

        let mut h = DataHandler::<i32>::new();
        let got = h.receive(0, tag, &comms[1]).unwrap();
        assert_eq!(got.count, 1);
        assert_eq!(got.envelope.len, 10);
        assert_eq!(h.data(), Some(&[7][..]));
    }

    /// Claims half the address space per element.
    #[derive(Default)]
    struct Huge;

    impl ElementCodec<u8> for Huge {
        fn encoded_size<C: Communicator + ?Sized>(&self, _ctx: &C) -> usize {
            usize::MAX / 2
        }
        fn encode<C: Communicator + ?Sized>(&self, _: &u8, _: &mut Position, _: &mut [u8], _: &C) {
            unreachable!()
        }
        fn decode<C: Communicator + ?Sized>(&self, _: &[u8], _: &mut Position, _: &C) -> u8 {
            unreachable!()
        }
        fn type_tag(&self) -> TypeTag {
            TypeTag::user(98)
        }
    }

    #[test]
    fn oversized_collections_report_count_overflow() {
        let h = DataHandler::<u8, Huge>::from_vec(vec![1, 2, 3]);
        assert_eq!(h.buffer_size(&NoComm), Err(MeshExchangeError::CountOverflow(3)));
        assert_eq!(h.buffer_size_for(1, &NoComm), Ok(4 + usize::MAX / 2));

        let mut buf = [0u8; 16];
        let mut pos = Position::default();
        assert_eq!(
            h.encode_collection(&mut pos, &mut buf, &NoComm),
            Err(MeshExchangeError::CountOverflow(3))
        );
        assert_eq!(pos.get(), 0);

        let mut sink = DataHandler::<u8, Huge>::new();
        let bytes = 3i32.to_le_bytes();
        assert_eq!(
            sink.decode_collection(&bytes, &mut Position::default(), &NoComm),
            Err(MeshExchangeError::CountOverflow(3))
        );
        assert_eq!(sink.ownership(), Ownership::Absent);

        let n = i32::MAX as usize + 1;
        assert_eq!(
            DataHandler::<u8>::new().buffer_size_for(n, &NoComm),
            Err(MeshExchangeError::CountOverflow(n))
        );
    }

    /// Claims 4 bytes per element but writes 2.
    #[derive(Default)]
    struct ShortWriter;

    impl ElementCodec<u16> for ShortWriter {
        fn encoded_size<C: Communicator + ?Sized>(&self, _ctx: &C) -> usize {
            4
        }
        fn encode<C: Communicator + ?Sized>(
            &self,
            value: &u16,
            pos: &mut Position,
            buf: &mut [u8],
            ctx: &C,
        ) {
            wire::pack(*value, pos, buf, ctx);
        }
        fn decode<C: Communicator + ?Sized>(&self, buf: &[u8], pos: &mut Position, ctx: &C) -> u16 {
            wire::unpack(buf, pos, ctx)
        }
        fn type_tag(&self) -> TypeTag {
            TypeTag::user(99)
        }
    }

    #[cfg(any(debug_assertions, feature = "check-invariants"))]
    #[test]
    fn codec_contract_violation_is_caught() {
        let h = DataHandler::<u16, ShortWriter>::from_vec(vec![1, 2]);
        let mut buf = vec![0u8; h.buffer_size(&NoComm).unwrap()];
        let mut pos = Position::default();
        let err = h.encode_collection(&mut pos, &mut buf, &NoComm).unwrap_err();
        assert!(matches!(err, MeshExchangeError::InvariantViolation(_)));
    }
}
