#![allow(dead_code)]
use mesh_exchange::algs::communicator::{CommTag, Communicator, Envelope, LocalComm};
use mesh_exchange::algs::wire::{Position, PrimitiveKind};
use mesh_exchange::data::codec::ElementCodec;
use mesh_exchange::data::handler::DataHandler;
use mesh_exchange::mesh_error::MeshExchangeError;
use std::thread;

/// `(send_to, recv_from)` for a ring of `size` ranks.
pub fn ring_neighbors(rank: usize, size: usize) -> (usize, usize) {
    ((rank + 1) % size, (rank + size - 1) % size)
}

/// Run `f` once per rank of a fresh `LocalComm` world, one thread each.
/// Panics in any rank fail the calling test.
pub fn run_ranks<F>(size: usize, f: F)
where
    F: Fn(&LocalComm) + Sync,
{
    let comms = LocalComm::world(size);
    let f = &f;
    thread::scope(|s| {
        for comm in &comms {
            s.spawn(move || f(comm));
        }
    });
}

/// Encode a handler into an exactly sized buffer.
pub fn encode_to_vec<T, K, C>(h: &DataHandler<T, K>, ctx: &C) -> Vec<u8>
where
    K: ElementCodec<T>,
    C: Communicator,
{
    let mut buf = vec![0u8; h.buffer_size(ctx).expect("collection too large to size")];
    let mut pos = Position::default();
    h.encode_collection(&mut pos, &mut buf, ctx)
        .expect("encode into exactly sized buffer");
    assert_eq!(pos.get(), buf.len(), "encode must fill the buffer exactly");
    buf
}

/// Local-only context whose primitive slots are padded to 8 bytes,
/// so sizes differ from the native widths.
#[derive(Clone, Copy, Debug, Default)]
pub struct Padded8;

impl Communicator for Padded8 {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn pack_size(&self, count: usize, _kind: PrimitiveKind) -> usize {
        count * 8
    }

    fn send(&self, peer: usize, _tag: CommTag, _buf: &[u8]) -> Result<(), MeshExchangeError> {
        Err(MeshExchangeError::TransportFailure {
            peer,
            reason: "Padded8 is pack-only".into(),
        })
    }

    fn probe(&self, peer: usize, _tag: CommTag) -> Result<Envelope, MeshExchangeError> {
        Err(MeshExchangeError::TransportFailure {
            peer,
            reason: "Padded8 is pack-only".into(),
        })
    }

    fn recv(
        &self,
        peer: usize,
        _tag: CommTag,
        _buf: &mut [u8],
    ) -> Result<Envelope, MeshExchangeError> {
        Err(MeshExchangeError::TransportFailure {
            peer,
            reason: "Padded8 is pack-only".into(),
        })
    }
}
