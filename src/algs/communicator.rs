//! Thin façade over in-process (threads as ranks) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! Every call blocks: `send` returns once the transport owns the bytes,
//! `probe` waits until a matching message is queued, and `recv` copies that
//! message into the caller's buffer. A `probe` must be followed by the `recv`
//! for the same peer and tag; interleaving pairs from several threads on one
//! communicator races.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::algs::wire::PrimitiveKind;
use crate::mesh_error::MeshExchangeError;

/// Typed message tag. Wraps the raw `u16` the backends put on the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommTag(pub u16);

impl CommTag {
    #[inline]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Derive a sibling tag, e.g. one per handler packed into the same epoch.
    #[inline]
    pub const fn offset(self, by: u16) -> Self {
        Self(self.0.wrapping_add(by))
    }
}

impl fmt::Display for CommTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Metadata of a matched incoming message, available before it is consumed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub source: usize,
    pub tag: CommTag,
    /// Exact length of the message in bytes.
    pub len: usize,
}

/// Blocking point-to-point communication interface (minimal by design).
///
/// An implementor is the *communication context*: it fixes the process group
/// and the byte size of each primitive slot.
pub trait Communicator {
    /// Rank of this process within the group.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// `true` when no message-passing backend backs this communicator.
    fn is_no_comm(&self) -> bool {
        false
    }

    /// Bytes needed to pack `count` slots of `kind` under this context.
    ///
    /// Must be at least `count * kind.width()`; a wider slot is zero-padded
    /// by [`wire::pack`](crate::algs::wire::pack). It must depend only on
    /// `count` and `kind`, never on the values being packed.
    fn pack_size(&self, count: usize, kind: PrimitiveKind) -> usize {
        count * kind.width()
    }

    /// Send `buf` to `peer`, blocking until the transport has accepted it.
    fn send(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Result<(), MeshExchangeError>;

    /// Block until a message from `peer` with `tag` is available and describe it.
    fn probe(&self, peer: usize, tag: CommTag) -> Result<Envelope, MeshExchangeError>;

    /// Receive the next message from `peer` with `tag` into `buf`.
    ///
    /// `buf` must be at least as long as the message (see [`Communicator::probe`]).
    fn recv(&self, peer: usize, tag: CommTag, buf: &mut [u8])
    -> Result<Envelope, MeshExchangeError>;
}

fn check_peer(peer: usize, size: usize) -> Result<(), MeshExchangeError> {
    if peer < size {
        Ok(())
    } else {
        Err(MeshExchangeError::TransportFailure {
            peer,
            reason: format!("rank {peer} out of range for a group of {size}"),
        })
    }
}

/// Compile-time no-op comm: the transport is absent from this build.
///
/// Every transport call fails with [`MeshExchangeError::TransportUnavailable`].
#[derive(Copy, Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn is_no_comm(&self) -> bool {
        true
    }

    fn send(&self, _peer: usize, _tag: CommTag, _buf: &[u8]) -> Result<(), MeshExchangeError> {
        Err(MeshExchangeError::TransportUnavailable { op: "send" })
    }

    fn probe(&self, _peer: usize, _tag: CommTag) -> Result<Envelope, MeshExchangeError> {
        Err(MeshExchangeError::TransportUnavailable { op: "probe" })
    }

    fn recv(
        &self,
        _peer: usize,
        _tag: CommTag,
        _buf: &mut [u8],
    ) -> Result<Envelope, MeshExchangeError> {
        Err(MeshExchangeError::TransportUnavailable { op: "recv" })
    }
}

// --- LocalComm: in-process, one thread per rank ---
type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Debug, Default)]
struct Mailbox {
    queues: DashMap<Key, VecDeque<Bytes>>,
    // Bumped on every delivery; receivers sleep on `arrived` between checks.
    generation: Mutex<u64>,
    arrived: Condvar,
}

impl Mailbox {
    fn deliver(&self, key: Key, msg: Bytes) {
        self.queues.entry(key).or_default().push_back(msg);
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.arrived.notify_all();
    }

    /// Block until the queue for `key` is non-empty, then run `f` on it.
    fn wait_for<R>(&self, key: Key, mut f: impl FnMut(&mut VecDeque<Bytes>) -> R) -> R {
        let mut generation = self.generation.lock();
        loop {
            if let Some(mut queue) = self.queues.get_mut(&key) {
                if !queue.is_empty() {
                    return f(&mut queue);
                }
            }
            self.arrived.wait(&mut generation);
        }
    }
}

/// In-process communicator: each rank is a thread sharing one mailbox.
///
/// Delivery is FIFO per `(src, dst, tag)`, matching the ordering guarantee of
/// MPI point-to-point messages.
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl LocalComm {
    /// Build a group of `size` communicators, ranks `0..size`, sharing one mailbox.
    pub fn world(size: usize) -> Vec<LocalComm> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| LocalComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }

    /// Number of messages queued for this rank from `peer` under `tag`.
    pub fn pending(&self, peer: usize, tag: CommTag) -> usize {
        self.mailbox
            .queues
            .get(&(peer, self.rank, tag.as_u16()))
            .map_or(0, |q| q.len())
    }
}

impl fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Result<(), MeshExchangeError> {
        check_peer(peer, self.size)?;
        self.mailbox
            .deliver((self.rank, peer, tag.as_u16()), Bytes::copy_from_slice(buf));
        Ok(())
    }

    fn probe(&self, peer: usize, tag: CommTag) -> Result<Envelope, MeshExchangeError> {
        check_peer(peer, self.size)?;
        let len = self
            .mailbox
            .wait_for((peer, self.rank, tag.as_u16()), |q| q[0].len());
        Ok(Envelope {
            source: peer,
            tag,
            len,
        })
    }

    fn recv(
        &self,
        peer: usize,
        tag: CommTag,
        buf: &mut [u8],
    ) -> Result<Envelope, MeshExchangeError> {
        check_peer(peer, self.size)?;
        let avail = buf.len();
        let msg = self
            .mailbox
            .wait_for((peer, self.rank, tag.as_u16()), |q| {
                // leave an oversized message queued, like a failed MPI_Recv
                if q[0].len() > avail {
                    Err(q[0].len())
                } else {
                    Ok(q.pop_front())
                }
            })
            .map_err(|len| MeshExchangeError::TransportFailure {
                peer,
                reason: format!("message of {len} bytes truncated into {avail}-byte buffer"),
            })?;
        let msg = msg.unwrap_or_default();
        buf[..msg.len()].copy_from_slice(&msg);
        Ok(Envelope {
            source: peer,
            tag,
            len: msg.len(),
        })
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as _, Destination as _, Equivalence as _, Source as _};

    /// Communicator over `MPI_COMM_WORLD`. Dropping it finalizes MPI.
    pub struct MpiComm {
        pub world: SimpleCommunicator,
        rank: usize,
        size: usize,
        // declared last so the world communicator is released before finalize
        _universe: Universe,
    }

    impl MpiComm {
        /// Initialize MPI and wrap the world communicator.
        pub fn new() -> Result<Self, MeshExchangeError> {
            let universe = mpi::initialize().ok_or_else(|| MeshExchangeError::TransportFailure {
                peer: 0,
                reason: "MPI could not be initialized (already initialized?)".into(),
            })?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                world,
                rank,
                size,
                _universe: universe,
            })
        }

        fn mpi_tag(tag: CommTag) -> mpi::Tag {
            mpi::Tag::from(tag.as_u16())
        }
    }

    impl Communicator for MpiComm {
        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn send(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Result<(), MeshExchangeError> {
            check_peer(peer, self.size)?;
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, Self::mpi_tag(tag));
            Ok(())
        }

        fn probe(&self, peer: usize, tag: CommTag) -> Result<Envelope, MeshExchangeError> {
            check_peer(peer, self.size)?;
            let status = self
                .world
                .process_at_rank(peer as i32)
                .probe_with_tag(Self::mpi_tag(tag));
            let count = status.count(u8::equivalent_datatype());
            usize::try_from(count)
                .map(|len| Envelope {
                    source: status.source_rank() as usize,
                    tag,
                    len,
                })
                .map_err(|_| MeshExchangeError::TransportFailure {
                    peer,
                    reason: format!("probe reported undefined byte count {count}"),
                })
        }

        fn recv(
            &self,
            peer: usize,
            tag: CommTag,
            buf: &mut [u8],
        ) -> Result<Envelope, MeshExchangeError> {
            check_peer(peer, self.size)?;
            let status = self
                .world
                .process_at_rank(peer as i32)
                .receive_into_with_tag(buf, Self::mpi_tag(tag));
            let count = status.count(u8::equivalent_datatype());
            usize::try_from(count)
                .map(|len| Envelope {
                    source: status.source_rank() as usize,
                    tag,
                    len,
                })
                .map_err(|_| MeshExchangeError::TransportFailure {
                    peer,
                    reason: format!("receive reported undefined byte count {count}"),
                })
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
