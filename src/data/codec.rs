//! Element codecs: per-type strategies for packing one value.
//!
//! A codec's `encoded_size` depends on the communication context only, never
//! on the value, so a handler can size a whole collection without visiting
//! its elements.

use std::fmt;
use std::marker::PhantomData;

use bytemuck::Pod;

use crate::algs::communicator::Communicator;
use crate::algs::wire::{self, Position, Primitive, PrimitiveKind};

/// Stable small integer identifying an element type on a channel.
///
/// Tags live in three disjoint bands:
///
/// | band    | range                              | built by            |
/// |---------|------------------------------------|---------------------|
/// | scalar  | `1..=10`                           | [`TypeTag::scalar`] |
/// | array   | `0x11..USER_BASE`, `(N << 4) \| code` | [`TypeTag::array`]  |
/// | user    | `USER_BASE..=i32::MAX`             | [`TypeTag::user`]   |
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(pub i32);

impl TypeTag {
    /// First tag available to application codecs.
    pub const USER_BASE: i32 = 0x4000_0000;

    /// Largest `N` an `[P; N]` array tag can carry.
    pub const ARRAY_MAX_LEN: usize = (Self::USER_BASE as usize >> 4) - 1;

    /// Largest `n` accepted by [`TypeTag::user`].
    pub const USER_MAX: i32 = i32::MAX - Self::USER_BASE;

    #[inline]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Tag of a single primitive value.
    pub const fn scalar(kind: PrimitiveKind) -> Self {
        Self(kind.code())
    }

    /// Tag of `[kind; n]`, or `None` unless `1 <= n <= ARRAY_MAX_LEN`.
    pub const fn checked_array(kind: PrimitiveKind, n: usize) -> Option<Self> {
        if n == 0 || n > Self::ARRAY_MAX_LEN {
            return None;
        }
        Some(Self(((n as i32) << 4) | kind.code()))
    }

    /// Tag of a fixed-size array `[kind; n]`.
    ///
    /// # Panics
    /// If `n` is outside `1..=ARRAY_MAX_LEN`. In a const context this is a
    /// compile error.
    pub const fn array(kind: PrimitiveKind, n: usize) -> Self {
        match Self::checked_array(kind, n) {
            Some(tag) => tag,
            None => panic!("array length outside the array tag band"),
        }
    }

    /// Tag for application codec `n`, or `None` unless `0 <= n <= USER_MAX`.
    pub const fn checked_user(n: i32) -> Option<Self> {
        if n < 0 || n > Self::USER_MAX {
            return None;
        }
        Some(Self(Self::USER_BASE + n))
    }

    /// Tag for application codec number `n`.
    ///
    /// # Panics
    /// If `n` is outside `0..=USER_MAX`. In a const context this is a compile
    /// error.
    pub const fn user(n: i32) -> Self {
        match Self::checked_user(n) {
            Some(tag) => tag,
            None => panic!("user codec number outside the user tag band"),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Size/encode/decode strategy for one value of `T`.
///
/// `encode` must write exactly `encoded_size(ctx)` bytes at `pos` and advance
/// it by that amount; `decode` is its inverse. Neither re-validates bounds: the
/// caller sized the buffer beforehand.
pub trait ElementCodec<T>: Default {
    /// Bytes needed for one `T` under `ctx`.
    fn encoded_size<C: Communicator + ?Sized>(&self, ctx: &C) -> usize;

    fn encode<C: Communicator + ?Sized>(
        &self,
        value: &T,
        pos: &mut Position,
        buf: &mut [u8],
        ctx: &C,
    );

    fn decode<C: Communicator + ?Sized>(&self, buf: &[u8], pos: &mut Position, ctx: &C) -> T;

    fn type_tag(&self) -> TypeTag;
}

/// Codec for a single primitive value.
pub struct ScalarCodec<P>(PhantomData<fn() -> P>);

impl<P> Default for ScalarCodec<P> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<P> Clone for ScalarCodec<P> {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl<P> fmt::Debug for ScalarCodec<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScalarCodec")
    }
}

impl<P: Primitive> ElementCodec<P> for ScalarCodec<P> {
    #[inline]
    fn encoded_size<C: Communicator + ?Sized>(&self, ctx: &C) -> usize {
        ctx.pack_size(1, P::KIND)
    }

    #[inline]
    fn encode<C: Communicator + ?Sized>(&self, value: &P, pos: &mut Position, buf: &mut [u8], ctx: &C) {
        wire::pack(*value, pos, buf, ctx);
    }

    #[inline]
    fn decode<C: Communicator + ?Sized>(&self, buf: &[u8], pos: &mut Position, ctx: &C) -> P {
        wire::unpack(buf, pos, ctx)
    }

    fn type_tag(&self) -> TypeTag {
        TypeTag::scalar(P::KIND)
    }
}

/// Codec for fixed-size arrays such as `[f64; 3]` coordinates.
pub struct ArrayCodec<P, const N: usize>(PhantomData<fn() -> P>);

impl<P, const N: usize> Default for ArrayCodec<P, N> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<P, const N: usize> Clone for ArrayCodec<P, N> {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl<P, const N: usize> fmt::Debug for ArrayCodec<P, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArrayCodec<{N}>")
    }
}

impl<P: Primitive, const N: usize> ArrayCodec<P, N> {
    // evaluated per instantiation: an out-of-band `N` fails to compile
    const TYPE_TAG: TypeTag = TypeTag::array(P::KIND, N);
}

impl<P: Primitive, const N: usize> ElementCodec<[P; N]> for ArrayCodec<P, N> {
    fn encoded_size<C: Communicator + ?Sized>(&self, ctx: &C) -> usize {
        ctx.pack_size(N, P::KIND)
    }

    fn encode<C: Communicator + ?Sized>(
        &self,
        value: &[P; N],
        pos: &mut Position,
        buf: &mut [u8],
        ctx: &C,
    ) {
        for &v in value {
            wire::pack(v, pos, buf, ctx);
        }
    }

    fn decode<C: Communicator + ?Sized>(&self, buf: &[u8], pos: &mut Position, ctx: &C) -> [P; N] {
        let mut out = [P::default(); N];
        for slot in out.iter_mut() {
            *slot = wire::unpack(buf, pos, ctx);
        }
        out
    }

    fn type_tag(&self) -> TypeTag {
        Self::TYPE_TAG
    }
}

/// Raw-bytes codec for `#[repr(C)]` plain-old-data records.
///
/// The record travels in native byte order and layout, so sender and receiver
/// must share both. `TAG` is added to [`TypeTag::USER_BASE`] and must lie in
/// `0..=TypeTag::USER_MAX`; anything else fails to compile.
pub struct PodCodec<T, const TAG: i32>(PhantomData<fn() -> T>);

impl<T, const TAG: i32> Default for PodCodec<T, TAG> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T, const TAG: i32> Clone for PodCodec<T, TAG> {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl<T, const TAG: i32> fmt::Debug for PodCodec<T, TAG> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PodCodec<{TAG}>")
    }
}

impl<T: Pod, const TAG: i32> PodCodec<T, TAG> {
    const TYPE_TAG: TypeTag = TypeTag::user(TAG);
}

impl<T: Pod, const TAG: i32> ElementCodec<T> for PodCodec<T, TAG> {
    fn encoded_size<C: Communicator + ?Sized>(&self, ctx: &C) -> usize {
        ctx.pack_size(size_of::<T>(), PrimitiveKind::U8)
    }

    fn encode<C: Communicator + ?Sized>(&self, value: &T, pos: &mut Position, buf: &mut [u8], ctx: &C) {
        let slot = self.encoded_size(ctx);
        let bytes = bytemuck::bytes_of(value);
        debug_assert!(slot >= bytes.len(), "pack_size narrower than the record");
        let dst = &mut buf[pos.get()..pos.get() + slot];
        dst[..bytes.len()].copy_from_slice(bytes);
        dst[bytes.len()..].fill(0);
        pos.advance(slot);
    }

    fn decode<C: Communicator + ?Sized>(&self, buf: &[u8], pos: &mut Position, ctx: &C) -> T {
        let slot = self.encoded_size(ctx);
        let value = bytemuck::pod_read_unaligned(&buf[pos.get()..pos.get() + size_of::<T>()]);
        pos.advance(slot);
        value
    }

    fn type_tag(&self) -> TypeTag {
        Self::TYPE_TAG
    }
}
