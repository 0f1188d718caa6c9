//! Fixed-width, little-endian wire primitives and the count prefix.
//!
//! A [`Position`] is a cursor threaded through every pack/unpack call. It is
//! deliberately not owned by the buffer, so the outputs of several handlers
//! can be laid out back to back in one physical buffer.
//!
//! Slot sizes come from the [`Communicator`]: a context may report a slot
//! wider than the value, in which case the tail is zero-filled.

use bytes::{Buf, BufMut};
use std::fmt;

use crate::algs::communicator::Communicator;
use crate::mesh_error::MeshExchangeError;

/// Byte offset into a pack/unpack buffer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position(usize);

impl Position {
    #[inline]
    pub const fn new(at: usize) -> Self {
        Self(at)
    }

    #[inline]
    pub const fn get(self) -> usize {
        self.0
    }

    #[inline]
    pub fn advance(&mut self, by: usize) {
        self.0 += by;
    }
}

impl From<Position> for usize {
    fn from(p: Position) -> usize {
        p.0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Primitive slot kinds the transport knows how to pack.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PrimitiveKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl PrimitiveKind {
    /// Native width in bytes.
    pub const fn width(self) -> usize {
        match self {
            PrimitiveKind::I8 | PrimitiveKind::U8 => 1,
            PrimitiveKind::I16 | PrimitiveKind::U16 => 2,
            PrimitiveKind::I32 | PrimitiveKind::U32 | PrimitiveKind::F32 => 4,
            PrimitiveKind::I64 | PrimitiveKind::U64 | PrimitiveKind::F64 => 8,
        }
    }

    /// Stable small integer identifying the kind; never reuse a retired code.
    pub const fn code(self) -> i32 {
        match self {
            PrimitiveKind::I8 => 1,
            PrimitiveKind::U8 => 2,
            PrimitiveKind::I16 => 3,
            PrimitiveKind::U16 => 4,
            PrimitiveKind::I32 => 5,
            PrimitiveKind::U32 => 6,
            PrimitiveKind::I64 => 7,
            PrimitiveKind::U64 => 8,
            PrimitiveKind::F32 => 9,
            PrimitiveKind::F64 => 10,
        }
    }

    /// Returns a stable string label for the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            PrimitiveKind::I8 => "i8",
            PrimitiveKind::U8 => "u8",
            PrimitiveKind::I16 => "i16",
            PrimitiveKind::U16 => "u16",
            PrimitiveKind::I32 => "i32",
            PrimitiveKind::U32 => "u32",
            PrimitiveKind::I64 => "i64",
            PrimitiveKind::U64 => "u64",
            PrimitiveKind::F32 => "f32",
            PrimitiveKind::F64 => "f64",
        }
    }
}

/// A numeric type with a fixed little-endian wire representation.
pub trait Primitive: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    const KIND: PrimitiveKind;

    /// Write `KIND.width()` little-endian bytes into the front of `out`.
    fn put(self, out: &mut [u8]);

    /// Read `KIND.width()` little-endian bytes from the front of `src`.
    fn get(src: &[u8]) -> Self;
}

macro_rules! impl_primitive {
    ($($t:ty => $kind:ident, $put:ident, $get:ident;)*) => {$(
        impl Primitive for $t {
            const KIND: PrimitiveKind = PrimitiveKind::$kind;
            #[inline]
            fn put(self, mut out: &mut [u8]) {
                out.$put(self);
            }
            #[inline]
            fn get(mut src: &[u8]) -> Self {
                src.$get()
            }
        }
    )*};
}

impl_primitive! {
    i8 => I8, put_i8, get_i8;
    u8 => U8, put_u8, get_u8;
    i16 => I16, put_i16_le, get_i16_le;
    u16 => U16, put_u16_le, get_u16_le;
    i32 => I32, put_i32_le, get_i32_le;
    u32 => U32, put_u32_le, get_u32_le;
    i64 => I64, put_i64_le, get_i64_le;
    u64 => U64, put_u64_le, get_u64_le;
    f32 => F32, put_f32_le, get_f32_le;
    f64 => F64, put_f64_le, get_f64_le;
}

const _: () = {
    assert!(PrimitiveKind::I32.width() == size_of::<i32>());
    assert!(PrimitiveKind::U64.width() == size_of::<u64>());
    assert!(PrimitiveKind::F64.width() == size_of::<f64>());
};

/// Pack one primitive at `pos`, advancing it by `ctx.pack_size(1, P::KIND)`.
///
/// The caller must have checked that the slot fits; out-of-range writes panic.
/// Debug builds also reject a context whose slot is narrower than the value.
#[inline]
pub fn pack<P, C>(value: P, pos: &mut Position, buf: &mut [u8], ctx: &C)
where
    P: Primitive,
    C: Communicator + ?Sized,
{
    let slot = ctx.pack_size(1, P::KIND);
    let width = P::KIND.width();
    debug_assert!(slot >= width, "pack_size({}) = {slot} is narrower than {width}", P::KIND.as_str());
    let dst = &mut buf[pos.get()..pos.get() + slot];
    value.put(&mut dst[..width]);
    dst[width..].fill(0);
    pos.advance(slot);
}

/// Unpack one primitive at `pos`, advancing it by `ctx.pack_size(1, P::KIND)`.
#[inline]
pub fn unpack<P, C>(buf: &[u8], pos: &mut Position, ctx: &C) -> P
where
    P: Primitive,
    C: Communicator + ?Sized,
{
    let slot = ctx.pack_size(1, P::KIND);
    debug_assert!(
        slot >= P::KIND.width(),
        "pack_size({}) = {slot} is narrower than {}",
        P::KIND.as_str(),
        P::KIND.width()
    );
    let value = P::get(&buf[pos.get()..pos.get() + P::KIND.width()]);
    pos.advance(slot);
    value
}

/// Size in bytes of the element-count header.
#[inline]
pub fn count_prefix_size<C: Communicator + ?Sized>(ctx: &C) -> usize {
    ctx.pack_size(1, PrimitiveKind::I32)
}

/// Pack an element count as the signed 4-byte prefix.
pub fn pack_count<C: Communicator + ?Sized>(
    n: usize,
    pos: &mut Position,
    buf: &mut [u8],
    ctx: &C,
) -> Result<(), MeshExchangeError> {
    let n = i32::try_from(n).map_err(|_| MeshExchangeError::CountOverflow(n))?;
    pack(n, pos, buf, ctx);
    Ok(())
}

/// Unpack the raw count prefix. Negative values are returned as-is so the
/// caller can reject them.
#[inline]
pub fn unpack_count<C: Communicator + ?Sized>(buf: &[u8], pos: &mut Position, ctx: &C) -> i32 {
    unpack(buf, pos, ctx)
}

/// Fail unless `needed` bytes fit between `pos` and the end of a `len`-byte buffer.
pub fn ensure_room(len: usize, pos: Position, needed: usize) -> Result<(), MeshExchangeError> {
    let available = len.saturating_sub(pos.get());
    if available >= needed {
        Ok(())
    } else {
        Err(MeshExchangeError::BufferTooSmall { needed, available })
    }
}
