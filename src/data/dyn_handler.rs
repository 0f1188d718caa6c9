//! Type-erased handler interface and an open registry keyed by [`TypeTag`].
//!
//! `AbstractDataHandler<C>` lets a caller keep handlers for different element
//! types behind one `Box<dyn ...>`, dispatch on [`AbstractDataHandler::type_tag`],
//! and downcast back to the concrete [`DataHandler`] once the type is known.

use std::any::Any;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::wire::Position;
use crate::data::codec::{ElementCodec, TypeTag};
use crate::data::handler::{DataHandler, Received};
use crate::mesh_error::MeshExchangeError;

/// Object-safe view of a [`DataHandler`] under communication context `C`.
pub trait AbstractDataHandler<C: Communicator + ?Sized> {
    /// Exact bytes needed to encode the attached collection.
    fn buffer_size(&self, ctx: &C) -> Result<usize, MeshExchangeError>;

    /// Encode the count prefix and elements at `pos`.
    fn encode_collection(
        &self,
        pos: &mut Position,
        buf: &mut [u8],
        ctx: &C,
    ) -> Result<(), MeshExchangeError>;

    /// Decode a count prefix and elements at `pos`, returning the count.
    fn decode_collection(
        &mut self,
        buf: &[u8],
        pos: &mut Position,
        ctx: &C,
    ) -> Result<usize, MeshExchangeError>;

    fn send(&self, dest: usize, tag: CommTag, ctx: &C) -> Result<(), MeshExchangeError>;

    fn receive(
        &mut self,
        source: usize,
        tag: CommTag,
        ctx: &C,
    ) -> Result<Received, MeshExchangeError>;

    fn type_tag(&self) -> TypeTag;

    /// Number of attached elements.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<C, T, K> AbstractDataHandler<C> for DataHandler<T, K>
where
    C: Communicator + ?Sized,
    T: 'static,
    K: ElementCodec<T> + 'static,
{
    fn buffer_size(&self, ctx: &C) -> Result<usize, MeshExchangeError> {
        DataHandler::buffer_size(self, ctx)
    }

    fn encode_collection(
        &self,
        pos: &mut Position,
        buf: &mut [u8],
        ctx: &C,
    ) -> Result<(), MeshExchangeError> {
        DataHandler::encode_collection(self, pos, buf, ctx)
    }

    fn decode_collection(
        &mut self,
        buf: &[u8],
        pos: &mut Position,
        ctx: &C,
    ) -> Result<usize, MeshExchangeError> {
        DataHandler::decode_collection(self, buf, pos, ctx)
    }

    fn send(&self, dest: usize, tag: CommTag, ctx: &C) -> Result<(), MeshExchangeError> {
        DataHandler::send(self, dest, tag, ctx)
    }

    fn receive(
        &mut self,
        source: usize,
        tag: CommTag,
        ctx: &C,
    ) -> Result<Received, MeshExchangeError> {
        DataHandler::receive(self, source, tag, ctx)
    }

    fn type_tag(&self) -> TypeTag {
        DataHandler::type_tag(self)
    }

    fn len(&self) -> usize {
        DataHandler::len(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<C: Communicator + ?Sized> dyn AbstractDataHandler<C> {
    /// Recover the concrete handler after dispatching on the type tag.
    pub fn downcast_ref<T: 'static, K: 'static>(&self) -> Option<&DataHandler<T, K>> {
        self.as_any().downcast_ref()
    }

    pub fn downcast_mut<T: 'static, K: 'static>(&mut self) -> Option<&mut DataHandler<T, K>> {
        self.as_any_mut().downcast_mut()
    }
}

type Factory<C> = fn() -> Box<dyn AbstractDataHandler<C>>;

fn make_empty<C, T, K>() -> Box<dyn AbstractDataHandler<C>>
where
    C: Communicator + ?Sized,
    T: 'static,
    K: ElementCodec<T> + 'static,
{
    Box::new(DataHandler::<T, K>::new())
}

/// Open set of element types that may arrive on a channel, keyed by tag.
pub struct HandlerRegistry<C: Communicator + ?Sized> {
    factories: BTreeMap<TypeTag, Factory<C>>,
}

impl<C: Communicator + ?Sized> Default for HandlerRegistry<C> {
    fn default() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }
}

impl<C: Communicator + ?Sized> fmt::Debug for HandlerRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl<C: Communicator + ?Sized> HandlerRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `DataHandler<T, K>` under the tag its codec reports.
    pub fn register<T, K>(&mut self) -> Result<TypeTag, MeshExchangeError>
    where
        T: 'static,
        K: ElementCodec<T> + 'static,
    {
        let tag = K::default().type_tag();
        match self.factories.entry(tag) {
            Entry::Vacant(slot) => {
                slot.insert(make_empty::<C, T, K>);
                Ok(tag)
            }
            Entry::Occupied(_) => Err(MeshExchangeError::DuplicateTypeTag(tag.as_i32())),
        }
    }

    /// A fresh, empty handler for `tag`.
    pub fn create(
        &self,
        tag: TypeTag,
    ) -> Result<Box<dyn AbstractDataHandler<C>>, MeshExchangeError> {
        self.factories
            .get(&tag)
            .map(|make| make())
            .ok_or(MeshExchangeError::UnknownTypeTag(tag.as_i32()))
    }

    /// Create the handler for `type_tag` and receive one message into it.
    pub fn receive_as(
        &self,
        type_tag: TypeTag,
        source: usize,
        tag: CommTag,
        ctx: &C,
    ) -> Result<(Box<dyn AbstractDataHandler<C>>, Received), MeshExchangeError> {
        let mut handler = self.create(type_tag)?;
        let received = handler.receive(source, tag, ctx)?;
        Ok((handler, received))
    }

    pub fn contains(&self, tag: TypeTag) -> bool {
        self.factories.contains_key(&tag)
    }

    /// Registered tags in ascending order.
    pub fn tags(&self) -> impl Iterator<Item = TypeTag> + '_ {
        self.factories.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
