//! The runtime context threaded through every host call
//!
//! [`Runtime`] owns the persisted [`Store`], the ownership records, the
//! call stack and the outstanding references. There is no global state:
//! the host evaluator holds one `Runtime` and passes it by `&mut` into
//! every operation.
//!
//! Storage, links, references, destruction and transactions extend
//! `Runtime` from their own modules.

use crate::config::RuntimeConfig;
use crate::container;
use crate::error::{VaultError, VaultResult};
use crate::ownership::{walk_owned, Binding, FrameStack, Location, OwnershipState, OwnershipTracker};
use crate::reference::ReferenceManager;
use crate::storage::{Store, StoredEntry};
use crate::txn::Transaction;
use tracing::{debug, warn};
use vault_val::{
    Address, CompositeKind, FrameId, Linear, RefTarget, Resource, ResourceId, Struct,
    TypeRegistry, Value, ValueKey, VaultStr,
};

pub struct Runtime {
    pub(crate) config: RuntimeConfig,
    pub(crate) types: TypeRegistry,
    pub(crate) store: Store,
    pub(crate) tracker: OwnershipTracker,
    pub(crate) frames: FrameStack,
    pub(crate) refs: ReferenceManager,
    pub(crate) txn: Option<Transaction>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig, types: TypeRegistry) -> Self {
        Self::from_store(Store::new(), config, types)
    }

    /// Resume from persisted state. Every resource found in the store is
    /// recorded as owned by the path (or field) holding it.
    pub fn from_store(store: Store, config: RuntimeConfig, types: TypeRegistry) -> Self {
        let mut tracker = OwnershipTracker::new();
        for (address, path, entry) in store.entries() {
            if let StoredEntry::Value(value) = entry {
                walk_owned(value, &Location::storage(address, path), &mut |id, at| {
                    tracker.adopt(id, at)
                });
            }
        }
        debug!(resources = tracker.len(), "runtime loaded");
        Self {
            config,
            types,
            store,
            tracker,
            frames: FrameStack::new(),
            refs: ReferenceManager::new(),
            txn: None,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Hand the store back, e.g. to persist it after the last commit
    pub fn into_store(self) -> Store {
        self.store
    }

    pub fn ownership(&self, id: ResourceId) -> Option<&OwnershipState> {
        self.tracker.state(id)
    }

    /// Identities with an ownership record, live or destroyed in the
    /// running transaction
    pub fn tracked_resources(&self) -> usize {
        self.tracker.len()
    }

    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    pub fn current_frame(&self) -> Option<FrameId> {
        self.frames.current()
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.depth()
    }

    /// Poison the running transaction when `result` carries a fatal error.
    /// The host may still discard the error, but the transaction can no
    /// longer commit.
    pub(crate) fn guard<T>(&mut self, result: VaultResult<T>) -> VaultResult<T> {
        if let Err(err) = &result {
            if err.is_fatal() {
                if let Some(txn) = self.txn.as_mut() {
                    if txn.poisoned.is_none() {
                        warn!(error = %err, "fatal error, transaction poisoned");
                        txn.poisoned = Some(err.to_string());
                    }
                }
            }
        }
        result
    }

    pub(crate) fn require_txn(&self) -> VaultResult<&Transaction> {
        self.txn.as_ref().ok_or(VaultError::NoTransaction)
    }

    /// Private data of `address` is only reachable with its authority
    pub(crate) fn require_authority(&self, address: Address) -> VaultResult<()> {
        let txn = self.require_txn()?;
        if !self.config.enforce_authority || txn.signers.contains(&address) {
            Ok(())
        } else {
            Err(VaultError::Unauthorized { address })
        }
    }

    fn ensure_not_borrowed(&self, target: RefTarget) -> VaultResult<()> {
        if self.refs.is_borrowed(&target) {
            Err(VaultError::AlreadyBorrowed {
                target: target.to_string(),
            })
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Construct a resource of a declared resource type. The new resource
    /// is in flight; linear field values move into it.
    pub fn create_resource<I, K>(&mut self, type_name: &str, fields: I) -> VaultResult<Value>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<VaultStr>,
    {
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let result = self.new_resource(type_name, fields);
        self.guard(result)
    }

    fn new_resource(&mut self, type_name: &str, fields: Vec<(VaultStr, Value)>) -> VaultResult<Value> {
        self.require_txn()?;
        match self.types.composite(type_name) {
            Some(info) if info.kind == CompositeKind::Resource => {}
            _ => {
                return Err(VaultError::UnknownType {
                    name: type_name.to_string(),
                })
            }
        }
        for (_, value) in &fields {
            for id in value.root_ids() {
                self.tracker.expect_in_flight(id)?;
            }
        }

        let id = self.tracker.mint();
        for (name, value) in &fields {
            self.tracker
                .settle_value(value, &Location::field(id, name.clone()))?;
        }
        debug!(id = %id, ty = type_name, "created resource");
        Ok(Value::Resource(Resource::new(id, type_name, fields)))
    }

    /// Construct a value of a declared struct type
    pub fn create_struct<I, K>(&mut self, type_name: &str, fields: I) -> VaultResult<Value>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<VaultStr>,
    {
        let result = match self.types.composite(type_name) {
            Some(info) if info.kind == CompositeKind::Struct => Struct::new(type_name, fields)
                .map(Value::Struct)
                .map_err(VaultError::from),
            _ => Err(VaultError::UnknownType {
                name: type_name.to_string(),
            }),
        };
        self.guard(result)
    }

    // ========================================================================
    // Frames
    // ========================================================================

    pub fn push_frame(&mut self) -> VaultResult<FrameId> {
        let result = match self.require_txn() {
            Ok(_) => self.frames.push(self.config.max_frame_depth),
            Err(err) => Err(err),
        };
        if let Ok(frame) = &result {
            debug!(frame = %frame, depth = self.frames.depth(), "push frame");
        }
        self.guard(result)
    }

    /// Leave `frame`. References it created are released, then every
    /// resource still bound to one of its locals is reported as
    /// `UnhandledResource`. The frame is gone either way.
    pub fn pop_frame(&mut self, frame: FrameId) -> VaultResult<()> {
        let result = self.exit_frame(frame);
        self.guard(result)
    }

    fn exit_frame(&mut self, frame: FrameId) -> VaultResult<()> {
        self.frames.pop(frame)?;
        let released = self.refs.release_frame(frame);
        debug!(frame = %frame, released, "pop frame");

        if let Some((id, at)) = self.tracker.held_in_frame(frame).into_iter().next() {
            return Err(VaultError::UnhandledResource {
                id,
                at: at.to_string(),
            });
        }
        Ok(())
    }

    /// Run `body` in a fresh frame. The frame (and anything `body` left
    /// above it) is popped even when `body` fails; the body's error wins.
    pub fn with_frame<T>(
        &mut self,
        body: impl FnOnce(&mut Self, FrameId) -> VaultResult<T>,
    ) -> VaultResult<T> {
        let frame = self.push_frame()?;
        let result = body(self, frame);
        let unwound = self.unwind_to(frame);
        let value = result?;
        unwound?;
        Ok(value)
    }

    /// Pop frames down to and including `frame`, keeping the first error
    pub(crate) fn unwind_to(&mut self, frame: FrameId) -> VaultResult<()> {
        if !self.frames.contains(frame) {
            let err = VaultError::FrameMismatch {
                expected: frame.to_string(),
                found: self
                    .frames
                    .current()
                    .map_or_else(|| "no frame".to_string(), |f| f.to_string()),
            };
            return self.guard(Err(err));
        }
        let mut first_err = None;
        while let Some(top) = self.frames.current() {
            if let Err(err) = self.pop_frame(top) {
                first_err.get_or_insert(err);
            }
            if top == frame {
                break;
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    // ========================================================================
    // Locals
    // ========================================================================

    /// Bind `value` to a local of `frame`. Linear roots of the value move
    /// into the binding; overwriting a binding that still owns a resource
    /// is a `ResourceLoss`.
    pub fn bind(&mut self, frame: FrameId, name: &str, value: Value) -> VaultResult<()> {
        let result = self.bind_local(frame, name, value);
        self.guard(result)
    }

    fn bind_local(&mut self, frame: FrameId, name: &str, value: Value) -> VaultResult<()> {
        self.require_txn()?;
        self.ensure_not_borrowed(RefTarget::Local {
            frame,
            name: name.into(),
        })?;
        let at = Location::local(frame, name);
        let locals = &mut self.frames.get_mut(frame)?.locals;
        if let Some(Binding::Live(old)) = locals.get(name) {
            if let Some(id) = old.root_ids().into_iter().next() {
                return Err(VaultError::ResourceLoss { id, at });
            }
        }
        self.tracker.settle_value(&value, &at)?;
        debug!(at = %at, kind = value.kind_name(), "bind local");
        locals.insert(name.into(), Binding::Live(value));
        Ok(())
    }

    /// Move a value out of a local. Linear values leave the binding
    /// unreadable; copyable values are duplicated and the binding stays.
    pub fn take(&mut self, frame: FrameId, name: &str) -> VaultResult<Value> {
        let result = self.take_local(frame, name);
        self.guard(result)
    }

    fn take_local(&mut self, frame: FrameId, name: &str) -> VaultResult<Value> {
        self.require_txn()?;
        let target = RefTarget::Local {
            frame,
            name: name.into(),
        };
        let borrowed = self.refs.is_borrowed(&target);
        let locals = &mut self.frames.get_mut(frame)?.locals;
        let value = match locals.get(name) {
            Some(Binding::Live(value)) => value,
            Some(Binding::Moved) => return Err(VaultError::UseAfterMove { name: name.into() }),
            None => return Err(VaultError::UnknownBinding { name: name.into() }),
        };
        if !value.is_linear() {
            return Ok(value.duplicate()?);
        }
        if borrowed {
            return Err(VaultError::AlreadyBorrowed {
                target: target.to_string(),
            });
        }
        self.tracker
            .release_value(value, &Location::local(frame, name))?;
        match locals.insert(name.into(), Binding::Moved) {
            Some(Binding::Live(value)) => Ok(value),
            _ => Err(VaultError::UseAfterMove { name: name.into() }),
        }
    }

    /// Read a local without moving it
    pub fn local(&mut self, frame: FrameId, name: &str) -> VaultResult<&Value> {
        let check = self
            .frames
            .get(frame)
            .and_then(|f| f.get(name))
            .map(|_| ());
        if let Err(err) = check {
            return self.guard(Err(err));
        }
        self.frames.get(frame)?.get(name)
    }

    /// Duplicate a copyable local
    pub fn copy_local(&mut self, frame: FrameId, name: &str) -> VaultResult<Value> {
        let result = self
            .frames
            .get(frame)
            .and_then(|f| f.get(name))
            .and_then(|value| value.duplicate().map_err(VaultError::from));
        self.guard(result)
    }

    /// `to = from` within one frame
    pub fn assign(&mut self, frame: FrameId, from: &str, to: &str) -> VaultResult<()> {
        self.pass(frame, from, frame, to)
    }

    /// Pass the local `arg` of `caller` as parameter `param` of `callee`
    pub fn pass(
        &mut self,
        caller: FrameId,
        arg: &str,
        callee: FrameId,
        param: &str,
    ) -> VaultResult<()> {
        let value = self.take(caller, arg)?;
        self.bind(callee, param, value)
    }

    // ========================================================================
    // Containers held in locals
    // ========================================================================

    /// Insert `value` into the array or dictionary bound to `name`
    pub fn insert(
        &mut self,
        frame: FrameId,
        name: &str,
        key: ValueKey,
        value: Value,
    ) -> VaultResult<()> {
        let result = self.with_local_container(frame, name, |tracker, container, at| {
            container::insert(tracker, container, at, name, key, value)
        });
        self.guard(result)
    }

    /// Append `value` to the array bound to `name`
    pub fn push(&mut self, frame: FrameId, name: &str, value: Value) -> VaultResult<()> {
        let result = self.with_local_container(frame, name, |tracker, container, at| {
            container::push(tracker, container, at, name, value)
        });
        self.guard(result)
    }

    /// Move the element at `key` out of the container bound to `name`
    pub fn remove(&mut self, frame: FrameId, name: &str, key: ValueKey) -> VaultResult<Option<Value>> {
        let result = self.with_local_container(frame, name, |tracker, container, at| {
            container::remove(tracker, container, at, name, &key)
        });
        self.guard(result)
    }

    fn with_local_container<T>(
        &mut self,
        frame: FrameId,
        name: &str,
        op: impl FnOnce(&mut OwnershipTracker, &mut Value, &Location) -> VaultResult<T>,
    ) -> VaultResult<T> {
        self.require_txn()?;
        self.ensure_not_borrowed(RefTarget::Local {
            frame,
            name: name.into(),
        })?;
        let at = Location::local(frame, name);
        let container = self.frames.get_mut(frame)?.get_mut(name)?;
        op(&mut self.tracker, container, &at)
    }

    // ========================================================================
    // Resource fields held in locals
    // ========================================================================

    /// Move a field out of the resource bound to `name`, leaving the slot
    /// empty. The resource cannot be stored or plainly destroyed until the
    /// slot is refilled.
    pub fn take_field(&mut self, frame: FrameId, name: &str, field: &str) -> VaultResult<Value> {
        let result = self.with_local_resource(frame, name, |tracker, res| {
            container::take_field(tracker, res, name, field)
        });
        self.guard(result)
    }

    /// Fill a field of the resource bound to `name`
    pub fn put_field(
        &mut self,
        frame: FrameId,
        name: &str,
        field: &str,
        value: Value,
    ) -> VaultResult<()> {
        let result = self.with_local_resource(frame, name, |tracker, res| {
            container::put_field(tracker, res, name, field, value)
        });
        self.guard(result)
    }

    fn with_local_resource<T>(
        &mut self,
        frame: FrameId,
        name: &str,
        op: impl FnOnce(&mut OwnershipTracker, &mut Resource) -> VaultResult<T>,
    ) -> VaultResult<T> {
        self.require_txn()?;
        self.ensure_not_borrowed(RefTarget::Local {
            frame,
            name: name.into(),
        })?;
        let value = self.frames.get_mut(frame)?.get_mut(name)?;
        let kind = value.kind_name();
        let res = value
            .as_resource_mut()
            .ok_or_else(|| VaultError::NotAContainer {
                name: name.to_string(),
                kind: kind.to_string(),
            })?;
        op(&mut self.tracker, res)
    }
}
