use crate::equation::Equation;
use crate::group::EquationGroup;
use crate::task::TaskId;
use equation_model::Value;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Bitmask over the fields of an [`Equation`] touched by one change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EquationFields(u8);

impl EquationFields {
    pub const NONE: Self = Self(0);
    pub const CONTENT: Self = Self(1);
    pub const KIND: Self = Self(1 << 1);
    pub const STATUS: Self = Self(1 << 2);
    pub const MESSAGE: Self = Self(1 << 3);
    pub const DEPENDENCIES: Self = Self(1 << 4);
    pub const VALUE: Self = Self(1 << 5);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for EquationFields {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EquationFields {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EquationFields {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// Bitmask over the fields of an [`EquationGroup`] touched by one change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupFields(u8);

impl GroupFields {
    pub const NONE: Self = Self(0);
    pub const STATEMENT: Self = Self(1);
    pub const EQUATION_COUNT: Self = Self(1 << 1);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for GroupFields {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for GroupFields {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

type SlotId = u64;

struct SlotEntry<F: ?Sized> {
    id: SlotId,
    slot: Arc<F>,
}

struct SlotList<F: ?Sized> {
    next_id: SlotId,
    entries: Vec<SlotEntry<F>>,
}

impl<F: ?Sized> Default for SlotList<F> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }
}

/// Type-erased handle a [`Connection`] uses to remove its slot.
trait SlotStore: Send + Sync {
    fn remove_slot(&self, id: SlotId) -> bool;
}

impl<F: ?Sized + Send + Sync> SlotStore for Mutex<SlotList<F>> {
    fn remove_slot(&self, id: SlotId) -> bool {
        let mut list = self.lock().unwrap_or_else(PoisonError::into_inner);
        let before = list.entries.len();
        list.entries.retain(|entry| entry.id != id);
        list.entries.len() != before
    }
}

/// A synchronous multicast signal.
///
/// Slots run on the emitting thread, in subscription order. Emission works on
/// a snapshot of the slot list, so a slot may connect, disconnect, or emit
/// again without deadlocking; a slot disconnected mid-emission may still
/// receive the in-flight event.
pub struct Signal<F: ?Sized> {
    inner: Arc<Mutex<SlotList<F>>>,
}

impl<F: ?Sized> Default for Signal<F> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SlotList::default())),
        }
    }
}

impl<F: ?Sized> std::fmt::Debug for Signal<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal").finish_non_exhaustive()
    }
}

impl<F: ?Sized + Send + Sync + 'static> Signal<F> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a slot; it stays connected until disconnected explicitly.
    pub fn connect(&self, slot: Box<F>) -> Connection {
        let mut list = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = list.next_id;
        list.next_id += 1;
        list.entries.push(SlotEntry {
            id,
            slot: Arc::from(slot),
        });
        drop(list);
        let store: Arc<dyn SlotStore> = self.inner.clone();
        Connection {
            id,
            store: Arc::downgrade(&store),
        }
    }

    /// Like [`connect`], but the slot is dropped with the returned guard.
    ///
    /// [`connect`]: Signal::connect
    pub fn connect_scoped(&self, slot: Box<F>) -> ScopedConnection {
        ScopedConnection(self.connect(slot))
    }

    /// Invokes `call` once per connected slot, in subscription order.
    pub fn for_each_slot(&self, mut call: impl FnMut(&F)) {
        let snapshot: Vec<Arc<F>> = {
            let list = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            list.entries.iter().map(|entry| entry.slot.clone()).collect()
        };
        for slot in snapshot {
            call(&slot);
        }
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slot_count() == 0
    }

    pub fn disconnect_all(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clear();
    }
}

/// Handle to one subscription; disconnecting is manual and idempotent.
#[derive(Clone)]
pub struct Connection {
    id: SlotId,
    store: Weak<dyn SlotStore>,
}

impl Connection {
    /// Removes the slot. Returns whether it was still connected.
    pub fn disconnect(&self) -> bool {
        self.store
            .upgrade()
            .is_some_and(|store| store.remove_slot(self.id))
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).finish()
    }
}

/// A [`Connection`] that disconnects when dropped.
#[derive(Debug)]
pub struct ScopedConnection(Connection);

impl ScopedConnection {
    /// Releases the guard without disconnecting.
    #[must_use]
    pub fn release(self) -> Connection {
        let conn = self.0.clone();
        std::mem::forget(self);
        conn
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.0.disconnect();
    }
}

pub type EquationSlot = dyn Fn(&Equation) + Send + Sync;
pub type EquationUpdateSlot = dyn Fn(&Equation, EquationFields) + Send + Sync;
pub type GroupSlot = dyn Fn(&EquationGroup) + Send + Sync;
pub type GroupUpdateSlot = dyn Fn(&EquationGroup, GroupFields) + Send + Sync;

impl Signal<EquationSlot> {
    pub fn emit(&self, equation: &Equation) {
        self.for_each_slot(|slot| slot(equation));
    }
}

impl Signal<EquationUpdateSlot> {
    pub fn emit(&self, equation: &Equation, fields: EquationFields) {
        self.for_each_slot(|slot| slot(equation, fields));
    }
}

impl Signal<GroupSlot> {
    pub fn emit(&self, group: &EquationGroup) {
        self.for_each_slot(|slot| slot(group));
    }
}

impl Signal<GroupUpdateSlot> {
    pub fn emit(&self, group: &EquationGroup, fields: GroupFields) {
        self.for_each_slot(|slot| slot(group, fields));
    }
}

/// The manager's typed event registry.
///
/// Emission is synchronous and ordered: within one transaction removals come
/// first (reverse insertion order), then additions (insertion order), then
/// field updates, then the group-level signal.
#[derive(Debug, Default)]
pub struct EquationSignals {
    pub equation_added: Signal<EquationSlot>,
    pub equation_removing: Signal<EquationSlot>,
    pub equation_updated: Signal<EquationUpdateSlot>,
    pub group_added: Signal<GroupSlot>,
    pub group_removing: Signal<GroupSlot>,
    pub group_updated: Signal<GroupUpdateSlot>,
}

impl EquationSignals {
    pub fn disconnect_all(&self) {
        self.equation_added.disconnect_all();
        self.equation_removing.disconnect_all();
        self.equation_updated.disconnect_all();
        self.group_added.disconnect_all();
        self.group_removing.disconnect_all();
        self.group_updated.disconnect_all();
    }
}

pub type TaskSlot = dyn Fn(TaskId) + Send + Sync;
pub type TaskFinishedSlot = dyn Fn(TaskId, &Value) + Send + Sync;
pub type TaskProgressSlot = dyn Fn(TaskId, u8, &str) + Send + Sync;
pub type DrainedSlot = dyn Fn() + Send + Sync;

impl Signal<TaskSlot> {
    pub fn emit(&self, id: TaskId) {
        self.for_each_slot(|slot| slot(id));
    }
}

impl Signal<TaskFinishedSlot> {
    pub fn emit(&self, id: TaskId, result: &Value) {
        self.for_each_slot(|slot| slot(id, result));
    }
}

impl Signal<TaskProgressSlot> {
    pub fn emit(&self, id: TaskId, percent: u8, message: &str) {
        self.for_each_slot(|slot| slot(id, percent, message));
    }
}

impl Signal<DrainedSlot> {
    pub fn emit(&self) {
        self.for_each_slot(|slot| slot());
    }
}

/// Event registry of the background task runner.
#[derive(Debug, Default)]
pub struct TaskSignals {
    pub queued: Signal<TaskSlot>,
    pub started: Signal<TaskSlot>,
    pub finished: Signal<TaskFinishedSlot>,
    pub cancelled: Signal<TaskSlot>,
    pub progress: Signal<TaskProgressSlot>,
    pub queue_drained: Signal<DrainedSlot>,
}

impl TaskSignals {
    pub fn disconnect_all(&self) {
        self.queued.disconnect_all();
        self.started.disconnect_all();
        self.finished.disconnect_all();
        self.cancelled.disconnect_all();
        self.progress.disconnect_all();
        self.queue_drained.disconnect_all();
    }
}
