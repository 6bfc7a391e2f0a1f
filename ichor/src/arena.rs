//! Reference arena.
//!
//! Generated code refers back to earlier values through a single array,
//! `o[i]`. The [`Arena`] mirrors that array on the generator side: each slot
//! records what the generated program stored at index `i`, so later
//! productions can ask for "some element" or "the document" and embed the
//! matching index.
//!
//! # Invariants
//!
//! - Indices are stable for the whole run. Slots are appended, never
//!   compacted or reused, because emitted code already contains literal
//!   indices.
//! - Removal is logical: [`Arena::null_out`] empties a slot but keeps its
//!   index.
//! - Identity is pointer identity (`Rc::ptr_eq`), not structural equality.
//!   Two separately created `<div>`s are different slots; adding the same
//!   `document` root twice is a no-op.
//!
//! Lookups are linear scans. Arenas hold hundreds of slots per run, and a
//! scan keeps results independent of hashing order.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::random::{RandomExt, RandomSource};

// ============================================================
// Kinds and indices
// ============================================================

/// A discovered type tag for a slot, used by instance-of-kind queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Kind(Cow<'static, str>);

impl Kind {
    /// A kind named by a static string.
    pub const fn from_static(name: &'static str) -> Self {
        Kind(Cow::Borrowed(name))
    }

    /// A kind with a runtime name.
    pub fn new(name: impl Into<String>) -> Self {
        Kind(Cow::Owned(name.into()))
    }

    /// The kind's name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kinds the built-in modules create and query.
pub mod kinds {
    use super::Kind;

    pub const WINDOW: Kind = Kind::from_static("Window");
    pub const DOCUMENT: Kind = Kind::from_static("Document");
    pub const ELEMENT: Kind = Kind::from_static("Element");
    pub const TEXT: Kind = Kind::from_static("Text");
    pub const FUNCTION: Kind = Kind::from_static("Function");
    pub const OBJECT: Kind = Kind::from_static("Object");
    pub const EVENT: Kind = Kind::from_static("Event");
    /// A value whose type was not discovered at generation time.
    pub const VALUE: Kind = Kind::from_static("Value");
}

/// Stable index of a slot. Renders as the bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(usize);

impl SlotIndex {
    /// Wrap a raw index.
    pub fn new(index: usize) -> Self {
        SlotIndex(index)
    }

    /// The raw index.
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================
// Slots
// ============================================================

/// Values stored in an arena report their kind, if known.
pub trait ArenaValue {
    /// The discovered kind of this value.
    fn kind(&self) -> Option<Kind>;

    /// Short human-readable description, used in snapshots.
    fn describe(&self) -> String {
        String::new()
    }
}

/// Contents of a slot.
#[derive(Debug)]
pub enum SlotState<T> {
    /// Index handed out, value not yet assigned.
    Reserved,
    /// Holds a value.
    Filled(Rc<T>),
    /// Logically removed.
    Nulled,
}

impl<T> Clone for SlotState<T> {
    fn clone(&self) -> Self {
        match self {
            SlotState::Reserved => SlotState::Reserved,
            SlotState::Filled(v) => SlotState::Filled(Rc::clone(v)),
            SlotState::Nulled => SlotState::Nulled,
        }
    }
}

/// One arena entry.
#[derive(Debug, Clone)]
pub struct Slot<T> {
    state: SlotState<T>,
    kind: Option<Kind>,
}

impl<T> Slot<T> {
    /// The slot's contents.
    pub fn state(&self) -> &SlotState<T> {
        &self.state
    }

    /// The kind discovered when the value was assigned.
    pub fn kind(&self) -> Option<&Kind> {
        self.kind.as_ref()
    }

    /// The value, if the slot is filled.
    pub fn value(&self) -> Option<&Rc<T>> {
        match &self.state {
            SlotState::Filled(v) => Some(v),
            _ => None,
        }
    }

    /// Whether the slot currently holds a value.
    pub fn is_filled(&self) -> bool {
        matches!(self.state, SlotState::Filled(_))
    }
}

/// Errors from arena mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArenaError {
    #[error("slot {0} does not exist")]
    OutOfRange(SlotIndex),

    #[error("slot {0} is not a reservation")]
    NotReserved(SlotIndex),
}

/// A serializable view of one slot, for comparing arenas across runs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SlotSnapshot {
    pub index: usize,
    pub state: &'static str,
    pub kind: Option<String>,
    pub description: String,
}

// ============================================================
// Arena
// ============================================================

/// Append-only pool of generated values, addressed by [`SlotIndex`].
#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T: ArenaValue> Arena<T> {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots ever handed out, including reserved and nulled ones.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot was ever handed out.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots currently holding a value.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_filled()).count()
    }

    /// Append a placeholder and return its index.
    pub fn reserve(&mut self) -> SlotIndex {
        self.slots.push(Slot {
            state: SlotState::Reserved,
            kind: None,
        });
        SlotIndex(self.slots.len() - 1)
    }

    /// Assign a value to a reserved slot.
    pub fn fill(&mut self, index: SlotIndex, value: Rc<T>) -> Result<(), ArenaError> {
        let slot = self
            .slots
            .get_mut(index.0)
            .ok_or(ArenaError::OutOfRange(index))?;
        if !matches!(slot.state, SlotState::Reserved) {
            return Err(ArenaError::NotReserved(index));
        }
        slot.kind = value.kind();
        slot.state = SlotState::Filled(value);
        Ok(())
    }

    /// Append a value unconditionally.
    pub fn push(&mut self, value: Rc<T>) -> SlotIndex {
        self.slots.push(Slot {
            kind: value.kind(),
            state: SlotState::Filled(value),
        });
        SlotIndex(self.slots.len() - 1)
    }

    /// Append `value` unless a slot already holds the identical value.
    ///
    /// Returns the new index, or `None` when the value was already present.
    pub fn add_if_novel(&mut self, value: &Rc<T>) -> Option<SlotIndex> {
        if self.find_index(value).is_some() {
            return None;
        }
        Some(self.push(Rc::clone(value)))
    }

    /// Index of the slot holding exactly `value`, by pointer identity.
    pub fn find_index(&self, value: &Rc<T>) -> Option<SlotIndex> {
        self.slots
            .iter()
            .position(|s| s.value().is_some_and(|v| Rc::ptr_eq(v, value)))
            .map(SlotIndex)
    }

    /// First filled slot whose kind is `kind`.
    pub fn instance_index(&self, kind: &Kind) -> Option<SlotIndex> {
        self.slots
            .iter()
            .position(|s| s.is_filled() && s.kind() == Some(kind))
            .map(SlotIndex)
    }

    /// A uniformly chosen filled slot whose value satisfies `predicate`.
    pub fn any_index<F>(&self, rng: &mut dyn RandomSource, predicate: F) -> Option<SlotIndex>
    where
        F: Fn(&T) -> bool,
    {
        let matches: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.value().filter(|v| predicate(v)).map(|_| i))
            .collect();
        rng.element(&matches).copied().map(SlotIndex)
    }

    /// A uniformly chosen filled slot of the given kind.
    pub fn any_of_kind(&self, rng: &mut dyn RandomSource, kind: &Kind) -> Option<SlotIndex> {
        let matches: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_filled() && s.kind() == Some(kind))
            .map(|(i, _)| i)
            .collect();
        rng.element(&matches).copied().map(SlotIndex)
    }

    /// A uniformly chosen filled slot of any kind.
    pub fn any_filled(&self, rng: &mut dyn RandomSource) -> Option<SlotIndex> {
        self.any_index(rng, |_| true)
    }

    /// Logically remove a slot. Returns whether the slot held a value.
    pub fn null_out(&mut self, index: SlotIndex) -> bool {
        match self.slots.get_mut(index.0) {
            Some(slot) => {
                let was_filled = slot.is_filled();
                slot.state = SlotState::Nulled;
                was_filled
            }
            None => false,
        }
    }

    /// The slot at `index`.
    pub fn slot(&self, index: SlotIndex) -> Option<&Slot<T>> {
        self.slots.get(index.0)
    }

    /// The value at `index`, if the slot is filled.
    pub fn get(&self, index: SlotIndex) -> Option<&Rc<T>> {
        self.slot(index).and_then(Slot::value)
    }

    /// Iterate over all slots with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (SlotIndex, &Slot<T>)> {
        self.slots.iter().enumerate().map(|(i, s)| (SlotIndex(i), s))
    }

    /// A comparable view of every slot.
    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        self.iter()
            .map(|(index, slot)| SlotSnapshot {
                index: index.0,
                state: match slot.state {
                    SlotState::Reserved => "reserved",
                    SlotState::Filled(_) => "filled",
                    SlotState::Nulled => "nulled",
                },
                kind: slot.kind().map(|k| k.to_string()),
                description: slot.value().map(|v| v.describe()).unwrap_or_default(),
            })
            .collect()
    }
}

// ============================================================
// Generator-side references
// ============================================================

/// What the generated program stored in a slot: its kind and the
/// expression that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    kind: Kind,
    origin: String,
}

impl Reference {
    /// A fresh reference, ready to be stored.
    pub fn new(kind: Kind, origin: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            kind,
            origin: origin.into(),
        })
    }

    /// The expression that produced this value.
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl ArenaValue for Reference {
    fn kind(&self) -> Option<Kind> {
        Some(self.kind.clone())
    }

    fn describe(&self) -> String {
        self.origin.clone()
    }
}

/// Well-known host singletons. Holding them as shared `Rc`s makes
/// `add_if_novel` recognize repeats.
#[derive(Debug, Clone)]
pub struct Roots {
    pub window: Rc<Reference>,
    pub document: Rc<Reference>,
    pub document_element: Rc<Reference>,
    pub body: Rc<Reference>,
}

impl Roots {
    /// Create the root references.
    pub fn new() -> Self {
        Self {
            window: Reference::new(kinds::WINDOW, "window"),
            document: Reference::new(kinds::DOCUMENT, "document"),
            document_element: Reference::new(kinds::ELEMENT, "document.documentElement"),
            body: Reference::new(kinds::ELEMENT, "document.body"),
        }
    }

    /// All roots, in prelude order.
    pub fn all(&self) -> [&Rc<Reference>; 4] {
        [&self.window, &self.document, &self.document_element, &self.body]
    }
}

impl Default for Roots {
    fn default() -> Self {
        Self::new()
    }
}
