//! The mutable analyzed representation of a binary.
//!
//! `Document` aggregates the memory map, cell and multicell stores, the
//! label bimap, the cross-reference graph, and the comment index, and
//! owns the binary stream and database handles. It is the single point
//! of serialization for analysis results: all mutators take the writer
//! lock for their duration, so concurrent worker-thread writes are
//! linearizable; readers take the shared lock and hand out clones, never
//! references into the guarded state.
//!
//! Every committed mutation is mirrored into the attached database (when
//! one is attached) and published to subscribers after the lock is
//! released. A subscriber that mutates the document from inside its own
//! handler does not re-enter the dispatch: the mutation commits, but its
//! events are queued and delivered once the in-flight dispatch on that
//! thread has finished. Mirroring failures are diagnostics, not aborts:
//! an analysis pass keeps going if the storage layer hiccups, and the
//! persisted state catches up on the next write of the same entity.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, ThreadId};

use core_address::Address;
use core_binary::BinaryStream;
use core_events::{DocumentEvent, EventMask, Subscriber};
use tracing::warn;

use crate::DocumentError;
use crate::cell::Cell;
use crate::database::Database;
use crate::label::{Label, LabelIndex};
use crate::memory::{MemoryArea, MemoryMap};
use crate::multicell::MultiCell;
use crate::xref::{XRefGraph, XRefKind};

/// Handle returned by [`Document::subscribe`], used to detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Store sizes, for logging and idempotence checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentStats {
    pub areas: usize,
    pub cells: usize,
    pub multicells: usize,
    pub labels: usize,
    pub xrefs: usize,
    pub comments: usize,
}

#[derive(Default)]
struct DocumentInner {
    stream: Option<Arc<BinaryStream>>,
    memory_map: MemoryMap,
    cells: BTreeMap<Address, Cell>,
    multicells: BTreeMap<Address, MultiCell>,
    labels: LabelIndex,
    xrefs: XRefGraph,
    comments: BTreeMap<Address, String>,
}

#[derive(Default)]
struct SubscriberList {
    entries: Vec<(SubscriptionId, EventMask, Arc<dyn Subscriber>)>,
    next_id: u64,
}

/// Tracks in-flight deliveries so a subscriber that mutates the document
/// from inside its handler has the resulting events queued behind the
/// dispatch that is already running on its thread, instead of
/// interleaved into it (or recursed without bound).
#[derive(Default)]
struct DeliveryState {
    busy: HashSet<ThreadId>,
    pending: VecDeque<DocumentEvent>,
}

#[derive(Default)]
pub struct Document {
    inner: RwLock<DocumentInner>,
    database: Mutex<Option<Box<dyn Database>>>,
    subscribers: Mutex<SubscriberList>,
    delivery: Mutex<DeliveryState>,
}

/// Clears the delivering mark even when a subscriber panics, so later
/// mutations on this thread do not queue events nobody will drain.
struct DeliveryGuard<'a> {
    document: &'a Document,
    thread: ThreadId,
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        let mut delivery = self
            .document
            .delivery
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        delivery.busy.remove(&self.thread);
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, DocumentInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, DocumentInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn db(&self) -> MutexGuard<'_, Option<Box<dyn Database>>> {
        self.database.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver `events` to every subscriber whose mask matches. Called
    /// with no lock held; delivery order follows registration order.
    ///
    /// When the calling thread is already inside a delivery — a handler
    /// mutated the document — the new events are queued and dispatched
    /// by the outer call after its own batch, so a dispatch in progress
    /// is never interleaved and handler-driven mutations cannot recurse.
    fn publish(&self, events: &[DocumentEvent]) {
        if events.is_empty() {
            return;
        }
        let me = thread::current().id();
        {
            let mut delivery = self.delivery.lock().unwrap_or_else(|e| e.into_inner());
            if delivery.busy.contains(&me) {
                delivery.pending.extend(events.iter().cloned());
                return;
            }
            delivery.busy.insert(me);
        }
        let _guard = DeliveryGuard {
            document: self,
            thread: me,
        };
        for event in events {
            self.dispatch(event);
        }
        // Apply handler-queued notifications in arrival order; each
        // dispatch may queue more, so drain until quiet.
        loop {
            let next = {
                let mut delivery = self.delivery.lock().unwrap_or_else(|e| e.into_inner());
                delivery.pending.pop_front()
            };
            match next {
                Some(event) => self.dispatch(&event),
                None => break,
            }
        }
    }

    fn dispatch(&self, event: &DocumentEvent) {
        let snapshot: Vec<(EventMask, Arc<dyn Subscriber>)> = {
            let list = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
            list.entries
                .iter()
                .map(|(_, mask, sub)| (*mask, Arc::clone(sub)))
                .collect()
        };
        let bit = event.mask();
        for (mask, subscriber) in &snapshot {
            if mask.contains(bit) {
                event.deliver(subscriber.as_ref());
            }
        }
    }

    // --- binding -------------------------------------------------------

    /// Attach the persistence back-end. When the database already carries
    /// a binary stream (the usual wiring order) and the document has
    /// none, the stream is adopted.
    pub fn use_database(&self, database: Box<dyn Database>) {
        let stream = database.binary_stream();
        {
            let mut inner = self.write();
            if inner.stream.is_none() {
                inner.stream = stream;
            }
        }
        *self.db() = Some(database);
    }

    pub fn set_binary_stream(&self, stream: Arc<BinaryStream>) {
        self.write().stream = Some(stream);
    }

    pub fn binary_stream(&self) -> Option<Arc<BinaryStream>> {
        self.read().stream.clone()
    }

    // --- memory map ----------------------------------------------------

    pub fn add_memory_area(&self, area: MemoryArea) -> Result<(), DocumentError> {
        let start = area.start();
        {
            let mut inner = self.write();
            inner.memory_map.add(area.clone())?;
            if let Some(db) = self.db().as_mut()
                && let Err(error) = db.store_memory_area(&area)
            {
                warn!(target: "core.document", area = area.name(), %error, "memory area mirror failed");
            }
        }
        self.publish(&[DocumentEvent::MemoryAreaUpdated { start }]);
        Ok(())
    }

    pub fn find_memory_area(&self, address: &Address) -> Option<MemoryArea> {
        self.read().memory_map.find(address).cloned()
    }

    pub fn memory_areas(&self) -> Vec<MemoryArea> {
        self.read().memory_map.iter().cloned().collect()
    }

    /// Stream offset backing `address`, through the memory map.
    pub fn translate(&self, address: &Address) -> Option<u64> {
        self.read().memory_map.translate(address)
    }

    // --- cells ---------------------------------------------------------

    pub fn cell(&self, address: &Address) -> Option<Cell> {
        self.read().cells.get(address).cloned()
    }

    pub fn has_instruction_at(&self, address: &Address) -> bool {
        self.read()
            .cells
            .get(address)
            .is_some_and(Cell::is_instruction)
    }

    /// Write `cell` at `address`.
    ///
    /// The cell must fall entirely inside a mapped area. When its span
    /// intersects existing cells (other than an equal-length cell at the
    /// same address, which is silently replaced), the write is rejected
    /// with `Conflict` unless `force` is set, in which case the
    /// intersecting cells are removed first.
    pub fn set_cell(&self, address: Address, cell: Cell, force: bool) -> Result<(), DocumentError> {
        {
            let mut inner = self.write();
            let area = inner
                .memory_map
                .find(&address)
                .ok_or(DocumentError::NotFound)?;
            let new_end = address
                .offset()
                .checked_add(u64::from(cell.length()))
                .ok_or(DocumentError::OutOfRange)?;
            if new_end > area.end_offset() {
                return Err(DocumentError::OutOfRange);
            }

            let conflicts = overlapping_spans(&inner.cells, &address, new_end)
                .into_iter()
                .filter(|(existing, length)| {
                    !(*existing == address && *length == cell.length())
                })
                .map(|(existing, _)| existing)
                .collect::<Vec<_>>();
            if !conflicts.is_empty() && !force {
                return Err(DocumentError::Conflict);
            }

            for existing in &conflicts {
                inner.cells.remove(existing);
            }
            inner.cells.insert(address, cell.clone());

            if let Some(db) = self.db().as_mut() {
                for existing in &conflicts {
                    if let Err(error) = db.remove_cell(existing) {
                        warn!(target: "core.document", address = %existing, %error, "cell removal mirror failed");
                    }
                }
                if let Err(error) = db.store_cell(&address, &cell) {
                    warn!(target: "core.document", address = %address, %error, "cell mirror failed");
                }
            }
        }
        self.publish(&[DocumentEvent::CellUpdated { address }]);
        Ok(())
    }

    /// Addresses and lengths of cells intersecting `[start, end)`, for
    /// gap computation. `end` is an offset in `start`'s address space.
    pub fn cell_spans(&self, start: &Address, end: u64) -> Vec<(Address, u16)> {
        overlapping_spans(&self.read().cells, start, end)
    }

    /// Snapshot of every cell in address order.
    pub fn cells(&self) -> Vec<(Address, Cell)> {
        self.read()
            .cells
            .iter()
            .map(|(address, cell)| (*address, cell.clone()))
            .collect()
    }

    /// The nearest cell strictly before `address` in the same space.
    pub fn previous_cell(&self, address: &Address) -> Option<(Address, Cell)> {
        let inner = self.read();
        let (found, cell) = inner.cells.range(..*address).next_back()?;
        if found.kind() != address.kind() || found.base() != address.base() {
            return None;
        }
        Some((*found, cell.clone()))
    }

    // --- multicells ----------------------------------------------------

    pub fn multi_cell(&self, address: &Address) -> Option<MultiCell> {
        self.read().multicells.get(address).cloned()
    }

    pub fn multi_cells(&self) -> Vec<(Address, MultiCell)> {
        self.read()
            .multicells
            .iter()
            .map(|(address, mc)| (*address, mc.clone()))
            .collect()
    }

    /// Write a multicell headed at `address`. A span intersection with a
    /// multicell headed elsewhere is rejected with `Conflict` unless
    /// `force` is set; the multicell at the same head is always replaced.
    pub fn set_multi_cell(
        &self,
        address: Address,
        multicell: MultiCell,
        force: bool,
    ) -> Result<(), DocumentError> {
        {
            let mut inner = self.write();
            let new_end = address
                .offset()
                .checked_add(multicell.size())
                .ok_or(DocumentError::OutOfRange)?;

            let conflicts: Vec<Address> = inner
                .multicells
                .iter()
                .filter(|(head, existing)| {
                    **head != address
                        && head.kind() == address.kind()
                        && head.base() == address.base()
                        && head.offset() < new_end
                        && address.offset() < head.offset().saturating_add(existing.size())
                })
                .map(|(head, _)| *head)
                .collect();
            if !conflicts.is_empty() && !force {
                return Err(DocumentError::Conflict);
            }

            for head in &conflicts {
                inner.multicells.remove(head);
            }
            inner.multicells.insert(address, multicell.clone());

            if let Some(db) = self.db().as_mut() {
                for head in &conflicts {
                    if let Err(error) = db.remove_multicell(head) {
                        warn!(target: "core.document", address = %head, %error, "multicell removal mirror failed");
                    }
                }
                if let Err(error) = db.store_multicell(&address, &multicell) {
                    warn!(target: "core.document", address = %address, %error, "multicell mirror failed");
                }
            }
        }
        self.publish(&[DocumentEvent::DocumentUpdated]);
        Ok(())
    }

    // --- labels --------------------------------------------------------

    pub fn add_label(&self, address: Address, label: Label) -> Result<(), DocumentError> {
        let mut events = Vec::new();
        {
            let mut inner = self.write();
            let previous = inner.labels.insert(address, label.clone())?;
            if let Some(db) = self.db().as_mut()
                && let Err(error) = db.store_label(&address, &label)
            {
                warn!(target: "core.document", address = %address, %error, "label mirror failed");
            }
            if let Some(previous) = previous {
                events.push(DocumentEvent::LabelUpdated {
                    address,
                    name: previous.name().to_string(),
                    removed: true,
                });
            }
            events.push(DocumentEvent::LabelUpdated {
                address,
                name: label.name().to_string(),
                removed: false,
            });
        }
        self.publish(&events);
        Ok(())
    }

    pub fn remove_label(&self, address: &Address) -> Option<Label> {
        let removed = {
            let mut inner = self.write();
            let removed = inner.labels.remove(address)?;
            if let Some(db) = self.db().as_mut()
                && let Err(error) = db.remove_label(address)
            {
                warn!(target: "core.document", address = %address, %error, "label removal mirror failed");
            }
            removed
        };
        self.publish(&[DocumentEvent::LabelUpdated {
            address: *address,
            name: removed.name().to_string(),
            removed: true,
        }]);
        Some(removed)
    }

    pub fn label_at(&self, address: &Address) -> Option<Label> {
        self.read().labels.at(address).cloned()
    }

    pub fn address_of_label(&self, name: &str) -> Option<Address> {
        self.read().labels.address_of(name)
    }

    pub fn labels(&self) -> Vec<(Address, Label)> {
        self.read()
            .labels
            .iter()
            .map(|(address, label)| (*address, label.clone()))
            .collect()
    }

    // --- cross references ----------------------------------------------

    /// Record a directed reference. Returns `false` when the identical
    /// edge was already present.
    pub fn add_cross_reference(&self, from: Address, to: Address, kind: XRefKind) -> bool {
        let mut inner = self.write();
        let inserted = inner.xrefs.add(from, to, kind);
        if inserted
            && let Some(db) = self.db().as_mut()
            && let Err(error) = db.store_cross_reference(&from, &to, kind)
        {
            warn!(target: "core.document", %from, %to, %error, "xref mirror failed");
        }
        inserted
    }

    pub fn cross_references_from(&self, address: &Address) -> Vec<(Address, XRefKind)> {
        self.read().xrefs.outgoing(address)
    }

    pub fn cross_references_to(&self, address: &Address) -> Vec<(Address, XRefKind)> {
        self.read().xrefs.incoming(address)
    }

    // --- comments ------------------------------------------------------

    /// Attach a comment at `address`, updating the cell header in place
    /// when a cell is present.
    pub fn set_comment(&self, address: Address, text: impl Into<String>) {
        let text = text.into();
        {
            let mut inner = self.write();
            let annotated = inner.cells.get_mut(&address).map(|cell| {
                cell.set_comment(Some(text.clone()));
                cell.clone()
            });
            inner.comments.insert(address, text.clone());
            if let Some(db) = self.db().as_mut() {
                if let Err(error) = db.store_comment(&address, &text) {
                    warn!(target: "core.document", address = %address, %error, "comment mirror failed");
                }
                if let Some(cell) = annotated
                    && let Err(error) = db.store_cell(&address, &cell)
                {
                    warn!(target: "core.document", address = %address, %error, "cell mirror failed");
                }
            }
        }
        self.publish(&[DocumentEvent::CellUpdated { address }]);
    }

    pub fn comment(&self, address: &Address) -> Option<String> {
        self.read().comments.get(address).cloned()
    }

    // --- subscriptions --------------------------------------------------

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>, mask: EventMask) -> SubscriptionId {
        let mut list = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        list.next_id += 1;
        let id = SubscriptionId(list.next_id);
        list.entries.push((id, mask, subscriber));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut list = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        list.entries.retain(|(entry_id, _, _)| *entry_id != id);
    }

    /// Publish the terminal event; the document is about to be dropped.
    pub fn quit(&self) {
        self.publish(&[DocumentEvent::Quit]);
    }

    // --- whole-document operations --------------------------------------

    /// The `start` label's address when present, else the lowest mapped
    /// address.
    pub fn start_address(&self) -> Option<Address> {
        let inner = self.read();
        inner
            .labels
            .address_of("start")
            .or_else(|| inner.memory_map.first().map(MemoryArea::start))
    }

    /// Replace in-memory state with the attached database's contents.
    pub fn load_from_database(&self) -> anyhow::Result<()> {
        let dump = {
            let mut db = self.db();
            let db = db
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("no database attached"))?;
            db.load()?
        };
        {
            let mut inner = self.write();
            let mut fresh = DocumentInner {
                stream: inner.stream.clone(),
                ..DocumentInner::default()
            };
            for area in dump.areas {
                fresh
                    .memory_map
                    .add(area)
                    .map_err(|e| anyhow::anyhow!("database memory map: {e}"))?;
            }
            fresh.cells = dump.cells.into_iter().collect();
            fresh.multicells = dump.multicells.into_iter().collect();
            for (address, label) in dump.labels {
                fresh
                    .labels
                    .insert(address, label)
                    .map_err(|e| anyhow::anyhow!("database labels: {e}"))?;
            }
            for (from, to, kind) in dump.xrefs {
                fresh.xrefs.add(from, to, kind);
            }
            fresh.comments = dump.comments.into_iter().collect();
            *inner = fresh;
        }
        self.publish(&[DocumentEvent::DocumentUpdated]);
        Ok(())
    }

    /// Push the whole in-memory state into the attached database.
    pub fn save_to_database(&self) -> anyhow::Result<()> {
        let inner = self.read();
        let mut db = self.db();
        let db = db
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("no database attached"))?;
        for area in inner.memory_map.iter() {
            db.store_memory_area(area)?;
        }
        for (address, cell) in &inner.cells {
            db.store_cell(address, cell)?;
        }
        for (address, multicell) in &inner.multicells {
            db.store_multicell(address, multicell)?;
        }
        for (address, label) in inner.labels.iter() {
            db.store_label(address, label)?;
        }
        for (from, to, kind) in inner.xrefs.edges() {
            db.store_cross_reference(&from, &to, kind)?;
        }
        for (address, text) in &inner.comments {
            db.store_comment(address, text)?;
        }
        Ok(())
    }

    pub fn stats(&self) -> DocumentStats {
        let inner = self.read();
        DocumentStats {
            areas: inner.memory_map.len(),
            cells: inner.cells.len(),
            multicells: inner.multicells.len(),
            labels: inner.labels.len(),
            xrefs: inner.xrefs.len(),
            comments: inner.comments.len(),
        }
    }
}

/// Cells in `map` whose `[addr, addr+len)` span intersects
/// `[start, end_offset)` within `start`'s address space.
fn overlapping_spans(
    map: &BTreeMap<Address, Cell>,
    start: &Address,
    end_offset: u64,
) -> Vec<(Address, u16)> {
    let mut spans = Vec::new();
    if let Some((address, cell)) = map.range(..*start).next_back()
        && address.kind() == start.kind()
        && address.base() == start.base()
        && address.offset().saturating_add(u64::from(cell.length())) > start.offset()
    {
        spans.push((*address, cell.length()));
    }
    for (address, cell) in map.range(*start..) {
        if address.kind() != start.kind()
            || address.base() != start.base()
            || address.offset() >= end_offset
        {
            break;
        }
        spans.push((*address, cell.length()));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{ArchTag, ValueFormat};
    use crate::memory::AreaAccess;

    fn addr(offset: u64) -> Address {
        Address::linear(offset, 32)
    }

    fn doc_with_text_area() -> Document {
        let doc = Document::new();
        doc.add_memory_area(MemoryArea::new(
            ".text",
            addr(0x1000),
            0x1000,
            AreaAccess::READ | AreaAccess::EXECUTE,
            0,
            ArchTag::UNKNOWN,
            0,
        ))
        .unwrap();
        doc
    }

    #[test]
    fn set_cell_requires_mapped_address() {
        let doc = doc_with_text_area();
        let err = doc
            .set_cell(addr(0x5000), Cell::value(1, ValueFormat::Hexadecimal), false)
            .unwrap_err();
        assert_eq!(err, DocumentError::NotFound);
    }

    #[test]
    fn set_cell_rejects_span_past_area_end() {
        let doc = doc_with_text_area();
        let err = doc
            .set_cell(addr(0x1FFF), Cell::value(2, ValueFormat::Hexadecimal), false)
            .unwrap_err();
        assert_eq!(err, DocumentError::OutOfRange);
        assert!(doc.cell(&addr(0x1FFF)).is_none());
    }

    #[test]
    fn overlapping_cell_needs_force() {
        let doc = doc_with_text_area();
        doc.set_cell(addr(0x1000), Cell::value(4, ValueFormat::Hexadecimal), false)
            .unwrap();
        // A shorter cell inside the existing span conflicts...
        let err = doc
            .set_cell(addr(0x1002), Cell::value(1, ValueFormat::Hexadecimal), false)
            .unwrap_err();
        assert_eq!(err, DocumentError::Conflict);
        assert!(doc.cell(&addr(0x1002)).is_none());
        // ...until forced, which evicts the overlapped cell.
        doc.set_cell(addr(0x1002), Cell::value(1, ValueFormat::Hexadecimal), true)
            .unwrap();
        assert!(doc.cell(&addr(0x1000)).is_none());
        assert!(doc.cell(&addr(0x1002)).is_some());
    }

    #[test]
    fn equal_length_rewrite_at_same_address_is_not_a_conflict() {
        let doc = doc_with_text_area();
        doc.set_cell(addr(0x1000), Cell::value(4, ValueFormat::Hexadecimal), false)
            .unwrap();
        doc.set_cell(addr(0x1000), Cell::value(4, ValueFormat::Decimal), false)
            .unwrap();
        let cell = doc.cell(&addr(0x1000)).unwrap();
        assert_eq!(
            cell.kind(),
            &crate::cell::CellKind::Value {
                format: ValueFormat::Decimal
            }
        );
    }

    #[test]
    fn label_bimap_round_trip_through_document() {
        let doc = doc_with_text_area();
        doc.add_label(addr(0x1000), Label::new("start", crate::label::LabelKind::Code))
            .unwrap();
        let found = doc.address_of_label("start").unwrap();
        assert_eq!(doc.label_at(&found).unwrap().name(), "start");
    }

    #[test]
    fn xref_indices_agree_through_document() {
        let doc = doc_with_text_area();
        assert!(doc.add_cross_reference(addr(0x1003), addr(0x1006), XRefKind::Branch));
        assert!(!doc.add_cross_reference(addr(0x1003), addr(0x1006), XRefKind::Branch));
        assert_eq!(
            doc.cross_references_from(&addr(0x1003)),
            vec![(addr(0x1006), XRefKind::Branch)]
        );
        assert_eq!(
            doc.cross_references_to(&addr(0x1006)),
            vec![(addr(0x1003), XRefKind::Branch)]
        );
    }

    #[test]
    fn comment_lands_in_index_and_cell_header() {
        let doc = doc_with_text_area();
        doc.set_cell(addr(0x1000), Cell::value(1, ValueFormat::Hexadecimal), false)
            .unwrap();
        doc.set_comment(addr(0x1000), "entry point");
        assert_eq!(doc.comment(&addr(0x1000)).as_deref(), Some("entry point"));
        assert_eq!(
            doc.cell(&addr(0x1000)).unwrap().comment(),
            Some("entry point")
        );
    }

    struct CountingSubscriber {
        cells: std::sync::atomic::AtomicUsize,
    }

    impl Subscriber for CountingSubscriber {
        fn on_cell_updated(&self, _address: &Address) {
            self.cells
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn masked_subscribers_see_matching_events_only() {
        let doc = doc_with_text_area();
        let counting = Arc::new(CountingSubscriber {
            cells: std::sync::atomic::AtomicUsize::new(0),
        });
        let deaf = Arc::new(CountingSubscriber {
            cells: std::sync::atomic::AtomicUsize::new(0),
        });
        doc.subscribe(counting.clone(), EventMask::CELL_UPDATED);
        doc.subscribe(deaf.clone(), EventMask::empty());

        for i in 0..3 {
            doc.set_cell(
                addr(0x1000 + i),
                Cell::value(1, ValueFormat::Hexadecimal),
                false,
            )
            .unwrap();
        }
        // A rejected write publishes nothing.
        let _ = doc.set_cell(addr(0x5000), Cell::value(1, ValueFormat::Hexadecimal), false);

        assert_eq!(counting.cells.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(deaf.cells.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let doc = doc_with_text_area();
        let counting = Arc::new(CountingSubscriber {
            cells: std::sync::atomic::AtomicUsize::new(0),
        });
        let id = doc.subscribe(counting.clone(), EventMask::CELL_UPDATED);
        doc.set_cell(addr(0x1000), Cell::value(1, ValueFormat::Hexadecimal), false)
            .unwrap();
        doc.unsubscribe(id);
        doc.set_cell(addr(0x1001), Cell::value(1, ValueFormat::Hexadecimal), false)
            .unwrap();
        assert_eq!(counting.cells.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    struct MutatingSubscriber {
        document: Mutex<Option<Arc<Document>>>,
        log: Mutex<Vec<String>>,
        mutated: std::sync::atomic::AtomicBool,
    }

    impl Subscriber for MutatingSubscriber {
        fn on_cell_updated(&self, address: &Address) {
            self.log.lock().unwrap().push(format!("cell {address}"));
            if !self
                .mutated
                .swap(true, std::sync::atomic::Ordering::SeqCst)
                && let Some(document) = self.document.lock().unwrap().clone()
            {
                // Mutating from inside a handler must succeed, with the
                // resulting event held back until this delivery ends.
                document
                    .add_label(*address, Label::new("reentrant", crate::label::LabelKind::Data))
                    .unwrap();
                self.log.lock().unwrap().push("handler returned".into());
            }
        }
        fn on_label_updated(&self, _address: &Address, name: &str, _removed: bool) {
            self.log.lock().unwrap().push(format!("label {name}"));
        }
    }

    #[test]
    fn handler_mutations_are_deferred_until_delivery_ends() {
        let doc = Arc::new(doc_with_text_area());
        let subscriber = Arc::new(MutatingSubscriber {
            document: Mutex::new(Some(Arc::clone(&doc))),
            log: Mutex::new(Vec::new()),
            mutated: std::sync::atomic::AtomicBool::new(false),
        });
        doc.subscribe(
            subscriber.clone(),
            EventMask::CELL_UPDATED | EventMask::LABEL_UPDATED,
        );

        doc.set_cell(addr(0x1000), Cell::value(1, ValueFormat::Hexadecimal), false)
            .unwrap();

        // The label event fired after the in-flight cell dispatch, not
        // recursively inside the handler.
        let log = subscriber.log.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![
                "cell 00001000".to_string(),
                "handler returned".to_string(),
                "label reentrant".to_string(),
            ]
        );
        // The mutation itself landed.
        assert_eq!(doc.label_at(&addr(0x1000)).unwrap().name(), "reentrant");
        // Break the subscriber <-> document cycle for the drop.
        *subscriber.document.lock().unwrap() = None;
    }

    #[test]
    fn start_address_prefers_start_label() {
        let doc = doc_with_text_area();
        assert_eq!(doc.start_address(), Some(addr(0x1000)));
        doc.add_label(addr(0x1234), Label::new("start", crate::label::LabelKind::Code))
            .unwrap();
        assert_eq!(doc.start_address(), Some(addr(0x1234)));
    }

    #[test]
    fn multicell_conflict_and_force() {
        let doc = doc_with_text_area();
        doc.set_multi_cell(addr(0x1000), MultiCell::string_region(8), false)
            .unwrap();
        let err = doc
            .set_multi_cell(addr(0x1004), MultiCell::string_region(8), false)
            .unwrap_err();
        assert_eq!(err, DocumentError::Conflict);
        doc.set_multi_cell(addr(0x1004), MultiCell::string_region(8), true)
            .unwrap();
        assert!(doc.multi_cell(&addr(0x1000)).is_none());
        assert!(doc.multi_cell(&addr(0x1004)).is_some());
    }
}
