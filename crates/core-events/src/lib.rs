//! Document change notifications.
//!
//! The document publishes a [`DocumentEvent`] after every committed
//! mutation; views and other observers implement [`Subscriber`] and attach
//! with an [`EventMask`] selecting the event kinds they care about.
//! Delivery is synchronous on the thread that performed the mutation —
//! analysis-driven events therefore arrive on worker threads, and
//! subscribers that need to marshal onto their own thread own that queue
//! themselves. Events are published only after the triggering write has
//! committed and the document's write lock has been released, so handlers
//! observe fully consistent state.

use core_address::Address;

bitflags::bitflags! {
    /// Event-kind selection bits. The values are part of the subscription
    /// contract and stay stable across releases.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EventMask: u32 {
        const LABEL_UPDATED       = 1;
        const DOCUMENT_UPDATED    = 2;
        const QUIT                = 4;
        const CELL_UPDATED        = 8;
        const MEMORY_AREA_UPDATED = 16;
    }
}

/// A single committed change to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    /// A label was added or removed at `address`.
    LabelUpdated {
        address: Address,
        name: String,
        removed: bool,
    },
    /// A coarse change with no finer-grained event (multicell writes,
    /// database reloads).
    DocumentUpdated,
    /// The cell at `address` was written or re-annotated.
    CellUpdated { address: Address },
    /// A memory area starting at `start` was mapped.
    MemoryAreaUpdated { start: Address },
    /// The document is being torn down; no further events follow.
    Quit,
}

impl DocumentEvent {
    /// The mask bit a subscription must carry to receive this event.
    pub fn mask(&self) -> EventMask {
        match self {
            DocumentEvent::LabelUpdated { .. } => EventMask::LABEL_UPDATED,
            DocumentEvent::DocumentUpdated => EventMask::DOCUMENT_UPDATED,
            DocumentEvent::CellUpdated { .. } => EventMask::CELL_UPDATED,
            DocumentEvent::MemoryAreaUpdated { .. } => EventMask::MEMORY_AREA_UPDATED,
            DocumentEvent::Quit => EventMask::QUIT,
        }
    }

    /// Route this event to the matching `Subscriber` hook.
    pub fn deliver(&self, subscriber: &dyn Subscriber) {
        match self {
            DocumentEvent::LabelUpdated {
                address,
                name,
                removed,
            } => subscriber.on_label_updated(address, name, *removed),
            DocumentEvent::DocumentUpdated => subscriber.on_document_updated(),
            DocumentEvent::CellUpdated { address } => subscriber.on_cell_updated(address),
            DocumentEvent::MemoryAreaUpdated { start } => subscriber.on_memory_area_updated(start),
            DocumentEvent::Quit => subscriber.on_quit(),
        }
    }
}

/// Observer hooks, one per event kind, all defaulting to no-ops so views
/// implement only what they render. Handlers run on the mutating thread
/// and must not block it; they may read the document freely (the write
/// lock is released before delivery) but should queue rather than perform
/// heavy work. A handler may also mutate the document: the write applies,
/// and the events it raises are held back until the delivery that invoked
/// the handler has completed.
pub trait Subscriber: Send + Sync {
    fn on_label_updated(&self, _address: &Address, _name: &str, _removed: bool) {}
    fn on_document_updated(&self) {}
    fn on_cell_updated(&self, _address: &Address) {}
    fn on_memory_area_updated(&self, _start: &Address) {}
    fn on_quit(&self) {}
}
