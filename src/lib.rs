// created = "2026-10-17"
// modified = "2026-10-17"

//! Tandem - A conflict-free shared document engine.
//!
//! A [`Doc`] holds named shared types: [`TextRef`], [`ArrayRef`],
//! [`MapRef`] and [`XmlFragmentRef`], which nest further values and XML
//! nodes. Every change is made inside a transaction, gets a unique
//! `(client, clock)` id, and can be exchanged with other replicas as a
//! binary update in either the v1 or the v2 encoding. Replicas that have
//! applied the same updates hold the same content, in whatever order the
//! updates arrived.
//!
//! # Quick Start
//!
//! ```
//! use tandem::{Doc, ReadTxn, Text};
//!
//! let mut alice = Doc::with_client_id(1);
//! let text = alice.get_or_insert_text("notes");
//! text.insert(&mut alice.transact_mut(), 0, "Hello, World!").unwrap();
//!
//! let mut bob = Doc::with_client_id(2);
//! let update = alice.encode_state_as_update_v1(None).unwrap();
//! bob.apply_update_v1(&update).unwrap();
//!
//! let notes = bob.get_or_insert_text("notes");
//! assert_eq!(notes.get_string(&bob.transact()), "Hello, World!");
//! ```
//!
//! # Undo
//!
//! ```
//! use tandem::{Doc, ReadTxn, Text};
//! use tandem::undo::{Options, UndoManager};
//!
//! let mut doc = Doc::with_client_id(1);
//! let text = doc.get_or_insert_text("notes");
//! let undo = UndoManager::new(&doc, &text, Options::default()).unwrap();
//!
//! text.insert(&mut doc.transact_mut(), 0, "draft").unwrap();
//! assert!(undo.undo(&mut doc));
//! assert_eq!(text.get_string(&doc.transact()), "");
//! assert!(undo.redo(&mut doc));
//! assert_eq!(text.get_string(&doc.transact()), "draft");
//! ```

pub mod any;
pub mod crdt;
pub mod doc;
pub mod error;
pub mod observer;
pub mod sync;
pub mod transaction;
pub mod types;
pub mod undo;
pub mod updates;

pub use any::Any;
pub use crdt::branch::{BranchPtr, TypeRef};
pub use crdt::primitives::clock::{Clock, ManualClock, StateVector, SystemClock};
pub use crdt::primitives::id::{ClientId, Id};
pub use crdt::primitives::id_set::{DeleteSet, IdSet};
pub use doc::{Doc, Options};
pub use error::{DecodeError, Error};
pub use observer::Subscription;
pub use sync::awareness::{Awareness, AwarenessEvent};
pub use transaction::{Origin, ReadTxn, Transaction, TransactionEvent, TransactionMut, UpdateEvent};
pub use types::array::ArrayRef;
pub use types::map::MapRef;
pub use types::text::{Attrs, Delta, Text, TextPrelim, TextRef};
pub use types::xml::{
    XmlElementPrelim, XmlElementRef, XmlFragment, XmlFragmentRef, XmlIn, XmlNode, XmlOut, XmlTextPrelim,
    XmlTextRef,
};
pub use types::{In, Out, SharedRef};
pub use undo::UndoManager;
pub use updates::update::Update;
