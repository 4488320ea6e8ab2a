// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! lm-core: Shared model for the livemirror client
//!
//! This crate holds the I/O-free part of the mirror: socket protocol types
//! and frame decoding, the session and tree-stack model, the two-phase
//! synchronization reducer and the session event records.

pub mod error;
pub mod event;
pub mod model;
pub mod protocol;
pub mod session;
pub mod state;
pub mod sync;

pub use error::{Error, Result};
pub use event::{EventRecord, NavigationEvent, SessionEvent, TreeLoadRecord, LOAD_TREE_EVENTS};
pub use model::{
    Card, Credentials, Page, Patient, SessionDescriptor, SessionKind, SyncDirection, SyncRecord,
    Tree, TreeFrame, User, GUEST_PATIENT_ID,
};
pub use protocol::{decode_frame, ClientMessage, InboundMessage, SyncResult};
pub use session::{Session, ShuffleStep};
pub use state::MirrorState;
pub use sync::{classify_records, ForceSyncReason, PollVerdict, ResultOutcome, SyncProgress, SyncState};
