//! Editor events fed to the tracker.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::decode_identity;
use crate::tracker::{ChangeOrigin, DocumentEvent};

/// Document and tab notifications, in the host's emit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditorEvent {
    /// The set of open tabs changed; `tabs` lists every tab input.
    TopologyChanged {
        /// Raw tab inputs.
        #[serde(default)]
        tabs: Vec<Value>,
    },
    /// A document's content changed in memory.
    DocumentChanged {
        /// Document identity in any accepted shape.
        document: Value,
        /// True when the document is already closed.
        #[serde(default)]
        is_closed: bool,
        /// Number of content changes in the event.
        #[serde(default)]
        change_count: usize,
    },
    /// A document was saved.
    DocumentSaved {
        /// Document identity in any accepted shape.
        document: Value,
    },
}

impl EditorEvent {
    /// Decode an edit/save into a tracker event. Topology changes and
    /// undecodable identities yield `None`.
    #[must_use]
    pub fn document_event(&self) -> Option<DocumentEvent> {
        match self {
            Self::TopologyChanged { .. } => None,
            Self::DocumentChanged {
                document,
                is_closed,
                change_count,
            } => Some(DocumentEvent {
                key: decode_identity(document)?,
                is_closed: *is_closed,
                origin: ChangeOrigin::Edit,
                change_count: *change_count,
            }),
            Self::DocumentSaved { document } => Some(DocumentEvent {
                key: decode_identity(document)?,
                is_closed: false,
                origin: ChangeOrigin::Save,
                change_count: 0,
            }),
        }
    }
}
