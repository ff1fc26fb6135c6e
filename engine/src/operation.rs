//! Write operations produced by planning.
//!
//! Convergence is expressed as a list of writes, not direct mutations: the
//! plan is computed without touching any source, and only the executor turns
//! these operations into adapter calls.

use crate::{FieldName, FieldValue, NativeName, SourceId, Timestamp};
use serde::{Deserialize, Serialize};

/// One planned write of a winning value to one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOp {
    /// Canonical field being written
    pub field: FieldName,
    /// Target source
    pub source_id: SourceId,
    /// The field's name in the target source
    pub native_field: NativeName,
    /// Winning value
    pub value: FieldValue,
    /// Winning timestamp (epoch milliseconds, UTC)
    pub timestamp: Timestamp,
}

impl WriteOp {
    pub fn new(
        field: impl Into<FieldName>,
        source_id: impl Into<SourceId>,
        native_field: impl Into<NativeName>,
        value: FieldValue,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            field: field.into(),
            source_id: source_id.into(),
            native_field: native_field.into(),
            value,
            timestamp,
        }
    }
}
