//! Secondary index from call id to the assistant message that issued it.
//!
//! The transcript owns every [`ToolCallRecord`]; this table only remembers
//! where to find a still-pending one when its result eventually crosses the
//! boundary. Entries are removed as calls settle and the table is drained
//! wholesale on cancel, so anything left in it is by definition pending.
//!
//! [`ToolCallRecord`]: cb_domain::message::ToolCallRecord

use std::collections::HashMap;

use cb_domain::error::{Error, Result};

/// Routes inbound tool results back to the pending call that requested them.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    /// call id -> transcript position of the issuing assistant message.
    entries: HashMap<String, usize>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a freshly announced call. Each id may be registered once per
    /// session.
    pub fn register(&mut self, call_id: &str, message_index: usize) -> Result<()> {
        if self.entries.contains_key(call_id) {
            return Err(Error::DuplicateCall(call_id.to_string()));
        }
        self.entries.insert(call_id.to_string(), message_index);
        Ok(())
    }

    /// Locate the assistant message holding this pending call.
    pub fn lookup(&self, call_id: &str) -> Result<usize> {
        self.entries
            .get(call_id)
            .copied()
            .ok_or_else(|| Error::UnknownCall(call_id.to_string()))
    }

    /// Drop a settled call from the index.
    pub fn remove(&mut self, call_id: &str) {
        self.entries.remove(call_id);
    }

    /// Empty the table, returning every still-pending entry so the caller
    /// can mark those calls failed in the transcript rather than dropping
    /// them silently.
    pub fn drain(&mut self) -> Vec<(String, usize)> {
        self.entries.drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_lookup_remove() {
        let mut table = CorrelationTable::new();
        table.register("c1", 3).unwrap();
        assert_eq!(table.lookup("c1").unwrap(), 3);
        table.remove("c1");
        assert!(matches!(table.lookup("c1"), Err(Error::UnknownCall(_))));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut table = CorrelationTable::new();
        table.register("c1", 0).unwrap();
        assert!(matches!(table.register("c1", 0), Err(Error::DuplicateCall(_))));
    }

    #[test]
    fn drain_returns_pending_entries() {
        let mut table = CorrelationTable::new();
        table.register("c1", 0).unwrap();
        table.register("c2", 0).unwrap();
        let mut pending = table.drain();
        pending.sort();
        assert_eq!(pending, vec![("c1".to_string(), 0), ("c2".to_string(), 0)]);
        assert!(table.is_empty());
    }
}
