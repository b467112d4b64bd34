//! Transaction-scoped view of the graph store.
//!
//! A `GraphAccessor` is the only way query operators touch graph state.
//! It pins the MVCC snapshot taken at transaction begin, tracks the
//! write set for commit/abort, and carries the command counter that
//! controls within-transaction write visibility.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::storage::graph::{
    Direction, EdgeData, EdgeId, EdgeTypeId, Expansion, GraphStore, IndexStats, LabelId,
    PropertyId, PropertyKey, PropertyValue, RecordKey, VertexData, VertexId,
};
use crate::storage::mvcc::{CommandId, Snapshot, TransactionId};
use crate::storage::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Active,
    Committed,
    Aborted,
}

impl GraphStore {
    /// Begins a transaction and returns an accessor scoped to it.
    pub fn access(self: &Arc<Self>) -> GraphAccessor {
        GraphAccessor::new(Arc::clone(self))
    }
}

pub struct GraphAccessor {
    store: Arc<GraphStore>,
    snapshot: Cell<Snapshot>,
    write_set: RefCell<Vec<RecordKey>>,
    state: Cell<TxState>,
    failed: Cell<bool>,
    index_created: Cell<bool>,
}

impl GraphAccessor {
    pub(crate) fn new(store: Arc<GraphStore>) -> Self {
        let snapshot = store.begin();
        Self {
            store,
            snapshot: Cell::new(snapshot),
            write_set: RefCell::new(Vec::new()),
            state: Cell::new(TxState::Active),
            failed: Cell::new(false),
            index_created: Cell::new(false),
        }
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.snapshot.get().tx
    }

    pub fn command_id(&self) -> CommandId {
        self.snapshot.get().command
    }

    fn snap(&self) -> Snapshot {
        self.snapshot.get()
    }

    fn record_write(&self, key: RecordKey) {
        self.write_set.borrow_mut().push(key);
    }

    /// Makes writes of earlier commands readable by subsequent reads in
    /// this transaction.
    pub fn advance_command(&self) {
        let mut snapshot = self.snapshot.get();
        snapshot.command += 1;
        self.snapshot.set(snapshot);
    }

    // ---- reads ------------------------------------------------------

    pub fn vertices(&self, label: Option<LabelId>) -> Vec<VertexId> {
        self.store.vertices(&self.snap(), label)
    }

    pub fn index_lookup_value(
        &self,
        label: LabelId,
        property: PropertyId,
        key: &PropertyKey,
    ) -> Vec<VertexId> {
        self.store
            .index_lookup_value(&self.snap(), label, property, key)
    }

    pub fn index_lookup_range(
        &self,
        label: LabelId,
        property: PropertyId,
        lower: Bound<PropertyKey>,
        upper: Bound<PropertyKey>,
    ) -> Vec<VertexId> {
        self.store
            .index_lookup_range(&self.snap(), label, property, lower, upper)
    }

    pub fn vertex_data(&self, id: VertexId) -> Option<VertexData> {
        self.store.vertex_data(&self.snap(), id)
    }

    pub fn vertex_labels(&self, id: VertexId) -> Vec<LabelId> {
        self.vertex_data(id).map(|d| d.labels).unwrap_or_default()
    }

    pub fn vertex_property(&self, id: VertexId, property: PropertyId) -> Option<PropertyValue> {
        self.vertex_data(id)
            .and_then(|d| d.properties.get(&property).cloned())
    }

    pub fn vertex_properties(&self, id: VertexId) -> BTreeMap<PropertyId, PropertyValue> {
        self.vertex_data(id).map(|d| d.properties).unwrap_or_default()
    }

    pub fn expansions(
        &self,
        vertex: VertexId,
        direction: Direction,
        edge_types: &[EdgeTypeId],
    ) -> Vec<Expansion> {
        self.store
            .expansions(&self.snap(), vertex, direction, edge_types)
    }

    pub fn edge_data(&self, id: EdgeId) -> Option<EdgeData> {
        self.store.edge_data(&self.snap(), id)
    }

    pub fn edge_property(&self, id: EdgeId, property: PropertyId) -> Option<PropertyValue> {
        self.edge_data(id)
            .and_then(|d| d.properties.get(&property).cloned())
    }

    // ---- writes -----------------------------------------------------

    pub fn create_vertex(
        &self,
        labels: Vec<LabelId>,
        properties: BTreeMap<PropertyId, PropertyValue>,
    ) -> VertexId {
        let id = self
            .store
            .create_vertex(&self.snap(), VertexData { labels, properties });
        self.record_write(RecordKey::Vertex(id));
        id
    }

    pub fn create_edge(
        &self,
        from: VertexId,
        to: VertexId,
        edge_type: EdgeTypeId,
        properties: BTreeMap<PropertyId, PropertyValue>,
    ) -> Result<EdgeId, StorageError> {
        let id = self
            .store
            .create_edge(&self.snap(), from, to, edge_type, properties)?;
        self.record_write(RecordKey::Edge(id));
        Ok(id)
    }

    /// Sets or, with a `None` value, removes a single property.
    pub fn set_property(
        &self,
        key: RecordKey,
        property: PropertyId,
        value: Option<PropertyValue>,
    ) -> Result<(), StorageError> {
        let snap = self.snap();
        match key {
            RecordKey::Vertex(id) => {
                self.store.update_vertex(&snap, id, |data| match &value {
                    Some(value) => {
                        data.properties.insert(property, value.clone());
                    }
                    None => {
                        data.properties.remove(&property);
                    }
                })?
            }
            RecordKey::Edge(id) => self.store.update_edge(&snap, id, |data| match &value {
                Some(value) => {
                    data.properties.insert(property, value.clone());
                }
                None => {
                    data.properties.remove(&property);
                }
            })?,
        }
        self.record_write(key);
        Ok(())
    }

    /// Replaces or merges the whole property set of a record.
    pub fn set_properties(
        &self,
        key: RecordKey,
        properties: BTreeMap<PropertyId, PropertyValue>,
        replace: bool,
    ) -> Result<(), StorageError> {
        let snap = self.snap();
        let apply = |target: &mut BTreeMap<PropertyId, PropertyValue>| {
            if replace {
                *target = properties.clone();
            } else {
                for (prop, value) in &properties {
                    target.insert(*prop, value.clone());
                }
            }
        };
        match key {
            RecordKey::Vertex(id) => self
                .store
                .update_vertex(&snap, id, |data| apply(&mut data.properties))?,
            RecordKey::Edge(id) => self
                .store
                .update_edge(&snap, id, |data| apply(&mut data.properties))?,
        }
        self.record_write(key);
        Ok(())
    }

    pub fn add_labels(&self, id: VertexId, labels: &[LabelId]) -> Result<(), StorageError> {
        self.store.update_vertex(&self.snap(), id, |data| {
            for &label in labels {
                if !data.labels.contains(&label) {
                    data.labels.push(label);
                }
            }
        })?;
        self.record_write(RecordKey::Vertex(id));
        Ok(())
    }

    pub fn remove_labels(&self, id: VertexId, labels: &[LabelId]) -> Result<(), StorageError> {
        self.store.update_vertex(&self.snap(), id, |data| {
            data.labels.retain(|label| !labels.contains(label));
        })?;
        self.record_write(RecordKey::Vertex(id));
        Ok(())
    }

    pub fn delete_vertex(&self, id: VertexId, detach: bool) -> Result<(), StorageError> {
        let touched = self.store.delete_vertex(&self.snap(), id, detach)?;
        self.write_set.borrow_mut().extend(touched);
        Ok(())
    }

    pub fn delete_edge(&self, id: EdgeId) -> Result<(), StorageError> {
        if self.store.delete_edge(&self.snap(), id)? {
            self.record_write(RecordKey::Edge(id));
        }
        Ok(())
    }

    // ---- indexes ----------------------------------------------------

    pub fn build_index(&self, label: LabelId, property: PropertyId) {
        self.store.build_index(&self.snap(), label, property);
        self.index_created.set(true);
    }

    pub fn has_property_index(&self, label: LabelId, property: PropertyId) -> bool {
        self.store.has_property_index(label, property)
    }

    pub fn is_index_created(&self) -> bool {
        self.index_created.get()
    }

    // ---- statistics -------------------------------------------------

    pub fn vertices_approx_count(&self) -> usize {
        self.store.vertices_approx_count()
    }

    pub fn label_approx_count(&self, label: LabelId) -> usize {
        self.store.label_approx_count(label)
    }

    pub fn property_index_stats(
        &self,
        label: LabelId,
        property: PropertyId,
    ) -> Option<IndexStats> {
        self.store.property_index_stats(label, property)
    }

    // ---- lifecycle --------------------------------------------------

    /// Marks an explicit transaction failed; statements keep failing
    /// until the owner rolls it back.
    pub fn mark_failed(&self) {
        self.failed.set(true);
    }

    pub fn is_failed(&self) -> bool {
        self.failed.get()
    }

    pub fn is_active(&self) -> bool {
        self.state.get() == TxState::Active
    }

    pub fn commit(&self) {
        if self.state.get() != TxState::Active {
            return;
        }
        let snap = self.snap();
        self.store.commit(snap.tx, &self.write_set.borrow());
        self.state.set(TxState::Committed);
    }

    pub fn abort(&self) {
        if self.state.get() != TxState::Active {
            return;
        }
        let snap = self.snap();
        self.store.abort(snap.tx, &self.write_set.borrow());
        self.state.set(TxState::Aborted);
        if self.failed.get() {
            warn!(tx = snap.tx, "failed transaction rolled back");
        }
    }
}

impl Drop for GraphAccessor {
    fn drop(&mut self) {
        if self.state.get() == TxState::Active {
            debug!(tx = self.snapshot.get().tx, "transaction dropped, aborting");
            self.abort();
        }
    }
}
