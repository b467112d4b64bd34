//! In-memory property-graph store.
//!
//! Vertices and edges live in version chains keyed by monotonic ids.
//! Label names, edge type names, and property keys are interned through
//! the store-wide catalog so plans can carry compact identifiers.
//! Adjacency lists and index entries are append-only; readers re-check
//! visibility and current values instead of relying on eager removal.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::storage::mvcc::{Chain, CommitId, Snapshot, Stamp, TransactionId, Visibility};
use crate::storage::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct VertexId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct EdgeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeTypeId(pub u32);

/// Edge traversal direction relative to a source vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

/// Scalar or list value stored on a vertex or edge.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    fn type_rank(&self) -> u8 {
        match self {
            PropertyValue::Bool(_) => 0,
            PropertyValue::Int(_) | PropertyValue::Double(_) => 1,
            PropertyValue::String(_) => 2,
            PropertyValue::List(_) => 3,
        }
    }
}

/// Total ordering over property values used as index keys.
///
/// Ints and doubles share one numeric class so an equality probe with
/// `1.0` finds vertices storing `1`.
#[derive(Debug, Clone)]
pub struct PropertyKey(pub PropertyValue);

impl PartialEq for PropertyKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PropertyKey {}

impl PartialOrd for PropertyKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PropertyKey {
    fn cmp(&self, other: &Self) -> Ordering {
        use PropertyValue::*;
        let (a, b) = (&self.0, &other.0);
        match (a, b) {
            (Bool(x), Bool(y)) => x.cmp(y),
            (Int(x), Int(y)) => x.cmp(y),
            (Double(x), Double(y)) => x.total_cmp(y),
            (Int(x), Double(y)) => (*x as f64).total_cmp(y),
            (Double(x), Int(y)) => x.total_cmp(&(*y as f64)),
            (String(x), String(y)) => x.cmp(y),
            (List(x), List(y)) => {
                for (ex, ey) in x.iter().zip(y.iter()) {
                    let ord = PropertyKey(ex.clone()).cmp(&PropertyKey(ey.clone()));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                x.len().cmp(&y.len())
            }
            _ => a.type_rank().cmp(&b.type_rank()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexData {
    pub labels: Vec<LabelId>,
    pub properties: BTreeMap<PropertyId, PropertyValue>,
}

impl VertexData {
    pub fn has_label(&self, label: LabelId) -> bool {
        self.labels.contains(&label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeData {
    pub from: VertexId,
    pub to: VertexId,
    pub edge_type: EdgeTypeId,
    pub properties: BTreeMap<PropertyId, PropertyValue>,
}

/// One step of an expansion: the traversed edge and its far endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expansion {
    pub edge: EdgeId,
    pub other: VertexId,
}

/// Cardinality statistics a property index exposes to the cost planner.
#[derive(Debug, Clone, Copy)]
pub struct IndexStats {
    pub entries: usize,
    pub distinct_keys: usize,
}

impl IndexStats {
    /// Expected matches for an equality probe.
    pub fn average_group_size(&self) -> f64 {
        if self.distinct_keys == 0 {
            0.0
        } else {
            self.entries as f64 / self.distinct_keys as f64
        }
    }
}

#[derive(Debug, Default)]
struct Interner {
    by_name: HashMap<String, u32>,
    names: Vec<String>,
}

impl Interner {
    fn intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_owned());
        self.by_name.insert(name.to_owned(), id);
        id
    }

    fn name(&self, id: u32) -> &str {
        &self.names[id as usize]
    }
}

/// Store-wide name catalog. Identifiers are append-only and stable for
/// the lifetime of the store, so cached plans may embed them.
#[derive(Debug, Default)]
pub struct Catalog {
    labels: RwLock<Interner>,
    properties: RwLock<Interner>,
    edge_types: RwLock<Interner>,
}

impl Catalog {
    pub fn label(&self, name: &str) -> LabelId {
        LabelId(self.labels.write().intern(name))
    }

    pub fn property(&self, name: &str) -> PropertyId {
        PropertyId(self.properties.write().intern(name))
    }

    pub fn edge_type(&self, name: &str) -> EdgeTypeId {
        EdgeTypeId(self.edge_types.write().intern(name))
    }

    pub fn label_name(&self, id: LabelId) -> String {
        self.labels.read().name(id.0).to_owned()
    }

    pub fn property_name(&self, id: PropertyId) -> String {
        self.properties.read().name(id.0).to_owned()
    }

    pub fn edge_type_name(&self, id: EdgeTypeId) -> String {
        self.edge_types.read().name(id.0).to_owned()
    }
}

#[derive(Debug, Default)]
struct Adjacency {
    out: Vec<EdgeId>,
    inc: Vec<EdgeId>,
}

type PropertyIndex = BTreeMap<PropertyKey, BTreeSet<VertexId>>;

#[derive(Debug, Default)]
struct StoreInner {
    vertices: BTreeMap<VertexId, Chain<VertexData>>,
    edges: BTreeMap<EdgeId, Chain<EdgeData>>,
    adjacency: HashMap<VertexId, Adjacency>,
    label_index: HashMap<LabelId, BTreeSet<VertexId>>,
    property_indexes: HashMap<(LabelId, PropertyId), PropertyIndex>,
}

impl StoreInner {
    fn index_vertex(&mut self, id: VertexId, data: &VertexData) {
        for &label in &data.labels {
            self.label_index.entry(label).or_default().insert(id);
            for (&prop, value) in &data.properties {
                if let Some(index) = self.property_indexes.get_mut(&(label, prop)) {
                    index
                        .entry(PropertyKey(value.clone()))
                        .or_default()
                        .insert(id);
                }
            }
        }
    }
}

/// Record identity used by transaction write sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKey {
    Vertex(VertexId),
    Edge(EdgeId),
}

/// The in-memory MVCC graph store. Shared across transactions; each
/// query accesses it through a transaction-scoped [`GraphAccessor`].
///
/// [`GraphAccessor`]: crate::storage::GraphAccessor
#[derive(Debug, Default)]
pub struct GraphStore {
    inner: RwLock<StoreInner>,
    pub catalog: Catalog,
    next_tx: AtomicU64,
    last_commit: AtomicU64,
    next_vertex: AtomicU64,
    next_edge: AtomicU64,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn begin(&self) -> Snapshot {
        let tx = self.next_tx.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        let snapshot = Snapshot {
            tx,
            command: 1,
            last_commit: self.last_commit.load(AtomicOrdering::SeqCst),
        };
        debug!(tx, last_commit = snapshot.last_commit, "transaction started");
        snapshot
    }

    pub(crate) fn commit(&self, tx: TransactionId, write_set: &[RecordKey]) -> CommitId {
        let mut inner = self.inner.write();
        let commit = self.last_commit.load(AtomicOrdering::SeqCst) + 1;
        for &key in write_set {
            match key {
                RecordKey::Vertex(id) => {
                    if let Some(chain) = inner.vertices.get_mut(&id) {
                        chain.seal(tx, commit);
                    }
                }
                RecordKey::Edge(id) => {
                    if let Some(chain) = inner.edges.get_mut(&id) {
                        chain.seal(tx, commit);
                    }
                }
            }
        }
        self.last_commit.store(commit, AtomicOrdering::SeqCst);
        debug!(tx, commit, writes = write_set.len(), "transaction committed");
        commit
    }

    pub(crate) fn abort(&self, tx: TransactionId, write_set: &[RecordKey]) {
        let mut inner = self.inner.write();
        for &key in write_set {
            match key {
                RecordKey::Vertex(id) => {
                    if let Some(chain) = inner.vertices.get_mut(&id) {
                        if chain.unseal(tx) {
                            inner.vertices.remove(&id);
                        }
                    }
                }
                RecordKey::Edge(id) => {
                    if let Some(chain) = inner.edges.get_mut(&id) {
                        if chain.unseal(tx) {
                            inner.edges.remove(&id);
                        }
                    }
                }
            }
        }
        debug!(tx, writes = write_set.len(), "transaction aborted");
    }

    pub(crate) fn create_vertex(&self, snap: &Snapshot, data: VertexData) -> VertexId {
        let id = VertexId(self.next_vertex.fetch_add(1, AtomicOrdering::SeqCst) + 1);
        let mut inner = self.inner.write();
        inner.index_vertex(id, &data);
        inner
            .vertices
            .insert(id, Chain::starting_with(data, Stamp::new(snap.tx, snap.command)));
        id
    }

    pub(crate) fn create_edge(
        &self,
        snap: &Snapshot,
        from: VertexId,
        to: VertexId,
        edge_type: EdgeTypeId,
        properties: BTreeMap<PropertyId, PropertyValue>,
    ) -> Result<EdgeId, StorageError> {
        let mut inner = self.inner.write();
        for endpoint in [from, to] {
            let chain = inner
                .vertices
                .get(&endpoint)
                .ok_or(StorageError::RecordGone("vertex"))?;
            if !chain.is_visible(snap, Visibility::Update) {
                return Err(StorageError::RecordGone("vertex"));
            }
        }
        let id = EdgeId(self.next_edge.fetch_add(1, AtomicOrdering::SeqCst) + 1);
        let data = EdgeData {
            from,
            to,
            edge_type,
            properties,
        };
        inner
            .edges
            .insert(id, Chain::starting_with(data, Stamp::new(snap.tx, snap.command)));
        inner.adjacency.entry(from).or_default().out.push(id);
        inner.adjacency.entry(to).or_default().inc.push(id);
        Ok(id)
    }

    pub(crate) fn update_vertex(
        &self,
        snap: &Snapshot,
        id: VertexId,
        apply: impl FnOnce(&mut VertexData),
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        let chain = inner
            .vertices
            .get_mut(&id)
            .ok_or(StorageError::RecordGone("vertex"))?;
        let mut data = chain
            .visible(snap, Visibility::Update)
            .ok_or(StorageError::RecordGone("vertex"))?
            .data
            .clone();
        apply(&mut data);
        chain.push_update(data.clone(), snap)?;
        inner.index_vertex(id, &data);
        Ok(())
    }

    pub(crate) fn update_edge(
        &self,
        snap: &Snapshot,
        id: EdgeId,
        apply: impl FnOnce(&mut EdgeData),
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        let chain = inner
            .edges
            .get_mut(&id)
            .ok_or(StorageError::RecordGone("edge"))?;
        let mut data = chain
            .visible(snap, Visibility::Update)
            .ok_or(StorageError::RecordGone("edge"))?
            .data
            .clone();
        apply(&mut data);
        chain.push_update(data, snap)
    }

    pub(crate) fn delete_vertex(
        &self,
        snap: &Snapshot,
        id: VertexId,
        detach: bool,
    ) -> Result<Vec<RecordKey>, StorageError> {
        let incident = self.incident_edges(snap, id);
        let mut touched = Vec::new();
        if !incident.is_empty() {
            if !detach {
                return Err(StorageError::VertexHasEdges);
            }
            for edge in incident {
                self.expire_edge(snap, edge)?;
                touched.push(RecordKey::Edge(edge));
            }
        }
        let mut inner = self.inner.write();
        let chain = inner
            .vertices
            .get_mut(&id)
            .ok_or(StorageError::RecordGone("vertex"))?;
        if chain.is_visible(snap, Visibility::Update) {
            chain.expire(snap)?;
            touched.push(RecordKey::Vertex(id));
        }
        Ok(touched)
    }

    pub(crate) fn delete_edge(&self, snap: &Snapshot, id: EdgeId) -> Result<bool, StorageError> {
        self.expire_edge(snap, id)
    }

    /// Expires an edge if it is still visible; deleting an edge this
    /// transaction already deleted is a no-op.
    fn expire_edge(&self, snap: &Snapshot, id: EdgeId) -> Result<bool, StorageError> {
        let mut inner = self.inner.write();
        let chain = inner
            .edges
            .get_mut(&id)
            .ok_or(StorageError::RecordGone("edge"))?;
        if !chain.is_visible(snap, Visibility::Update) {
            return Ok(false);
        }
        chain.expire(snap)?;
        Ok(true)
    }

    fn incident_edges(&self, snap: &Snapshot, id: VertexId) -> Vec<EdgeId> {
        let inner = self.inner.read();
        let Some(adjacency) = inner.adjacency.get(&id) else {
            return Vec::new();
        };
        let mut edges = Vec::new();
        for &edge in adjacency.out.iter().chain(adjacency.inc.iter()) {
            if edges.contains(&edge) {
                continue;
            }
            if let Some(chain) = inner.edges.get(&edge) {
                if chain.is_visible(snap, Visibility::Update) {
                    edges.push(edge);
                }
            }
        }
        edges
    }

    pub(crate) fn vertex_data(&self, snap: &Snapshot, id: VertexId) -> Option<VertexData> {
        let inner = self.inner.read();
        inner
            .vertices
            .get(&id)?
            .visible(snap, Visibility::Read)
            .map(|v| v.data.clone())
    }

    pub(crate) fn edge_data(&self, snap: &Snapshot, id: EdgeId) -> Option<EdgeData> {
        let inner = self.inner.read();
        inner
            .edges
            .get(&id)?
            .visible(snap, Visibility::Read)
            .map(|v| v.data.clone())
    }

    pub(crate) fn vertices(&self, snap: &Snapshot, label: Option<LabelId>) -> Vec<VertexId> {
        let inner = self.inner.read();
        match label {
            None => inner
                .vertices
                .iter()
                .filter(|(_, chain)| chain.is_visible(snap, Visibility::Read))
                .map(|(&id, _)| id)
                .collect(),
            Some(label) => {
                let Some(entries) = inner.label_index.get(&label) else {
                    return Vec::new();
                };
                entries
                    .iter()
                    .filter(|id| {
                        inner
                            .vertices
                            .get(*id)
                            .and_then(|chain| chain.visible(snap, Visibility::Read))
                            .is_some_and(|v| v.data.has_label(label))
                    })
                    .copied()
                    .collect()
            }
        }
    }

    pub(crate) fn index_lookup_value(
        &self,
        snap: &Snapshot,
        label: LabelId,
        property: PropertyId,
        key: &PropertyKey,
    ) -> Vec<VertexId> {
        let inner = self.inner.read();
        let Some(index) = inner.property_indexes.get(&(label, property)) else {
            return Vec::new();
        };
        let Some(entries) = index.get(key) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter(|id| {
                inner
                    .vertices
                    .get(*id)
                    .and_then(|chain| chain.visible(snap, Visibility::Read))
                    .is_some_and(|v| {
                        v.data.has_label(label)
                            && v.data
                                .properties
                                .get(&property)
                                .is_some_and(|value| PropertyKey(value.clone()) == *key)
                    })
            })
            .copied()
            .collect()
    }

    pub(crate) fn index_lookup_range(
        &self,
        snap: &Snapshot,
        label: LabelId,
        property: PropertyId,
        lower: Bound<PropertyKey>,
        upper: Bound<PropertyKey>,
    ) -> Vec<VertexId> {
        let inner = self.inner.read();
        let Some(index) = inner.property_indexes.get(&(label, property)) else {
            return Vec::new();
        };
        // An empty or inverted range yields nothing; BTreeMap::range
        // panics on those.
        if let (
            Bound::Included(low) | Bound::Excluded(low),
            Bound::Included(high) | Bound::Excluded(high),
        ) = (&lower, &upper)
        {
            if low > high {
                return Vec::new();
            }
            if low == high
                && (matches!(lower, Bound::Excluded(_)) || matches!(upper, Bound::Excluded(_)))
            {
                return Vec::new();
            }
        }
        let in_bounds = |key: &PropertyKey| {
            let lower_ok = match &lower {
                Bound::Unbounded => true,
                Bound::Included(b) => key >= b,
                Bound::Excluded(b) => key > b,
            };
            let upper_ok = match &upper {
                Bound::Unbounded => true,
                Bound::Included(b) => key <= b,
                Bound::Excluded(b) => key < b,
            };
            lower_ok && upper_ok
        };
        let mut result = Vec::new();
        for (_, entries) in index.range((lower.clone(), upper.clone())) {
            for id in entries {
                if result.contains(id) {
                    continue;
                }
                let current = inner
                    .vertices
                    .get(id)
                    .and_then(|chain| chain.visible(snap, Visibility::Read));
                if current.is_some_and(|v| {
                    v.data.has_label(label)
                        && v.data
                            .properties
                            .get(&property)
                            .is_some_and(|value| in_bounds(&PropertyKey(value.clone())))
                }) {
                    result.push(*id);
                }
            }
        }
        result
    }

    pub(crate) fn expansions(
        &self,
        snap: &Snapshot,
        vertex: VertexId,
        direction: Direction,
        edge_types: &[EdgeTypeId],
    ) -> Vec<Expansion> {
        let inner = self.inner.read();
        let Some(adjacency) = inner.adjacency.get(&vertex) else {
            return Vec::new();
        };
        let mut result = Vec::new();
        let mut push = |edge: EdgeId, data: &EdgeData, other: VertexId| {
            if edge_types.is_empty() || edge_types.contains(&data.edge_type) {
                result.push(Expansion { edge, other });
            }
        };
        if direction != Direction::In {
            for &edge in &adjacency.out {
                if let Some(v) = inner
                    .edges
                    .get(&edge)
                    .and_then(|chain| chain.visible(snap, Visibility::Read))
                {
                    push(edge, &v.data, v.data.to);
                }
            }
        }
        if direction != Direction::Out {
            for &edge in &adjacency.inc {
                if let Some(v) = inner
                    .edges
                    .get(&edge)
                    .and_then(|chain| chain.visible(snap, Visibility::Read))
                {
                    // A self loop already appeared in the outgoing pass.
                    if direction == Direction::Both && v.data.from == v.data.to {
                        continue;
                    }
                    push(edge, &v.data, v.data.from);
                }
            }
        }
        result
    }

    /// Builds a label+property index over currently visible vertices and
    /// registers it for maintenance on subsequent writes.
    pub(crate) fn build_index(&self, snap: &Snapshot, label: LabelId, property: PropertyId) {
        let mut inner = self.inner.write();
        let mut index: PropertyIndex = BTreeMap::new();
        let entries: Vec<(VertexId, PropertyValue)> = inner
            .vertices
            .iter()
            .filter_map(|(&id, chain)| {
                chain
                    .visible(snap, Visibility::Update)
                    .map(|v| (id, &v.data))
            })
            .filter(|(_, data)| data.has_label(label))
            .filter_map(|(id, data)| data.properties.get(&property).map(|v| (id, v.clone())))
            .collect();
        for (id, value) in entries {
            index.entry(PropertyKey(value)).or_default().insert(id);
        }
        inner.property_indexes.insert((label, property), index);
        info!(
            label = %self.catalog.label_name(label),
            property = %self.catalog.property_name(property),
            "index created"
        );
    }

    pub(crate) fn has_property_index(&self, label: LabelId, property: PropertyId) -> bool {
        self.inner
            .read()
            .property_indexes
            .contains_key(&(label, property))
    }

    pub(crate) fn vertices_approx_count(&self) -> usize {
        self.inner.read().vertices.len()
    }

    pub(crate) fn label_approx_count(&self, label: LabelId) -> usize {
        self.inner
            .read()
            .label_index
            .get(&label)
            .map_or(0, |entries| entries.len())
    }

    pub(crate) fn property_index_stats(
        &self,
        label: LabelId,
        property: PropertyId,
    ) -> Option<IndexStats> {
        let inner = self.inner.read();
        let index = inner.property_indexes.get(&(label, property))?;
        Some(IndexStats {
            entries: index.values().map(|set| set.len()).sum(),
            distinct_keys: index.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store_with_labeled_vertex(value: i64) -> (Arc<GraphStore>, VertexId, LabelId, PropertyId) {
        let store = Arc::new(GraphStore::new());
        let label = store.catalog.label("Person");
        let property = store.catalog.property("id");
        let accessor = store.access();
        let vertex = accessor.create_vertex(
            vec![label],
            BTreeMap::from([(property, PropertyValue::Int(value))]),
        );
        accessor.commit();
        (store, vertex, label, property)
    }

    #[test]
    fn property_keys_merge_numeric_classes() {
        assert_eq!(
            PropertyKey(PropertyValue::Int(1)),
            PropertyKey(PropertyValue::Double(1.0))
        );
        assert!(PropertyKey(PropertyValue::Int(2)) > PropertyKey(PropertyValue::Double(1.5)));
        assert!(
            PropertyKey(PropertyValue::String("a".into()))
                > PropertyKey(PropertyValue::Double(9.0))
        );
    }

    #[test]
    fn label_scans_recheck_current_labels() {
        let (store, vertex, label, _) = store_with_labeled_vertex(1);
        let accessor = store.access();
        assert_eq!(accessor.vertices(Some(label)), [vertex]);
        accessor.remove_labels(vertex, &[label]).unwrap();
        accessor.advance_command();
        // The stale index entry is filtered out on read.
        assert!(accessor.vertices(Some(label)).is_empty());
    }

    #[test]
    fn index_lookups_recheck_current_values() {
        let (store, vertex, label, property) = store_with_labeled_vertex(1);
        {
            let accessor = store.access();
            accessor.build_index(label, property);
            accessor.commit();
        }
        let accessor = store.access();
        assert_eq!(
            accessor.index_lookup_value(label, property, &PropertyKey(PropertyValue::Int(1))),
            [vertex]
        );
        accessor
            .set_property(
                RecordKey::Vertex(vertex),
                property,
                Some(PropertyValue::Int(2)),
            )
            .unwrap();
        accessor.advance_command();
        assert!(accessor
            .index_lookup_value(label, property, &PropertyKey(PropertyValue::Int(1)))
            .is_empty());
        assert_eq!(
            accessor.index_lookup_value(label, property, &PropertyKey(PropertyValue::Int(2))),
            [vertex]
        );
    }

    #[test]
    fn expansions_follow_direction_and_types() {
        let store = Arc::new(GraphStore::new());
        let likes = store.catalog.edge_type("Likes");
        let hates = store.catalog.edge_type("Hates");
        let accessor = store.access();
        let a = accessor.create_vertex(Vec::new(), BTreeMap::new());
        let b = accessor.create_vertex(Vec::new(), BTreeMap::new());
        let liked = accessor.create_edge(a, b, likes, BTreeMap::new()).unwrap();
        accessor.create_edge(b, a, hates, BTreeMap::new()).unwrap();
        accessor.advance_command();

        let out = accessor.expansions(a, Direction::Out, &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].other, b);
        assert_eq!(accessor.expansions(a, Direction::Both, &[]).len(), 2);
        let typed = accessor.expansions(a, Direction::Both, &[likes]);
        assert_eq!(typed.len(), 1);
        assert_eq!(typed[0].edge, liked);
    }

    #[test]
    fn aborted_writes_leave_no_trace() {
        let store = Arc::new(GraphStore::new());
        let accessor = store.access();
        accessor.create_vertex(Vec::new(), BTreeMap::new());
        accessor.abort();
        let reader = store.access();
        assert!(reader.vertices(None).is_empty());
    }

    #[test]
    fn conflicting_writers_are_rejected() {
        let (store, vertex, _, property) = store_with_labeled_vertex(1);
        let tx1 = store.access();
        let tx2 = store.access();
        tx1.set_property(
            RecordKey::Vertex(vertex),
            property,
            Some(PropertyValue::Int(2)),
        )
        .unwrap();
        let err = tx2
            .set_property(
                RecordKey::Vertex(vertex),
                property,
                Some(PropertyValue::Int(3)),
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }
}
