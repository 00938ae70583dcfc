//! # ViewEngine
//!
//! Materialized views over the document store. Each view keeps its rows in a
//! `BTreeMap` ordered by `(key, document id, emit index)` plus a back-index of
//! the rows every document emitted, so a change only touches that document's
//! rows. Views are derived and disposable: [`ViewEngine::rebuild_all`]
//! recomputes them from the store.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use domains::{Change, ChangeListener, Document, DocumentId, DocumentStore, DomainError, DomainResult, Revision};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::key::{ViewKey, ViewQuery, ViewRow};
use super::registry::{ReduceFn, ViewDefinition, ViewRegistry};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RowKey {
    key: ViewKey,
    doc: DocumentId,
    seq: u32,
}

impl RowKey {
    fn lowest(key: ViewKey) -> Self {
        Self {
            key,
            doc: DocumentId::MIN,
            seq: 0,
        }
    }

    fn highest(key: ViewKey) -> Self {
        Self {
            key,
            doc: DocumentId::MAX,
            seq: u32::MAX,
        }
    }
}

#[derive(Debug)]
struct ViewIndex {
    definition: ViewDefinition,
    rows: BTreeMap<RowKey, Value>,
    emitted: HashMap<DocumentId, Vec<RowKey>>,
    /// Last revision applied per document, tombstones included. Notifications
    /// can arrive out of order; anything not newer than this is dropped.
    seen: HashMap<DocumentId, Revision>,
}

impl ViewIndex {
    fn new(definition: ViewDefinition) -> Self {
        Self {
            definition,
            rows: BTreeMap::new(),
            emitted: HashMap::new(),
            seen: HashMap::new(),
        }
    }

    /// Returns false when the change is stale for this view.
    fn apply(&mut self, doc: &Document, deleted: bool) -> bool {
        if matches!(self.seen.get(&doc.id), Some(seen) if *seen >= doc.revision) {
            return false;
        }
        self.seen.insert(doc.id, doc.revision);
        self.remove_rows(doc.id);
        if !deleted {
            self.emit(doc);
        }
        true
    }

    /// Replaces every row with the projection of `documents`. Known tombstones
    /// are kept so a late notification for a deleted document stays ignored.
    fn rebuild(&mut self, documents: &[Document]) {
        self.rows.clear();
        self.emitted.clear();
        for doc in documents {
            self.seen.insert(doc.id, doc.revision);
            self.emit(doc);
        }
    }

    fn remove_rows(&mut self, id: DocumentId) {
        if let Some(rows) = self.emitted.remove(&id) {
            for row in rows {
                self.rows.remove(&row);
            }
        }
    }

    fn emit(&mut self, doc: &Document) {
        match (self.definition.map)(doc) {
            Ok(pairs) => {
                let mut emitted = Vec::with_capacity(pairs.len());
                for (seq, (key, value)) in pairs.into_iter().enumerate() {
                    let row = RowKey {
                        key,
                        doc: doc.id,
                        seq: seq as u32,
                    };
                    self.rows.insert(row.clone(), value);
                    emitted.push(row);
                }
                if !emitted.is_empty() {
                    self.emitted.insert(doc.id, emitted);
                }
            }
            Err(err) => warn!(
                view = %self.definition.name,
                doc = %doc.id,
                error = %err,
                "map failed, entry skipped"
            ),
        }
    }

    fn select(&self, query: &ViewQuery) -> Vec<ViewRow> {
        let selected: Vec<(&RowKey, &Value)> = match &query.key {
            Some(key) => self
                .rows
                .range(RowKey::lowest(key.clone())..)
                .take_while(|(row, _)| row.key.starts_with(key))
                .collect(),
            None => {
                if let (Some(start), Some(end)) = (&query.start_key, &query.end_key) {
                    if start > end {
                        return Vec::new();
                    }
                }
                let lower = query
                    .start_key
                    .clone()
                    .map_or(Bound::Unbounded, |k| Bound::Included(RowKey::lowest(k)));
                let upper = query
                    .end_key
                    .clone()
                    .map_or(Bound::Unbounded, |k| Bound::Included(RowKey::highest(k)));
                self.rows.range((lower, upper)).collect()
            }
        };
        selected
            .into_iter()
            .map(|(row, value)| ViewRow {
                key: row.key.clone(),
                id: Some(row.doc),
                value: value.clone(),
            })
            .collect()
    }
}

/// Summary of a full rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildReport {
    pub views: usize,
    pub documents: usize,
    pub rows: usize,
}

#[derive(Debug)]
pub struct ViewEngine {
    views: BTreeMap<String, RwLock<ViewIndex>>,
}

impl ViewEngine {
    /// Creates empty views for every definition in `registry`. Call
    /// [`ViewEngine::rebuild_all`] before serving queries.
    pub fn new(registry: &ViewRegistry) -> Self {
        let views = registry
            .iter()
            .map(|def| (def.name.clone(), RwLock::new(ViewIndex::new(def.clone()))))
            .collect();
        Self { views }
    }

    pub fn view_names(&self) -> impl Iterator<Item = &str> {
        self.views.keys().map(String::as_str)
    }

    fn slot(&self, name: &str) -> DomainResult<&RwLock<ViewIndex>> {
        self.views
            .get(name)
            .ok_or_else(|| DomainError::not_found("view", name))
    }

    /// Recomputes every view from the store. Used at startup and as the
    /// recovery path for a suspect index.
    pub async fn rebuild_all(&self, store: &dyn DocumentStore) -> DomainResult<RebuildReport> {
        // Lock first, then read: changes committed meanwhile queue behind the
        // locks and are applied (or dropped as stale) afterwards.
        let mut guards = Vec::with_capacity(self.views.len());
        for slot in self.views.values() {
            guards.push(slot.write().await);
        }
        let documents = store.all_documents().await?;
        for index in guards.iter_mut() {
            index.rebuild(&documents);
        }
        let report = RebuildReport {
            views: guards.len(),
            documents: documents.len(),
            rows: guards.iter().map(|index| index.rows.len()).sum(),
        };
        info!(
            views = report.views,
            documents = report.documents,
            rows = report.rows,
            "views rebuilt"
        );
        Ok(report)
    }

    pub async fn rebuild_view(&self, name: &str, store: &dyn DocumentStore) -> DomainResult<usize> {
        let mut index = self.slot(name)?.write().await;
        let documents = store.all_documents().await?;
        index.rebuild(&documents);
        info!(view = name, rows = index.rows.len(), "view rebuilt");
        Ok(index.rows.len())
    }

    /// Replaces the definition of a registered view. A different version
    /// triggers a rebuild of that view; the same version is a no-op.
    /// Returns whether a rebuild happened.
    pub async fn install(
        &self,
        definition: ViewDefinition,
        store: &dyn DocumentStore,
    ) -> DomainResult<bool> {
        let mut index = self.slot(&definition.name)?.write().await;
        if index.definition.version == definition.version {
            return Ok(false);
        }
        let documents = store.all_documents().await?;
        info!(
            view = %definition.name,
            from = index.definition.version,
            to = definition.version,
            "view definition changed, rebuilding"
        );
        index.definition = definition;
        index.rebuild(&documents);
        Ok(true)
    }

    pub async fn query(&self, name: &str, query: &ViewQuery) -> DomainResult<Vec<ViewRow>> {
        let index = self.slot(name)?.read().await;
        let mut rows = index.select(query);
        if query.wants_reduce() {
            let reduce = index.definition.reduce.ok_or_else(|| {
                DomainError::validation(format!("view `{name}` has no reduce function"))
            })?;
            rows = if query.group {
                group_rows(&rows, reduce)
            } else {
                total_row(&rows, reduce).into_iter().collect()
            };
        }
        drop(index);

        if query.descending {
            rows.reverse();
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    /// Row count per view.
    pub async fn row_counts(&self) -> Vec<(String, usize)> {
        let mut counts = Vec::with_capacity(self.views.len());
        for (name, slot) in &self.views {
            counts.push((name.clone(), slot.read().await.rows.len()));
        }
        counts
    }
}

#[async_trait]
impl ChangeListener for ViewEngine {
    async fn on_change(&self, change: &Change) {
        let doc = change.document();
        for (name, slot) in &self.views {
            let applied = slot.write().await.apply(doc, change.is_delete());
            if applied {
                debug!(view = %name, doc = %doc.id, revision = %doc.revision, "view updated");
            } else {
                debug!(view = %name, doc = %doc.id, revision = %doc.revision, "stale change ignored");
            }
        }
    }
}

fn group_rows(rows: &[ViewRow], reduce: ReduceFn) -> Vec<ViewRow> {
    let mut grouped = Vec::new();
    let mut start = 0;
    while start < rows.len() {
        let key = &rows[start].key;
        let end = rows[start..]
            .iter()
            .position(|row| &row.key != key)
            .map_or(rows.len(), |offset| start + offset);
        let values: Vec<&Value> = rows[start..end].iter().map(|row| &row.value).collect();
        grouped.push(ViewRow {
            key: key.clone(),
            id: None,
            value: reduce(&values),
        });
        start = end;
    }
    grouped
}

fn total_row(rows: &[ViewRow], reduce: ReduceFn) -> Option<ViewRow> {
    if rows.is_empty() {
        return None;
    }
    let values: Vec<&Value> = rows.iter().map(|row| &row.value).collect();
    Some(ViewRow {
        key: ViewKey::default(),
        id: None,
        value: reduce(&values),
    })
}
