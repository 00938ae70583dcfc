//! # Thread reconstruction
//!
//! Turns the flat `replies_by_parent` relation into a depth-first walk of a
//! reply tree. A walk is a pure function of a [`ThreadSnapshot`], so calling
//! [`ThreadSnapshot::walk`] again restarts it from the root.

use std::collections::{HashMap, HashSet};

use domains::{Document, DocumentId, DomainResult};
use serde::Serialize;
use tracing::warn;

use crate::views::ViewRow;

/// Parent id to ordered children, captured from the reply view at one point in time.
#[derive(Debug, Clone, Default)]
pub struct ThreadSnapshot {
    children: HashMap<DocumentId, Vec<Document>>,
    max_depth: usize,
}

impl ThreadSnapshot {
    /// Builds from `replies_by_parent` rows. Row order is kept, so siblings
    /// come out in creation order.
    pub fn from_rows(rows: &[ViewRow], max_depth: usize) -> DomainResult<Self> {
        let mut children: HashMap<DocumentId, Vec<Document>> = HashMap::new();
        for row in rows {
            let doc: Document = row.decode()?;
            if let Some(reply) = doc.as_reply() {
                children.entry(reply.parent_id).or_default().push(doc);
            }
        }
        Ok(Self {
            children,
            max_depth,
        })
    }

    /// Builds from raw documents; anything that is not a reply is ignored.
    pub fn from_documents(docs: impl IntoIterator<Item = Document>, max_depth: usize) -> Self {
        let mut children: HashMap<DocumentId, Vec<Document>> = HashMap::new();
        for doc in docs {
            if let Some(parent) = doc.as_reply().map(|reply| reply.parent_id) {
                children.entry(parent).or_default().push(doc);
            }
        }
        for siblings in children.values_mut() {
            siblings.sort_by_key(|doc| doc.id);
        }
        Self {
            children,
            max_depth,
        }
    }

    pub fn children_of(&self, parent: &DocumentId) -> &[Document] {
        self.children.get(parent).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn reply_count(&self) -> usize {
        self.children.values().map(Vec::len).sum()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Depth-first walk under `root`; direct children are depth 0.
    pub fn walk(&self, root: DocumentId) -> ThreadWalk<'_> {
        let mut walk = ThreadWalk {
            snapshot: self,
            root,
            stack: Vec::new(),
            visited: HashSet::from([root]),
        };
        if self.max_depth > 0 {
            walk.push_children(&root, 0);
        }
        walk
    }
}

/// Lazy `(reply, depth)` sequence. Uses an explicit stack, never revisits a
/// document, and does not descend past the snapshot's `max_depth`.
#[derive(Debug)]
pub struct ThreadWalk<'a> {
    snapshot: &'a ThreadSnapshot,
    root: DocumentId,
    stack: Vec<(&'a Document, usize)>,
    visited: HashSet<DocumentId>,
}

impl<'a> ThreadWalk<'a> {
    fn push_children(&mut self, parent: &DocumentId, depth: usize) {
        // reversed so the first child is popped first
        for child in self.snapshot.children_of(parent).iter().rev() {
            self.stack.push((child, depth));
        }
    }
}

impl<'a> Iterator for ThreadWalk<'a> {
    type Item = (&'a Document, usize);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((doc, depth)) = self.stack.pop() {
            if !self.visited.insert(doc.id) {
                warn!(root = %self.root, doc = %doc.id, "reply cycle detected, skipping revisit");
                continue;
            }
            let next_depth = depth + 1;
            if next_depth < self.snapshot.max_depth {
                self.push_children(&doc.id, next_depth);
            } else if !self.snapshot.children_of(&doc.id).is_empty() {
                warn!(
                    root = %self.root,
                    doc = %doc.id,
                    max_depth = self.snapshot.max_depth,
                    "thread truncated at depth limit"
                );
            }
            return Some((doc, depth));
        }
        None
    }
}

/// A reply with its nested children, for callers that want the tree shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadNode {
    pub document: Document,
    pub children: Vec<ThreadNode>,
}

/// The root of a thread plus the reply snapshot it was reconstructed from.
#[derive(Debug, Clone)]
pub struct Thread {
    pub root: Document,
    snapshot: ThreadSnapshot,
}

impl Thread {
    pub fn new(root: Document, snapshot: ThreadSnapshot) -> Self {
        Self { root, snapshot }
    }

    pub fn replies(&self) -> ThreadWalk<'_> {
        self.snapshot.walk(self.root.id)
    }

    pub fn snapshot(&self) -> &ThreadSnapshot {
        &self.snapshot
    }

    /// Nests the walk into a tree without recursion.
    pub fn tree(&self) -> Vec<ThreadNode> {
        let mut roots = Vec::new();
        let mut path: Vec<ThreadNode> = Vec::new();
        for (doc, depth) in self.replies() {
            while path.len() > depth {
                if let Some(node) = path.pop() {
                    attach(&mut path, &mut roots, node);
                }
            }
            path.push(ThreadNode {
                document: doc.clone(),
                children: Vec::new(),
            });
        }
        while let Some(node) = path.pop() {
            attach(&mut path, &mut roots, node);
        }
        roots
    }
}

fn attach(path: &mut [ThreadNode], roots: &mut Vec<ThreadNode>, node: ThreadNode) {
    match path.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}
