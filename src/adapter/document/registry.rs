//! Entity registry
//!
//! Collections are owned by the adapter instance and looked up by
//! `EntityName`. A missing entity is a `NotRegistered` value, distinct
//! from "record not found" and from backend failures.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::error::QueryError;

/// One stored record
pub type Document = Map<String, Value>;

/// Typed collection key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityName(String);

impl EntityName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EntityName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Lookup of an entity that has no collection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Model for entity {entity} is not registered")]
pub struct NotRegistered {
    pub entity: EntityName,
}

impl From<NotRegistered> for QueryError {
    fn from(err: NotRegistered) -> Self {
        QueryError::NotRegistered {
            entity: err.entity.0,
        }
    }
}

/// Ordered records of one entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    documents: Vec<Document>,
}

impl Collection {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    /// Index of the record whose `_id` equals `id`
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.documents
            .iter()
            .position(|doc| doc.get("_id").and_then(Value::as_str) == Some(id))
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Document> {
        self.position_of(id).map(|i| &self.documents[i])
    }

    pub fn get(&self, index: usize) -> Option<&Document> {
        self.documents.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Document> {
        self.documents.get_mut(index)
    }

    pub fn push(&mut self, document: Document) {
        self.documents.push(document);
    }

    pub fn remove(&mut self, index: usize) -> Document {
        self.documents.remove(index)
    }
}

/// Every registered collection, keyed by entity
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    collections: BTreeMap<EntityName, Collection>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty collection; an existing one is kept
    pub fn register(&mut self, entity: impl Into<EntityName>) {
        self.collections.entry(entity.into()).or_default();
    }

    /// Register a collection holding `documents`, replacing any existing one
    pub fn register_with(&mut self, entity: impl Into<EntityName>, documents: Vec<Document>) {
        self.collections
            .insert(entity.into(), Collection::new(documents));
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.collections.contains_key(&EntityName::from(entity))
    }

    pub fn collection(&self, entity: &str) -> Result<&Collection, NotRegistered> {
        let name = EntityName::from(entity);
        match self.collections.get(&name) {
            Some(collection) => Ok(collection),
            None => Err(NotRegistered { entity: name }),
        }
    }

    pub fn collection_mut(&mut self, entity: &str) -> Result<&mut Collection, NotRegistered> {
        let name = EntityName::from(entity);
        match self.collections.get_mut(&name) {
            Some(collection) => Ok(collection),
            None => Err(NotRegistered { entity: name }),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &EntityName> {
        self.collections.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityName, &Collection)> {
        self.collections.iter()
    }
}
