//! Shared fixtures for the integration suite: a users schema over the
//! in-memory store.
#![allow(dead_code)] // each test binary uses its own subset

use kvdoc_core::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct User {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: String,
}

impl User {
    pub fn new(name: &str, email: Option<&str>, role: &str) -> Self {
        Self {
            name: name.to_string(),
            email: email.map(ToString::to_string),
            role: role.to_string(),
        }
    }
}

pub fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

/// Plain collection: no index maintenance.
pub fn plain_users(store: &Arc<MemoryStore>) -> Collection<User, MemoryStore> {
    Collection::new(
        Arc::clone(store),
        &["plain_users"],
        CollectionOptions::default(),
    )
}

/// Indexable collection: unique `email`, non-unique `role`.
pub fn users(store: &Arc<MemoryStore>) -> IndexableCollection<User, MemoryStore> {
    IndexableCollection::new(
        Arc::clone(store),
        &["users"],
        CollectionOptions::default(),
        &[
            ("email", IndexKind::Primary),
            ("role", IndexKind::Secondary),
        ],
    )
}

pub fn part(text: &str) -> KeyPart {
    KeyPart::from(text)
}
