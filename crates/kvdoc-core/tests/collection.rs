mod common;

use common::{User, part, plain_users, store};
use kvdoc_core::prelude::*;
use std::sync::Arc;

#[test]
fn add_then_find_roundtrips() {
    let store = store();
    let users = plain_users(&store);
    let value = User::new("ada", Some("ada@x"), "admin");

    let result = users.add(value.clone()).unwrap();
    let id = result.id().unwrap().clone();

    let found = users.find(&id).unwrap().unwrap();
    assert_eq!(found.value, value);
    assert_eq!(found.versionstamp, result.versionstamp().unwrap());
}

#[test]
fn generated_ids_are_insertion_ordered() {
    let store = store();
    let users = plain_users(&store);

    for name in ["a", "b", "c"] {
        let _ = users.add(User::new(name, None, "user")).unwrap();
    }

    let listed = users.list(&ListOptions::default()).unwrap();
    let names: Vec<&str> = listed
        .documents
        .iter()
        .map(|doc| doc.value.name.as_str())
        .collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn set_conflicts_on_existing_id_without_overwrite() {
    let store = store();
    let users = plain_users(&store);
    let id = part("u1");

    let first = users
        .set(&id, User::new("a", None, "user"), &SetOptions::default())
        .unwrap();
    assert!(first.is_committed());

    let second = users
        .set(&id, User::new("b", None, "user"), &SetOptions::default())
        .unwrap();
    assert_eq!(second, CommitResult::Conflict);

    // the losing write changed nothing
    assert_eq!(users.find(&id).unwrap().unwrap().value.name, "a");
}

#[test]
fn set_with_overwrite_replaces() {
    let store = store();
    let users = plain_users(&store);
    let id = part("u1");

    let _ = users
        .set(&id, User::new("a", None, "user"), &SetOptions::default())
        .unwrap();
    let replaced = users
        .set(
            &id,
            User::new("b", None, "user"),
            &SetOptions {
                overwrite: true,
                ..SetOptions::default()
            },
        )
        .unwrap();

    assert!(replaced.is_committed());
    assert_eq!(users.find(&id).unwrap().unwrap().value.name, "b");
}

#[test]
fn update_requires_an_existing_document() {
    let store = store();
    let users = plain_users(&store);
    let id = part("u1");

    let missing = users.update(&id, User::new("a", None, "user")).unwrap();
    assert_eq!(missing, CommitResult::Conflict);

    let _ = users
        .set(&id, User::new("a", None, "user"), &SetOptions::default())
        .unwrap();
    let updated = users.update(&id, User::new("a2", None, "user")).unwrap();
    assert!(updated.is_committed());
    assert_eq!(users.find(&id).unwrap().unwrap().value.name, "a2");
}

#[test]
fn find_many_skips_absent_ids() {
    let store = store();
    let users = plain_users(&store);

    let _ = users
        .set(&part("u1"), User::new("a", None, "user"), &SetOptions::default())
        .unwrap();
    let _ = users
        .set(&part("u3"), User::new("c", None, "user"), &SetOptions::default())
        .unwrap();

    let found = users
        .find_many(&[part("u1"), part("u2"), part("u3")])
        .unwrap();
    let names: Vec<&str> = found.iter().map(|doc| doc.value.name.as_str()).collect();
    assert_eq!(names, vec!["a", "c"]);
}

#[test]
fn list_pages_with_cursors() {
    let store = store();
    let users = plain_users(&store);
    for n in 0..5 {
        let id = part(&format!("u{n}"));
        let _ = users
            .set(&id, User::new(&format!("n{n}"), None, "user"), &SetOptions::default())
            .unwrap();
    }

    let first = users
        .list(&ListOptions {
            limit: Some(2),
            ..ListOptions::default()
        })
        .unwrap();
    assert_eq!(first.documents.len(), 2);
    let cursor = first.cursor.expect("full page yields a cursor");

    let second = users
        .list(&ListOptions {
            limit: Some(2),
            cursor: Some(cursor),
            ..ListOptions::default()
        })
        .unwrap();
    let names: Vec<&str> = second
        .documents
        .iter()
        .map(|doc| doc.value.name.as_str())
        .collect();
    assert_eq!(names, vec!["n2", "n3"]);

    let rest = users
        .list(&ListOptions {
            limit: Some(2),
            cursor: second.cursor.clone(),
            ..ListOptions::default()
        })
        .unwrap();
    assert_eq!(rest.documents.len(), 1);
    assert!(rest.cursor.is_none(), "short page ends pagination");
}

#[test]
fn list_respects_bounds_reverse_and_filter() {
    let store = store();
    let users = plain_users(&store);
    for (id, role) in [("a", "admin"), ("b", "user"), ("c", "admin"), ("d", "user")] {
        let _ = users
            .set(&part(id), User::new(id, None, role), &SetOptions::default())
            .unwrap();
    }

    let bounded = users
        .list(&ListOptions {
            start_id: Some(part("b")),
            end_id: Some(part("d")),
            ..ListOptions::default()
        })
        .unwrap();
    let ids: Vec<&str> = bounded
        .documents
        .iter()
        .map(|doc| doc.value.name.as_str())
        .collect();
    assert_eq!(ids, vec!["b", "c"]);

    let reversed = users
        .list(&ListOptions {
            reverse: true,
            limit: Some(2),
            ..ListOptions::default()
        })
        .unwrap();
    let ids: Vec<&str> = reversed
        .documents
        .iter()
        .map(|doc| doc.value.name.as_str())
        .collect();
    assert_eq!(ids, vec!["d", "c"]);

    let admins = users
        .list(&ListOptions {
            filter: Some(Arc::new(|doc: &Document<User>| doc.value.role == "admin")),
            ..ListOptions::default()
        })
        .unwrap();
    assert_eq!(admins.documents.len(), 2);
}

#[test]
fn count_and_for_each_cover_the_collection() {
    let store = store();
    let users = plain_users(&store);
    for n in 0..3 {
        let _ = users.add(User::new(&format!("n{n}"), None, "user")).unwrap();
    }

    assert_eq!(users.count(&ListOptions::default()).unwrap(), 3);

    let mut seen = 0;
    let cursor = users
        .for_each(&ListOptions::default(), |_| seen += 1)
        .unwrap();
    assert_eq!(seen, 3);
    assert!(cursor.is_none());
}

#[test]
fn delete_and_delete_many_remove_documents() {
    let store = store();
    let users = plain_users(&store);
    for id in ["a", "b", "c"] {
        let _ = users
            .set(&part(id), User::new(id, None, "user"), &SetOptions::default())
            .unwrap();
    }

    users.delete(&[part("a")]).unwrap();
    assert!(users.find(&part("a")).unwrap().is_none());

    let _ = users.delete_many(&ListOptions::default()).unwrap();
    assert_eq!(users.count(&ListOptions::default()).unwrap(), 0);
}

#[test]
fn validation_failures_abort_before_any_write() {
    struct NonEmptyName;

    impl Model<User> for NonEmptyName {
        fn parse(&self, value: User) -> Result<User, ValidationError> {
            if value.name.is_empty() {
                return Err(ValidationError::new("name must not be empty"));
            }
            Ok(value)
        }
    }

    let store = store();
    let users: Collection<User, MemoryStore> = Collection::new(
        Arc::clone(&store),
        &["validated_users"],
        CollectionOptions {
            model: Arc::new(NonEmptyName),
            ..CollectionOptions::default()
        },
    );

    let err = users.add(User::new("", None, "user")).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(users.count(&ListOptions::default()).unwrap(), 0);
}
