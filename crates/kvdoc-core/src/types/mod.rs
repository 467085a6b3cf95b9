mod id;

pub use id::{Ulid, UlidError};
