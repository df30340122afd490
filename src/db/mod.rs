//! Persistence (§6): the `ConversationRepository` interface plus two
//! implementations — `TursoClient` (libsql, embeddable/local-first, the
//! crate's one concrete runnable backend) and `InMemoryRepository` (test
//! double only).

pub mod memory_repo;
pub mod traits;
pub mod turso;

pub use memory_repo::InMemoryRepository;
pub use traits::{ConversationRepository, NewMessage};
pub use turso::TursoClient;
