pub mod audit;
pub mod connectors;
pub mod conversations;
pub mod db;
pub mod error;
pub mod policies;
pub mod procedures;
pub mod tenants;
pub mod types;

pub use audit::AuditStore;
pub use connectors::ConnectorStore;
pub use conversations::{ConversationStore, Cursor};
pub use error::PersistenceError;
pub use policies::PolicyStore;
pub use procedures::ProcedureStore;
pub use tenants::TenantStore;
