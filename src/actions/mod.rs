//! Action creators that decide whether a fetch is needed and dispatch it.

pub mod entity;
pub mod paginated;

pub use self::entity::{EntityAction, ReloadFn, entity_action};
pub use self::paginated::{PaginatedAction, paginated_action};
