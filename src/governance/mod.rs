/// Content governance core
///
/// Role catalog, permission evaluation, the content lifecycle state
/// machines, the append-only audit trail, role change coordination, and
/// bulk operations. Shared mutable state (a user's role, a post's or
/// comment's status) is mutated exclusively through the managers in this
/// module, never by ad hoc field assignment.

pub mod audit;
pub mod bulk;
pub mod comments;
pub mod lifecycle;
pub mod permissions;
pub mod role_change;
pub mod roles;

pub use audit::{AuditEntry, AuditFilter, AuditLog, AuditRecord, AuditStatistics};
pub use bulk::{BulkAction, BulkOperationRunner, BulkOutcome, BulkParams};
pub use comments::{CommentModeration, CommentStatus};
pub use lifecycle::{ContentLifecycle, PostStatus};
pub use permissions::{evaluate, Capability, Decision};
pub use role_change::{RoleChangeCoordinator, RoleChangeRecord};
pub use roles::Role;
