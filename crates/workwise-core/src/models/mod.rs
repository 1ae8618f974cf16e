//! Data models for the facility dashboard resources.
//!
//! The client passes these through to the backend without interpreting
//! them; the types exist so callers get typed fields instead of raw JSON.
//!
//! - `Department`: organizational unit that owns machines
//! - `Machine`, `MaintenanceTicket`: equipment and its repair tickets
//! - `Job`: scheduled work with a priority
//! - `Notification`: per-user messages
//! - `User`, `NewAccount`: accounts and the registration payload

pub mod department;
pub mod job;
pub mod machine;
pub mod notification;
pub mod user;

pub use department::{Department, DepartmentInput};
pub use job::{Job, JobPriority};
pub use machine::{Machine, MachineInput, MachineStatus, MaintenanceTicket, TicketStatus};
pub use notification::Notification;
pub use user::{NewAccount, User};
