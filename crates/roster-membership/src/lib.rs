pub mod classify;
pub mod dispatcher;
pub mod handler;
pub mod membership;

pub use classify::{MemberEventKind, MembershipEvent, UnknownEventKind, classify};
pub use dispatcher::Dispatcher;
pub use handler::Handler;
pub use membership::{Membership, MembershipBuilder};
