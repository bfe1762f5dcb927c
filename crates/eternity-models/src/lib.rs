pub mod member;
pub mod poll;
pub mod role;

pub use member::{Member, RawMember};
pub use poll::{CloseReason, NewPoll, Poll, PollResponse, PollState, Selector};
pub use role::Role;
