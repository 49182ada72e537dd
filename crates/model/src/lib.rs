#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod codec;
pub mod error;
pub mod poll;

pub use poll::{Choice, Choices, Poll, TTL};
pub use uuid::Uuid;
