//! # gridbot
//!
//! A step-wise interpreter for small visual robot programs on a tile grid.
//!
//! Programs are [`Module`]s of fixed-name procedures whose bodies hold
//! intrinsic actions, calls, conditionals and loops. [`Robots`] walk a
//! [`Map`], each running one procedure at a time. Every call to
//! [`Robots::step`] performs a single action or control hop, so a host can
//! animate one action per tick, and a robot can be saved mid-program and
//! resumed after loading.
//!
//! Calls never use the host stack: each robot keeps an explicit, bounded
//! [`ContinuationStack`] and calls in tail position push nothing, so tail
//! recursive procedures run forever in constant space.

pub mod codec;
pub mod direction;
pub mod error;
pub mod interpreter;
pub mod map;
pub mod program;
pub mod robot;
pub mod robots;
pub mod stack;
pub mod workspace;

pub use direction::*;
pub use error::*;
pub use interpreter::*;
pub use map::*;
pub use program::*;
pub use robot::*;
pub use robots::*;
pub use stack::*;
pub use workspace::*;
