//! Game handlers: thin glue from decoded messages to subsystems.
//!
//! Each handler validates the request against the session's in-world
//! state, calls the owning subsystem (world, registry, collaborator
//! action) and queues response or broadcast packets. Handlers never hold a
//! registry borrow across a collaborator call; anything that could block
//! becomes a deferred action executed by the runtime.

mod auth;
mod game;
mod item;
mod social;
