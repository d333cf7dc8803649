//! State Container: schema, merge policies and versioned state.
//!
//! Fields are JSON values declared in a [`StateSchema`]. Nodes return
//! [`Delta`]s; the engine merges a round of them with [`State::apply`], which
//! is independent of the order the deltas arrived in.

mod reducer;
mod schema;
mod store;

pub use reducer::{Max, MergeObject, Min, Reducer, Sum};
pub use schema::{
    value_kind, FieldSpec, FieldType, MergePolicy, ResumeField, ResumeSchema, StateSchema,
};
pub use store::{Delta, State, StateError, StateUpdate};
