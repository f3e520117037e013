//! Record storage and sort indices.
//!
//! Records live in a [`RecordTable`] keyed by [`Key`](crate::types::Key);
//! [`SortIndexes`] keeps one ascending key sequence per tracked field.

mod index;
mod table;

pub use index::{compare_sort_values, sort_value, SortIndexes};
pub use table::{RecordTable, FIRST_ID};
