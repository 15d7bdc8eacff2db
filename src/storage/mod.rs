mod cell;
mod row;

pub use cell::Cell;
pub use row::{IndexRow, IndexSchema, RowLocation};
