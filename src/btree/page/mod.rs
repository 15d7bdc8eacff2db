mod base_page;
pub use base_page::*;

mod internal_page;
mod leaf_page;
mod page_id;

pub use internal_page::*;
pub use leaf_page::*;
pub use page_id::*;
