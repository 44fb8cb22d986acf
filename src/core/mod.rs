// Core modules implementing the table model, binary layouts, and error modeling.
pub mod codec;
pub mod cursor;
pub mod error;
pub mod format;
pub mod kingsisle;
pub mod pool;
pub mod schema;
pub mod table;
pub mod types;
