#![forbid(unsafe_code)]
//! Reading and writing Maestro (MAE) structure files.
//! A file is a sequence of brace-delimited blocks: an anonymous header block
//! followed by one `f_m_ct` block per structure, each carrying scalar
//! properties plus indexed `m_atom` and `m_bond` tables. Plain and
//! gzip-compressed inputs are both accepted.

pub mod block;
pub mod error;
pub mod lexer;
pub mod reader;
pub mod record;
pub mod structure;
pub mod table;
pub mod value;
pub mod writer;

pub use block::{parse_blocks, Block, BlockReader, IndexedBlock};
pub use error::{ErrorKind, MaeError, Position, Result};
pub use lexer::{Lexer, Token, TokenKind};
pub use reader::{
    read_async_reader, read_file, read_file_with_options, read_reader, read_str,
    read_str_with_options, ReadOptions,
};
pub use record::{structures_from_json, structures_to_json};
pub use structure::{MaeDocument, Structure};
pub use table::{ColumnTable, PropertyMap};
pub use value::{PropertyName, Value, ValueKind};
pub use writer::{document_to_string, to_string, write_document_file, write_file, write_writer};
