//! Generic MAE blocks and the parser that reads them one at a time.
//!
//! A block is `name { header… ::: values… nested-blocks… }`. Indexed
//! blocks (`name[N] { header… ::: rows… ::: }`) hold a column table whose
//! rows start with a 1-based row number. The anonymous top-level block at
//! the start of a file is returned with an empty name.

use log::{debug, trace};

use crate::error::{MaeError, Position, Result};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::table::{ColumnTable, PropertyMap};
use crate::value::{PropertyName, Value};

/// Upper bound on rows preallocated from a declared `[N]` count.
const MAX_PREALLOCATED_ROWS: usize = 1 << 16;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub name: String,
    pub properties: PropertyMap,
    pub blocks: Vec<Block>,
    pub tables: Vec<IndexedBlock>,
}

impl Block {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|block| block.name == name)
    }

    pub fn table(&self, name: &str) -> Option<&IndexedBlock> {
        self.tables.iter().find(|table| table.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexedBlock {
    pub name: String,
    pub table: ColumnTable,
}

impl IndexedBlock {
    pub fn new(name: impl Into<String>, table: ColumnTable) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }
}

/// Reads top-level blocks lazily from MAE text.
#[derive(Debug, Clone)]
pub struct BlockReader<'a> {
    lexer: Lexer<'a>,
    failed: bool,
}

impl<'a> BlockReader<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            lexer: Lexer::new(input),
            failed: false,
        }
    }

    fn next_token(&mut self) -> Result<Option<Token<'a>>> {
        self.lexer.next().transpose()
    }

    /// Next token inside block `name`; running out of input is an error.
    fn expect_token(&mut self, name: &str) -> Result<Token<'a>> {
        let eof = self.lexer.location();
        self.next_token()?
            .ok_or_else(|| MaeError::schema(format!("unterminated block '{name}'")).at(eof))
    }

    fn expect_open(&mut self, name: &str) -> Result<()> {
        let token = self.expect_token(name)?;
        if token.kind != TokenKind::OpenBrace {
            return Err(MaeError::schema(format!(
                "expected '{{' after block name '{name}', found {}",
                token.describe()
            ))
            .at(token.position));
        }
        Ok(())
    }

    fn read_top_level(&mut self) -> Result<Option<Block>> {
        let Some(token) = self.next_token()? else {
            return Ok(None);
        };
        let block = match token.kind {
            TokenKind::OpenBrace => self.read_block(String::new())?,
            TokenKind::Word => {
                let name = token.text.into_owned();
                if split_indexed(&name).is_some() {
                    return Err(MaeError::schema(format!(
                        "indexed block '{name}' is not allowed at the top level"
                    ))
                    .at(token.position));
                }
                self.expect_open(&name)?;
                self.read_block(name)?
            }
            _ => {
                return Err(MaeError::schema(format!(
                    "expected a block name, found {}",
                    token.describe()
                ))
                .at(token.position))
            }
        };
        trace!(
            "parsed block '{}' ({} properties, {} sub-blocks, {} tables)",
            block.name,
            block.properties.len(),
            block.blocks.len(),
            block.tables.len()
        );
        Ok(Some(block))
    }

    /// Reads the body of a scalar block; the opening brace is consumed.
    fn read_block(&mut self, name: String) -> Result<Block> {
        let header = self.read_header(&name)?;
        let mut block = Block::new(name);

        for (index, column) in header.iter().enumerate() {
            let token = self.expect_token(&block.name)?;
            if !token.is_value() {
                return Err(MaeError::schema(format!(
                    "block '{}' declares {} properties but only {} values precede {}",
                    block.name,
                    header.len(),
                    index,
                    token.describe()
                ))
                .at(token.position));
            }
            let value = coerce_cell(&token, column, &block.name)?;
            block.properties.insert(column.clone(), value);
        }

        loop {
            let token = self.expect_token(&block.name)?;
            match token.kind {
                TokenKind::CloseBrace => break,
                TokenKind::Word => {
                    let child = token.text.into_owned();
                    self.expect_open(&child)?;
                    match split_indexed(&child) {
                        Some((base, rows)) => {
                            let rows = rows.map_err(|err| err.at(token.position))?;
                            let table = self.read_indexed(base, rows, token.position)?;
                            block.tables.push(table);
                        }
                        None => {
                            let nested = self.read_block(child)?;
                            block.blocks.push(nested);
                        }
                    }
                }
                _ => {
                    return Err(MaeError::schema(format!(
                        "unexpected {} in block '{}'",
                        token.describe(),
                        block.name
                    ))
                    .at(token.position))
                }
            }
        }
        Ok(block)
    }

    fn read_header(&mut self, name: &str) -> Result<Vec<PropertyName>> {
        let mut header: Vec<PropertyName> = Vec::new();
        loop {
            let token = self.expect_token(name)?;
            match token.kind {
                TokenKind::Separator => return Ok(header),
                TokenKind::Word => {
                    let column = PropertyName::parse(&token.text).ok_or_else(|| {
                        MaeError::schema(format!(
                            "column '{}' in block '{name}' has no b_/i_/r_/s_ type prefix",
                            token.text
                        ))
                        .at(token.position)
                    })?;
                    if header.contains(&column) {
                        return Err(MaeError::schema(format!(
                            "column '{column}' declared twice in block '{name}'"
                        ))
                        .at(token.position));
                    }
                    header.push(column);
                }
                _ => {
                    return Err(MaeError::schema(format!(
                        "expected a property name or ':::' in block '{name}', found {}",
                        token.describe()
                    ))
                    .at(token.position))
                }
            }
        }
    }

    fn read_indexed(
        &mut self,
        name: &str,
        declared_rows: usize,
        start: Position,
    ) -> Result<IndexedBlock> {
        let header = self.read_header(name)?;
        let capacity = declared_rows.min(MAX_PREALLOCATED_ROWS);
        let mut columns: Vec<Vec<Value>> = header
            .iter()
            .map(|_| Vec::with_capacity(capacity))
            .collect();
        let mut rows = 0usize;

        // Newlines are plain whitespace: a row ends after one value per
        // declared column, wherever the line breaks fall.
        loop {
            let token = self.expect_token(name)?;
            match token.kind {
                TokenKind::Separator => break,
                TokenKind::Number => {}
                _ => {
                    return Err(MaeError::schema(format!(
                        "expected a row number or ':::' in block '{name}', found {}",
                        token.describe()
                    ))
                    .at(token.position))
                }
            }
            let Ok(row_number) = token.text.parse::<usize>() else {
                return Err(MaeError::schema(format!(
                    "invalid row number '{}' in block '{name}'",
                    token.text
                ))
                .at(token.position));
            };
            rows += 1;
            if rows > declared_rows {
                return Err(MaeError::schema(format!(
                    "block '{name}' declares {declared_rows} rows but has more values than fit"
                ))
                .at(token.position));
            }
            if row_number != rows {
                debug!("block '{name}' row {rows} is numbered {row_number}");
            }

            for (index, (column, values)) in header.iter().zip(columns.iter_mut()).enumerate() {
                let cell = self.expect_token(name)?;
                if !cell.is_value() {
                    return Err(MaeError::schema(format!(
                        "row {rows} of block '{name}' has {index} values, expected {}",
                        header.len()
                    ))
                    .at(cell.position));
                }
                values.push(coerce_cell(&cell, column, name)?);
            }
        }

        let close = self.expect_token(name)?;
        if close.kind != TokenKind::CloseBrace {
            return Err(MaeError::schema(format!(
                "expected '}}' to close block '{name}', found {}",
                close.describe()
            ))
            .at(close.position));
        }
        if rows != declared_rows {
            return Err(MaeError::schema(format!(
                "block '{name}' declares {declared_rows} rows but contains {rows}"
            ))
            .at(start));
        }

        let mut table = ColumnTable::with_rows(rows);
        for (column, values) in header.into_iter().zip(columns) {
            table.push_column(column, values)?;
        }
        Ok(IndexedBlock::new(name, table))
    }
}

impl<'a> Iterator for BlockReader<'a> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.read_top_level().transpose();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}

/// Parse every top-level block of `input`.
pub fn parse_blocks(input: &str) -> Result<Vec<Block>> {
    BlockReader::new(input).collect()
}

fn coerce_cell(token: &Token<'_>, column: &PropertyName, block: &str) -> Result<Value> {
    Value::coerce(token, column.kind())
        .map_err(|err| err.context(format_args!("block '{block}', column '{column}'")))
}

/// Split `m_atom[12]` into `("m_atom", Ok(12))`; `None` for plain names.
fn split_indexed(name: &str) -> Option<(&str, Result<usize>)> {
    let (base, rest) = name.split_once('[')?;
    let count = rest
        .strip_suffix(']')
        .and_then(|digits| digits.parse::<usize>().ok())
        .ok_or_else(|| MaeError::schema(format!("malformed indexed block name '{name}'")));
    Some((base, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    const CT: &str = r#"
{
  s_m_m2io_version
  :::
  2.0.0
}

f_m_ct {
  s_m_title
  i_m_ct_format
  :::
  "water molecule"
  2
  m_atom[3] {
    # First column is atom index #
    i_m_mmod_type
    r_m_x_coord
    s_m_pdb_atom_name
    :::
    1 16 0.000 " OW "
    2 42 0.957 <>
    3 42 -0.240 " HW2"
    :::
  }
  m_depend[1] {
    i_m_depend_dependency
    s_m_depend_property
    :::
    1 10 s_m_title
    :::
  }
}
"#;

    #[test]
    fn reads_header_and_ct_blocks() {
        let blocks = parse_blocks(CT).expect("parses");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].name, "");
        assert_eq!(blocks[0].properties["s_m_m2io_version"], Value::from("2.0.0"));

        let ct = &blocks[1];
        assert_eq!(ct.name, "f_m_ct");
        assert_eq!(ct.properties["s_m_title"], Value::from("water molecule"));
        assert_eq!(ct.properties["i_m_ct_format"], Value::Integer(2));

        let atoms = &ct.table("m_atom").expect("atom table").table;
        assert_eq!(atoms.len(), 3);
        let names: Vec<&str> = atoms.names().map(PropertyName::as_str).collect();
        assert_eq!(names, vec!["i_m_mmod_type", "r_m_x_coord", "s_m_pdb_atom_name"]);
        assert_eq!(atoms["r_m_x_coord"][2], Value::Real(-0.24));
        assert_eq!(atoms["s_m_pdb_atom_name"][1], Value::Undefined);
        assert!(ct.table("m_depend").is_some());
    }

    #[test]
    fn short_row_is_a_schema_error() {
        let text = "f_m_ct {\n :::\n m_bond[2] {\n  i_m_from\n  i_m_to\n  i_m_order\n  :::\n  1 1 2 1\n  2 2 3\n  :::\n }\n}\n";
        let err = parse_blocks(text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert_eq!(err.line(), Some(10));
        assert!(err.message().contains("row 2"), "{}", err.message());
    }

    #[test]
    fn long_row_is_a_schema_error() {
        let text = "f_m_ct {\n :::\n m_bond[1] {\n  i_m_from\n  :::\n  1 1 2\n  :::\n }\n}\n";
        let err = parse_blocks(text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert_eq!(err.line(), Some(6));
    }

    #[test]
    fn rows_may_wrap_across_lines() {
        let text = "f_m_ct {\n :::\n m_atom[2] {\n  i_m_a\n  r_m_b\n  :::\n  1 4\n    0.5\n  2\n  5 1.5\n  :::\n }\n}\n";
        let blocks = parse_blocks(text).unwrap();
        let atoms = &blocks[0].table("m_atom").unwrap().table;
        assert_eq!(atoms.len(), 2);
        assert_eq!(atoms["i_m_a"][1], Value::Integer(5));
        assert_eq!(atoms["r_m_b"][0], Value::Real(0.5));
    }

    #[test]
    fn extra_row_values_surface_as_stray_rows() {
        let text = "f_m_ct {\n :::\n m_atom[2] {\n  i_m_a\n  :::\n  1 4 x\n  2 5\n  :::\n }\n}\n";
        let err = parse_blocks(text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert_eq!(err.line(), Some(6));
    }

    #[test]
    fn multi_line_strings_stay_in_their_row() {
        let text = "f_m_ct {\n :::\n m_atom[2] {\n  s_m_note\n  i_m_n\n  :::\n  1 \"two\nlines\" 7\n  2 x 8\n  :::\n }\n}\n";
        let blocks = parse_blocks(text).unwrap();
        let atoms = &blocks[0].table("m_atom").unwrap().table;
        assert_eq!(atoms["s_m_note"][0], Value::from("two\nlines"));
        assert_eq!(atoms["i_m_n"][1], Value::Integer(8));
    }

    #[test]
    fn declared_row_count_must_match() {
        let text = "f_m_ct {\n :::\n m_atom[2] {\n  i_m_mmod_type\n  :::\n  1 3\n  :::\n }\n}\n";
        let err = parse_blocks(text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(err.message().contains("declares 2 rows"));
    }

    #[test]
    fn missing_scalar_values_are_reported() {
        let text = "f_m_ct {\n s_m_title\n i_m_count\n :::\n name\n}\n";
        let err = parse_blocks(text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(err.message().contains("declares 2 properties"));
    }

    #[test]
    fn unprefixed_columns_are_rejected() {
        let err = parse_blocks("f_m_ct {\n m_title\n :::\n x\n}\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(err.message().contains("m_title"));
    }

    #[test]
    fn unterminated_block_is_a_schema_error() {
        let err = parse_blocks("f_m_ct {\n s_m_title\n :::\n name\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(err.message().contains("unterminated"));
    }

    #[test]
    fn cell_type_errors_name_the_column() {
        let text = "f_m_ct {\n :::\n m_atom[1] {\n  i_m_mmod_type\n  :::\n  1 carbon\n  :::\n }\n}\n";
        let err = parse_blocks(text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
        assert_eq!(err.line(), Some(6));
        assert!(err.message().contains("i_m_mmod_type"));
    }

    #[test]
    fn reads_one_block_at_a_time() {
        let mut reader = BlockReader::new(CT);
        assert_eq!(reader.next().unwrap().unwrap().name, "");
        assert_eq!(reader.next().unwrap().unwrap().name, "f_m_ct");
        assert!(reader.next().is_none());
    }

    #[test]
    fn empty_tables_and_headers() {
        let text = "f_m_ct {\n :::\n m_atom[0] {\n  r_m_x_coord\n  :::\n  :::\n }\n}\n";
        let blocks = parse_blocks(text).unwrap();
        let table = &blocks[0].table("m_atom").unwrap().table;
        assert_eq!(table.len(), 0);
        assert_eq!(table.column_count(), 1);
        assert!(blocks[0].properties.is_empty());
    }

    #[test]
    fn splits_indexed_names() {
        assert_eq!(split_indexed("m_atom[12]").map(|(b, n)| (b, n.ok())), Some(("m_atom", Some(12))));
        assert!(split_indexed("m_atom").is_none());
        assert!(split_indexed("m_atom[x]").unwrap().1.is_err());
    }
}
