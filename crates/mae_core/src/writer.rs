//! MAE serializer.
//!
//! Output is rendered completely in memory before the destination is
//! touched, so a type error in the last structure leaves no partial file.

use std::borrow::Cow;
use std::fs;
use std::io::Write;
use std::path::Path;

use log::{debug, info};
use tempfile::{Builder, NamedTempFile};

use crate::block::{Block, IndexedBlock};
use crate::error::{MaeError, Result};
use crate::lexer::{Lexer, TokenKind, SEPARATOR};
use crate::structure::{MaeDocument, Structure, ATOM_BLOCK, BOND_BLOCK, CT_BLOCK, CT_TITLE};
use crate::table::{ColumnTable, PropertyMap};
use crate::value::{PropertyName, Value, ValueKind};

pub const M2IO_VERSION: &str = "2.0.0";
pub const VERSION_PROPERTY: &str = "s_m_m2io_version";

const INDENT: &str = "  ";

/// Render `structures` as MAE text, preceded by the standard version block.
pub fn to_string(structures: &[Structure]) -> Result<String> {
    let mut out = Emitter::default();
    out.version_header();
    for (index, structure) in structures.iter().enumerate() {
        out.structure(structure)
            .map_err(|err| err.context(format_args!("structure {index}")))?;
    }
    Ok(out.finish())
}

/// Render a document; its metadata blocks replace the default version block.
pub fn document_to_string(document: &MaeDocument) -> Result<String> {
    let mut out = Emitter::default();
    if document.metadata.is_empty() {
        out.version_header();
    }
    for block in &document.metadata {
        out.top_level_block(block)?;
    }
    for (index, structure) in document.structures.iter().enumerate() {
        out.structure(structure)
            .map_err(|err| err.context(format_args!("structure {index}")))?;
    }
    Ok(out.finish())
}

/// Write `structures` to any byte sink.
pub fn write_writer<W: Write>(mut writer: W, structures: &[Structure]) -> Result<()> {
    let text = to_string(structures)?;
    writer.write_all(text.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Write `structures` to `path` as uncompressed MAE text.
///
/// The file is written to a temporary sibling and renamed into place, so
/// `path` either keeps its old contents or receives the complete output.
pub fn write_file(path: impl AsRef<Path>, structures: &[Structure]) -> Result<()> {
    let path = path.as_ref();
    let text = to_string(structures).map_err(|err| err.with_path(path))?;
    persist(path, &text)?;
    info!("wrote {} structures to {}", structures.len(), path.display());
    Ok(())
}

pub fn write_document_file(path: impl AsRef<Path>, document: &MaeDocument) -> Result<()> {
    let path = path.as_ref();
    let text = document_to_string(document).map_err(|err| err.with_path(path))?;
    persist(path, &text)?;
    info!(
        "wrote {} structures to {}",
        document.structure_count(),
        path.display()
    );
    Ok(())
}

fn persist(path: &Path, text: &str) -> Result<()> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let attempt = || -> Result<()> {
        let mut file = staging_file(directory, path)?;
        debug!("staging output in {}", file.path().display());
        file.write_all(text.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(path)?;
        Ok(())
    };
    attempt().map_err(|err| err.with_path(path))
}

/// Temp file next to `destination` that will carry the right mode once
/// persisted: the destination's own permissions when it exists, otherwise
/// the umask-filtered default a plain `File::create` would get.
fn staging_file(directory: &Path, destination: &Path) -> Result<NamedTempFile> {
    let mut builder = Builder::new();
    builder.prefix(".mae-");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let file = builder.tempfile_in(directory)?;
    if let Ok(metadata) = fs::metadata(destination) {
        file.as_file().set_permissions(metadata.permissions())?;
    }
    Ok(file)
}

/// Whether `name` reads back as the single bare word naming a block.
fn is_block_name(name: &str) -> bool {
    if name.contains('[') {
        return false;
    }
    let mut tokens = Lexer::new(name);
    let first_is_name = matches!(
        tokens.next(),
        Some(Ok(token)) if token.kind == TokenKind::Word && token.text == name
    );
    first_is_name && tokens.next().is_none()
}

fn check_block_name(name: &str) -> Result<()> {
    if is_block_name(name) {
        Ok(())
    } else {
        Err(MaeError::validation(format!(
            "'{name}' cannot be written as a block name"
        )))
    }
}

/// Resolve the one type a column is written with.
///
/// The defined values must all share a kind, and that kind must agree with
/// the name's prefix. Integer 0/1 flags under a boolean name are accepted and
/// written as booleans. A column with no defined values keeps its prefix.
pub fn resolve_column_kind(name: &PropertyName, values: &[Value]) -> Result<ValueKind> {
    let declared = name.kind();
    let mut observed: Option<ValueKind> = None;
    for value in values {
        let Some(kind) = value.kind() else {
            continue;
        };
        match observed {
            None => observed = Some(kind),
            Some(seen) if seen == kind => {}
            Some(seen) => {
                return Err(MaeError::type_error(format!(
                    "column '{name}' mixes {seen} and {kind} values"
                )))
            }
        }
    }

    match observed {
        None => Ok(declared),
        Some(kind) if kind == declared => Ok(kind),
        Some(ValueKind::Integer)
            if declared == ValueKind::Boolean
                && values
                    .iter()
                    .all(|value| matches!(value, Value::Integer(0 | 1) | Value::Undefined)) =>
        {
            Ok(ValueKind::Boolean)
        }
        Some(kind) => Err(MaeError::type_error(format!(
            "column '{name}' is declared {declared} but holds {kind} values"
        ))),
    }
}

#[derive(Default)]
struct Emitter {
    out: String,
    depth: usize,
}

impl Emitter {
    fn finish(self) -> String {
        self.out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn open(&mut self, name: &str) {
        if name.is_empty() {
            self.line("{");
        } else {
            self.line(&format!("{name} {{"));
        }
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth -= 1;
        self.line("}");
    }

    fn version_header(&mut self) {
        self.out.push('\n');
        self.open("");
        self.line(VERSION_PROPERTY);
        self.line(SEPARATOR);
        self.line(M2IO_VERSION);
        self.close();
    }

    fn structure(&mut self, structure: &Structure) -> Result<()> {
        if structure.properties.contains_key(CT_TITLE) {
            return Err(MaeError::validation(format!(
                "'{CT_TITLE}' must be given as the structure title, not as a property"
            )));
        }
        let mut scalars: Vec<(Cow<'_, str>, Cow<'_, str>)> = Vec::new();
        if let Some(title) = &structure.title {
            let value = Value::String(title.clone());
            let token = value.to_token(ValueKind::String)?.into_owned();
            scalars.push((Cow::Borrowed(CT_TITLE), Cow::Owned(token)));
        }
        scalars.extend(scalar_tokens(&structure.properties)?);

        let mut tables = Vec::new();
        for (name, table) in [(ATOM_BLOCK, &structure.atoms), (BOND_BLOCK, &structure.bonds)] {
            if !table.is_empty() {
                tables.push(TableText::render(name, table)?);
            }
        }
        for IndexedBlock { name, table } in &structure.extra_tables {
            if name == ATOM_BLOCK || name == BOND_BLOCK {
                return Err(MaeError::validation(format!(
                    "extra table '{name}' would be read back as the structure's own table"
                )));
            }
            tables.push(TableText::render(name, table)?);
        }

        self.out.push('\n');
        self.open(CT_BLOCK);
        self.scalars(&scalars);
        for table in &tables {
            self.table(table);
        }
        for nested in &structure.extra_blocks {
            self.block(nested)?;
        }
        self.close();
        Ok(())
    }

    fn top_level_block(&mut self, block: &Block) -> Result<()> {
        if block.name == CT_BLOCK {
            return Err(MaeError::validation(format!(
                "metadata block '{CT_BLOCK}' would be read back as a structure"
            )));
        }
        if !block.name.is_empty() {
            check_block_name(&block.name)?;
        }
        self.out.push('\n');
        self.body(block)
    }

    fn block(&mut self, block: &Block) -> Result<()> {
        check_block_name(&block.name)?;
        self.body(block)
    }

    fn body(&mut self, block: &Block) -> Result<()> {
        let scalars = scalar_tokens(&block.properties)
            .map_err(|err| err.context(format_args!("block '{}'", block.name)))?;
        let tables = block
            .tables
            .iter()
            .map(|IndexedBlock { name, table }| TableText::render(name, table))
            .collect::<Result<Vec<_>>>()?;

        self.open(&block.name);
        self.scalars(&scalars);
        for table in &tables {
            self.table(table);
        }
        for nested in &block.blocks {
            self.block(nested)?;
        }
        self.close();
        Ok(())
    }

    fn scalars(&mut self, scalars: &[(Cow<'_, str>, Cow<'_, str>)]) {
        for (name, _) in scalars {
            self.line(name);
        }
        self.line(SEPARATOR);
        for (_, token) in scalars {
            self.line(token);
        }
    }

    fn table(&mut self, table: &TableText<'_>) {
        self.open(&format!("{}[{}]", table.name, table.rows.len()));
        self.line(&format!("# First column is {} index #", table.label()));
        for name in &table.header {
            self.line(name.as_str());
        }
        self.line(SEPARATOR);
        for (index, row) in table.rows.iter().enumerate() {
            let mut text = (index + 1).to_string();
            for token in row {
                text.push(' ');
                text.push_str(token);
            }
            self.line(&text);
        }
        self.line(SEPARATOR);
        self.close();
    }
}

fn scalar_tokens(properties: &PropertyMap) -> Result<Vec<(Cow<'_, str>, Cow<'_, str>)>> {
    properties
        .iter()
        .map(|(name, value)| {
            let kind = resolve_column_kind(name, std::slice::from_ref(value))?;
            let token = value
                .to_token(kind)
                .map_err(|err| err.context(format_args!("property '{name}'")))?;
            Ok((Cow::Owned(name.with_kind(kind).as_str().to_string()), token))
        })
        .collect()
}

/// An indexed block with every cell already formatted.
struct TableText<'a> {
    name: &'a str,
    header: Vec<PropertyName>,
    rows: Vec<Vec<Cow<'a, str>>>,
}

impl<'a> TableText<'a> {
    fn render(name: &'a str, table: &'a ColumnTable) -> Result<Self> {
        check_block_name(name)?;
        let mut header = Vec::with_capacity(table.column_count());
        let mut rows: Vec<Vec<Cow<'a, str>>> = (0..table.len())
            .map(|_| Vec::with_capacity(table.column_count()))
            .collect();
        for (column, values) in table.iter() {
            let kind = resolve_column_kind(column, values)
                .map_err(|err| err.context(format_args!("block '{name}'")))?;
            for (row, value) in rows.iter_mut().zip(values) {
                let token = value.to_token(kind).map_err(|err| {
                    err.context(format_args!("block '{name}', column '{column}'"))
                })?;
                row.push(token);
            }
            header.push(column.with_kind(kind));
        }
        Ok(Self { name, header, rows })
    }

    fn label(&self) -> &str {
        self.name.strip_prefix("m_").unwrap_or(self.name)
    }
}
