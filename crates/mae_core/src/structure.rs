use log::debug;

use crate::block::{Block, IndexedBlock};
use crate::error::{MaeError, Result};
use crate::reader::ReadOptions;
use crate::table::{ColumnTable, PropertyMap};
use crate::value::Value;

pub const CT_BLOCK: &str = "f_m_ct";
pub const ATOM_BLOCK: &str = "m_atom";
pub const BOND_BLOCK: &str = "m_bond";
pub const CT_TITLE: &str = "s_m_title";

/// One `f_m_ct` entry of an MAE file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Structure {
    pub title: Option<String>,
    pub properties: PropertyMap,
    pub atoms: ColumnTable,
    pub bonds: ColumnTable,
    /// Indexed tables other than `m_atom` / `m_bond`, retained on request.
    pub extra_tables: Vec<IndexedBlock>,
    /// Nested scalar blocks, retained on request.
    pub extra_blocks: Vec<Block>,
}

impl Structure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Build a structure from a parsed `f_m_ct` block.
    pub fn from_block(block: Block, options: &ReadOptions) -> Result<Self> {
        let Block {
            name,
            mut properties,
            blocks,
            tables,
        } = block;

        let title = match properties.shift_remove(CT_TITLE) {
            Some(Value::String(title)) => Some(title),
            Some(Value::Undefined) | None => None,
            Some(other) => {
                return Err(MaeError::schema(format!(
                    "{CT_TITLE} of block '{name}' holds {other:?}, expected a string"
                )))
            }
        };

        let mut structure = Structure {
            title,
            properties,
            ..Structure::default()
        };

        let mut seen_atoms = false;
        let mut seen_bonds = false;
        for IndexedBlock { name: table_name, table } in tables {
            let slot = match table_name.as_str() {
                ATOM_BLOCK => Some((&mut seen_atoms, &mut structure.atoms)),
                BOND_BLOCK => Some((&mut seen_bonds, &mut structure.bonds)),
                _ => None,
            };
            match slot {
                Some((seen, target)) => {
                    if *seen {
                        return Err(MaeError::schema(format!(
                            "block '{name}' contains more than one '{table_name}' table"
                        )));
                    }
                    *seen = true;
                    *target = table;
                }
                None if options.retain_unknown_blocks => {
                    debug!("retaining indexed block '{table_name}' of '{name}'");
                    structure
                        .extra_tables
                        .push(IndexedBlock::new(table_name, table));
                }
                None => debug!("dropping indexed block '{table_name}' of '{name}'"),
            }
        }

        for nested in blocks {
            if options.retain_unknown_blocks {
                debug!("retaining block '{}' of '{name}'", nested.name);
                structure.extra_blocks.push(nested);
            } else {
                debug!("dropping block '{}' of '{name}'", nested.name);
            }
        }

        Ok(structure)
    }

    pub fn extra_table(&self, name: &str) -> Option<&ColumnTable> {
        self.extra_tables
            .iter()
            .find(|indexed| indexed.name == name)
            .map(|indexed| &indexed.table)
    }
}

/// Everything read from one MAE input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaeDocument {
    /// Top-level blocks other than `f_m_ct`, such as the version header.
    /// Only filled when [`ReadOptions::retain_metadata`] is set.
    pub metadata: Vec<Block>,
    pub structures: Vec<Structure>,
}

impl MaeDocument {
    pub fn structure_count(&self) -> usize {
        self.structures.len()
    }
}

/// Group a stream of top-level blocks into structures.
pub fn assemble<I>(blocks: I, options: &ReadOptions) -> Result<MaeDocument>
where
    I: IntoIterator<Item = Result<Block>>,
{
    let mut document = MaeDocument::default();
    for block in blocks {
        let block = block?;
        if block.name == CT_BLOCK {
            document.structures.push(Structure::from_block(block, options)?);
        } else if options.retain_metadata {
            debug!("retaining top-level block '{}'", block.name);
            document.metadata.push(block);
        } else {
            debug!("skipping top-level block '{}'", block.name);
        }
    }
    Ok(document)
}
