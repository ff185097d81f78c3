use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::{write::GzEncoder, Compression};
use mae_core::{
    read_file, read_file_with_options, structures_from_json, structures_to_json, write_document_file,
    write_file, ErrorKind, PropertyName, ReadOptions, Structure, Value,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/benzoate.mae")
}

fn names<'a>(names: impl Iterator<Item = &'a PropertyName>) -> Vec<String> {
    names.map(|name| name.to_string()).collect()
}

/// Equality on structures ignores key order, so compare it separately.
fn assert_same_layout(left: &Structure, right: &Structure) {
    assert_eq!(names(left.properties.keys()), names(right.properties.keys()));
    assert_eq!(names(left.atoms.names()), names(right.atoms.names()));
    assert_eq!(names(left.bonds.names()), names(right.bonds.names()));
}

#[test]
fn reads_benzoate_fixture() {
    let structures = read_file(fixture()).expect("benzoate parses");
    assert_eq!(structures.len(), 1);

    let benzoate = &structures[0];
    assert_eq!(benzoate.title.as_deref(), Some("benzoate"));
    assert_eq!(benzoate.atom_count(), 9);
    assert_eq!(benzoate.bond_count(), 8);
    assert_eq!(benzoate.property("b_m_prop_d"), Some(&Value::Boolean(true)));
    assert_eq!(benzoate.property("r_m_energy"), Some(&Value::Real(-421.5)));
    assert_eq!(
        benzoate.property("s_m_entry_name"),
        Some(&Value::String("benzoate anion".into()))
    );
    assert_eq!(benzoate.property("s_m_note"), Some(&Value::Undefined));
    assert!(benzoate.property("s_m_title").is_none());

    assert_eq!(benzoate.atoms["b_m_prop_a"][0], Value::Boolean(true));
    assert_eq!(benzoate.atoms["b_m_prop_a"][3], Value::Undefined);
    assert_eq!(benzoate.atoms["s_m_pdb_atom_name"][8], Value::String(" O2 ".into()));
    assert_eq!(benzoate.atoms["i_m_formal_charge"][8], Value::Integer(-1));
    assert_eq!(benzoate.atoms["r_m_charge1"][8], Value::Undefined);
    assert_eq!(benzoate.bonds["i_m_order"][0], Value::Integer(2));

    for (name, values) in benzoate.atoms.iter() {
        assert_eq!(values.len(), 9, "atom column {name} has a ragged length");
    }
    assert!(benzoate.extra_tables.is_empty());
    assert!(benzoate.extra_blocks.is_empty());
}

#[test]
fn write_then_read_reproduces_the_structures() {
    let parsed = read_file(fixture()).unwrap();
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("benzoate-new.mae");

    write_file(&out, &parsed).unwrap();
    let reparsed = read_file(&out).unwrap();

    assert_eq!(parsed, reparsed);
    assert_same_layout(&parsed[0], &reparsed[0]);
    assert_eq!(reparsed[0].atoms["b_m_prop_a"][0].as_bool(), Some(true));
    assert_eq!(reparsed[0].property("b_m_prop_d").and_then(Value::as_bool), Some(true));
}

#[test]
fn writing_is_deterministic() {
    let parsed = read_file(fixture()).unwrap();
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first.mae");
    let second = dir.path().join("second.mae");

    write_file(&first, &parsed).unwrap();
    write_file(&second, &read_file(&first).unwrap()).unwrap();

    assert_eq!(fs::read_to_string(first).unwrap(), fs::read_to_string(second).unwrap());
}

#[test]
fn gzipped_copy_reads_the_same() {
    let dir = TempDir::new().unwrap();
    let compressed = dir.path().join("benzoate.maegz");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&fs::read(fixture()).unwrap()).unwrap();
    fs::write(&compressed, encoder.finish().unwrap()).unwrap();

    assert_eq!(read_file(&compressed).unwrap(), read_file(fixture()).unwrap());
}

#[test]
fn plain_text_under_a_gzip_name_is_rejected() {
    let dir = TempDir::new().unwrap();
    let misnamed = dir.path().join("benzoate.mae.gz");
    fs::copy(fixture(), &misnamed).unwrap();

    let err = read_file(&misnamed).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(err.path(), Some(misnamed.as_path()));
}

#[test]
fn retained_blocks_survive_a_document_round_trip() {
    let options = ReadOptions {
        retain_unknown_blocks: true,
        retain_metadata: true,
    };
    let document = read_file_with_options(fixture(), options).unwrap();
    let depend = document.structures[0]
        .extra_table("m_depend")
        .expect("m_depend retained");
    assert_eq!(depend.len(), 2);
    assert_eq!(depend["s_m_depend_property"][1], Value::String("s_m_entry_name".into()));

    let provenance = &document.structures[0].extra_blocks;
    assert_eq!(provenance.len(), 1);
    assert_eq!(provenance[0].name, "m_provenance");
    assert_eq!(provenance[0].properties["r_m_version"], Value::Real(2.5));
    let steps = &provenance[0].table("m_steps").expect("m_steps retained").table;
    assert_eq!(steps["s_m_action"][1], Value::String("add hydrogens".into()));

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("document.mae");
    write_document_file(&out, &document).unwrap();
    let reread = read_file_with_options(&out, options).unwrap();
    assert_eq!(reread, document);
    assert_eq!(reread.structures[0].extra_blocks, document.structures[0].extra_blocks);
}

#[test]
fn json_records_carry_the_fixture() {
    let parsed = read_file(fixture()).unwrap();
    let records = structures_to_json(&parsed).unwrap();
    let restored = structures_from_json(&records).unwrap();

    assert_eq!(restored, parsed);
    assert_same_layout(&parsed[0], &restored[0]);
}

#[test]
fn failed_write_keeps_previous_output() {
    let parsed = read_file(fixture()).unwrap();
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("kept.mae");
    write_file(&out, &parsed).unwrap();
    let before = fs::read_to_string(&out).unwrap();

    let mut broken = parsed.clone();
    broken[0]
        .properties
        .insert("i_m_ct_format".parse().unwrap(), Value::Real(2.5));
    let err = write_file(&out, &broken).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Type);
    assert_eq!(fs::read_to_string(&out).unwrap(), before);
}
