use std::{
    fs::File,
    io::Read,
    path::Path,
};

use flate2::read::MultiGzDecoder;
use futures::io::{AsyncRead, AsyncReadExt};
use log::{debug, info};

use crate::{
    block::BlockReader,
    error::{MaeError, Result},
    structure::{assemble, MaeDocument, Structure},
};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Keep nested blocks of a ct other than `m_atom` / `m_bond`.
    pub retain_unknown_blocks: bool,
    /// Keep top-level blocks that are not structures.
    pub retain_metadata: bool,
}

pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<Structure>> {
    read_file_with_options(path, ReadOptions::default()).map(|document| document.structures)
}

/// Read a plain or gzip-compressed MAE file.
///
/// Compression is detected from the content. A `.gz` / `.maegz` name whose
/// content is not gzip is rejected rather than guessed at.
pub fn read_file_with_options(
    path: impl AsRef<Path>,
    options: ReadOptions,
) -> Result<MaeDocument> {
    let path_ref = path.as_ref();
    info!("reading MAE file {}", path_ref.display());
    let bytes = read_bytes(path_ref).map_err(|err| err.with_path(path_ref))?;
    let text = decode(bytes, has_gzip_extension(path_ref)).map_err(|err| err.with_path(path_ref))?;
    let document = read_str_with_options(&text, options).map_err(|err| err.with_path(path_ref))?;
    debug!(
        "read {} structures from {}",
        document.structure_count(),
        path_ref.display()
    );
    Ok(document)
}

pub fn read_reader<R: Read>(mut reader: R, options: ReadOptions) -> Result<MaeDocument> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let text = decode(bytes, false)?;
    read_str_with_options(&text, options)
}

pub async fn read_async_reader<R>(mut reader: R, options: ReadOptions) -> Result<MaeDocument>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .await
        .map_err(MaeError::from)?;
    let text = decode(bytes, false)?;
    read_str_with_options(&text, options)
}

pub fn read_str(input: &str) -> Result<Vec<Structure>> {
    read_str_with_options(input, ReadOptions::default()).map(|document| document.structures)
}

pub fn read_str_with_options(input: &str, options: ReadOptions) -> Result<MaeDocument> {
    assemble(BlockReader::new(input), &options)
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn has_gzip_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz") || ext.eq_ignore_ascii_case("maegz"))
        .unwrap_or(false)
}

/// Turn raw input into text, inflating it first when it starts with the gzip
/// magic bytes.
fn decode(bytes: Vec<u8>, gzip_expected: bool) -> Result<String> {
    let bytes = if bytes.starts_with(&GZIP_MAGIC) {
        debug!("gzip input detected ({} compressed bytes)", bytes.len());
        let mut inflated = Vec::new();
        MultiGzDecoder::new(bytes.as_slice())
            .read_to_end(&mut inflated)
            .map_err(|err| MaeError::io(format!("corrupt gzip stream: {err}")).with_source(err))?;
        inflated
    } else if bytes == [GZIP_MAGIC[0]] {
        return Err(MaeError::io("input ends after the first gzip magic byte"));
    } else if gzip_expected {
        return Err(MaeError::io("file is named as gzip but is not gzip-compressed"));
    } else {
        bytes
    };
    Ok(String::from_utf8(bytes)?)
}
