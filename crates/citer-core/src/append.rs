//! Append-only writes to the output bibliography
//!
//! An entry is written with a single `write_all` followed by `sync_all`.
//! If either fails the file is truncated back to its original length, so
//! the file never holds a partial entry.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use citer_bibtex::BibRecord;
use tracing::{info, warn};

use crate::error::AppendError;
use crate::store::{BibCodec, BibliographyStore};

pub struct AppendEngine;

impl AppendEngine {
    /// Serialize `record` through the store's codec and add it to the end
    /// of `output`, creating the file if needed
    pub fn append<C: BibCodec>(
        store: &mut BibliographyStore<C>,
        output: &Path,
        record: &BibRecord,
    ) -> Result<(), AppendError> {
        let entry = store.codec().serialize(record);

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(output)
            .map_err(|source| AppendError::Open {
                path: output.to_path_buf(),
                source,
            })?;

        let write_error = |source| AppendError::Write {
            key: record.id().to_string(),
            path: output.to_path_buf(),
            source,
        };

        let original_len = file.metadata().map_err(write_error)?.len();
        let separator = separator_for(&mut file, original_len).map_err(write_error)?;
        let payload = format!("{}{}", separator, entry);

        if let Err(source) = write_synced(&mut file, payload.as_bytes()) {
            if let Err(e) = file.set_len(original_len) {
                warn!(path = %output.display(), error = %e, "could not roll back partial append");
            }
            return Err(write_error(source));
        }

        store.invalidate(output);
        info!(key = record.id(), path = %output.display(), "appended entry");
        Ok(())
    }
}

/// A blank line between entries; an extra newline when the file does not
/// end with one
fn separator_for(file: &mut File, len: u64) -> std::io::Result<&'static str> {
    if len == 0 {
        return Ok("");
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(if last[0] == b'\n' { "\n" } else { "\n\n" })
}

fn write_synced(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes)?;
    file.sync_all()
}
