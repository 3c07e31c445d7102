//! Versioned binary persistence for basis data.
//!
//! Every space serializes through the same envelope: magic, format
//! version, then the space-specific payload, encoded with bincode.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{Result, SpaceError};

const MAGIC: u32 = 0x464f_434b; // "FOCK"
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    magic: u32,
    version: u32,
    payload: T,
}

pub(crate) fn write_envelope<T: Serialize>(path: &Path, payload: &T) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(
        writer,
        &Envelope {
            magic: MAGIC,
            version: FORMAT_VERSION,
            payload,
        },
    )?;
    Ok(())
}

pub(crate) fn read_envelope<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    let env: Envelope<T> = bincode::deserialize_from(reader)?;
    if env.magic != MAGIC || env.version != FORMAT_VERSION {
        return Err(SpaceError::BadFileFormat {
            found: env.version,
            expected: FORMAT_VERSION,
        });
    }
    Ok(env.payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        let payload: Vec<u64> = vec![42, 7, 0];
        write_envelope(&path, &payload).unwrap();
        let back: Vec<u64> = read_envelope(&path).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_rejects_wrong_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        std::fs::write(&path, [0u8; 32]).unwrap();
        let err = read_envelope::<Vec<u64>>(&path);
        assert!(err.is_err());
    }
}
