use super::encryption::KdfParams;
use crate::errors::CoreError;

/// Magic bytes identifying a ledger table file.
pub const MAGIC: &[u8; 4] = b"PLDG";

/// Current table file version.
pub const CURRENT_VERSION: u16 = 1;

/// Longest accepted table name, in bytes.
pub const MAX_TABLE_NAME_LEN: usize = 64;

/// Header size without the table name:
/// magic(4) + version(2) + name_len(2) + kdf_params(12) + salt(16) + nonce(12) + ciphertext_len(8) = 56
pub const MIN_HEADER_SIZE: usize = 56;

/// Header of an encrypted table file.
#[derive(Debug)]
pub struct TableHeader {
    pub version: u16,
    pub table: String,
    pub kdf_params: KdfParams,
    pub salt: [u8; 16],
    pub nonce: [u8; 12],
    pub ciphertext_len: u64,
}

/// Serialize a table file.
///
/// Layout:
/// ```text
/// [PLDG: 4B] [version: 2B LE] [name_len: 2B LE] [name: name_len B]
/// [memory_cost: 4B LE] [time_cost: 4B LE] [parallelism: 4B LE]
/// [salt: 16B] [nonce: 12B] [ciphertext_len: 8B LE] [ciphertext]
/// ```
pub fn write_table_file(
    table: &str,
    kdf_params: &KdfParams,
    salt: &[u8; 16],
    nonce: &[u8; 12],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CoreError> {
    let name = table.as_bytes();
    if name.is_empty() || name.len() > MAX_TABLE_NAME_LEN {
        return Err(CoreError::InvalidFileFormat(format!(
            "Table name must be 1..={MAX_TABLE_NAME_LEN} bytes, got {}",
            name.len()
        )));
    }

    let mut buf = Vec::with_capacity(MIN_HEADER_SIZE + name.len() + ciphertext.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&CURRENT_VERSION.to_le_bytes());
    buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
    buf.extend_from_slice(name);
    buf.extend_from_slice(&kdf_params.memory_cost.to_le_bytes());
    buf.extend_from_slice(&kdf_params.time_cost.to_le_bytes());
    buf.extend_from_slice(&kdf_params.parallelism.to_le_bytes());
    buf.extend_from_slice(salt);
    buf.extend_from_slice(nonce);
    buf.extend_from_slice(&(ciphertext.len() as u64).to_le_bytes());
    buf.extend_from_slice(ciphertext);
    Ok(buf)
}

/// Sequential little-endian reader over a header.
struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], CoreError> {
        let end = self.offset + len;
        if end > self.data.len() {
            return Err(CoreError::InvalidFileFormat(format!("File truncated while reading {what}")));
        }
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N], CoreError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    fn u16(&mut self, what: &str) -> Result<u16, CoreError> {
        Ok(u16::from_le_bytes(self.array(what)?))
    }

    fn u32(&mut self, what: &str) -> Result<u32, CoreError> {
        Ok(u32::from_le_bytes(self.array(what)?))
    }

    fn u64(&mut self, what: &str) -> Result<u64, CoreError> {
        Ok(u64::from_le_bytes(self.array(what)?))
    }
}

/// Parse a table file. Returns the header and the ciphertext slice.
pub fn read_table_file(data: &[u8]) -> Result<(TableHeader, &[u8]), CoreError> {
    if data.len() < MIN_HEADER_SIZE {
        return Err(CoreError::InvalidFileFormat(
            "File too small to be a ledger table".into(),
        ));
    }
    if &data[0..4] != MAGIC {
        return Err(CoreError::InvalidFileFormat(
            "Invalid magic bytes, not a ledger table".into(),
        ));
    }

    let mut cursor = Cursor { data, offset: 4 };

    let version = cursor.u16("version")?;
    if version == 0 || version > CURRENT_VERSION {
        return Err(CoreError::UnsupportedVersion(version));
    }

    let name_len = cursor.u16("table name length")? as usize;
    if name_len == 0 || name_len > MAX_TABLE_NAME_LEN {
        return Err(CoreError::InvalidFileFormat(format!(
            "Table name length out of range: {name_len}"
        )));
    }
    let table = std::str::from_utf8(cursor.take(name_len, "table name")?)
        .map_err(|_| CoreError::InvalidFileFormat("Table name is not UTF-8".into()))?
        .to_string();

    let memory_cost = cursor.u32("KDF memory_cost")?;
    let time_cost = cursor.u32("KDF time_cost")?;
    let parallelism = cursor.u32("KDF parallelism")?;

    // A crafted header must not be able to make the KDF exhaust the machine.
    if !(8..=1_048_576).contains(&memory_cost) {
        return Err(CoreError::InvalidFileFormat(format!(
            "KDF memory_cost out of safe range: {memory_cost} KiB (expected 8..1048576)"
        )));
    }
    if !(1..=20).contains(&time_cost) {
        return Err(CoreError::InvalidFileFormat(format!(
            "KDF time_cost out of safe range: {time_cost} (expected 1..20)"
        )));
    }
    if !(1..=16).contains(&parallelism) {
        return Err(CoreError::InvalidFileFormat(format!(
            "KDF parallelism out of safe range: {parallelism} (expected 1..16)"
        )));
    }

    let salt = cursor.array::<16>("salt")?;
    let nonce = cursor.array::<12>("nonce")?;
    let ciphertext_len = cursor.u64("ciphertext length")?;

    let remaining = data.len() - cursor.offset;
    if (remaining as u64) < ciphertext_len {
        return Err(CoreError::InvalidFileFormat(format!(
            "File truncated: expected {ciphertext_len} bytes of ciphertext, got {remaining}"
        )));
    }
    let ciphertext = cursor.take(ciphertext_len as usize, "ciphertext")?;

    let header = TableHeader {
        version,
        table,
        kdf_params: KdfParams {
            memory_cost,
            time_cost,
            parallelism,
        },
        salt,
        nonce,
        ciphertext_len,
    };

    Ok((header, ciphertext))
}
