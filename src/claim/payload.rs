use crate::claim::error::ClaimError;
use anyhow::{Result, anyhow};

/// A signed capability to stream one resource until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamClaim {
    /// Catalog id of the song this claim grants access to
    pub resource_id: String,
    /// Caller the claim was minted for, if the listing was authenticated
    pub caller_id: Option<String>,
    /// Issue time in Unix seconds
    pub issued_at: u64,
    /// Expiration time in Unix seconds, exclusive
    pub expires_at: u64,
}

impl StreamClaim {
    /// Remaining lifetime in seconds at `now`; zero once expired
    pub fn remaining(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// Serialize payload to binary format
    ///
    /// Layout (little endian):
    /// `issued_at u64 | expires_at u64 | id_len u16 | id | has_caller u8 | [caller_len u16 | caller]`
    pub fn serialize_to_bytes(&self) -> Result<Vec<u8>> {
        let caller_len = self.caller_id.as_ref().map_or(0, |c| 2 + c.len());
        let mut bytes = Vec::with_capacity(8 + 8 + 2 + self.resource_id.len() + 1 + caller_len);

        bytes.extend_from_slice(&self.issued_at.to_le_bytes());
        bytes.extend_from_slice(&self.expires_at.to_le_bytes());
        put_str(&mut bytes, &self.resource_id, "Resource ID")?;

        match &self.caller_id {
            Some(caller_id) => {
                bytes.push(1);
                put_str(&mut bytes, caller_id, "Caller ID")?;
            }
            None => bytes.push(0),
        }

        Ok(bytes)
    }

    /// Deserialize payload from binary format
    pub fn deserialize_from_bytes(bytes: &[u8]) -> Result<Self, ClaimError> {
        let mut reader = Reader { bytes, offset: 0 };

        let issued_at = u64::from_le_bytes(reader.array("issued_at")?);
        let expires_at = u64::from_le_bytes(reader.array("expires_at")?);
        let resource_id = reader.string("resource_id")?;

        let caller_id = match reader.array::<1>("caller flag")?[0] {
            0 => None,
            1 => Some(reader.string("caller_id")?),
            flag => {
                return Err(ClaimError::InvalidPayload(format!(
                    "Invalid caller flag {flag}"
                )));
            }
        };

        if reader.offset != bytes.len() {
            return Err(ClaimError::InvalidPayload(
                "Trailing bytes after payload".to_string(),
            ));
        }

        Ok(Self {
            resource_id,
            caller_id,
            issued_at,
            expires_at,
        })
    }
}

fn put_str(bytes: &mut Vec<u8>, value: &str, what: &str) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| anyhow!("{what} too long"))?;
    bytes.extend_from_slice(&len.to_le_bytes());
    bytes.extend_from_slice(value.as_bytes());
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8], ClaimError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| ClaimError::InvalidPayload(format!("Failed to read {field}")))?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, field: &str) -> Result<[u8; N], ClaimError> {
        self.take(N, field)?
            .try_into()
            .map_err(|_| ClaimError::InvalidPayload(format!("Failed to read {field}")))
    }

    fn string(&mut self, field: &str) -> Result<String, ClaimError> {
        let len = u16::from_le_bytes(self.array(field)?) as usize;
        let raw = self.take(len, field)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| ClaimError::InvalidPayload(format!("Invalid UTF-8 in {field}")))
    }
}
