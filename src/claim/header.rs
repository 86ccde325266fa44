use crate::claim::error::ClaimError;

pub(crate) const MAGIC: &[u8; 4] = b"SGC1";
pub(crate) const VERSION: u8 = 1;
pub(crate) const ALG_AES_256_GCM: u8 = 1;

// magic(4) + ver(1) + kid(1) + alg(1) + rsv(1) + nonce(12)
pub(crate) const HEADER_SIZE: usize = 20;
pub(crate) const TAG_SIZE: usize = 16;

/// Plaintext token header, bound to the ciphertext as AAD
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ClaimHeader {
    pub kid: u8,
    pub alg: u8,
    pub nonce: [u8; 12],
}

impl ClaimHeader {
    pub fn new(kid: u8) -> Self {
        let mut nonce = [0u8; 12];
        use rand::RngCore;
        rand::thread_rng().fill_bytes(&mut nonce);

        Self {
            kid,
            alg: ALG_AES_256_GCM,
            nonce,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(MAGIC);
        bytes[4] = VERSION;
        bytes[5] = self.kid;
        bytes[6] = self.alg;
        // bytes[7] reserved
        bytes[8..].copy_from_slice(&self.nonce);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ClaimError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ClaimError::InvalidHeader("Invalid header size".to_string()));
        }

        if &bytes[0..4] != MAGIC {
            return Err(ClaimError::InvalidHeader("Invalid magic bytes".to_string()));
        }

        let version = bytes[4];
        if version != VERSION {
            return Err(ClaimError::InvalidHeader(format!(
                "Unsupported version: {version}",
            )));
        }

        let alg = bytes[6];
        if alg != ALG_AES_256_GCM {
            return Err(ClaimError::InvalidHeader(format!(
                "Unsupported algorithm: {alg}"
            )));
        }

        if bytes[7] != 0 {
            return Err(ClaimError::InvalidHeader(
                "Reserved byte must be zero".to_string(),
            ));
        }

        let nonce: [u8; 12] = bytes[8..HEADER_SIZE]
            .try_into()
            .map_err(|_| ClaimError::InvalidHeader("Failed to read nonce".to_string()))?;

        Ok(Self {
            kid: bytes[5],
            alg,
            nonce,
        })
    }
}
