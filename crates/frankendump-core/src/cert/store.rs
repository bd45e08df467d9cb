//! Certificate lookup and chain assembly against the E-ticket save.

use log::{debug, error};

use frankendump_platform::save::{SaveError, SaveStore};

use super::layout::{CERT_MAX_SIZE, CERT_MIN_SIZE};
use super::{CertChain, CertError, Certificate};

/// Mount path of the E-ticket system save container.
pub const CERT_SAVE_CONTAINER_PATH: &str = "sys:/save/80000000000000e0";

/// Per-certificate storage path prefix inside the container.
pub const CERT_STORAGE_BASE_PATH: &str = "/certificate/";

/// Issuer strings name the root explicitly; chains are built from the
/// certificate names that follow it.
pub const ROOT_ISSUER_PREFIX: &str = "Root-";

/// Scratch size for issuer tokenization. Issuers longer than this are
/// truncated before splitting, matching the fixed temporary the format was
/// designed around.
const ISSUER_SCRATCH_LEN: usize = 0x40;

/// Resolves certificates and chains from the platform save container.
pub struct CertStore<S: SaveStore> {
    saves: S,
}

impl<S: SaveStore> CertStore<S> {
    #[must_use]
    pub fn new(saves: S) -> Self {
        Self { saves }
    }

    /// Load and parse the certificate stored under `name`.
    ///
    /// The save container is opened read-only for the duration of the call
    /// and closed on every exit path.
    pub fn certificate_by_name(&self, name: &str) -> Result<Certificate, CertError> {
        if name.is_empty() {
            error!("certificate lookup with an empty name");
            return Err(CertError::InvalidArgument("certificate name is empty"));
        }

        let path = format!("{CERT_STORAGE_BASE_PATH}{name}");

        let container = self.saves.open(CERT_SAVE_CONTAINER_PATH).map_err(|err| {
            error!("failed to open E-ticket save container: {err}");
            CertError::Save(err)
        })?;

        let entry = container.lookup(&path).map_err(|err| match err {
            SaveError::EntryNotFound(_) => {
                error!("certificate {name:?} not present in the E-ticket save");
                CertError::NotFound(name.to_owned())
            }
            other => {
                error!("lookup of certificate {name:?} failed: {other}");
                CertError::Save(other)
            }
        })?;

        let size = entry.size;
        if size < CERT_MIN_SIZE as u64 || size > CERT_MAX_SIZE as u64 {
            error!("certificate {name:?} has invalid size {size:#x}");
            return Err(CertError::SizeOutOfRange {
                name: name.to_owned(),
                size,
            });
        }

        let mut data = vec![0u8; size as usize];
        let read = container.read(&entry, 0, &mut data)? as u64;
        if read != size {
            error!("short read on certificate {name:?}: wanted {size:#x}, got {read:#x}");
            return Err(CertError::ShortRead {
                expected: size,
                read,
            });
        }

        let cert = Certificate::parse(data).map_err(|source| {
            error!("certificate {name:?} is malformed: {source}");
            CertError::Malformed {
                name: name.to_owned(),
                source,
            }
        })?;

        debug!(
            "loaded certificate {name:?} ({:#x} bytes, {:?})",
            cert.size(),
            cert.kind()
        );
        Ok(cert)
    }

    /// Assemble the chain named by a signature issuer string such as
    /// `"Root-CA00000003-XS00000020"`. Certificates appear in token order.
    ///
    /// Any failed lookup aborts the whole call; the partially built chain
    /// is released, never returned.
    pub fn chain_by_issuer(&self, issuer: &str) -> Result<CertChain, CertError> {
        if issuer.is_empty() {
            error!("chain requested for an empty issuer string");
            return Err(CertError::InvalidArgument("issuer string is empty"));
        }

        let Some(tail) = issuer.strip_prefix(ROOT_ISSUER_PREFIX) else {
            error!("issuer {issuer:?} does not start with {ROOT_ISSUER_PREFIX:?}");
            return Err(CertError::BadIssuerPrefix);
        };

        let tokens = issuer_tokens(tail);
        if tokens.is_empty() {
            error!("issuer {issuer:?} names no certificates");
            return Err(CertError::EmptyIssuer);
        }

        let mut certs = Vec::with_capacity(tokens.len());
        for token in &tokens {
            let cert = self.certificate_by_name(token).map_err(|err| {
                error!("unable to retrieve certificate {token:?} for issuer {issuer:?}");
                err
            })?;
            certs.push(cert);
        }

        CertChain::new(certs)
    }

    /// Resolve an issuer to a chain and serialize it into one contiguous
    /// raw buffer (root-proximate certificate first).
    pub fn raw_chain_by_issuer(&self, issuer: &str) -> Result<Vec<u8>, CertError> {
        let chain = self.chain_by_issuer(issuer)?;
        Ok(chain.serialize_raw())
    }
}

/// Split the issuer tail on `-` the way a destructive `strtok` over a
/// fixed 0x40-byte copy would: the tail is truncated to fit the scratch
/// (with its terminator), leading and repeated delimiters are skipped, and
/// each token ends at the next delimiter or the terminator.
fn issuer_tokens(tail: &str) -> Vec<String> {
    let mut scratch = [0u8; ISSUER_SCRATCH_LEN];
    let take = tail.len().min(ISSUER_SCRATCH_LEN - 1);
    scratch[..take].copy_from_slice(&tail.as_bytes()[..take]);

    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < scratch.len() && scratch[pos] != 0 {
        while pos < scratch.len() && scratch[pos] == b'-' {
            pos += 1;
        }
        if pos >= scratch.len() || scratch[pos] == 0 {
            break;
        }
        let start = pos;
        while pos < scratch.len() && scratch[pos] != 0 && scratch[pos] != b'-' {
            pos += 1;
        }
        tokens.push(String::from_utf8_lossy(&scratch[start..pos]).into_owned());
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_in_order() {
        assert_eq!(issuer_tokens("a-b-c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_single_token() {
        assert_eq!(issuer_tokens("CA00000003"), vec!["CA00000003"]);
    }

    #[test]
    fn test_empty_and_delimiter_only_tails() {
        assert!(issuer_tokens("").is_empty());
        assert!(issuer_tokens("---").is_empty());
    }

    #[test]
    fn test_repeated_delimiters_collapse() {
        assert_eq!(issuer_tokens("a--b"), vec!["a", "b"]);
    }

    #[test]
    fn test_tail_truncated_to_scratch() {
        // 70 'a's: only the first 0x3F bytes survive the copy.
        let tail = "a".repeat(70);
        let tokens = issuer_tokens(&tail);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].len(), ISSUER_SCRATCH_LEN - 1);
    }
}
