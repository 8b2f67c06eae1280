//! Streaming symmetric decryption of an OpenPGP message.

use std::io::{self, Read};
use std::sync::LazyLock;

use sequoia_openpgp as openpgp;

use openpgp::cert::Cert;
use openpgp::crypto::{Password, SessionKey};
use openpgp::packet::{PKESK, SKESK};
use openpgp::parse::stream::{
    DecryptionHelper, DecryptorBuilder, MessageStructure, VerificationHelper,
};
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::types::SymmetricAlgorithm;
use openpgp::KeyHandle;

use crate::error::{GatewayError, Result};

static POLICY: LazyLock<StandardPolicy> = LazyLock::new(StandardPolicy::new);

/// Wrap `source` in a decryption stream for a symmetrically encrypted
/// OpenPGP message.
///
/// Fails with `NotEncrypted` when the bytes are not an encrypted message,
/// `NotSymmetric` when the message carries no symmetric session-key
/// packet, and `BadKey` when the supplied key does not unlock it. The key
/// is offered exactly once; OpenPGP signals a wrong key by prompting
/// again, which the single-shot helper refuses.
pub fn decrypt_stream<R>(source: R, key: &Password) -> Result<PlaintextReader>
where
    R: Read + Send + Sync + 'static,
{
    let helper = SingleShotKey {
        key: key.clone(),
        prompted: false,
    };
    let decryptor = DecryptorBuilder::from_reader(source)
        .map_err(GatewayError::Pgp)?
        .with_policy(&*POLICY, None, helper)
        .map_err(classify)?;
    Ok(PlaintextReader {
        inner: Box::new(decryptor),
    })
}

/// Reader over the plaintext of a decrypted message.
pub struct PlaintextReader {
    inner: Box<dyn Read + Send>,
}

impl Read for PlaintextReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.as_mut().read(buf)
    }
}

fn classify(err: anyhow::Error) -> GatewayError {
    match err.downcast::<GatewayError>() {
        Ok(gateway) => gateway,
        Err(err) => {
            // The helper's refusal can surface wrapped in parser context;
            // recover the crypto verdict from anywhere in the chain.
            for cause in err.chain() {
                match cause.downcast_ref::<GatewayError>() {
                    Some(GatewayError::NotSymmetric) => return GatewayError::NotSymmetric,
                    Some(GatewayError::BadKey) => return GatewayError::BadKey,
                    _ => {}
                }
            }
            GatewayError::NotEncrypted(err.to_string())
        }
    }
}

/// Key provider that answers a single symmetric prompt and refuses any
/// retry.
struct SingleShotKey {
    key: Password,
    prompted: bool,
}

impl VerificationHelper for SingleShotKey {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(Vec::new())
    }

    fn check(&mut self, _structure: MessageStructure) -> openpgp::Result<()> {
        // Signatures are not part of the transparent-encryption contract.
        Ok(())
    }
}

impl DecryptionHelper for SingleShotKey {
    fn decrypt(
        &mut self,
        _pkesks: &[PKESK],
        skesks: &[SKESK],
        _sym_algo: Option<SymmetricAlgorithm>,
        decrypt: &mut dyn FnMut(Option<SymmetricAlgorithm>, &SessionKey) -> bool,
    ) -> openpgp::Result<Option<Cert>> {
        if skesks.is_empty() {
            return Err(GatewayError::NotSymmetric.into());
        }
        if self.prompted {
            return Err(GatewayError::BadKey.into());
        }
        self.prompted = true;

        for skesk in skesks {
            if let Ok((algorithm, session_key)) = skesk.decrypt(&self.key) {
                if decrypt(algorithm, &session_key) {
                    return Ok(None);
                }
            }
        }
        Err(GatewayError::BadKey.into())
    }
}
