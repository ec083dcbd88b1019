use itertools::Itertools;
use k8s_openapi::api::core::v1::Secret;
use rustls::{crypto::ring, sign::CertifiedKey};
use rustls_pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer};
use tracing::debug;

use super::{TranslationError, Translator};
use crate::common::{GatewayObjectKind, ObjectId, ResourceKey, SslObject, TlsBinding};

// Gateway-convention data keys, with the protocol-standard names accepted
// as a fallback. When both pairs are present the first set wins.
const SECRET_CERT_KEYS: [&str; 2] = ["cert", "tls.crt"];
const SECRET_KEY_KEYS: [&str; 2] = ["key", "tls.key"];

/// Whether the secret carries entries under any of the accepted data keys.
/// Watchers use this to skip secrets that can never satisfy a TLS binding.
pub fn secret_has_key_material(secret: &Secret) -> bool {
    secret.data.as_ref().is_some_and(|data| {
        SECRET_CERT_KEYS.iter().any(|name| data.contains_key(*name)) && SECRET_KEY_KEYS.iter().any(|name| data.contains_key(*name))
    })
}

/// Derived certificate binding: raw PEM pair plus the deduplicated SNI set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Certificate {
    pub cert: String,
    pub key: String,
    pub snis: Vec<String>,
}

impl Translator {
    /// Resolves a TLS secret reference into a validated certificate. No
    /// retry lives here: a missing or malformed secret is surfaced to the
    /// caller, and the secret's own watch notification re-triggers the
    /// owner once it appears.
    pub fn translate_ingress_tls(&self, namespace: &str, owner_name: &str, secret_name: &str, hosts: &[String]) -> Result<Certificate, TranslationError> {
        let secret_key = ResourceKey::secret(namespace, secret_name);
        let secret = self.cache.get_secret(&secret_key).ok_or_else(|| TranslationError::SecretNotFound(secret_key.clone()))?;

        let (cert, key) = extract_pem_pair(&secret_key, &secret)?;
        validate_key_pair(&cert, &key)?;

        let snis: Vec<String> = hosts.iter().cloned().unique().collect();
        if snis.is_empty() {
            return Err(TranslationError::EmptyHostList(ResourceKey::route(namespace, owner_name)));
        }
        debug!("translated TLS binding for {owner_name}: secret {secret_key}, snis {snis:?}");
        Ok(Certificate { cert, key, snis })
    }

    pub(super) fn translate_tls_binding(&self, binding: &TlsBinding) -> Result<SslObject, TranslationError> {
        if binding.hosts.is_empty() {
            return Err(TranslationError::EmptyHostList(binding.owner.clone()));
        }
        let certificate = self.translate_ingress_tls(&binding.owner.namespace, &binding.owner.name, &binding.secret_name, &binding.hosts)?;
        Ok(SslObject {
            id: ObjectId::new(&binding.owner, GatewayObjectKind::Ssl, binding.index),
            cert: certificate.cert,
            key: certificate.key,
            snis: certificate.snis,
        })
    }
}

fn extract_pem_pair(secret_key: &ResourceKey, secret: &Secret) -> Result<(String, String), TranslationError> {
    let Some(data) = secret.data.as_ref() else {
        return Err(TranslationError::MalformedSecret(secret_key.clone(), "secret has no data".to_owned()));
    };

    let lookup = |names: [&str; 2]| names.iter().find_map(|name| data.get(*name));
    let (Some(cert), Some(key)) = (lookup(SECRET_CERT_KEYS), lookup(SECRET_KEY_KEYS)) else {
        return Err(TranslationError::MalformedSecret(
            secret_key.clone(),
            "missing certificate or private key entry".to_owned(),
        ));
    };

    let cert = String::from_utf8(cert.0.clone())
        .map_err(|error| TranslationError::MalformedSecret(secret_key.clone(), format!("certificate is not valid UTF-8: {error}")))?;
    let key = String::from_utf8(key.0.clone())
        .map_err(|error| TranslationError::MalformedSecret(secret_key.clone(), format!("private key is not valid UTF-8: {error}")))?;
    Ok((cert, key))
}

/// Parses the PEM pair and checks that the private key corresponds to the
/// public key in the end-entity certificate. A violated pair is an error,
/// never a silent pass-through.
fn validate_key_pair(cert: &str, key: &str) -> Result<(), TranslationError> {
    let chain: Vec<CertificateDer<'static>> = CertificateDer::pem_slice_iter(cert.as_bytes())
        .collect::<Result<_, _>>()
        .map_err(|error| TranslationError::InvalidCertificateKeyPair(format!("certificate does not parse: {error:?}")))?;
    if chain.is_empty() {
        return Err(TranslationError::InvalidCertificateKeyPair("no certificate in PEM payload".to_owned()));
    }
    let private_key = PrivateKeyDer::from_pem_slice(key.as_bytes())
        .map_err(|error| TranslationError::InvalidCertificateKeyPair(format!("private key does not parse: {error:?}")))?;

    CertifiedKey::from_der(chain, private_key, &ring::default_provider())
        .map_err(|error| TranslationError::InvalidCertificateKeyPair(error.to_string()))?;
    Ok(())
}
