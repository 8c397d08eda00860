//! XML-DSig verification against the pinned IdP certificate.
//!
//! Only the enveloped-signature profile SAML uses is accepted: one
//! reference to the signed element by ID, the enveloped transform plus a
//! canonicalization, RSA with SHA-2. Redirect-binding messages carry a
//! detached signature over the query string instead.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ring::signature::{self, UnparsedPublicKey, VerificationAlgorithm};
use sha2::{Digest, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;
use thiserror::Error;
use x509_parser::pem::parse_x509_pem;
use x509_parser::public_key::PublicKey;

use super::xml::{canonicalize, Canonicalization, Element};

pub const DSIG_NAMESPACE: &str = "http://www.w3.org/2000/09/xmldsig#";

const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
const C14N: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
const ENVELOPED: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
const RSA_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384";
const RSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";

const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
const SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#sha384";
const SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("message is not signed")]
    Missing,

    #[error("unsupported algorithm: {0}")]
    Unsupported(String),

    #[error("malformed signature: {0}")]
    Malformed(String),

    #[error("signature does not reference the signed element")]
    Reference,

    #[error("digest of the signed element does not match")]
    Digest,

    #[error("signature value does not verify with the IdP certificate")]
    Invalid,

    #[error("unusable IdP certificate: {0}")]
    Certificate(String),
}

fn malformed(reason: &str) -> SignatureError {
    SignatureError::Malformed(reason.to_string())
}

/// Verifies IdP signatures with the RSA key of a pinned certificate.
///
/// Certificates embedded in `KeyInfo` are never trusted.
#[derive(Debug, Clone)]
pub struct XmlSignatureValidator {
    /// PKCS#1 `RSAPublicKey` DER.
    public_key: Vec<u8>,
}

impl XmlSignatureValidator {
    pub fn from_pem(pem: &str) -> Result<Self, SignatureError> {
        let (_, pem) = parse_x509_pem(pem.trim().as_bytes())
            .map_err(|e| SignatureError::Certificate(e.to_string()))?;
        let certificate = pem
            .parse_x509()
            .map_err(|e| SignatureError::Certificate(e.to_string()))?;

        let spki = certificate.public_key();
        match spki.parsed() {
            Ok(PublicKey::RSA(_)) => Ok(Self {
                public_key: spki.subject_public_key.data.to_vec(),
            }),
            Ok(_) => Err(SignatureError::Certificate("not an RSA key".to_string())),
            Err(e) => Err(SignatureError::Certificate(e.to_string())),
        }
    }

    /// Verify the `ds:Signature` that is a direct child of `element`.
    pub fn verify_enveloped(&self, element: &Element) -> Result<(), SignatureError> {
        let signature = element
            .child(DSIG_NAMESPACE, "Signature")
            .ok_or(SignatureError::Missing)?;
        let signed_info = signature
            .child(DSIG_NAMESPACE, "SignedInfo")
            .ok_or_else(|| malformed("missing SignedInfo"))?;

        let c14n = signed_info
            .child(DSIG_NAMESPACE, "CanonicalizationMethod")
            .ok_or_else(|| malformed("missing CanonicalizationMethod"))?;
        let (method, prefixes) = canonicalization(c14n)?;

        let algorithm = signed_info
            .child(DSIG_NAMESPACE, "SignatureMethod")
            .and_then(|m| m.attribute("Algorithm"))
            .ok_or_else(|| malformed("missing SignatureMethod"))?;
        let algorithm = verification_algorithm(algorithm)?;

        let mut references = signed_info.children_named(DSIG_NAMESPACE, "Reference");
        let reference = references.next().ok_or(SignatureError::Reference)?;
        if references.next().is_some() {
            return Err(malformed("more than one Reference"));
        }

        let id = element.attribute("ID").ok_or(SignatureError::Reference)?;
        if reference.attribute("URI") != Some(format!("#{}", id).as_str()) {
            return Err(SignatureError::Reference);
        }

        // Reference digest first, then the signature over SignedInfo.
        let (digest_method, digest_prefixes) = reference_transforms(reference)?;
        let digest_uri = reference
            .child(DSIG_NAMESPACE, "DigestMethod")
            .and_then(|m| m.attribute("Algorithm"))
            .ok_or_else(|| malformed("missing DigestMethod"))?;
        let expected = reference
            .child(DSIG_NAMESPACE, "DigestValue")
            .map(|v| decode_base64(&v.text()))
            .transpose()?
            .ok_or_else(|| malformed("missing DigestValue"))?;

        let canonical = canonicalize(element, digest_method, &digest_prefixes, Some(signature));
        let actual = digest(digest_uri, canonical.as_bytes())?;
        if !bool::from(actual.ct_eq(&expected)) {
            return Err(SignatureError::Digest);
        }

        let signature_value = signature
            .child(DSIG_NAMESPACE, "SignatureValue")
            .map(|v| decode_base64(&v.text()))
            .transpose()?
            .ok_or_else(|| malformed("missing SignatureValue"))?;

        let canonical_signed_info = canonicalize(signed_info, method, &prefixes, None);
        UnparsedPublicKey::new(algorithm, &self.public_key)
            .verify(canonical_signed_info.as_bytes(), &signature_value)
            .map_err(|_| SignatureError::Invalid)
    }

    /// Verify a redirect-binding signature over `signed` query bytes.
    pub fn verify_detached(
        &self,
        signed: &[u8],
        algorithm: &str,
        signature_b64: &str,
    ) -> Result<(), SignatureError> {
        let algorithm = verification_algorithm(algorithm)?;
        let signature_value = decode_base64(signature_b64)?;

        UnparsedPublicKey::new(algorithm, &self.public_key)
            .verify(signed, &signature_value)
            .map_err(|_| SignatureError::Invalid)
    }
}

fn canonicalization(
    method: &Element,
) -> Result<(Canonicalization, Vec<String>), SignatureError> {
    let algorithm = method
        .attribute("Algorithm")
        .ok_or_else(|| malformed("canonicalization without Algorithm"))?;

    match algorithm {
        EXC_C14N => {
            let prefixes = method
                .elements()
                .find(|e| e.local == "InclusiveNamespaces" && e.namespace() == Some(EXC_C14N))
                .and_then(|e| e.attribute("PrefixList"))
                .map(|list| list.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();
            Ok((Canonicalization::Exclusive, prefixes))
        }
        C14N => Ok((Canonicalization::Inclusive, Vec::new())),
        other => Err(SignatureError::Unsupported(other.to_string())),
    }
}

/// The enveloped transform is mandatory; a missing canonicalization
/// transform means inclusive C14N.
fn reference_transforms(
    reference: &Element,
) -> Result<(Canonicalization, Vec<String>), SignatureError> {
    let transforms: Vec<&Element> = reference
        .child(DSIG_NAMESPACE, "Transforms")
        .map(|t| t.children_named(DSIG_NAMESPACE, "Transform").collect())
        .unwrap_or_default();

    let mut enveloped = false;
    let mut method = (Canonicalization::Inclusive, Vec::new());
    for transform in transforms {
        match transform.attribute("Algorithm") {
            Some(ENVELOPED) => enveloped = true,
            Some(_) => method = canonicalization(transform)?,
            None => return Err(malformed("transform without Algorithm")),
        }
    }

    if !enveloped {
        return Err(SignatureError::Unsupported(
            "reference without enveloped-signature transform".to_string(),
        ));
    }
    Ok(method)
}

fn verification_algorithm(uri: &str) -> Result<&'static dyn VerificationAlgorithm, SignatureError> {
    match uri {
        RSA_SHA256 => Ok(&signature::RSA_PKCS1_2048_8192_SHA256),
        RSA_SHA384 => Ok(&signature::RSA_PKCS1_2048_8192_SHA384),
        RSA_SHA512 => Ok(&signature::RSA_PKCS1_2048_8192_SHA512),
        other => Err(SignatureError::Unsupported(other.to_string())),
    }
}

fn digest(uri: &str, data: &[u8]) -> Result<Vec<u8>, SignatureError> {
    match uri {
        SHA256 => Ok(Sha256::digest(data).to_vec()),
        SHA384 => Ok(Sha384::digest(data).to_vec()),
        SHA512 => Ok(Sha512::digest(data).to_vec()),
        other => Err(SignatureError::Unsupported(other.to_string())),
    }
}

fn decode_base64(text: &str) -> Result<Vec<u8>, SignatureError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(compact)
        .map_err(|_| malformed("invalid base64"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saml::xml::parse;

    const IDP_CERT: &str = include_str!("testdata/idp_cert.pem");
    const OTHER_CERT: &str = include_str!("testdata/other_cert.pem");
    const SIGNED_RESPONSE: &str = include_str!("testdata/signed_response.xml");
    const SAML: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

    fn assertion(root: &Element) -> &Element {
        root.child(SAML, "Assertion").unwrap()
    }

    #[test]
    fn test_from_pem_requires_a_certificate() {
        assert!(XmlSignatureValidator::from_pem(IDP_CERT).is_ok());
        let bogus = "-----BEGIN CERTIFICATE-----\nTUlJQ2FrZQ==\n-----END CERTIFICATE-----";
        assert!(matches!(
            XmlSignatureValidator::from_pem(bogus),
            Err(SignatureError::Certificate(_))
        ));
    }

    #[test]
    fn test_signed_assertion_verifies() {
        let validator = XmlSignatureValidator::from_pem(IDP_CERT).unwrap();
        let root = parse(SIGNED_RESPONSE).unwrap();

        validator.verify_enveloped(assertion(&root)).unwrap();
        assert!(matches!(validator.verify_enveloped(&root), Err(SignatureError::Missing)));
    }

    #[test]
    fn test_other_certificate_fails() {
        let validator = XmlSignatureValidator::from_pem(OTHER_CERT).unwrap();
        let root = parse(SIGNED_RESPONSE).unwrap();

        assert!(matches!(
            validator.verify_enveloped(assertion(&root)),
            Err(SignatureError::Invalid)
        ));
    }

    #[test]
    fn test_tampered_content_fails_digest() {
        let validator = XmlSignatureValidator::from_pem(IDP_CERT).unwrap();
        let tampered = SIGNED_RESPONSE.replace("PK:123456-78901", "PK:999999-99999");
        let root = parse(&tampered).unwrap();

        assert!(matches!(
            validator.verify_enveloped(assertion(&root)),
            Err(SignatureError::Digest)
        ));
    }

    #[test]
    fn test_reference_must_name_the_element() {
        let validator = XmlSignatureValidator::from_pem(IDP_CERT).unwrap();
        let moved = SIGNED_RESPONSE.replace(r#"ID="_a1""#, r#"ID="_a2""#);
        let root = parse(&moved).unwrap();

        assert!(matches!(
            validator.verify_enveloped(assertion(&root)),
            Err(SignatureError::Reference)
        ));
    }

    #[test]
    fn test_sha1_is_refused() {
        let validator = XmlSignatureValidator::from_pem(IDP_CERT).unwrap();
        let weak =
            SIGNED_RESPONSE.replace(RSA_SHA256, "http://www.w3.org/2000/09/xmldsig#rsa-sha1");
        let root = parse(&weak).unwrap();

        assert!(matches!(
            validator.verify_enveloped(assertion(&root)),
            Err(SignatureError::Unsupported(_))
        ));
    }
}
