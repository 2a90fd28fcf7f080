//! X.509 v3 certificates over the ASN.1 validator: parsing, creation and
//! signing (RSA), and the chain verification the handshake relies on.

use crate::alert::AlertDescription;
use palisade_core::asn1::{self, types, Asn1, Captures, Content, TagClass, Validator};
use palisade_core::hash;
use palisade_core::{Error, Result};
use palisade_core::oids;
use palisade_core::pki::encoding::{rsa_public_key_from_spki, rsa_public_key_to_spki};
use palisade_core::pki::{RsaPrivateKey, RsaPublicKey};
use palisade_core::pem::{self, PemMessage};

const BASIC_CONSTRAINTS_OID: &str = "2.5.29.19";
const SUBJECT_ALT_NAME_OID: &str = "2.5.29.17";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameAttribute {
    pub oid: String,
    pub value: String,
}

pub type DistinguishedName = Vec<NameAttribute>;

/// Attribute lookup by short name ("CN", "O", ...) or dotted OID.
pub fn dn_get<'a>(dn: &'a DistinguishedName, key: &str) -> Option<&'a str> {
    let oid = match key {
        "CN" => "2.5.4.3",
        "C" => "2.5.4.6",
        "L" => "2.5.4.7",
        "ST" => "2.5.4.8",
        "O" => "2.5.4.10",
        "OU" => "2.5.4.11",
        other => oids::oid(other).unwrap_or(other),
    };
    dn.iter().find(|a| a.oid == oid).map(|a| a.value.as_str())
}

#[derive(Debug, Clone)]
pub struct Certificate {
    /// Full certificate DER.
    pub raw: Vec<u8>,
    /// `tbsCertificate` DER, the exact bytes the signature covers.
    pub tbs: Vec<u8>,
    pub serial: Vec<u8>,
    pub signature_oid: String,
    pub signature: Vec<u8>,
    pub issuer: DistinguishedName,
    pub subject: DistinguishedName,
    /// Validity window, milliseconds since the Unix epoch.
    pub not_before: i64,
    pub not_after: i64,
    pub public_key: RsaPublicKey,
    pub is_ca: bool,
    pub subject_alt_names: Vec<String>,
}

impl Certificate {
    pub fn subject_common_name(&self) -> Option<&str> {
        dn_get(&self.subject, "CN")
    }

    pub fn issuer_common_name(&self) -> Option<&str> {
        dn_get(&self.issuer, "CN")
    }

    pub fn valid_at(&self, ms: i64) -> bool {
        ms >= self.not_before && ms <= self.not_after
    }

    /// Check this certificate's signature against an issuer public key.
    pub fn verify_signature(&self, issuer_key: &RsaPublicKey) -> Result<bool> {
        let digest_algorithm = match oids::name(&self.signature_oid) {
            Some("md5WithRSAEncryption") => "md5",
            Some("sha1WithRSAEncryption") => "sha1",
            Some("sha256WithRSAEncryption") => "sha256",
            Some("sha384WithRSAEncryption") => "sha384",
            Some("sha512WithRSAEncryption") => "sha512",
            _ => return Err(Error::UnknownAlgorithm(self.signature_oid.clone())),
        };
        let digest = hash::digest(digest_algorithm, &self.tbs)?;
        issuer_key.verify_pkcs1v15(digest_algorithm, &digest, &self.signature)
    }

    pub fn to_pem(&self) -> String {
        pem::encode(&PemMessage::new("CERTIFICATE", self.raw.clone()))
    }

    pub fn from_pem(text: &str) -> Result<Certificate> {
        for msg in pem::decode(text)? {
            if msg.has_type("CERTIFICATE") {
                return parse_certificate(&msg.body);
            }
        }
        Err(Error::internal("no CERTIFICATE message in PEM input"))
    }
}

// -- parsing -------------------------------------------------------------

fn certificate_validator() -> Validator {
    Validator::node("certificate")
        .universal(types::SEQUENCE)
        .constructed(true)
        .children(vec![
            Validator::node("certificate.tbsCertificate")
                .universal(types::SEQUENCE)
                .constructed(true)
                .capture_asn1("tbs")
                .children(vec![
                    Validator::node("tbsCertificate.version")
                        .context(0)
                        .constructed(true)
                        .optional(),
                    Validator::node("tbsCertificate.serialNumber")
                        .universal(types::INTEGER)
                        .capture("serial"),
                    Validator::node("tbsCertificate.signature")
                        .universal(types::SEQUENCE)
                        .constructed(true),
                    Validator::node("tbsCertificate.issuer")
                        .universal(types::SEQUENCE)
                        .constructed(true)
                        .capture_asn1("issuer"),
                    Validator::node("tbsCertificate.validity")
                        .universal(types::SEQUENCE)
                        .constructed(true)
                        .capture_asn1("validity"),
                    Validator::node("tbsCertificate.subject")
                        .universal(types::SEQUENCE)
                        .constructed(true)
                        .capture_asn1("subject"),
                    Validator::node("tbsCertificate.subjectPublicKeyInfo")
                        .universal(types::SEQUENCE)
                        .constructed(true)
                        .capture_asn1("spki"),
                    Validator::node("tbsCertificate.extensions")
                        .context(3)
                        .constructed(true)
                        .optional()
                        .capture_asn1("extensions"),
                ]),
            Validator::node("certificate.signatureAlgorithm")
                .universal(types::SEQUENCE)
                .constructed(true)
                .children(vec![Validator::node("signatureAlgorithm.algorithm")
                    .universal(types::OID)
                    .capture("sigOid")]),
            Validator::node("certificate.signatureValue")
                .universal(types::BIT_STRING)
                .capture_bit_string_value("signature"),
        ])
}

fn parse_name(node: &Asn1) -> Result<DistinguishedName> {
    let mut dn = Vec::new();
    for rdn in node.children()? {
        for attr in rdn.children()? {
            let kids = attr.children()?;
            if kids.len() != 2 {
                return Err(Error::internal("malformed RDN attribute"));
            }
            let oid = asn1::der_to_oid(kids[0].as_bytes()?)?;
            let value = String::from_utf8_lossy(kids[1].as_bytes()?).into_owned();
            dn.push(NameAttribute { oid, value });
        }
    }
    Ok(dn)
}

fn parse_time(node: &Asn1) -> Result<i64> {
    let text = std::str::from_utf8(node.as_bytes()?)
        .map_err(|_| Error::internal("time value is not ASCII"))?;
    match node.tag {
        types::UTC_TIME => asn1::utc_time_to_date(text),
        types::GENERALIZED_TIME => asn1::generalized_time_to_date(text),
        _ => Err(Error::TagMismatch),
    }
}

fn parse_extensions(node: &Asn1) -> Result<(bool, Vec<String>)> {
    let mut is_ca = false;
    let mut sans = Vec::new();

    // [3] wraps the extensions SEQUENCE.
    let seq = node
        .children()?
        .first()
        .ok_or(Error::internal("empty extensions wrapper"))?;
    for ext in seq.children()? {
        let kids = ext.children()?;
        if kids.len() < 2 {
            return Err(Error::internal("malformed extension"));
        }
        let oid = asn1::der_to_oid(kids[0].as_bytes()?)?;
        // kids[1] may be the critical flag; the value is the last child.
        let value = kids.last().expect("len checked").as_bytes()?;
        match oid.as_str() {
            BASIC_CONSTRAINTS_OID => {
                let inner = asn1::from_der_bytes(value)?;
                if let Ok(children) = inner.children() {
                    if let Some(first) = children.first() {
                        if first.tag == types::BOOLEAN {
                            is_ca = first.as_bytes()?.first().copied().unwrap_or(0) != 0;
                        }
                    }
                } else if inner.as_bytes()?.is_empty() {
                    is_ca = false;
                }
            }
            SUBJECT_ALT_NAME_OID => {
                let inner = asn1::from_der_bytes(value)?;
                for name in inner.children()? {
                    // dNSName [2] IA5String.
                    if name.class == TagClass::ContextSpecific && name.tag == 2 {
                        sans.push(String::from_utf8_lossy(name.as_bytes()?).into_owned());
                    }
                }
            }
            _ => {}
        }
    }
    Ok((is_ca, sans))
}

pub fn parse_certificate(der: &[u8]) -> Result<Certificate> {
    let node = asn1::from_der_bytes(der)?;
    let mut captures = Captures::new();
    let mut errors = Vec::new();
    if !asn1::validate(&node, &certificate_validator(), &mut captures, Some(&mut errors)) {
        return Err(Error::internal(format!("not an X.509 certificate: {errors:?}")));
    }

    let tbs_node = captures.node("tbs").ok_or(Error::internal("certificate without TBS"))?;
    let validity = captures.node("validity").ok_or(Error::internal("missing validity"))?;
    let times = validity.children()?;
    if times.len() != 2 {
        return Err(Error::internal("validity must hold two times"));
    }

    let (is_ca, subject_alt_names) = match captures.node("extensions") {
        Some(ext) => parse_extensions(ext)?,
        None => (false, Vec::new()),
    };

    Ok(Certificate {
        raw: der.to_vec(),
        tbs: asn1::to_der(tbs_node),
        serial: captures.bytes("serial").ok_or(Error::internal("missing serial"))?.to_vec(),
        signature_oid: asn1::der_to_oid(
            captures.bytes("sigOid").ok_or(Error::internal("missing signature algorithm"))?,
        )?,
        signature: captures
            .bytes("signature")
            .ok_or(Error::internal("missing signature bits"))?
            .to_vec(),
        issuer: parse_name(captures.node("issuer").ok_or(Error::internal("missing issuer"))?)?,
        subject: parse_name(captures.node("subject").ok_or(Error::internal("missing subject"))?)?,
        not_before: parse_time(&times[0])?,
        not_after: parse_time(&times[1])?,
        public_key: rsa_public_key_from_spki(
            captures.node("spki").ok_or(Error::internal("missing subjectPublicKeyInfo"))?,
        )?,
        is_ca,
        subject_alt_names,
    })
}

// -- creation ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CertificateParams {
    pub serial: Vec<u8>,
    /// (short name or dotted OID, value) pairs, e.g. `("CN", "server")`.
    pub subject: Vec<(String, String)>,
    pub issuer: Vec<(String, String)>,
    pub not_before: i64,
    pub not_after: i64,
    pub is_ca: bool,
    pub subject_alt_names: Vec<String>,
}

impl CertificateParams {
    /// Self-signed shape: issuer equals subject.
    pub fn self_signed(common_name: &str, not_before: i64, not_after: i64) -> Self {
        let dn = vec![("CN".to_string(), common_name.to_string())];
        CertificateParams {
            serial: vec![0x01],
            subject: dn.clone(),
            issuer: dn,
            not_before,
            not_after,
            is_ca: true,
            subject_alt_names: Vec::new(),
        }
    }
}

fn attr_oid(key: &str) -> Result<&str> {
    Ok(match key {
        "CN" => "2.5.4.3",
        "C" => "2.5.4.6",
        "L" => "2.5.4.7",
        "ST" => "2.5.4.8",
        "O" => "2.5.4.10",
        "OU" => "2.5.4.11",
        other if other.contains('.') => other,
        other => oids::oid(other).ok_or(Error::UnknownAlgorithm(other.to_string()))?,
    })
}

fn encode_name(attrs: &[(String, String)]) -> Result<Asn1> {
    let mut rdns = Vec::new();
    for (key, value) in attrs {
        let printable = value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || " '()+,-./:=?".contains(c));
        let value_node = if printable {
            Asn1::printable_string(value)
        } else {
            Asn1::utf8_string(value)
        };
        rdns.push(Asn1::set(vec![Asn1::sequence(vec![
            Asn1::oid(attr_oid(key)?)?,
            value_node,
        ])]));
    }
    Ok(Asn1::sequence(rdns))
}

fn encode_extensions(params: &CertificateParams) -> Result<Option<Asn1>> {
    let mut exts = Vec::new();

    let bc_value = if params.is_ca {
        Asn1::sequence(vec![Asn1::boolean(true)])
    } else {
        Asn1::sequence(vec![])
    };
    exts.push(Asn1::sequence(vec![
        Asn1::oid(BASIC_CONSTRAINTS_OID)?,
        Asn1::boolean(true),
        Asn1::octet_string(asn1::to_der(&bc_value)),
    ]));

    if !params.subject_alt_names.is_empty() {
        let names: Vec<Asn1> = params
            .subject_alt_names
            .iter()
            .map(|n| {
                Asn1::new(
                    TagClass::ContextSpecific,
                    2,
                    false,
                    Content::Bytes(n.as_bytes().to_vec()),
                )
            })
            .collect();
        exts.push(Asn1::sequence(vec![
            Asn1::oid(SUBJECT_ALT_NAME_OID)?,
            Asn1::octet_string(asn1::to_der(&Asn1::sequence(names))),
        ]));
    }

    Ok(Some(Asn1::context(3, vec![Asn1::sequence(exts)])))
}

/// Build and sign a v3 certificate for `subject_key` with `issuer_key`.
pub fn create_certificate(
    params: &CertificateParams,
    subject_key: &RsaPublicKey,
    issuer_key: &RsaPrivateKey,
) -> Result<Certificate> {
    const SHA256_WITH_RSA: &str = "1.2.840.113549.1.1.11";
    let algorithm = Asn1::sequence(vec![Asn1::oid(SHA256_WITH_RSA)?, Asn1::null()]);

    let mut tbs_children = vec![
        // version v3
        Asn1::context(0, vec![Asn1::integer(2)]),
        Asn1::unsigned_integer(&params.serial),
        algorithm.clone(),
        encode_name(&params.issuer)?,
        Asn1::sequence(vec![
            Asn1::utc_time(params.not_before),
            Asn1::utc_time(params.not_after),
        ]),
        encode_name(&params.subject)?,
        rsa_public_key_to_spki(subject_key)?,
    ];
    if let Some(exts) = encode_extensions(params)? {
        tbs_children.push(exts);
    }
    let tbs = Asn1::sequence(tbs_children);
    let tbs_der = asn1::to_der(&tbs);

    let digest = hash::digest("sha256", &tbs_der)?;
    let signature = issuer_key.sign_pkcs1v15("sha256", &digest)?;

    let certificate = Asn1::sequence(vec![tbs, algorithm, Asn1::bit_string(&signature)]);
    parse_certificate(&asn1::to_der(&certificate))
}

// -- trust store and chain verification ----------------------------------

#[derive(Debug, Default)]
pub struct CaStore {
    certs: Vec<Certificate>,
}

impl CaStore {
    pub fn new() -> Self {
        CaStore::default()
    }

    pub fn add(&mut self, cert: Certificate) {
        self.certs.push(cert);
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn contains(&self, cert: &Certificate) -> bool {
        self.certs.iter().any(|c| c.raw == cert.raw)
    }

    pub fn find_issuer(&self, cert: &Certificate) -> Option<&Certificate> {
        self.certs.iter().find(|c| c.subject == cert.issuer)
    }
}

/// Verify `chain` (leaf first) against `store` at time `now_ms`. The error
/// maps straight onto the alert to send.
pub fn verify_chain(
    store: &CaStore,
    chain: &[Certificate],
    now_ms: i64,
) -> std::result::Result<(), AlertDescription> {
    if chain.is_empty() {
        return Err(AlertDescription::BadCertificate);
    }

    for (i, cert) in chain.iter().enumerate() {
        if !cert.valid_at(now_ms) {
            return Err(AlertDescription::CertificateExpired);
        }

        // A certificate present in the store is trusted as-is.
        if store.contains(cert) {
            return Ok(());
        }

        let issuer = chain
            .get(i + 1)
            .or_else(|| store.find_issuer(cert))
            .ok_or(AlertDescription::UnknownCa)?;
        let in_store = store.find_issuer(cert).map(|c| c.raw == issuer.raw).unwrap_or(false);

        if !cert
            .verify_signature(&issuer.public_key)
            .map_err(|_| AlertDescription::BadCertificate)?
        {
            return Err(AlertDescription::BadCertificate);
        }
        // Anything signing another certificate must be a CA, unless it is
        // signing itself.
        if issuer.subject != cert.subject && !issuer.is_ca {
            return Err(AlertDescription::BadCertificate);
        }

        if in_store {
            if !issuer.valid_at(now_ms) {
                return Err(AlertDescription::CertificateExpired);
            }
            return Ok(());
        }
    }

    // Walked the whole chain without reaching a trusted certificate.
    Err(AlertDescription::UnknownCa)
}
