//! OID dictionary for the algorithms and X.500 attributes this workspace
//! speaks. Static tables; lookups in both directions.

/// (dotted OID, short name) pairs.
const TABLE: &[(&str, &str)] = &[
    // Public-key and signature algorithms
    ("1.2.840.113549.1.1.1", "rsaEncryption"),
    ("1.2.840.113549.1.1.4", "md5WithRSAEncryption"),
    ("1.2.840.113549.1.1.5", "sha1WithRSAEncryption"),
    ("1.2.840.113549.1.1.7", "RSAES-OAEP"),
    ("1.2.840.113549.1.1.8", "mgf1"),
    ("1.2.840.113549.1.1.10", "RSASSA-PSS"),
    ("1.2.840.113549.1.1.11", "sha256WithRSAEncryption"),
    ("1.2.840.113549.1.1.12", "sha384WithRSAEncryption"),
    ("1.2.840.113549.1.1.13", "sha512WithRSAEncryption"),
    ("1.3.101.112", "EdDSA25519"),
    // Digest algorithms
    ("1.2.840.113549.2.5", "md5"),
    ("1.3.14.3.2.26", "sha1"),
    ("2.16.840.1.101.3.4.2.1", "sha256"),
    ("2.16.840.1.101.3.4.2.2", "sha384"),
    ("2.16.840.1.101.3.4.2.3", "sha512"),
    ("2.16.840.1.101.3.4.2.5", "sha512-224"),
    ("2.16.840.1.101.3.4.2.6", "sha512-256"),
    // HMAC / PBE
    ("1.2.840.113549.2.7", "hmacWithSHA1"),
    ("1.2.840.113549.2.9", "hmacWithSHA256"),
    ("1.2.840.113549.1.5.12", "pkcs5PBKDF2"),
    ("1.2.840.113549.1.5.13", "pkcs5PBES2"),
    // Symmetric ciphers
    ("1.2.840.113549.3.2", "rc2-cbc"),
    ("1.2.840.113549.3.7", "des-EDE3-CBC"),
    ("1.3.14.3.2.7", "desCBC"),
    ("2.16.840.1.101.3.4.1.2", "aes128-CBC"),
    ("2.16.840.1.101.3.4.1.22", "aes192-CBC"),
    ("2.16.840.1.101.3.4.1.42", "aes256-CBC"),
    // X.500 attribute types
    ("2.5.4.3", "commonName"),
    ("2.5.4.5", "serialNumber"),
    ("2.5.4.6", "countryName"),
    ("2.5.4.7", "localityName"),
    ("2.5.4.8", "stateOrProvinceName"),
    ("2.5.4.9", "streetAddress"),
    ("2.5.4.10", "organizationName"),
    ("2.5.4.11", "organizationalUnitName"),
    ("1.2.840.113549.1.9.1", "emailAddress"),
    // X.509 extensions
    ("2.5.29.14", "subjectKeyIdentifier"),
    ("2.5.29.15", "keyUsage"),
    ("2.5.29.17", "subjectAltName"),
    ("2.5.29.18", "issuerAltName"),
    ("2.5.29.19", "basicConstraints"),
    ("2.5.29.31", "cRLDistributionPoints"),
    ("2.5.29.35", "authorityKeyIdentifier"),
    ("2.5.29.37", "extKeyUsage"),
    ("1.3.6.1.5.5.7.3.1", "serverAuth"),
    ("1.3.6.1.5.5.7.3.2", "clientAuth"),
];

/// Short name for a dotted OID, when known.
pub fn name(oid: &str) -> Option<&'static str> {
    TABLE.iter().find(|(o, _)| *o == oid).map(|(_, n)| *n)
}

/// Dotted OID for a short name, when known.
pub fn oid(name: &str) -> Option<&'static str> {
    TABLE.iter().find(|(_, n)| *n == name).map(|(o, _)| *o)
}

/// Name when known, otherwise the dotted form itself.
pub fn display(oid_str: &str) -> &str {
    name(oid_str).unwrap_or(oid_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bidirectional() {
        assert_eq!(name("1.2.840.113549.1.1.1"), Some("rsaEncryption"));
        assert_eq!(oid("rsaEncryption"), Some("1.2.840.113549.1.1.1"));
        assert_eq!(oid("sha256"), Some("2.16.840.1.101.3.4.2.1"));
        assert_eq!(name("9.9.9"), None);
        assert_eq!(display("2.5.4.3"), "commonName");
        assert_eq!(display("9.9.9"), "9.9.9");
    }
}
