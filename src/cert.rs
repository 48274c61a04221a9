use std::io::{BufReader, Cursor};

use der::{asn1::Ia5String, Decode as _, DecodePem as _, Encode as _};
use eyre::{eyre, WrapErr as _};
use pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _};
use time::{OffsetDateTime, PrimitiveDateTime};
use x509_cert::{
    builder::{Builder, RequestBuilder as CsrBuilder},
    ext::pkix::{name::GeneralName, SubjectAltName},
    name::Name,
};
use zeroize::Zeroizing;

/// Make a P-256 private key (from which we can derive a public key).
pub fn create_p256_key() -> p256::ecdsa::SigningKey {
    let csprng = &mut rand::thread_rng();
    ecdsa::SigningKey::from(p256::SecretKey::random(csprng))
}

/// Creates a DER encoded CSR for `domains`, signed with `signer`.
///
/// The first domain becomes the Common Name (CN). All domains are listed in the Subject
/// Alternative Name (SAN) extension.
pub fn create_csr(signer: &p256::ecdsa::SigningKey, domains: &[&str]) -> eyre::Result<Vec<u8>> {
    let primary_domain = domains
        .first()
        .ok_or_else(|| eyre!("CSR needs at least one domain"))?;

    let subject = format!("CN={primary_domain}")
        .parse::<Name>()
        .wrap_err("CSR subject")?;

    let mut csr = CsrBuilder::new(subject, signer).map_err(|err| eyre!("CSR builder: {err}"))?;

    let names = domains
        .iter()
        .map(|domain| Ia5String::new(domain).map(GeneralName::DnsName))
        .collect::<Result<Vec<_>, _>>()
        .wrap_err("CSR alt names")?;

    csr.add_extension(&SubjectAltName(names))
        .map_err(|err| eyre!("CSR extension: {err}"))?;

    let csr = csr
        .build::<p256::ecdsa::DerSignature>()
        .map_err(|err| eyre!("build csr: {err}"))?;

    csr.to_der().wrap_err("encode csr")
}

/// Encapsulated certificate chain and private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    private_key_pem: Zeroizing<String>,
    certificate: String,
}

impl Certificate {
    pub(crate) fn new(private_key_pem: Zeroizing<String>, certificate: String) -> Self {
        Certificate {
            private_key_pem,
            certificate,
        }
    }

    /// Loads a stored certificate, validating both parts.
    pub fn parse(private_key_pem: Zeroizing<String>, certificate: String) -> eyre::Result<Self> {
        // validate certificate
        x509_cert::Certificate::from_pem(certificate.as_str())?;

        // validate private key
        p256::ecdsa::SigningKey::from_pkcs8_pem(&private_key_pem)?;

        Ok(Certificate {
            private_key_pem,
            certificate,
        })
    }

    /// The private key in PEM format.
    pub fn private_key(&self) -> &str {
        &self.private_key_pem
    }

    /// The private key in DER encoding.
    pub fn private_key_der(&self) -> eyre::Result<Zeroizing<Vec<u8>>> {
        let private_key = p256::ecdsa::SigningKey::from_pkcs8_pem(&self.private_key_pem)?;
        let der = private_key.to_pkcs8_der()?;
        Ok(Zeroizing::new(der.as_bytes().to_vec()))
    }

    /// The issued certificate chain in PEM format, as downloaded.
    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    /// The issued certificate chain in DER format, end-entity certificate first.
    pub fn certificate_chain(&self) -> eyre::Result<Vec<Vec<u8>>> {
        let mut rdr = BufReader::new(Cursor::new(self.certificate()));

        rustls_pemfile::certs(&mut rdr)
            .map(|res| res.map(|cert| cert.to_vec()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// The end-entity certificate in DER format.
    pub fn leaf(&self) -> eyre::Result<Vec<u8>> {
        self.certificate_chain()?
            .into_iter()
            .next()
            .ok_or_else(|| eyre!("no certificates in chain"))
    }

    /// The issuer certificates following the end-entity certificate, in DER format.
    pub fn chain(&self) -> eyre::Result<Vec<Vec<u8>>> {
        Ok(self.certificate_chain()?.into_iter().skip(1).collect())
    }

    /// Expiry of the end-entity certificate.
    pub fn not_after(&self) -> eyre::Result<OffsetDateTime> {
        let cert = x509_cert::Certificate::from_der(&self.leaf()?)?;

        let not_after = cert.tbs_certificate.validity.not_after.to_date_time();

        // X.509 validity times are UTC
        let not_after = PrimitiveDateTime::try_from(not_after)
            .wrap_err("certificate expiry")?
            .assume_utc();

        Ok(not_after)
    }

    /// Inspect the certificate to count the number of (whole) valid days left.
    ///
    /// It's up to the ACME API provider to decide how long an issued certificate is valid.
    /// Let's Encrypt sets the validity to 90 days. This function reports 89 days for newly
    /// issued cert, since it counts _whole_ days.
    ///
    /// It is possible to get negative days for an expired certificate.
    pub fn valid_days_left(&self) -> eyre::Result<i64> {
        let diff = self.not_after()? - OffsetDateTime::now_utc();
        Ok(diff.whole_days())
    }

    /// Returns true if the certificate expires within `threshold` from now.
    pub fn expires_within(&self, threshold: time::Duration) -> eyre::Result<bool> {
        Ok(self.not_after()? - OffsetDateTime::now_utc() <= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    #[test]
    fn csr_carries_all_domains() {
        let key = create_p256_key();
        let der = create_csr(&key, &["example.org", "www.example.org"]).unwrap();

        let csr = x509_cert::request::CertReq::from_der(&der).unwrap();
        assert_eq!(csr.info.subject.to_string(), "CN=example.org");
        assert_eq!(csr.info.attributes.len(), 1);
    }

    #[test]
    fn csr_needs_a_domain() {
        assert!(create_csr(&create_p256_key(), &[]).is_err());
    }

    #[test]
    fn expiry_of_self_signed() {
        let cert = test::self_signed("example.org", time::Duration::days(10));

        let days = cert.valid_days_left().unwrap();
        assert!((9..=10).contains(&days), "{days}");
        assert!(cert.expires_within(time::Duration::days(30)).unwrap());
        assert!(!cert.expires_within(time::Duration::days(5)).unwrap());

        assert_eq!(cert.certificate_chain().unwrap().len(), 1);
        assert!(cert.chain().unwrap().is_empty());
        assert!(!cert.private_key_der().unwrap().is_empty());
    }

    #[test]
    fn parse_rejects_non_certificates() {
        let key = create_p256_key().to_pkcs8_pem(pem::LineEnding::LF).unwrap();
        assert!(Certificate::parse(key, "CERT HERE".to_owned()).is_err());
    }
}
