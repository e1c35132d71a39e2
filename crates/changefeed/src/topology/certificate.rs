//! TLS certificate references.
//!
//! The frontend terminates TLS with a certificate issued and rotated outside
//! this system. Only the reference is modelled, and it must be well formed
//! before anything is assembled.

use crate::{Error, Result};
use core::{fmt, str::FromStr};
use serde::{Deserialize, Serialize};

/// Environment variable holding the certificate reference.
pub const CERT_ARN_ENV: &str = "CERT_ARN";

const REMEDIATION: &str = "Set the certificate reference before assembling:\n\
```\n\
export CERT_ARN=arn:aws:acm:<AWS_REGION>:<Account ID>:certificate/<Cert ID>\n\
```";

/// A validated certificate ARN of the form
/// `arn:<partition>:acm:<region>:<account>:certificate/<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CertificateRef {
    partition: String,
    region: String,
    account: String,
    certificate_id: String,
}

impl CertificateRef {
    /// Resolves an optional raw reference, treating absence as a
    /// configuration error.
    pub fn resolve(raw: Option<&str>) -> Result<Self> {
        match raw.map(str::trim) {
            Some(raw) if !raw.is_empty() => raw.parse(),
            _ => Err(Error::configuration(
                format!("Environment variable {CERT_ARN_ENV} is not set!"),
                REMEDIATION,
            )),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn certificate_id(&self) -> &str {
        &self.certificate_id
    }
}

fn invalid(raw: &str, why: &str) -> Error {
    Error::configuration(
        format!("{CERT_ARN_ENV} `{raw}` is not a valid certificate reference: {why}"),
        REMEDIATION,
    )
}

impl FromStr for CertificateRef {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.splitn(6, ':').collect();
        let [scheme, partition, service, region, account, resource] = parts[..] else {
            return Err(invalid(raw, "expected six `:` separated fields"));
        };

        if scheme != "arn" {
            return Err(invalid(raw, "must start with `arn:`"));
        }
        if partition.is_empty() || region.is_empty() {
            return Err(invalid(raw, "partition and region must be set"));
        }
        if service != "acm" {
            return Err(invalid(raw, "service must be `acm`"));
        }
        if account.len() != 12 || !account.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid(raw, "account must be a 12 digit id"));
        }
        let certificate_id = match resource.strip_prefix("certificate/") {
            Some(id) if !id.is_empty() => id,
            _ => return Err(invalid(raw, "resource must be `certificate/<id>`")),
        };

        Ok(Self {
            partition: partition.to_string(),
            region: region.to_string(),
            account: account.to_string(),
            certificate_id: certificate_id.to_string(),
        })
    }
}

impl fmt::Display for CertificateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:acm:{}:{}:certificate/{}",
            self.partition, self.region, self.account, self.certificate_id
        )
    }
}

impl TryFrom<String> for CertificateRef {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CertificateRef> for String {
    fn from(value: CertificateRef) -> Self {
        value.to_string()
    }
}
