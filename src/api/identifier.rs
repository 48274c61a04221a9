use serde::{Deserialize, Serialize};

/// An identifier a certificate is requested for.
///
/// Only `dns` identifiers are issued by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub _type: String,
    pub value: String,
}

impl Identifier {
    pub(crate) fn dns(value: &str) -> Self {
        Self {
            _type: "dns".to_owned(),
            value: value.to_owned(),
        }
    }
}
