use crate::normalize::Strictness;
use serde::{Deserialize, Serialize};

const MISSING_NOTE: &str = "NOTE : If the image is blurry or some information is missing then leave that part as an empty string. Return only the JSON document.";

const SUPPLIER_SCHEMA: &str = r#"{
  "vendorDetails": {
    "vendorName": "",
    "gstAvailability": "",
    "gstAmount": "",
    "gstInternalAmount": "",
    "gst": "",
    "address": ""
  },
  "buyerDetails": {
    "buyerName": "",
    "buyerGst": ""
  },
  "invoiceDetails": {
    "invoiceNumber": "",
    "invoiceDate": "",
    "poNumber": "",
    "totalAmount": "",
    "tcsAmount": ""
  },
  "addressDetails": {
    "billingAddress": {
      "billToName": "",
      "billToAddress": ""
    },
    "shippingAddress": {
      "shipToName": "",
      "shipToAddress": ""
    }
  },
  "transportDetails": {
    "vehicleNumber": "",
    "loadingAddress": ""
  },
  "productDetails": {
    "productName": ""
  },
  "IRN_Number": ""
}"#;

const TRANSPORTER_SCHEMA: &str = r#"{
  "transporterBill": {
    "invoiceNumber": "",
    "lrNumber": "",
    "vehicleNumber": "",
    "date": "",
    "amount": ""
  }
}"#;

/// Kind of document the extraction prompt targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    Supplier,
    Transporter,
}

impl std::fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileKind::Supplier => f.write_str("supplier"),
            ProfileKind::Transporter => f.write_str("transporter"),
        }
    }
}

/// Field schema, scoring exclusions and string folding that belong together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionProfile {
    pub kind: ProfileKind,
    pub prompt: String,
    pub excluded_paths: Vec<String>,
    pub strictness: Strictness,
}

impl ExtractionProfile {
    pub fn builtin(kind: ProfileKind) -> Self {
        match kind {
            // Address text varies too much between models to score.
            ProfileKind::Supplier => Self {
                kind,
                prompt: build_prompt(SUPPLIER_SCHEMA),
                excluded_paths: vec![
                    "vendorDetails.address".to_string(),
                    "addressDetails".to_string(),
                    "transportDetails.loadingAddress".to_string(),
                ],
                strictness: Strictness::Strict,
            },
            ProfileKind::Transporter => Self {
                kind,
                prompt: build_prompt(TRANSPORTER_SCHEMA),
                excluded_paths: Vec::new(),
                strictness: Strictness::Basic,
            },
        }
    }

    /// Adds extra exclusions, skipping blanks and duplicates.
    pub fn with_exclusions<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in extra {
            let path = path.as_ref().trim().trim_matches('.');
            if !path.is_empty() && !self.excluded_paths.iter().any(|p| p == path) {
                self.excluded_paths.push(path.to_string());
            }
        }
        self
    }

    pub fn with_strictness(mut self, strictness: Option<Strictness>) -> Self {
        if let Some(s) = strictness {
            self.strictness = s;
        }
        self
    }

    /// True when `path` equals an excluded prefix or sits beneath one.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths.iter().any(|prefix| {
            path == prefix
                || (path.len() > prefix.len()
                    && path.starts_with(prefix.as_str())
                    && path.as_bytes()[prefix.len()] == b'.')
        })
    }
}

fn build_prompt(schema: &str) -> String {
    format!(
        "I want you to process the document with high accuracy to generate the following fields and return a json document with filled information\n{}\n\n{}",
        schema, MISSING_NOTE
    )
}
