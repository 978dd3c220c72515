//! Change-detection hashing over syncable fields.
//!
//! The digest covers exactly the fields forwarded to the target system,
//! normalized so that formatting noise (whitespace, trailing decimal zeros,
//! field ordering in upstream payloads) never triggers a spurious update.

use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use super::model::{SourceCustomer, SourceInvoice, SourceProduct};

/// Joins normalized fields before hashing. The unit separator cannot occur
/// in any normalized field, so distinct field vectors never collide.
const FIELD_SEPARATOR: char = '\u{1f}';

/// Entities that carry a change-detection digest.
pub trait ContentHash {
    /// Normalized syncable fields, in a fixed order.
    fn syncable_fields(&self) -> Vec<String>;

    /// `sha256:<hex>` digest over [`ContentHash::syncable_fields`].
    fn content_hash(&self) -> String {
        let joined = self
            .syncable_fields()
            .join(&FIELD_SEPARATOR.to_string());
        sha256_hex(joined.as_bytes())
    }
}

/// Render a SHA-256 digest as `sha256:<lowercase hex>`.
pub fn sha256_hex(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    let mut out = String::with_capacity(7 + digest.len() * 2);
    out.push_str("sha256:");
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

fn norm_str(value: &str) -> String {
    value.trim().to_string()
}

fn norm_opt(value: Option<&str>) -> String {
    value.map(norm_str).unwrap_or_default()
}

fn norm_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

fn norm_opt_decimal(value: Option<Decimal>) -> String {
    value.map(norm_decimal).unwrap_or_default()
}

impl ContentHash for SourceCustomer {
    fn syncable_fields(&self) -> Vec<String> {
        vec![
            norm_str(&self.name),
            norm_opt(self.email.as_deref()),
            norm_opt(self.phone.as_deref()),
            norm_opt(self.organization_number.as_deref()),
            norm_opt(self.postal_address.as_deref()),
            norm_opt(self.postal_code.as_deref()),
            norm_opt(self.city.as_deref()),
        ]
    }
}

impl ContentHash for SourceProduct {
    fn syncable_fields(&self) -> Vec<String> {
        vec![
            norm_str(&self.name),
            norm_opt(self.product_number.as_deref()),
            norm_decimal(self.unit_price),
            norm_str(&self.currency),
            norm_opt_decimal(self.vat_percent),
        ]
    }
}

impl ContentHash for SourceInvoice {
    fn syncable_fields(&self) -> Vec<String> {
        let mut fields = vec![
            norm_str(&self.invoice_number),
            norm_str(&self.customer_id),
            self.issued_date.to_string(),
            self.due_date.to_string(),
            norm_str(&self.currency),
            norm_decimal(self.total_amount),
        ];
        for line in &self.lines {
            fields.push(norm_str(&line.product_id));
            fields.push(norm_opt(line.description.as_deref()));
            fields.push(norm_decimal(line.quantity));
            fields.push(norm_decimal(line.unit_price));
        }
        fields
    }
}
