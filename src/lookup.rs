//! Point reads against the store for manual verification of an upload.

use crate::store::DocumentStore;
use crate::upload::{is_valid_key, PRODUCTS_PATH};
use crate::IngestError;
use serde::Deserialize;
use std::fmt;

/// Codes checked when none are given on the command line.
pub const SAMPLE_CODES: &[&str] = &[
    "101209159",
    "105000011",
    "3017620422003",
    "92000111107153600155",
    "830028000931",
    "0810014672342",
    "0049000002485",
    "0009800820023",
];

/// A stored product as read back; fields may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StoredProduct {
    pub code: Option<String>,
    pub name: Option<String>,
    pub ingredients: Option<String>,
}

#[derive(Debug)]
pub enum LookupOutcome {
    Found { code: String, product: StoredProduct },
    NotFound { code: String },
    Failed { code: String, error: IngestError },
}

impl LookupOutcome {
    pub fn code(&self) -> &str {
        match self {
            LookupOutcome::Found { code, .. }
            | LookupOutcome::NotFound { code }
            | LookupOutcome::Failed { code, .. } => code,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, LookupOutcome::Found { .. })
    }
}

impl fmt::Display for LookupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Looking up barcode: {}", self.code())?;
        match self {
            LookupOutcome::Found { product, .. } => {
                let or_na = |v: &Option<String>| v.clone().unwrap_or_else(|| "N/A".to_string());
                writeln!(f, "Product found!")?;
                writeln!(f, "Name: {}", or_na(&product.name))?;
                writeln!(f, "Ingredients: {}", or_na(&product.ingredients))?;
                write!(f, "Code: {}", or_na(&product.code))
            }
            LookupOutcome::NotFound { code } => write!(f, "No product found with barcode {code}"),
            LookupOutcome::Failed { code, error } => write!(f, "Lookup of {code} failed: {error}"),
        }
    }
}

/// One read at `products/<code>`; never retried.
pub async fn lookup_product<S>(store: &S, code: &str) -> LookupOutcome
where
    S: DocumentStore + ?Sized,
{
    let code = code.to_string();
    if !is_valid_key(&code) {
        return LookupOutcome::NotFound { code };
    }
    match store.get(&format!("{PRODUCTS_PATH}/{code}")).await {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(product) => LookupOutcome::Found { code, product },
            Err(e) => LookupOutcome::Failed {
                code,
                error: e.into(),
            },
        },
        Ok(None) => LookupOutcome::NotFound { code },
        Err(error) => LookupOutcome::Failed { code, error },
    }
}

/// Look up each code in order; one failure does not stop the rest.
pub async fn lookup_products<S, C>(store: &S, codes: &[C]) -> Vec<LookupOutcome>
where
    S: DocumentStore + ?Sized,
    C: AsRef<str>,
{
    let mut outcomes = Vec::with_capacity(codes.len());
    for code in codes {
        outcomes.push(lookup_product(store, code.as_ref()).await);
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn found_and_not_found() {
        let store = MemoryStore::new();
        store
            .update(
                "products",
                &json!({ "3017620422003": { "code": "3017620422003", "name": "Nutella" } }),
            )
            .await
            .unwrap();

        let outcomes = lookup_products(&store, &["3017620422003", "000", ""]).await;
        assert!(outcomes[0].is_found());
        assert!(matches!(outcomes[1], LookupOutcome::NotFound { .. }));
        assert!(matches!(outcomes[2], LookupOutcome::NotFound { .. }));

        let shown = outcomes[0].to_string();
        assert!(shown.contains("Name: Nutella"));
        assert!(shown.contains("Ingredients: N/A"));
        assert_eq!(
            outcomes[1].to_string(),
            "Looking up barcode: 000\nNo product found with barcode 000"
        );
    }
}
