//! Mock payment links
//!
//! Links are minted locally from a configured base URL. Nothing is stored and
//! no chain is touched.

use serde::Serialize;
use uuid::Uuid;

use crate::amount::{TokenAmount, USDC_DECIMALS};
use crate::config::PaylinkConfig;
use crate::error::BridgeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paylink {
    pub id: String,
    pub amount: String,
    pub memo: String,
    pub currency: String,
    pub network: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct PaylinkIssuer {
    base_url: String,
}

impl PaylinkIssuer {
    pub fn new(config: &PaylinkConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Issue a link for `amount` USDC. The amount is echoed exactly as given.
    pub fn create(&self, amount: &str, memo: Option<&str>) -> Result<Paylink, BridgeError> {
        TokenAmount::parse(amount, USDC_DECIMALS)?;

        let id = Uuid::new_v4().simple().to_string();
        Ok(Paylink {
            url: format!("{}/{}", self.base_url, id),
            id,
            amount: amount.trim().to_string(),
            memo: memo.unwrap_or_default().to_string(),
            currency: "USDC".to_string(),
            network: "testnet".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> PaylinkIssuer {
        PaylinkIssuer::new(&PaylinkConfig {
            base_url: "https://paylink.test/".to_string(),
        })
    }

    #[test]
    fn test_create_paylink() {
        let link = issuer().create("12.5", Some("invoice 42")).unwrap();
        assert_eq!(link.amount, "12.5");
        assert_eq!(link.memo, "invoice 42");
        assert_eq!(link.currency, "USDC");
        assert_eq!(link.network, "testnet");
        assert_eq!(link.id.len(), 32);
        assert_eq!(link.url, format!("https://paylink.test/{}", link.id));
    }

    #[test]
    fn test_ids_are_unique() {
        let issuer = issuer();
        let a = issuer.create("1", None).unwrap();
        let b = issuer.create("1", None).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.memo, "");
    }

    #[test]
    fn test_rejects_invalid_amount() {
        assert!(issuer().create("-3", None).is_err());
        assert!(issuer().create("lots", None).is_err());
    }
}
