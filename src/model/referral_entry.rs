use chrono::{DateTime, Duration, Utc};

use crate::{error::Error, types::RefListItem};

/// Referral rewards are 0.2% of the traded volume.
pub const REFERRAL_FEE_RATE: f64 = 0.002;

#[derive(Debug, Clone, PartialEq)]
pub struct ReferralEntry {
    pub ref_id: String,
    pub registered_at: DateTime<Utc>,
    pub spin_at: DateTime<Utc>,
    pub ref_balance_usd: f64,
    pub traders: usize,
    pub top_balance_share_usd: Option<f64>,
}

impl ReferralEntry {
    pub fn from_item(
        item: RefListItem,
        reward_delay: Duration,
    ) -> Result<ReferralEntry, Error> {
        let registered_at = item.registered_at.to_datetime()?;
        let spin_at = registered_at
            .checked_add_signed(reward_delay)
            .ok_or_else(|| Error::InvalidOption {
                option: format!("reward time for {}", item.ref_id),
            })?;
        let traders = item
            .earn_senders
            .as_ref()
            .map(|senders| senders.len())
            .unwrap_or(0);

        Ok(ReferralEntry {
            ref_id: item.ref_id,
            registered_at,
            spin_at,
            ref_balance_usd: item.ref_balance_usd.unwrap_or(0.0),
            traders,
            top_balance_share_usd: item.top_balance_share_usd,
        })
    }

    pub fn volume_usd(&self) -> f64 {
        self.ref_balance_usd / REFERRAL_FEE_RATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(json: &str) -> RefListItem {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_spin_at_is_seven_days_after_registration() {
        let entry = ReferralEntry::from_item(
            item(
                r#"{"refId":"alpha","registeredAt":"2024-03-30T22:15:00Z",
                    "refBalanceUsd":4.0,"earnSenders":{"a":1,"b":2}}"#,
            ),
            Duration::days(7),
        )
        .unwrap();

        let registered = Utc.with_ymd_and_hms(2024, 3, 30, 22, 15, 0).unwrap();
        assert_eq!(entry.registered_at, registered);
        assert_eq!(entry.spin_at - entry.registered_at, Duration::days(7));
        assert_eq!(entry.traders, 2);
        assert!((entry.volume_usd() - 2000.0).abs() < 1e-9);
        assert_eq!(entry.top_balance_share_usd, None);
    }

    #[test]
    fn test_epoch_millis_registration() {
        let entry = ReferralEntry::from_item(
            item(r#"{"refId":"beta","registeredAt":1700000000000}"#),
            Duration::days(7),
        )
        .unwrap();

        assert_eq!(entry.registered_at.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(
            entry.spin_at.timestamp_millis(),
            1_700_000_000_000 + 7 * 24 * 60 * 60 * 1000
        );
        assert_eq!(entry.traders, 0);
    }

    #[test]
    fn test_invalid_registration_is_an_error() {
        let result = ReferralEntry::from_item(
            item(r#"{"refId":"gamma","registeredAt":"yesterday"}"#),
            Duration::days(7),
        );
        assert!(matches!(result, Err(Error::InvalidOption { .. })));
    }

    #[test]
    fn test_null_balance_counts_as_zero() {
        let items: Vec<RefListItem> = serde_json::from_str(
            r#"[
                {"refId":"alpha","registeredAt":1700000000000,"refBalanceUsd":null},
                {"refId":"beta","registeredAt":1700000000000,"refBalanceUsd":1.5}
            ]"#,
        )
        .unwrap();
        let entries = items
            .into_iter()
            .map(|item| ReferralEntry::from_item(item, Duration::days(7)))
            .collect::<Result<Vec<_>, Error>>()
            .unwrap();

        assert_eq!(entries[0].ref_balance_usd, 0.0);
        assert_eq!(entries[0].volume_usd(), 0.0);
        assert_eq!(entries[1].ref_balance_usd, 1.5);
    }
}
