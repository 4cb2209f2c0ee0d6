//! Mock wallet screening.
//!
//! Risk level is derived from the address itself so the same wallet always
//! lands in the same band. Score, reason and history details are random
//! within that band.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use rust_decimal::Decimal;

use crate::error::ServiceError;
use crate::onboarding::model::{
    ContextualFlag, FlagKind, FlagSeverity, RiskLevel, ScanDetails, ScanResult,
    is_high_risk_country,
};

use super::{ScanContext, WalletScreener, simulate_latency};

/// Shortest address the screener accepts.
pub const MIN_ADDRESS_LEN: usize = 26;

const LOW_RISK_REASONS: &[&str] = &[
    "Clean transaction history",
    "No flagged interactions detected",
    "Wallet activity consistent with declared usage",
    "All sources verified and legitimate",
    "Standard trading patterns observed",
];

const MEDIUM_RISK_REASONS: &[&str] = &[
    "Minor exposure to unhosted wallets",
    "Some transactions with unlicensed exchanges",
    "Occasional privacy tool usage detected",
    "Cross-chain transfers requiring review",
    "Indirect exposure to flagged entities (<1%)",
];

const HIGH_RISK_REASONS: &[&str] = &[
    "Direct interaction with sanctioned addresses",
    "High exposure to darknet markets",
    "Tainted USDT from known mixer services",
    "Significant ransomware-linked funds detected",
    "Multiple transactions with OFAC-listed entities",
    "Funds traced to known scam operations",
    "High-volume transfers from restricted jurisdictions",
];

/// Local stand-in for a KYT screening API.
pub struct MockScreener {
    simulate_latency: bool,
}

impl MockScreener {
    pub fn new(simulate_latency: bool) -> Self {
        Self { simulate_latency }
    }
}

#[async_trait]
impl WalletScreener for MockScreener {
    async fn scan(&self, address: &str, context: &ScanContext) -> Result<ScanResult, ServiceError> {
        simulate_latency(self.simulate_latency, 1_500, 3_000).await;

        let address = address.trim();
        if address.chars().count() < MIN_ADDRESS_LEN {
            tracing::debug!(address, "Rejected malformed wallet address");
            return Err(ServiceError::InvalidWalletAddress);
        }

        let result = build_result(address, context);
        tracing::info!(
            address,
            risk = %result.risk,
            score = result.score,
            "Wallet screened"
        );
        Ok(result)
    }
}

/// Risk band for an address: sum of its character codes mod 100, split
/// 70 / 20 / 10 into low / medium / high.
pub fn risk_for_address(address: &str) -> RiskLevel {
    let sum: u64 = address.chars().map(|c| u64::from(u32::from(c))).sum();
    match sum % 100 {
        0..70 => RiskLevel::Low,
        70..90 => RiskLevel::Medium,
        _ => RiskLevel::High,
    }
}

/// Contextual flag from the declared activity. Jurisdiction risk takes
/// precedence over the volume mismatch.
pub fn contextual_flag(context: &ScanContext, risk: RiskLevel, score: u8) -> Option<ContextualFlag> {
    if context
        .operating_countries
        .iter()
        .any(|c| is_high_risk_country(c))
    {
        return Some(ContextualFlag {
            kind: FlagKind::JurisdictionRisk,
            message: "Operating in restricted or high-risk jurisdiction".to_string(),
            severity: FlagSeverity::Warning,
        });
    }

    let high_volume = context.monthly_volume.is_some_and(|v| v.is_high_volume());
    if high_volume && risk == RiskLevel::Low && score < 20 {
        return Some(ContextualFlag {
            kind: FlagKind::VolumeMismatch,
            message: "High declared volume with limited on-chain history".to_string(),
            severity: FlagSeverity::Info,
        });
    }
    None
}

fn build_result(address: &str, context: &ScanContext) -> ScanResult {
    let mut rng = rand::thread_rng();
    let risk = risk_for_address(address);

    let (reasons, score) = match risk {
        RiskLevel::Low => (LOW_RISK_REASONS, rng.gen_range(0..30)),
        RiskLevel::Medium => (MEDIUM_RISK_REASONS, rng.gen_range(30..70)),
        RiskLevel::High => (HIGH_RISK_REASONS, rng.gen_range(70..100)),
    };
    let reason = reasons
        .choose(&mut rng)
        .copied()
        .unwrap_or("Screening complete")
        .to_string();

    let now = Utc::now();
    let first_seen = now - Duration::seconds(rng.gen_range(0..365 * 24 * 60 * 60));
    let total_volume_usd = Decimal::new(rng.gen_range(0..1_000_000_000), 2);
    let risk_factors = if risk == RiskLevel::Low {
        Vec::new()
    } else {
        vec![reason.clone()]
    };

    ScanResult {
        risk,
        score,
        reason,
        wallet_address: address.to_string(),
        timestamp: now,
        details: ScanDetails {
            transaction_count: rng.gen_range(50..1_050),
            first_seen,
            total_volume_usd,
            risk_factors,
            contextual_flag: contextual_flag(context, risk, score),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::onboarding::model::MonthlyVolume;

    const ADDRESS: &str = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";

    fn screener() -> MockScreener {
        MockScreener::new(false)
    }

    #[tokio::test]
    async fn rejects_short_addresses() {
        let err = screener()
            .scan("0x1234", &ScanContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidWalletAddress));
    }

    #[tokio::test]
    async fn same_address_same_risk() {
        let a = screener().scan(ADDRESS, &ScanContext::default()).await.unwrap();
        let b = screener().scan(ADDRESS, &ScanContext::default()).await.unwrap();
        assert_eq!(a.risk, b.risk);
        assert_eq!(a.risk, risk_for_address(ADDRESS));
        assert_eq!(a.wallet_address, ADDRESS);
    }

    #[tokio::test]
    async fn score_stays_in_band() {
        for _ in 0..20 {
            let result = screener().scan(ADDRESS, &ScanContext::default()).await.unwrap();
            let band = match result.risk {
                RiskLevel::Low => 0..30,
                RiskLevel::Medium => 30..70,
                RiskLevel::High => 70..100,
            };
            assert!(band.contains(&result.score));
            assert_eq!(result.details.risk_factors.is_empty(), result.risk == RiskLevel::Low);
        }
    }

    #[test]
    fn risk_bands_follow_char_sum() {
        // 26 x '0' (48) = 1248 -> 48 -> low
        assert_eq!(risk_for_address(&"0".repeat(26)), RiskLevel::Low);
        // 25 x '0' + 'Z' (90) = 1290 -> 90 -> high
        let high = format!("{}Z", "0".repeat(25));
        assert_eq!(risk_for_address(&high), RiskLevel::High);
        // 25 x '0' + 'F' (70) = 1270 -> 70 -> medium
        let medium = format!("{}F", "0".repeat(25));
        assert_eq!(risk_for_address(&medium), RiskLevel::Medium);
    }

    #[test]
    fn jurisdiction_flag_beats_volume_flag() {
        let context = ScanContext {
            monthly_volume: Some(MonthlyVolume::Over50m),
            operating_countries: BTreeSet::from(["US".to_string(), "IR".to_string()]),
        };
        let flag = contextual_flag(&context, RiskLevel::Low, 5).unwrap();
        assert_eq!(flag.kind, FlagKind::JurisdictionRisk);
        assert_eq!(flag.severity, FlagSeverity::Warning);
    }

    #[test]
    fn volume_mismatch_needs_pristine_wallet() {
        let context = ScanContext {
            monthly_volume: Some(MonthlyVolume::From10mTo50m),
            operating_countries: BTreeSet::from(["US".to_string()]),
        };
        let flag = contextual_flag(&context, RiskLevel::Low, 10).unwrap();
        assert_eq!(flag.kind, FlagKind::VolumeMismatch);
        assert_eq!(flag.severity, FlagSeverity::Info);

        assert!(contextual_flag(&context, RiskLevel::Low, 25).is_none());
        assert!(contextual_flag(&context, RiskLevel::Medium, 10).is_none());

        let low_volume = ScanContext {
            monthly_volume: Some(MonthlyVolume::From1mTo10m),
            ..context
        };
        assert!(contextual_flag(&low_volume, RiskLevel::Low, 10).is_none());
    }
}
