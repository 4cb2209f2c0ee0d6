//! Onboarding profile and its per-step sections.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::state::Step;

/// Which kind of applicant is onboarding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    /// High-net-worth person.
    Individual,
    /// Company, fund, family office, or trust.
    Entity,
}

impl std::fmt::Display for ClientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Individual => write!(f, "individual"),
            Self::Entity => write!(f, "entity"),
        }
    }
}

/// Prohibited-category screening (step 2).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EligibilitySection {
    pub completed: bool,
    pub none_of_above: bool,
    pub checked_items: BTreeSet<String>,
}

/// Personal details for an individual applicant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndividualBasics {
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub suffix: String,
    pub email: String,
    pub phone: String,
    pub phone_country_code: String,
    pub citizenship: String,
    /// Social security number, stored normalized as `XXX-XX-XXXX`.
    pub ssn: String,
    /// Date of birth, `YYYY-MM-DD`.
    pub dob: String,
}

impl Default for IndividualBasics {
    fn default() -> Self {
        Self {
            first_name: String::new(),
            middle_name: String::new(),
            last_name: String::new(),
            suffix: String::new(),
            email: String::new(),
            phone: String::new(),
            phone_country_code: "+1".to_string(),
            citizenship: String::new(),
            ssn: String::new(),
            dob: String::new(),
        }
    }
}

/// Business details for an entity applicant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EntityBasics {
    pub legal_business_name: String,
    pub has_dba: bool,
    pub dba_name: String,
    pub country_of_incorporation: String,
    pub state_of_incorporation: String,
    /// Employer identification number, stored normalized as `XX-XXXXXXX`.
    pub ein: String,
    pub ein_document_uploaded: bool,
    pub business_phone: String,
    pub phone_country_code: String,
    pub website: String,
    pub industry: String,
    pub activity_description: String,
}

impl Default for EntityBasics {
    fn default() -> Self {
        Self {
            legal_business_name: String::new(),
            has_dba: false,
            dba_name: String::new(),
            country_of_incorporation: String::new(),
            state_of_incorporation: String::new(),
            ein: String::new(),
            ein_document_uploaded: false,
            business_phone: String::new(),
            phone_country_code: "+1".to_string(),
            website: String::new(),
            industry: String::new(),
            activity_description: String::new(),
        }
    }
}

/// Step 3 data, shaped by the client type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Basics {
    Individual(IndividualBasics),
    Entity(EntityBasics),
}

impl Default for Basics {
    fn default() -> Self {
        Self::Individual(IndividualBasics::default())
    }
}

impl Basics {
    /// Empty basics of the variant matching `client_type`.
    pub fn for_client_type(client_type: ClientType) -> Self {
        match client_type {
            ClientType::Individual => Self::Individual(IndividualBasics::default()),
            ClientType::Entity => Self::Entity(EntityBasics::default()),
        }
    }

    pub fn client_type(&self) -> ClientType {
        match self {
            Self::Individual(_) => ClientType::Individual,
            Self::Entity(_) => ClientType::Entity,
        }
    }

    pub fn as_individual(&self) -> Option<&IndividualBasics> {
        match self {
            Self::Individual(b) => Some(b),
            Self::Entity(_) => None,
        }
    }
}

/// A postal address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AddressRecord {
    pub country: String,
    pub street1: String,
    pub street2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

impl Default for AddressRecord {
    fn default() -> Self {
        Self {
            country: "US".to_string(),
            street1: String::new(),
            street2: String::new(),
            city: String::new(),
            state: String::new(),
            postal_code: String::new(),
        }
    }
}

impl AddressRecord {
    pub fn is_us(&self) -> bool {
        self.country.eq_ignore_ascii_case("US")
    }
}

/// Step 4 data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AddressSection {
    pub primary: AddressRecord,
    pub has_separate_physical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical: Option<AddressRecord>,
}

/// Id of the owner record present in a fresh profile.
pub const PRIMARY_OWNER_ID: Uuid = Uuid::from_u128(1);

/// A beneficial owner or control person.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerRecord {
    pub id: Uuid,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, deserialize_with = "lenient_percentage")]
    pub ownership_percentage: Decimal,
    #[serde(default)]
    pub is_control_person: bool,
    #[serde(default)]
    pub id_uploaded: bool,
    #[serde(default)]
    pub verified: bool,
}

impl OwnerRecord {
    /// A blank record with the given id.
    pub fn blank(id: Uuid) -> Self {
        Self {
            id,
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            ownership_percentage: Decimal::ZERO,
            is_control_person: false,
            id_uploaded: false,
            verified: false,
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Percentages saved as null, empty or non-numeric text count as zero.
fn lenient_percentage<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s,
        _ => return Ok(Decimal::ZERO),
    };
    let raw = raw.trim();
    Ok(raw
        .parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(raw))
        .unwrap_or(Decimal::ZERO))
}

/// Step 5 data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UboSection {
    pub owners: Vec<OwnerRecord>,
    pub certified: bool,
}

impl Default for UboSection {
    fn default() -> Self {
        Self {
            owners: vec![OwnerRecord::blank(PRIMARY_OWNER_ID)],
            certified: false,
        }
    }
}

/// Expected size of a single trade.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeSize {
    #[serde(rename = "under_100k")]
    Under100k,
    #[serde(rename = "100k_to_500k")]
    From100kTo500k,
    #[serde(rename = "500k_to_1m")]
    From500kTo1m,
    #[serde(rename = "1m_to_5m")]
    From1mTo5m,
    #[serde(rename = "over_5m")]
    Over5m,
}

impl std::fmt::Display for TradeSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Under100k => "Under $100K",
            Self::From100kTo500k => "$100K - $500K",
            Self::From500kTo1m => "$500K - $1M",
            Self::From1mTo5m => "$1M - $5M",
            Self::Over5m => "Over $5M",
        };
        write!(f, "{s}")
    }
}

/// Expected monthly trading volume.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MonthlyVolume {
    #[serde(rename = "under_1m")]
    Under1m,
    #[serde(rename = "1m_to_10m")]
    From1mTo10m,
    #[serde(rename = "10m_to_50m")]
    From10mTo50m,
    #[serde(rename = "over_50m")]
    Over50m,
}

impl MonthlyVolume {
    /// Volumes of $10M and up.
    pub fn is_high_volume(&self) -> bool {
        matches!(self, Self::From10mTo50m | Self::Over50m)
    }
}

impl std::fmt::Display for MonthlyVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Under1m => "Under $1M",
            Self::From1mTo10m => "$1M - $10M",
            Self::From10mTo50m => "$10M - $50M",
            Self::Over50m => "Over $50M",
        };
        write!(f, "{s}")
    }
}

/// Step 6 data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ActivitySection {
    pub usage_description: String,
    pub sources_of_funds: BTreeSet<String>,
    pub expected_trade_size: Option<TradeSize>,
    pub monthly_volume: Option<MonthlyVolume>,
    pub operating_countries: BTreeSet<String>,
    pub high_risk_acknowledged: bool,
}

impl Default for ActivitySection {
    fn default() -> Self {
        Self {
            usage_description: String::new(),
            sources_of_funds: BTreeSet::new(),
            expected_trade_size: None,
            monthly_volume: None,
            operating_countries: BTreeSet::from(["US".to_string()]),
            high_risk_acknowledged: false,
        }
    }
}

impl ActivitySection {
    /// Selected countries that appear on the high-risk list.
    pub fn high_risk_countries(&self) -> Vec<String> {
        self.operating_countries
            .iter()
            .filter(|c| is_high_risk_country(c))
            .cloned()
            .collect()
    }
}

/// Risk level reported by wallet screening.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    VolumeMismatch,
    JurisdictionRisk,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlagSeverity {
    Info,
    Warning,
}

/// A screening observation derived from the declared activity profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextualFlag {
    pub kind: FlagKind,
    pub message: String,
    pub severity: FlagSeverity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanDetails {
    pub transaction_count: u32,
    pub first_seen: DateTime<Utc>,
    pub total_volume_usd: Decimal,
    pub risk_factors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contextual_flag: Option<ContextualFlag>,
}

/// Outcome of a wallet risk scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanResult {
    pub risk: RiskLevel,
    /// 0..=100, higher is riskier.
    pub score: u8,
    pub reason: String,
    pub wallet_address: String,
    pub timestamp: DateTime<Utc>,
    pub details: ScanDetails,
}

/// Step 7 data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WalletSection {
    pub address: String,
    pub scan_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_result: Option<ScanResult>,
}

/// The canonical onboarding record for one session.
///
/// Stored in the `settings` table as JSON under key `"onboarding_profile"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OnboardingProfile {
    pub current_step: Step,
    pub client_type: Option<ClientType>,
    pub safe_disclaimer: bool,
    pub eligibility: EligibilitySection,
    pub basics: Basics,
    pub address: AddressSection,
    pub ubo: UboSection,
    pub activity: ActivitySection,
    pub wallet: WalletSection,
    pub submitted: bool,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Reference returned by the handoff, kept so it survives reloads.
    pub application_id: Option<String>,
}

impl Default for OnboardingProfile {
    fn default() -> Self {
        Self {
            current_step: Step::ClientType,
            client_type: None,
            safe_disclaimer: false,
            eligibility: EligibilitySection::default(),
            basics: Basics::default(),
            address: AddressSection::default(),
            ubo: UboSection::default(),
            activity: ActivitySection::default(),
            wallet: WalletSection::default(),
            submitted: false,
            submitted_at: None,
            application_id: None,
        }
    }
}

impl OnboardingProfile {
    pub fn is_individual(&self) -> bool {
        self.client_type == Some(ClientType::Individual)
    }
}

/// Jurisdictions that require enhanced due diligence.
pub const HIGH_RISK_COUNTRIES: &[&str] = &["CU", "IR", "KP", "SY", "RU"];

pub fn is_high_risk_country(code: &str) -> bool {
    HIGH_RISK_COUNTRIES
        .iter()
        .any(|c| c.eq_ignore_ascii_case(code.trim()))
}

/// A prohibited applicant category from the eligibility screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestrictedCategory {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
}

pub const RESTRICTED_CATEGORIES: &[RestrictedCategory] = &[
    RestrictedCategory {
        id: "shell_bank",
        label: "Shell bank",
        description: "A bank with no physical presence in any jurisdiction",
    },
    RestrictedCategory {
        id: "sanctioned_person",
        label: "Sanctioned person or entity",
        description: "Listed on OFAC, UN, EU, or UK sanctions lists",
    },
    RestrictedCategory {
        id: "unlicensed_msb",
        label: "Unlicensed money services business",
        description: "Transmitting funds for third parties without the required licenses",
    },
    RestrictedCategory {
        id: "darknet_or_mixer",
        label: "Darknet market or mixing service",
        description: "Operating or facilitating darknet markets, mixers, or tumblers",
    },
    RestrictedCategory {
        id: "unlicensed_gambling",
        label: "Unlicensed gambling",
        description: "Online gaming or betting without a valid license",
    },
    RestrictedCategory {
        id: "politically_exposed_unscreened",
        label: "Unscreened politically exposed person",
        description: "A senior political figure who has not completed enhanced screening",
    },
];

/// Settings keys used for onboarding persistence.
pub mod settings_keys {
    /// Key for the OnboardingProfile JSON blob in the settings table.
    pub const ONBOARDING_PROFILE: &str = "onboarding_profile";
    /// Default user ID (single-user console).
    pub const DEFAULT_USER: &str = "default";
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn default_profile_has_expected_values() {
        let p = OnboardingProfile::default();
        assert_eq!(p.current_step, Step::ClientType);
        assert!(p.client_type.is_none());
        assert!(!p.safe_disclaimer);
        assert!(!p.eligibility.completed);
        assert_eq!(p.address.primary.country, "US");
        assert!(p.address.physical.is_none());
        assert_eq!(p.ubo.owners.len(), 1);
        assert_eq!(p.ubo.owners[0].id, PRIMARY_OWNER_ID);
        assert_eq!(p.ubo.owners[0].ownership_percentage, Decimal::ZERO);
        assert!(p.activity.operating_countries.contains("US"));
        assert!(p.wallet.scan_result.is_none());
        assert!(!p.submitted);
        assert!(p.submitted_at.is_none());
    }

    #[test]
    fn two_defaults_are_equal() {
        assert_eq!(OnboardingProfile::default(), OnboardingProfile::default());
    }

    #[test]
    fn basics_are_tagged_by_kind() {
        let basics = Basics::Entity(EntityBasics {
            legal_business_name: "Acme Holdings LLC".to_string(),
            ..Default::default()
        });
        let json = serde_json::to_value(&basics).unwrap();
        assert_eq!(json["kind"], "entity");
        assert_eq!(json["legal_business_name"], "Acme Holdings LLC");

        let parsed: Basics = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.client_type(), ClientType::Entity);
    }

    #[test]
    fn basics_fill_missing_fields_with_defaults() {
        let parsed: Basics =
            serde_json::from_str(r#"{"kind":"individual","first_name":"Ada"}"#).unwrap();
        let individual = parsed.as_individual().unwrap();
        assert_eq!(individual.first_name, "Ada");
        assert_eq!(individual.phone_country_code, "+1");
    }

    #[test]
    fn profile_serde_roundtrip() {
        let mut profile = OnboardingProfile::default();
        profile.current_step = Step::Activity;
        profile.client_type = Some(ClientType::Individual);
        profile.activity.monthly_volume = Some(MonthlyVolume::From10mTo50m);
        profile.activity.expected_trade_size = Some(TradeSize::From1mTo5m);

        let json = serde_json::to_string(&profile).unwrap();
        let parsed: OnboardingProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, profile);
    }

    #[test]
    fn current_step_serializes_as_integer() {
        let json = serde_json::to_value(OnboardingProfile::default()).unwrap();
        assert_eq!(json["current_step"], 1);
    }

    #[test]
    fn enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&TradeSize::From100kTo500k).unwrap(),
            "\"100k_to_500k\""
        );
        assert_eq!(
            serde_json::to_string(&MonthlyVolume::Over50m).unwrap(),
            "\"over_50m\""
        );
        let ct: ClientType = serde_json::from_str("\"entity\"").unwrap();
        assert_eq!(ct, ClientType::Entity);
    }

    #[test]
    fn high_risk_lookup_ignores_case() {
        assert!(is_high_risk_country("KP"));
        assert!(is_high_risk_country("ir"));
        assert!(!is_high_risk_country("US"));
    }

    #[test]
    fn activity_reports_high_risk_selection() {
        let mut activity = ActivitySection::default();
        activity.operating_countries.insert("SY".to_string());
        activity.operating_countries.insert("DE".to_string());
        assert_eq!(activity.high_risk_countries(), vec!["SY".to_string()]);
    }

    #[test]
    fn high_volume_threshold() {
        assert!(!MonthlyVolume::From1mTo10m.is_high_volume());
        assert!(MonthlyVolume::From10mTo50m.is_high_volume());
        assert!(MonthlyVolume::Over50m.is_high_volume());
    }

    #[test]
    fn unreadable_percentage_counts_as_zero() {
        let id = PRIMARY_OWNER_ID.to_string();
        for raw in [json!(null), json!(""), json!("abc"), json!({"x": 1})] {
            let owner: OwnerRecord =
                serde_json::from_value(json!({"id": id, "ownership_percentage": raw})).unwrap();
            assert_eq!(owner.ownership_percentage, Decimal::ZERO, "{raw}");
        }

        let owner: OwnerRecord =
            serde_json::from_value(json!({"id": id, "ownership_percentage": "60.5"})).unwrap();
        assert_eq!(owner.ownership_percentage, Decimal::new(605, 1));
        let owner: OwnerRecord =
            serde_json::from_value(json!({"id": id, "ownership_percentage": 40})).unwrap();
        assert_eq!(owner.ownership_percentage, Decimal::from(40));
    }
}
