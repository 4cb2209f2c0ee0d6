//! Per-step validation rules.
//!
//! Each validator looks only at the candidate input for its step and returns
//! a map of field errors. An empty map means the step may complete.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::model::{
    ActivitySection, AddressRecord, AddressSection, Basics, ClientType, EntityBasics,
    IndividualBasics, RESTRICTED_CATEGORIES, ScanResult, UboSection,
};
use super::owners::{FULL_OWNERSHIP, total_ownership};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{10,15}$").expect("valid regex"));
static SSN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{3}-?\d{2}-?\d{4}$").expect("valid regex"));
static EIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}-?\d{7}$").expect("valid regex"));
static ZIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{5}(-\d{4})?$").expect("valid regex"));

pub const MIN_AGE_YEARS: u32 = 18;
pub const MIN_ACTIVITY_DESCRIPTION: usize = 20;
pub const MIN_USAGE_DESCRIPTION: usize = 50;
pub const WALLET_ADDRESS_LEN: std::ops::RangeInclusive<usize> = 26..=62;

/// Field-level validation errors keyed by field path (`email`,
/// `physical.city`, `owners[1].email`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error. The first message for a field wins.
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }

    fn require(&mut self, field: &str, value: &str, message: &str) -> bool {
        if value.trim().is_empty() {
            self.insert(field, message);
            false
        } else {
            true
        }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

// ── Step inputs ─────────────────────────────────────────────────────

/// Candidate input for step 1.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientTypeInput {
    pub client_type: Option<ClientType>,
    pub safe_disclaimer: bool,
}

/// Candidate input for step 2.
///
/// "None of the above" and the category checkboxes are mutually exclusive;
/// the toggle helpers keep them that way.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EligibilityInput {
    pub none_of_above: bool,
    pub checked_items: BTreeSet<String>,
}

impl EligibilityInput {
    pub fn toggle_item(&mut self, id: &str) {
        if !self.checked_items.remove(id) {
            self.checked_items.insert(id.to_string());
            self.none_of_above = false;
        }
    }

    pub fn set_none_of_above(&mut self, value: bool) {
        self.none_of_above = value;
        if value {
            self.checked_items.clear();
        }
    }
}

/// Candidate input for step 7.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WalletInput {
    pub address: String,
}

// ── Validators ──────────────────────────────────────────────────────

pub fn validate_client_type(input: &ClientTypeInput) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    if input.client_type.is_none() {
        errors.insert("client_type", "Please select a client type");
    }
    if !input.safe_disclaimer {
        errors.insert("safe_disclaimer", "You must acknowledge the disclaimer");
    }
    errors.into_result()
}

/// Outcome of the eligibility screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EligibilityDecision {
    Eligible,
    /// A prohibited category was checked. No input on this step leads
    /// forward until it is unchecked.
    Ineligible(Vec<String>),
    Incomplete(FieldErrors),
}

pub fn validate_eligibility(input: &EligibilityInput) -> EligibilityDecision {
    let unknown: Vec<&String> = input
        .checked_items
        .iter()
        .filter(|id| !RESTRICTED_CATEGORIES.iter().any(|c| c.id == id.as_str()))
        .collect();
    if !unknown.is_empty() {
        let mut errors = FieldErrors::new();
        errors.insert(
            "checked_items",
            format!(
                "Unknown categories: {}",
                unknown.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            ),
        );
        return EligibilityDecision::Incomplete(errors);
    }

    if !input.checked_items.is_empty() {
        return EligibilityDecision::Ineligible(input.checked_items.iter().cloned().collect());
    }

    if input.none_of_above {
        EligibilityDecision::Eligible
    } else {
        let mut errors = FieldErrors::new();
        errors.insert(
            "none_of_above",
            "Please confirm that none of the categories apply",
        );
        EligibilityDecision::Incomplete(errors)
    }
}

/// Validate step 3. `today` anchors the minimum-age check.
pub fn validate_basics(basics: &Basics, today: NaiveDate) -> Result<(), FieldErrors> {
    match basics {
        Basics::Individual(b) => validate_individual(b, today),
        Basics::Entity(b) => validate_entity(b),
    }
}

fn validate_individual(b: &IndividualBasics, today: NaiveDate) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    errors.require("first_name", &b.first_name, "First name is required");
    errors.require("last_name", &b.last_name, "Last name is required");
    check_email(&mut errors, "email", &b.email);
    check_phone(&mut errors, "phone", &b.phone, "Phone number is required");
    errors.require("citizenship", &b.citizenship, "Citizenship is required");

    if errors.require("ssn", &b.ssn, "SSN is required") && !SSN_RE.is_match(b.ssn.trim()) {
        errors.insert("ssn", "Invalid SSN format (XXX-XX-XXXX)");
    }

    if errors.require("dob", &b.dob, "Date of birth is required") {
        match NaiveDate::parse_from_str(b.dob.trim(), "%Y-%m-%d") {
            Ok(dob) => {
                let age = today.years_since(dob).unwrap_or(0);
                if age < MIN_AGE_YEARS {
                    errors.insert("dob", "Must be at least 18 years old");
                }
            }
            Err(_) => errors.insert("dob", "Invalid date of birth (YYYY-MM-DD)"),
        }
    }

    errors.into_result()
}

fn validate_entity(b: &EntityBasics) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    errors.require(
        "legal_business_name",
        &b.legal_business_name,
        "Legal business name is required",
    );
    if b.has_dba {
        errors.require("dba_name", &b.dba_name, "DBA name is required");
    }
    let has_country = errors.require(
        "country_of_incorporation",
        &b.country_of_incorporation,
        "Country of incorporation is required",
    );
    if has_country && b.country_of_incorporation.trim().eq_ignore_ascii_case("US") {
        errors.require(
            "state_of_incorporation",
            &b.state_of_incorporation,
            "State of incorporation is required",
        );
    }
    if errors.require("ein", &b.ein, "EIN is required") && !EIN_RE.is_match(b.ein.trim()) {
        errors.insert("ein", "Invalid EIN format (XX-XXXXXXX)");
    }
    check_phone(
        &mut errors,
        "business_phone",
        &b.business_phone,
        "Business phone is required",
    );
    errors.require("industry", &b.industry, "Industry is required");
    if errors.require(
        "activity_description",
        &b.activity_description,
        "Business activity description is required",
    ) && b.activity_description.trim().chars().count() < MIN_ACTIVITY_DESCRIPTION
    {
        errors.insert(
            "activity_description",
            "Please provide more detail (at least 20 characters)",
        );
    }
    errors.into_result()
}

pub fn validate_address(address: &AddressSection) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    check_address(&mut errors, "", &address.primary, true);

    if address.has_separate_physical {
        match address.physical {
            Some(ref physical) => check_address(&mut errors, "physical.", physical, false),
            None => errors.insert("physical", "Physical address is required"),
        }
    }
    errors.into_result()
}

fn check_address(errors: &mut FieldErrors, prefix: &str, addr: &AddressRecord, need_country: bool) {
    let key = |field: &str| format!("{prefix}{field}");

    if need_country {
        errors.require(&key("country"), &addr.country, "Country is required");
    }
    errors.require(&key("street1"), &addr.street1, "Street address is required");
    errors.require(&key("city"), &addr.city, "City is required");
    if addr.is_us() {
        errors.require(&key("state"), &addr.state, "State is required");
    }
    if errors.require(&key("postal_code"), &addr.postal_code, "ZIP/Postal code is required")
        && addr.is_us()
        && !ZIP_RE.is_match(addr.postal_code.trim())
    {
        errors.insert(key("postal_code"), "Invalid ZIP code");
    }
}

/// Validate step 5. Individuals must carry exactly one owner holding 100%.
pub fn validate_ownership(ubo: &UboSection, client_type: ClientType) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    if ubo.owners.is_empty() {
        errors.insert("owners", "At least one beneficial owner is required");
    }

    for (i, owner) in ubo.owners.iter().enumerate() {
        let key = |field: &str| format!("owners[{i}].{field}");
        errors.require(&key("first_name"), &owner.first_name, "First name is required");
        errors.require(&key("last_name"), &owner.last_name, "Last name is required");
        check_email(&mut errors, &key("email"), &owner.email);
        if owner.ownership_percentage < Decimal::ZERO {
            errors.insert(key("ownership_percentage"), "Must be 0 or greater");
        } else if owner.ownership_percentage > FULL_OWNERSHIP {
            errors.insert(key("ownership_percentage"), "Cannot exceed 100%");
        }
    }

    if total_ownership(&ubo.owners) > FULL_OWNERSHIP {
        errors.insert("owners", "Total ownership cannot exceed 100%");
    }

    if client_type == ClientType::Individual {
        if ubo.owners.len() != 1 {
            errors.insert("owners", "Individual applicants have exactly one owner");
        } else if ubo.owners[0].ownership_percentage != FULL_OWNERSHIP {
            errors.insert(
                "owners[0].ownership_percentage",
                "Individual ownership is fixed at 100%",
            );
        }
    }

    if !ubo.certified {
        errors.insert("certified", "You must certify the ownership information");
    }
    errors.into_result()
}

/// Validate the field rules of step 6. The high-risk acknowledgement is a
/// separate gate, see [`unacknowledged_high_risk`].
pub fn validate_activity(activity: &ActivitySection) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    if errors.require(
        "usage_description",
        &activity.usage_description,
        "Please describe how you will use the service",
    ) && activity.usage_description.trim().chars().count() < MIN_USAGE_DESCRIPTION
    {
        errors.insert(
            "usage_description",
            "Please provide more detail (at least 50 characters)",
        );
    }
    if activity.sources_of_funds.is_empty() {
        errors.insert("sources_of_funds", "Select at least one source of funds");
    }
    if activity.expected_trade_size.is_none() {
        errors.insert("expected_trade_size", "Please select expected trade size");
    }
    if activity.monthly_volume.is_none() {
        errors.insert("monthly_volume", "Please select expected monthly volume");
    }
    if activity.operating_countries.is_empty() {
        errors.insert("operating_countries", "Select at least one country");
    }
    errors.into_result()
}

/// High-risk countries selected without acknowledgement. Empty when the
/// step may complete.
pub fn unacknowledged_high_risk(activity: &ActivitySection) -> Vec<String> {
    if activity.high_risk_acknowledged {
        Vec::new()
    } else {
        activity.high_risk_countries()
    }
}

/// Validate step 7. Any risk level passes; only a missing scan for this
/// address blocks.
pub fn validate_wallet(input: &WalletInput, scan: Option<&ScanResult>) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    let address = input.address.trim();

    if address.is_empty() {
        errors.insert("address", "Wallet address is required");
    } else if !WALLET_ADDRESS_LEN.contains(&address.chars().count()) {
        errors.insert("address", "Invalid wallet address length");
    }

    match scan {
        Some(result) if result.wallet_address == address => {}
        _ => errors.insert(
            "scan",
            "Please run the wallet risk scan for this address before continuing",
        ),
    }
    errors.into_result()
}

fn check_email(errors: &mut FieldErrors, field: &str, value: &str) {
    if errors.require(field, value, "Email is required") && !EMAIL_RE.is_match(value.trim()) {
        errors.insert(field, "Invalid email address");
    }
}

fn check_phone(errors: &mut FieldErrors, field: &str, value: &str, required: &str) {
    if errors.require(field, value, required) && !PHONE_RE.is_match(value.trim()) {
        errors.insert(field, "Invalid phone number");
    }
}

// ── Normalization ───────────────────────────────────────────────────

/// `123456789` or `123-45-6789` → `123-45-6789`. `None` if not nine digits.
pub fn normalize_ssn(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 9 || !SSN_RE.is_match(raw.trim()) {
        return None;
    }
    Some(format!("{}-{}-{}", &digits[..3], &digits[3..5], &digits[5..]))
}

/// `123456789` or `12-3456789` → `12-3456789`. `None` if not nine digits.
pub fn normalize_ein(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 9 || !EIN_RE.is_match(raw.trim()) {
        return None;
    }
    Some(format!("{}-{}", &digits[..2], &digits[2..]))
}

/// Rewrite SSN / EIN into their canonical hyphenated form. Values that do
/// not parse are left alone.
pub fn normalize_basics(basics: &mut Basics) {
    match basics {
        Basics::Individual(b) => {
            if let Some(ssn) = normalize_ssn(&b.ssn) {
                b.ssn = ssn;
            }
        }
        Basics::Entity(b) => {
            if let Some(ein) = normalize_ein(&b.ein) {
                b.ein = ein;
            }
        }
    }
}
