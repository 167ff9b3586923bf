use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level rule set
// ---------------------------------------------------------------------------

/// Static rule tables for one pipeline run. Every section has production
/// defaults, so an empty TOML document is a valid rule set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleSet {
    pub categories: CategoryRules,
    pub time: TimeRules,
    pub variants: VariantRules,
    pub fields: FieldMapping,
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CategoryRules {
    /// Categories kept as-is.
    pub included: Vec<String>,
    /// Categories dropped on purpose (logged at info, not warn).
    pub excluded: Vec<String>,
    /// The category the fiscal-period resolver works on.
    pub earnings: String,
    /// Categories that are mutually exclusive at one instant, highest priority first.
    pub same_instant_priority: Vec<String>,
    /// Target category -> source categories, highest priority first.
    pub dedup: BTreeMap<String, Vec<String>>,
    /// Source category -> renamed category, no grouping.
    pub rename: BTreeMap<String, String>,
}

impl Default for CategoryRules {
    fn default() -> Self {
        Self {
            included: [
                "Earnings",
                "SalesRevenue",
                "Dividend",
                "Conference",
                "ShareholdersMeeting",
                "AnalystsInvestorsMeeting",
                "SpecialSituation",
            ]
            .map(String::from)
            .to_vec(),
            excluded: ["ProjectedEarningsRelease", "ConfirmedEarningsRelease"]
                .map(String::from)
                .to_vec(),
            earnings: "Earnings".into(),
            same_instant_priority: Vec::new(),
            dedup: BTreeMap::new(),
            rename: BTreeMap::from([
                ("SalesRevenueRelease".to_string(), "SalesRevenue".to_string()),
                ("SalesRevenueCall".to_string(), "SalesRevenue".to_string()),
            ]),
        }
    }
}

impl CategoryRules {
    /// Included ∪ dedup sources ∪ rename sources, minus the deny-list.
    pub fn allowed(&self) -> BTreeSet<String> {
        let mut allowed: BTreeSet<String> = self.included.iter().cloned().collect();
        for sources in self.dedup.values() {
            allowed.extend(sources.iter().cloned());
        }
        allowed.extend(self.rename.keys().cloned());
        for excluded in &self.excluded {
            allowed.remove(excluded);
        }
        allowed
    }

    /// Source category -> (target category, priority index).
    pub fn dedup_lookup(&self) -> HashMap<&str, (&str, usize)> {
        let mut lookup = HashMap::new();
        for (target, sources) in &self.dedup {
            for (priority, source) in sources.iter().enumerate() {
                lookup.insert(source.as_str(), (target.as_str(), priority));
            }
        }
        lookup
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeRules {
    /// IANA zone local times are rendered in.
    pub zone: String,
    /// Abbreviations the zone is expected to produce (standard, daylight).
    pub abbreviations: Vec<String>,
    /// Market-time code the provider uses when it has no confirmed time of day.
    pub unconfirmed_code: String,
}

impl Default for TimeRules {
    fn default() -> Self {
        Self {
            zone: "America/Toronto".into(),
            abbreviations: vec!["EST".into(), "EDT".into()],
            unconfirmed_code: "Unspecified".into(),
        }
    }
}

impl TimeRules {
    pub fn tz(&self) -> Result<Tz, ReconError> {
        self.zone
            .parse::<Tz>()
            .map_err(|_| ReconError::UnknownZone(self.zone.clone()))
    }
}

// ---------------------------------------------------------------------------
// Ticker variants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VariantRules {
    pub domestic_suffix: String,
    pub foreign_suffix: String,
    /// Canonical tickers whose foreign listing is a different company.
    pub exclude: Vec<String>,
    /// Bases rewritten `<base><foreign>` -> `<base><domestic>` when no
    /// variant map is available.
    pub rewrite_bases: Vec<String>,
}

impl Default for VariantRules {
    fn default() -> Self {
        Self {
            domestic_suffix: "-CA".into(),
            foreign_suffix: "-US".into(),
            // LB-US is not Laurentian Bank.
            exclude: vec!["LB-CA".into()],
            rewrite_bases: ["RY", "TD", "BMO", "BNS", "CM", "NA"].map(String::from).to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// Provider column mapping
// ---------------------------------------------------------------------------

/// Internal field -> provider column name. Only this table changes when the
/// provider does.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldMapping {
    pub event_id: String,
    pub ticker: String,
    pub event_type: String,
    pub event_date_time: String,
    pub description: String,
    pub webcast_link: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub fiscal_year: String,
    pub fiscal_period: String,
    pub market_time_code: String,
    pub last_modified_date: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            event_id: "event_id".into(),
            ticker: "ticker".into(),
            event_type: "event_type".into(),
            event_date_time: "event_date_time".into(),
            description: "description".into(),
            webcast_link: "webcast_link".into(),
            contact_name: "contact_name".into(),
            contact_phone: "contact_phone".into(),
            contact_email: "contact_email".into(),
            fiscal_year: "fiscal_year".into(),
            fiscal_period: "fiscal_period".into(),
            market_time_code: "market_time_code".into(),
            last_modified_date: "last_modified_date".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl RuleSet {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let rules: RuleSet =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let cats = &self.categories;

        if cats.earnings.is_empty() {
            return Err(ReconError::ConfigValidation(
                "categories.earnings must not be empty".into(),
            ));
        }

        for category in &cats.included {
            if cats.excluded.contains(category) {
                return Err(ReconError::ConfigValidation(format!(
                    "category '{category}' is both included and excluded"
                )));
            }
        }

        let mut owners: HashMap<&str, &str> = HashMap::new();
        for (target, sources) in &cats.dedup {
            if sources.is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "dedup target '{target}' has no source categories"
                )));
            }
            for source in sources {
                if let Some(previous) = owners.insert(source.as_str(), target.as_str()) {
                    return Err(ReconError::ConfigValidation(format!(
                        "category '{source}' is a dedup source for both '{previous}' and '{target}'"
                    )));
                }
            }
        }

        for source in cats.rename.keys() {
            if owners.contains_key(source.as_str()) {
                return Err(ReconError::ConfigValidation(format!(
                    "category '{source}' appears in both the dedup and rename tables"
                )));
            }
        }

        let mut seen = BTreeSet::new();
        for category in &cats.same_instant_priority {
            if !seen.insert(category) {
                return Err(ReconError::ConfigValidation(format!(
                    "category '{category}' listed twice in same_instant_priority"
                )));
            }
        }

        self.time.tz()?;
        if self.time.abbreviations.is_empty() {
            return Err(ReconError::ConfigValidation(
                "time.abbreviations must list at least one abbreviation".into(),
            ));
        }

        let v = &self.variants;
        if v.domestic_suffix.is_empty() || v.foreign_suffix.is_empty() {
            return Err(ReconError::ConfigValidation(
                "variant suffixes must not be empty".into(),
            ));
        }
        if v.domestic_suffix == v.foreign_suffix {
            return Err(ReconError::ConfigValidation(format!(
                "domestic and foreign suffix are both '{}'",
                v.domestic_suffix
            )));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
