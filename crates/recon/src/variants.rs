//! Ticker variants: alternate-market listings of the same institution.
//!
//! The provider sometimes files a domestic bank's events under its foreign
//! listing (`RY-US` instead of `RY-CA`). The fetch queries both forms, and the
//! [`VariantMap`] built here folds every form back to the canonical ticker.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::VariantRules;

/// Queried ticker -> canonical ticker. Built once per run, immutable after.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantMap {
    canonical_of: BTreeMap<String, String>,
}

impl VariantMap {
    pub fn canonical(&self, ticker: &str) -> Option<&str> {
        self.canonical_of.get(ticker).map(String::as_str)
    }

    /// True when `ticker` is itself a canonical identifier.
    pub fn is_canonical(&self, ticker: &str) -> bool {
        self.canonical(ticker) == Some(ticker)
    }

    /// Alternates that fold into `canonical`.
    pub fn alternates_of<'a>(&'a self, canonical: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.canonical_of
            .iter()
            .filter(move |(from, to)| to.as_str() == canonical && from.as_str() != canonical)
            .map(|(from, _)| from.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.canonical_of.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.canonical_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical_of.is_empty()
    }
}

/// Expanded query set plus the map that folds it back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    /// Canonical tickers first (input order), then synthesized alternates.
    pub query: Vec<String>,
    pub map: VariantMap,
}

/// Expand canonical tickers with their foreign-market alternates.
pub fn expand_variants(canonical: &[String], rules: &VariantRules) -> Expansion {
    let mut expansion = Expansion::default();

    // Canonicals are registered first so an alternate can never claim a
    // ticker that was itself listed as canonical.
    for ticker in canonical {
        let ticker = ticker.trim();
        if ticker.is_empty() || expansion.map.canonical_of.contains_key(ticker) {
            continue;
        }
        expansion
            .map
            .canonical_of
            .insert(ticker.to_string(), ticker.to_string());
        expansion.query.push(ticker.to_string());
    }

    let canonicals = expansion.query.clone();
    for ticker in &canonicals {
        if rules.exclude.iter().any(|e| e == ticker) {
            continue;
        }
        let Some(base) = ticker.strip_suffix(rules.domestic_suffix.as_str()) else {
            continue;
        };
        let alternate = format!("{base}{}", rules.foreign_suffix);
        if expansion.map.canonical_of.contains_key(&alternate) {
            debug!(ticker = %ticker, alternate = %alternate, "alternate already queried, not remapped");
            continue;
        }
        expansion
            .map
            .canonical_of
            .insert(alternate.clone(), ticker.clone());
        expansion.query.push(alternate);
    }

    expansion
}

/// How provider tickers are folded back to canonical form.
#[derive(Debug, Clone, Copy)]
pub enum TickerNormalizer<'a> {
    /// Through the run's variant map.
    Variants(&'a VariantMap),
    /// Fixed `<base><foreign>` -> `<base><domestic>` rewrite for the configured bases.
    SuffixRewrite(&'a VariantRules),
}

impl TickerNormalizer<'_> {
    pub fn normalize(&self, ticker: &str) -> String {
        let ticker = ticker.trim();
        match self {
            Self::Variants(map) => map.canonical(ticker).unwrap_or(ticker).to_string(),
            Self::SuffixRewrite(rules) => {
                let rewritten = rules.rewrite_bases.iter().find_map(|base| {
                    let foreign = format!("{base}{}", rules.foreign_suffix);
                    (ticker == foreign).then(|| format!("{base}{}", rules.domestic_suffix))
                });
                rewritten.unwrap_or_else(|| ticker.to_string())
            }
        }
    }
}
