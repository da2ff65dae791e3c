//! Static product catalog: subscription plans and digital products.
//!
//! Everything here is compiled in. Abbreviations are the wire form used in
//! order lines (`Cha-Bas-1_m-100`); the full names are what users see.

/// A priced subscription offering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogEntry {
    /// Service abbreviation, e.g. "Cha".
    pub service: &'static str,
    /// Plan abbreviation, e.g. "Bas".
    pub plan: &'static str,
    /// Period token, e.g. "1_m".
    pub period: &'static str,
    pub price: u32,
}

/// A one-off digital product (no period).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DigitalProduct {
    pub id: &'static str,
    pub name: &'static str,
    pub price: u32,
}

const SERVICES: &[(&str, &str)] = &[
    ("Cha", "ChatGPT"),
    ("Cla", "Claude"),
    ("Spo", "Spotify"),
    ("You", "YouTube Premium"),
];

const PLANS: &[(&str, &str)] = &[
    ("Bas", "Basic"),
    ("Plu", "Plus"),
    ("Pro", "Pro"),
    ("Pre", "Premium"),
    ("Ind", "Individual"),
];

const PERIODS: &[(&str, &str)] = &[
    ("1_m", "1 month"),
    ("3_m", "3 months"),
    ("6_m", "6 months"),
    ("12_m", "12 months"),
];

/// The full subscription price list. One row per purchasable combination.
const ENTRIES: &[CatalogEntry] = &[
    CatalogEntry { service: "Cha", plan: "Bas", period: "1_m", price: 100 },
    CatalogEntry { service: "Cha", plan: "Bas", period: "3_m", price: 270 },
    CatalogEntry { service: "Cha", plan: "Bas", period: "6_m", price: 500 },
    CatalogEntry { service: "Cha", plan: "Plu", period: "1_m", price: 250 },
    CatalogEntry { service: "Cha", plan: "Plu", period: "3_m", price: 690 },
    CatalogEntry { service: "Cha", plan: "Plu", period: "12_m", price: 2400 },
    CatalogEntry { service: "Cla", plan: "Pro", period: "1_m", price: 220 },
    CatalogEntry { service: "Cla", plan: "Pro", period: "3_m", price: 600 },
    CatalogEntry { service: "Spo", plan: "Ind", period: "1_m", price: 60 },
    CatalogEntry { service: "Spo", plan: "Ind", period: "6_m", price: 320 },
    CatalogEntry { service: "Spo", plan: "Pre", period: "12_m", price: 550 },
    CatalogEntry { service: "You", plan: "Pre", period: "1_m", price: 75 },
    CatalogEntry { service: "You", plan: "Pre", period: "12_m", price: 700 },
];

const DIGITAL: &[DigitalProduct] = &[
    DigitalProduct { id: "gift_10", name: "Gift card $10", price: 12 },
    DigitalProduct { id: "gift_25", name: "Gift card $25", price: 28 },
    DigitalProduct { id: "esim_1gb", name: "Travel eSIM 1 GB", price: 9 },
    DigitalProduct { id: "vpn_key", name: "VPN access key, 1 month", price: 15 },
];

pub fn service_name(abbr: &str) -> Option<&'static str> {
    SERVICES.iter().find(|(a, _)| *a == abbr).map(|(_, n)| *n)
}

pub fn plan_name(abbr: &str) -> Option<&'static str> {
    PLANS.iter().find(|(a, _)| *a == abbr).map(|(_, n)| *n)
}

pub fn period_name(token: &str) -> Option<&'static str> {
    PERIODS.iter().find(|(t, _)| *t == token).map(|(_, n)| *n)
}

pub fn entry(service: &str, plan: &str, period: &str) -> Option<&'static CatalogEntry> {
    ENTRIES
        .iter()
        .find(|e| e.service == service && e.plan == plan && e.period == period)
}

pub fn price_of(service: &str, plan: &str, period: &str) -> Option<u32> {
    entry(service, plan, period).map(|e| e.price)
}

pub fn entries() -> &'static [CatalogEntry] {
    ENTRIES
}

pub fn digital_products() -> &'static [DigitalProduct] {
    DIGITAL
}

pub fn digital_product(id: &str) -> Option<&'static DigitalProduct> {
    DIGITAL.iter().find(|p| p.id == id)
}

/// Services that have at least one purchasable entry, in menu order.
pub fn services() -> Vec<(&'static str, &'static str)> {
    SERVICES
        .iter()
        .filter(|(abbr, _)| ENTRIES.iter().any(|e| e.service == *abbr))
        .copied()
        .collect()
}

/// Plans purchasable for the given service, in menu order.
pub fn plans_of(service: &str) -> Vec<(&'static str, &'static str)> {
    PLANS
        .iter()
        .filter(|(abbr, _)| ENTRIES.iter().any(|e| e.service == service && e.plan == *abbr))
        .copied()
        .collect()
}

/// (period token, display name, price) options for a service/plan pair.
pub fn periods_of(service: &str, plan: &str) -> Vec<(&'static str, &'static str, u32)> {
    ENTRIES
        .iter()
        .filter(|e| e.service == service && e.plan == plan)
        .filter_map(|e| period_name(e.period).map(|name| (e.period, name, e.price)))
        .collect()
}
