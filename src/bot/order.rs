//! Order codec: short order reference ids and the raw order-line format.
//!
//! Order ids are human-readable references, NOT unique keys. Two users (or
//! two prices) can collide on the same tail digits; the authoritative
//! record of an order is its conversation and message rows.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::bot::catalog::{self, CatalogEntry, DigitalProduct};

/// Which side of the store an order came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderKind {
    Subscription,
    Digital,
}

impl OrderKind {
    fn prefix(self) -> char {
        match self {
            OrderKind::Subscription => 'O',
            OrderKind::Digital => 'D',
        }
    }
}

/// A completed catalog selection waiting for payment. Lives only in memory;
/// discarded once the invoice is paid or the user cancels.
#[derive(Debug, Clone)]
pub struct PendingOrder {
    pub order_id: String,
    /// Human description, e.g. "ChatGPT Basic, 1 month".
    pub summary: String,
    pub price: u32,
    /// The raw command a user could send to re-submit the same order.
    pub command: String,
}

/// One parsed line of a raw order. Unknown abbreviations become placeholder
/// names so a single bad item never voids the rest of the order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub service_name: String,
    pub plan_name: String,
    pub period_name: String,
    pub price: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOrder {
    pub items: Vec<OrderItem>,
    pub total: u32,
}

#[derive(Debug, PartialEq)]
pub enum OrderError {
    /// Not a single order line parsed.
    NoValidItems,
}

impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoValidItems => write!(f, "no valid items in order"),
        }
    }
}

impl std::error::Error for OrderError {}

/// Build the short order reference: prefix + last 4 digits of the user id +
/// last 2 digits of the price, both zero-padded.
pub fn order_id(user_id: i64, price: u32, kind: OrderKind) -> String {
    format!("{}{:04}{:02}", kind.prefix(), user_id.unsigned_abs() % 10_000, price % 100)
}

/// Wire form of a subscription selection: `Cha-Bas-1_m-100`.
pub fn encode_line(entry: &CatalogEntry) -> String {
    format!("{}-{}-{}-{}", entry.service, entry.plan, entry.period, entry.price)
}

/// Pending order for a subscription selection.
pub fn subscription_order(user_id: i64, entry: &CatalogEntry) -> PendingOrder {
    let id = order_id(user_id, entry.price, OrderKind::Subscription);
    let summary = format!(
        "{} {}, {}",
        catalog::service_name(entry.service).unwrap_or(entry.service),
        catalog::plan_name(entry.plan).unwrap_or(entry.plan),
        catalog::period_name(entry.period).unwrap_or(entry.period),
    );
    let command = format!("/order {} {}", id, encode_line(entry));
    PendingOrder { order_id: id, summary, price: entry.price, command }
}

/// Pending order for a digital product.
pub fn digital_order(user_id: i64, product: &DigitalProduct) -> PendingOrder {
    let id = order_id(user_id, product.price, OrderKind::Digital);
    let command = format!("/order {} {}", id, product.id);
    PendingOrder {
        order_id: id,
        summary: product.name.to_string(),
        price: product.price,
        command,
    }
}

fn line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z]+)-([A-Za-z]+)-(\d+_[a-z])-(\d+)$").expect("order line regex")
    })
}

/// Parse whitespace-separated raw order lines of the form
/// `ServiceAbbr-PlanAbbr-Period-Price`.
///
/// Unrecognized abbreviations resolve to placeholder names; a line with a
/// bad shape or unparseable price is skipped with a warning. The order as a
/// whole fails only when nothing parsed.
pub fn parse_order(args: &[&str]) -> Result<ParsedOrder, OrderError> {
    let mut items = Vec::new();
    let mut total: u32 = 0;

    for raw in args {
        let Some(caps) = line_re().captures(raw) else {
            warn!("Skipping malformed order line: {raw:?}");
            continue;
        };

        let price: u32 = match caps[4].parse() {
            Ok(p) => p,
            Err(_) => {
                warn!("Skipping order line with unparseable price: {raw:?}");
                continue;
            }
        };

        let new_total = match total.checked_add(price) {
            Some(t) => t,
            None => {
                warn!("Skipping order line that overflows the total: {raw:?}");
                continue;
            }
        };

        let service = &caps[1];
        let plan = &caps[2];
        let period = &caps[3];

        items.push(OrderItem {
            service_name: catalog::service_name(service)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Unknown service ({service})")),
            plan_name: catalog::plan_name(plan)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Unknown plan ({plan})")),
            period_name: catalog::period_name(period)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Unknown period ({period})")),
            price,
        });
        total = new_total;
    }

    if items.is_empty() {
        return Err(OrderError::NoValidItems);
    }
    Ok(ParsedOrder { items, total })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::catalog;

    #[test]
    fn test_order_id_format() {
        assert_eq!(order_id(923847, 100, OrderKind::Subscription), "O384700");
        assert_eq!(order_id(923847, 250, OrderKind::Digital), "D384750");
        // Short ids and prices are zero-padded.
        assert_eq!(order_id(42, 5, OrderKind::Subscription), "O004205");
    }

    #[test]
    fn test_order_id_is_not_unique() {
        // Same tail digits collide; the id is a label, nothing more.
        let a = order_id(10_001, 100, OrderKind::Subscription);
        let b = order_id(20_001, 200, OrderKind::Subscription);
        assert_eq!(a, b);
    }

    #[test]
    fn test_encode_line() {
        let entry = catalog::entries()[0];
        assert_eq!(encode_line(&entry), "Cha-Bas-1_m-100");
    }

    #[test]
    fn test_subscription_order() {
        let entry = catalog::entries()[0];
        let order = subscription_order(923847, &entry);
        assert_eq!(order.order_id, "O384700");
        assert_eq!(order.summary, "ChatGPT Basic, 1 month");
        assert_eq!(order.price, 100);
        assert_eq!(order.command, "/order O384700 Cha-Bas-1_m-100");
    }

    #[test]
    fn test_digital_order() {
        let product = catalog::digital_product("gift_10").unwrap();
        let order = digital_order(42, product);
        assert!(order.order_id.starts_with('D'));
        assert_eq!(order.summary, "Gift card $10");
        assert_eq!(order.price, 12);
    }

    #[test]
    fn test_parse_single_item() {
        let parsed = parse_order(&["Cha-Bas-1_m-100"]).unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].service_name, "ChatGPT");
        assert_eq!(parsed.items[0].plan_name, "Basic");
        assert_eq!(parsed.items[0].period_name, "1 month");
        assert_eq!(parsed.items[0].price, 100);
        assert_eq!(parsed.total, 100);
    }

    #[test]
    fn test_unknown_abbreviation_yields_placeholder() {
        // One bad item must not void the rest of the order.
        let parsed = parse_order(&["Cha-Bas-1_m-100", "Xyz-Bad-1_m-50"]).unwrap();
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(parsed.items[1].service_name, "Unknown service (Xyz)");
        assert_eq!(parsed.items[1].plan_name, "Unknown plan (Bad)");
        assert_eq!(parsed.items[1].price, 50);
        assert_eq!(parsed.total, 150);
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let parsed = parse_order(&["garbage", "Cha-Bas-1_m-100"]).unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.total, 100);
    }

    #[test]
    fn test_overlong_price_is_skipped() {
        // 99999999999 overflows u32; only that item is dropped.
        let parsed = parse_order(&["Cha-Bas-1_m-99999999999", "Spo-Ind-1_m-60"]).unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].service_name, "Spotify");
    }

    #[test]
    fn test_total_overflow_skips_item() {
        // Two huge regex-valid prices must not wrap (or panic) the total;
        // the item that would overflow is dropped like any other bad line.
        let parsed =
            parse_order(&["Cha-Bas-1_m-4000000000", "Cha-Bas-1_m-4000000000", "Spo-Ind-1_m-60"])
                .unwrap();
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(parsed.total, 4_000_000_060);
    }

    #[test]
    fn test_no_valid_items() {
        assert_eq!(parse_order(&["nonsense", "also-bad"]), Err(OrderError::NoValidItems));
        assert_eq!(parse_order(&[]), Err(OrderError::NoValidItems));
    }

    #[test]
    fn test_round_trip_whole_catalog() {
        // Encoding then decoding recovers the display data for every entry.
        for entry in catalog::entries() {
            let line = encode_line(entry);
            let parsed = parse_order(&[line.as_str()]).unwrap();
            assert_eq!(parsed.items.len(), 1, "entry {line}");
            let item = &parsed.items[0];
            assert_eq!(item.service_name, catalog::service_name(entry.service).unwrap());
            assert_eq!(item.plan_name, catalog::plan_name(entry.plan).unwrap());
            assert_eq!(item.period_name, catalog::period_name(entry.period).unwrap());
            assert_eq!(item.price, entry.price);
            assert_eq!(parsed.total, entry.price);
        }
    }
}
