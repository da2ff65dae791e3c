//! Inline keyboards and the callback token format behind their buttons.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::bot::catalog;

/// A parsed callback button press.
#[derive(Debug, Clone, PartialEq)]
pub enum Callback {
    Menu,
    Catalog,
    Digital,
    Ask,
    Channel,
    /// Service picked; show its plans.
    Service(String),
    /// Plan picked; show its periods.
    Plan(String, String),
    /// Full selection; show the confirmation.
    Buy(String, String, String),
    /// Digital product picked.
    Product(String),
    Pay,
    Cancel,
    /// Operator pressed "claim" on a broadcast.
    Claim(i64),
}

impl Callback {
    /// Parse the opaque token carried in `CallbackQuery::data`.
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.split(':');
        let head = parts.next()?;
        let rest: Vec<&str> = parts.collect();

        match (head, rest.as_slice()) {
            ("menu", []) => Some(Self::Menu),
            ("catalog", []) => Some(Self::Catalog),
            ("digital", []) => Some(Self::Digital),
            ("ask", []) => Some(Self::Ask),
            ("channel", []) => Some(Self::Channel),
            ("svc", [s]) => Some(Self::Service(s.to_string())),
            ("plan", [s, p]) => Some(Self::Plan(s.to_string(), p.to_string())),
            ("buy", [s, p, per]) => {
                Some(Self::Buy(s.to_string(), p.to_string(), per.to_string()))
            }
            ("dig", [id]) => Some(Self::Product(id.to_string())),
            ("pay", []) => Some(Self::Pay),
            ("cancel", []) => Some(Self::Cancel),
            ("claim", [id]) => id.parse().ok().map(Self::Claim),
            _ => None,
        }
    }
}

pub fn main_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("🛍 Subscriptions", "catalog"),
            InlineKeyboardButton::callback("📦 Digital store", "digital"),
        ],
        vec![
            InlineKeyboardButton::callback("❓ Ask a question", "ask"),
            InlineKeyboardButton::callback("📣 Our channel", "channel"),
        ],
    ])
}

pub fn services_keyboard() -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = catalog::services()
        .into_iter()
        .map(|(abbr, name)| vec![InlineKeyboardButton::callback(name, format!("svc:{abbr}"))])
        .collect();
    rows.push(vec![InlineKeyboardButton::callback("« Back", "menu")]);
    InlineKeyboardMarkup::new(rows)
}

pub fn plans_keyboard(service: &str) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = catalog::plans_of(service)
        .into_iter()
        .map(|(abbr, name)| {
            vec![InlineKeyboardButton::callback(name, format!("plan:{service}:{abbr}"))]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback("« Back", "catalog")]);
    InlineKeyboardMarkup::new(rows)
}

pub fn periods_keyboard(service: &str, plan: &str, currency: &str) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = catalog::periods_of(service, plan)
        .into_iter()
        .map(|(token, name, price)| {
            vec![InlineKeyboardButton::callback(
                format!("{name} — {price} {currency}"),
                format!("buy:{service}:{plan}:{token}"),
            )]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback("« Back", format!("svc:{service}"))]);
    InlineKeyboardMarkup::new(rows)
}

pub fn digital_keyboard(currency: &str) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = catalog::digital_products()
        .iter()
        .map(|p| {
            vec![InlineKeyboardButton::callback(
                format!("{} — {} {currency}", p.name, p.price),
                format!("dig:{}", p.id),
            )]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback("« Back", "menu")]);
    InlineKeyboardMarkup::new(rows)
}

pub fn confirm_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("💳 Pay", "pay"),
        InlineKeyboardButton::callback("✖ Cancel", "cancel"),
    ]])
}

/// The claim affordance attached to new-question broadcasts.
pub fn claim_keyboard(user_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "✋ Claim",
        format!("claim:{user_id}"),
    )]])
}
