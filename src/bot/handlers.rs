//! dptree endpoints: command dispatch, free-text relay and callback flows.
//!
//! Handlers copy what they need out of the router's lock, then do their
//! Telegram and SQLite I/O. A notification that fails to send is logged
//! and never rolls back a routing-state change.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{ChatKind, InlineKeyboardMarkup, User};
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

use crate::bot::commands::{self, Command};
use crate::bot::keyboards::{self, Callback};
use crate::bot::order;
use crate::bot::router::{ConversationKind, RelayTarget, RouterError};
use crate::bot::store::UserProfile;
use crate::bot::BotState;

const NO_ACCESS: &str = "⛔ No access.";
const SNIPPET_CHARS: usize = 80;

fn snippet(text: &str) -> String {
    let mut s: String = text.chars().take(SNIPPET_CHARS).collect();
    if text.chars().count() > SNIPPET_CHARS {
        s.push('…');
    }
    s
}

fn profile_of(user: &User) -> UserProfile {
    UserProfile {
        user_id: user.id.0 as i64,
        first_name: user.first_name.clone(),
        username: user.username.clone(),
        language_code: user.language_code.clone(),
        is_bot: user.is_bot,
    }
}

fn display_name(user: &User) -> String {
    match &user.username {
        Some(u) => format!("@{u}"),
        None => user.first_name.clone(),
    }
}

/// Split a long report into Telegram-sized messages on line boundaries.
fn chunk_lines(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if !current.is_empty() && current.chars().count() + line.chars().count() + 1 > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

async fn send_chunked(bot: &Bot, chat_id: ChatId, text: &str) -> ResponseResult<()> {
    for chunk in chunk_lines(text, 3500) {
        bot.send_message(chat_id, chunk).await?;
    }
    Ok(())
}

// ==================== MESSAGES ====================

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    // This bot only talks in DMs.
    if !matches!(msg.chat.kind, ChatKind::Private(_)) {
        return Ok(());
    }
    let user = match msg.from {
        Some(ref u) if !u.is_bot => u,
        _ => return Ok(()),
    };
    let text = match msg.text() {
        Some(t) => t,
        None => return Ok(()),
    };

    // Every contact refreshes the user row.
    if let Err(e) = state.store.upsert_user(&profile_of(user)) {
        warn!("Failed to upsert user {}: {e}", user.id);
    }

    match Command::parse(text, &state.bot_username) {
        Ok(cmd) => handle_command(&bot, &msg, user, cmd, &state).await,
        Err(_) => handle_free_text(&bot, &msg, user, text, &state).await,
    }
}

async fn handle_command(
    bot: &Bot,
    msg: &Message,
    user: &User,
    cmd: Command,
    state: &BotState,
) -> ResponseResult<()> {
    let is_owner = state.config.is_owner(user.id);

    // Defense in depth: gate here even though each admin handler is only
    // reachable through this check.
    if cmd.is_owner_only() && !is_owner {
        info!("Refused {:?} for non-operator {}", cmd, user.id);
        bot.send_message(msg.chat.id, NO_ACCESS).await?;
        return Ok(());
    }

    match cmd {
        Command::Start => {
            bot.send_message(
                msg.chat.id,
                "👋 Welcome to Lavka — subscriptions and digital goods.\nPick an option below.",
            )
            .reply_markup(keyboards::main_menu())
            .await?;
        }
        Command::Help => {
            let mut help = Command::descriptions().to_string();
            if is_owner {
                help.push_str(
                    "\n\nOperator commands:\n\
                     /stats — store totals\n\
                     /export_users — dump all user records\n\
                     /chats — active conversations\n\
                     /questions — unclaimed conversations\n\
                     /history <user_id> — message log\n\
                     /clear_conversations — wipe all conversations\n\
                     /dialog <user_id> — start a manual dialog",
                );
            }
            bot.send_message(msg.chat.id, help).await?;
        }
        Command::Order(args) => handle_raw_order(bot, msg, user, &args, state).await?,
        Command::End => handle_end(bot, msg, user, state).await?,

        Command::Stats => {
            let text = format!(
                "📊 Users: {}\nConversations: {} ({} in memory)\nMessages: {}",
                state.store.count_users(),
                state.store.count_conversations(),
                state.router.active().len(),
                state.store.count_messages(),
            );
            bot.send_message(msg.chat.id, text).await?;
        }
        Command::ExportUsers => match state.store.export_users() {
            Ok(users) if users.is_empty() => {
                bot.send_message(msg.chat.id, "No users recorded yet.").await?;
            }
            Ok(users) => {
                let mut out = String::from("user_id\tname\tusername\tlang\tbot\tcreated\n");
                for u in users {
                    out.push_str(&format!(
                        "{}\t{}\t{}\t{}\t{}\t{}\n",
                        u.user_id,
                        u.first_name,
                        u.username.as_deref().unwrap_or("-"),
                        u.language_code.as_deref().unwrap_or("-"),
                        if u.is_bot { "yes" } else { "no" },
                        u.created_at,
                    ));
                }
                send_chunked(bot, msg.chat.id, &out).await?;
            }
            Err(e) => {
                warn!("Export failed: {e}");
                bot.send_message(msg.chat.id, "Export failed, see logs.").await?;
            }
        },
        Command::Chats => {
            let active = state.router.active();
            let text = if active.is_empty() {
                "No active conversations.".to_string()
            } else {
                active
                    .iter()
                    .map(|c| {
                        format!(
                            "• {} [{}] {} — {}",
                            c.user_id,
                            c.kind.label(),
                            c.operator.map_or("unclaimed".to_string(), |op| format!("op {op}")),
                            c.snippet,
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            send_chunked(bot, msg.chat.id, &text).await?;
        }
        Command::Questions => {
            let unclaimed = state.router.unclaimed();
            if unclaimed.is_empty() {
                bot.send_message(msg.chat.id, "No unclaimed conversations.").await?;
            } else {
                for c in unclaimed {
                    bot.send_message(
                        msg.chat.id,
                        format!("{} from user {}:\n{}", c.kind.label(), c.user_id, c.snippet),
                    )
                    .reply_markup(keyboards::claim_keyboard(c.user_id))
                    .await?;
                }
            }
        }
        Command::History(arg) => match commands::parse_user_id(&arg) {
            Ok(target) => match state.store.query_history(target, state.config.history_limit) {
                Ok(history) if history.is_empty() => {
                    bot.send_message(msg.chat.id, format!("No messages from user {target}."))
                        .await?;
                }
                Ok(history) => {
                    let text = history
                        .iter()
                        .map(|m| {
                            let dir = if m.from_operator { "←" } else { "→" };
                            format!("{} {} {}", m.created_at, dir, m.text)
                        })
                        .collect::<Vec<_>>()
                        .join("\n");
                    send_chunked(bot, msg.chat.id, &text).await?;
                }
                Err(e) => {
                    warn!("History query failed: {e}");
                    bot.send_message(msg.chat.id, "History query failed, see logs.").await?;
                }
            },
            Err(e) => {
                bot.send_message(msg.chat.id, e).await?;
            }
        },
        Command::ClearConversations => {
            let in_memory = state.router.clear_all();
            let rows = match state.store.delete_all_conversations() {
                Ok(n) => n,
                Err(e) => {
                    warn!("Failed to clear conversation rows: {e}");
                    0
                }
            };
            bot.send_message(
                msg.chat.id,
                format!("🧹 Cleared {in_memory} active conversations ({rows} stored rows)."),
            )
            .await?;
        }
        Command::Dialog(arg) => {
            let target = match commands::parse_user_id(&arg) {
                Ok(t) => t,
                Err(e) => {
                    bot.send_message(msg.chat.id, e).await?;
                    return Ok(());
                }
            };
            let operator_id = user.id.0 as i64;
            match state.router.open_assigned(operator_id, target, ConversationKind::ManualDialog) {
                Ok(()) => {
                    if let Err(e) = state.store.insert_conversation(target, ConversationKind::ManualDialog, "") {
                        warn!("Failed to store manual dialog: {e}");
                    }
                    if let Err(e) = state.store.update_conversation_operator(target, Some(operator_id)) {
                        warn!("Failed to store dialog operator: {e}");
                    }
                    if bot
                        .send_message(ChatId(target), "👨‍💻 An operator has joined the conversation.")
                        .await
                        .is_err()
                    {
                        warn!("Could not notify user {target} about the manual dialog");
                    }
                    bot.send_message(
                        msg.chat.id,
                        format!("Dialog with user {target} started. Send /end to finish."),
                    )
                    .await?;
                }
                Err(e) => {
                    bot.send_message(msg.chat.id, e.to_string()).await?;
                }
            }
        }
    }
    Ok(())
}

// ==================== FREE TEXT ====================

async fn handle_free_text(
    bot: &Bot,
    msg: &Message,
    user: &User,
    text: &str,
    state: &BotState,
) -> ResponseResult<()> {
    let sender_id = user.id.0 as i64;
    let is_operator = state.config.is_owner(user.id);

    match state.router.relay_target(sender_id, is_operator) {
        Ok(RelayTarget::ToUser(user_id)) => {
            // Delivery is best effort; the message still goes into the log.
            if bot.send_message(ChatId(user_id), text).await.is_err() {
                warn!("Could not deliver operator message to user {user_id}");
                bot.send_message(
                    msg.chat.id,
                    "Could not deliver your message. The user may have blocked the bot.",
                )
                .await?;
            }
            record_relayed(state, user_id, text, true);
        }
        Ok(RelayTarget::ToOperator(operator_id)) => {
            let forwarded = format!("{} ({sender_id}):\n{text}", display_name(user));
            if bot.send_message(ChatId(operator_id), forwarded).await.is_err() {
                warn!("Could not deliver message from {sender_id} to operator {operator_id}");
                bot.send_message(
                    msg.chat.id,
                    "Sorry, we couldn't reach the operator right now. Your message was saved.",
                )
                .await?;
            }
            record_relayed(state, sender_id, text, false);
        }
        Ok(RelayTarget::NewQuestion) => {
            handle_new_question(bot, msg, user, text, state).await?;
        }
        Err(RouterError::NoActiveConversation) => {
            // Operators only; end users always fall through to the
            // new-question flow.
            bot.send_message(msg.chat.id, "You have no active dialog. See /questions.").await?;
        }
        Err(e) => {
            warn!("Unexpected relay error for {sender_id}: {e}");
        }
    }
    Ok(())
}

/// Log a relayed message and refresh the conversation snippet. Runs
/// whether or not the Telegram delivery succeeded.
fn record_relayed(state: &BotState, user_id: i64, text: &str, from_operator: bool) {
    state.router.touch(user_id, &snippet(text));
    if let Err(e) = state.store.insert_message(user_id, text, from_operator) {
        warn!("Failed to log relayed message for {user_id}: {e}");
    }
}

async fn handle_new_question(
    bot: &Bot,
    msg: &Message,
    user: &User,
    text: &str,
    state: &BotState,
) -> ResponseResult<()> {
    let user_id = user.id.0 as i64;
    let snip = snippet(text);
    let created = state.router.open(user_id, ConversationKind::Question, &snip);

    if created {
        if let Err(e) = state.store.record_contact(&profile_of(user), ConversationKind::Question, text) {
            warn!("Failed to record question from {user_id}: {e}");
        }
        broadcast_claimable(bot, state, user_id, ConversationKind::Question, &snip).await;
        bot.send_message(
            msg.chat.id,
            "✅ Your question was sent to our operators. You'll get a reply right here.",
        )
        .await?;
    } else {
        // Follow-up before anyone claimed; just extend the open question.
        if let Err(e) = state.store.insert_conversation(user_id, ConversationKind::Question, &snip) {
            warn!("Failed to refresh conversation for {user_id}: {e}");
        }
        if let Err(e) = state.store.insert_message(user_id, text, false) {
            warn!("Failed to log follow-up from {user_id}: {e}");
        }
        bot.send_message(msg.chat.id, "➕ Added to your open question.").await?;
    }
    Ok(())
}

/// Send the conversation summary with a claim button to every operator.
/// First claim wins; the rest get a non-fatal "already taken" notice.
async fn broadcast_claimable(
    bot: &Bot,
    state: &BotState,
    user_id: i64,
    kind: ConversationKind,
    snip: &str,
) {
    for operator_id in state.config.operator_ids() {
        let result = bot
            .send_message(
                ChatId(operator_id),
                format!("🔔 {} from user {user_id}:\n{snip}", kind.label()),
            )
            .reply_markup(keyboards::claim_keyboard(user_id))
            .await;
        if let Err(e) = result {
            warn!("Failed to notify operator {operator_id}: {e}");
        }
    }
}

// ==================== ORDERS ====================

async fn handle_raw_order(
    bot: &Bot,
    msg: &Message,
    user: &User,
    args: &str,
    state: &BotState,
) -> ResponseResult<()> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    let Some((token, items)) = parts.split_first() else {
        bot.send_message(msg.chat.id, "Usage: /order <id> <Service-Plan-Period-Price>...").await?;
        return Ok(());
    };

    let parsed = match order::parse_order(items) {
        Ok(p) => p,
        Err(e) => {
            bot.send_message(
                msg.chat.id,
                format!("Could not read that order ({e}). Expected items like Cha-Bas-1_m-100."),
            )
            .await?;
            return Ok(());
        }
    };

    let user_id = user.id.0 as i64;
    let mut lines = vec![format!("🧾 Order {token}:")];
    for item in &parsed.items {
        lines.push(format!(
            "• {}, {}, {} — {} {}",
            item.service_name, item.plan_name, item.period_name, item.price, state.config.currency
        ));
    }
    lines.push(format!("Total: {} {}", parsed.total, state.config.currency));
    let confirmation = lines.join("\n");

    let snip = snippet(&format!("{token}: {} item(s), total {}", parsed.items.len(), parsed.total));
    state.router.open(user_id, ConversationKind::Order, &snip);
    if let Err(e) = state.store.record_contact(&profile_of(user), ConversationKind::Order, &confirmation) {
        warn!("Failed to record raw order from {user_id}: {e}");
    }
    broadcast_claimable(bot, state, user_id, ConversationKind::Order, &snip).await;

    bot.send_message(msg.chat.id, format!("{confirmation}\n\nAn operator will confirm shortly."))
        .await?;
    Ok(())
}

// ==================== END DIALOG ====================

async fn handle_end(bot: &Bot, msg: &Message, user: &User, state: &BotState) -> ResponseResult<()> {
    let sender_id = user.id.0 as i64;
    let is_operator = state.config.is_owner(user.id);

    match state.router.end(sender_id, is_operator) {
        Ok(ended) => {
            if let Err(e) = state.store.delete_conversation(ended.user_id) {
                warn!("Failed to delete conversation row for {}: {e}", ended.user_id);
            }
            if is_operator {
                if bot
                    .send_message(
                        ChatId(ended.user_id),
                        "The operator has closed this conversation. Send a new message any time.",
                    )
                    .await
                    .is_err()
                {
                    warn!("Could not notify user {} about the ended dialog", ended.user_id);
                }
                bot.send_message(msg.chat.id, format!("Dialog with user {} ended.", ended.user_id))
                    .await?;
            } else {
                if let Some(operator_id) = ended.operator {
                    if bot
                        .send_message(
                            ChatId(operator_id),
                            format!("User {sender_id} ended the conversation."),
                        )
                        .await
                        .is_err()
                    {
                        warn!("Could not notify operator {operator_id} about the ended dialog");
                    }
                }
                bot.send_message(msg.chat.id, "Conversation ended. Thanks for writing in!").await?;
            }
        }
        Err(_) => {
            // Informational, not an error page.
            let reply = if is_operator {
                "You have no active dialog."
            } else {
                "You have no active conversation."
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
    }
    Ok(())
}

// ==================== CALLBACKS ====================

pub async fn handle_callback(bot: Bot, q: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(data) = q.data.clone() else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    let Some(callback) = Callback::parse(&data) else {
        warn!("Unknown callback token: {data:?}");
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    let user_id = q.from.id.0 as i64;

    match callback {
        Callback::Menu => {
            ack(&bot, &q).await?;
            show(&bot, &q, "Pick an option below.", keyboards::main_menu()).await?;
        }
        Callback::Catalog => {
            ack(&bot, &q).await?;
            show(&bot, &q, "Choose a service:", keyboards::services_keyboard()).await?;
        }
        Callback::Digital => {
            ack(&bot, &q).await?;
            show(&bot, &q, "Digital store:", keyboards::digital_keyboard(&state.config.currency))
                .await?;
        }
        Callback::Ask => {
            ack(&bot, &q).await?;
            bot.send_message(
                ChatId(user_id),
                "✍️ Just type your question here and the first free operator will pick it up.",
            )
            .await?;
        }
        Callback::Channel => {
            ack(&bot, &q).await?;
            let reply = match &state.config.channel_link {
                Some(link) => format!("📣 Follow us: {link}"),
                None => "No channel configured yet.".to_string(),
            };
            bot.send_message(ChatId(user_id), reply).await?;
        }
        Callback::Service(service) => {
            ack(&bot, &q).await?;
            match crate::bot::catalog::service_name(&service) {
                Some(name) => {
                    show(
                        &bot,
                        &q,
                        &format!("{name} — choose a plan:"),
                        keyboards::plans_keyboard(&service),
                    )
                    .await?;
                }
                None => {
                    show(&bot, &q, "That service is gone. Choose another:", keyboards::services_keyboard())
                        .await?;
                }
            }
        }
        Callback::Plan(service, plan) => {
            ack(&bot, &q).await?;
            show(
                &bot,
                &q,
                "Choose a period:",
                keyboards::periods_keyboard(&service, &plan, &state.config.currency),
            )
            .await?;
        }
        Callback::Buy(service, plan, period) => {
            ack(&bot, &q).await?;
            match crate::bot::catalog::entry(&service, &plan, &period) {
                Some(entry) => {
                    let pending = order::subscription_order(user_id, entry);
                    let text = format!(
                        "🧾 {}\nPrice: {} {}\nOrder ref: {}\n\nOr submit it later with:\n{}",
                        pending.summary,
                        pending.price,
                        state.config.currency,
                        pending.order_id,
                        pending.command,
                    );
                    state.pending_orders.lock().await.insert(user_id, pending);
                    show(&bot, &q, &text, keyboards::confirm_keyboard()).await?;
                }
                None => {
                    show(&bot, &q, "That option is no longer available.", keyboards::services_keyboard())
                        .await?;
                }
            }
        }
        Callback::Product(id) => {
            ack(&bot, &q).await?;
            match crate::bot::catalog::digital_product(&id) {
                Some(product) => {
                    let pending = order::digital_order(user_id, product);
                    let text = format!(
                        "🧾 {}\nPrice: {} {}\nOrder ref: {}",
                        pending.summary, pending.price, state.config.currency, pending.order_id,
                    );
                    state.pending_orders.lock().await.insert(user_id, pending);
                    show(&bot, &q, &text, keyboards::confirm_keyboard()).await?;
                }
                None => {
                    show(&bot, &q, "That product is gone.", keyboards::digital_keyboard(&state.config.currency))
                        .await?;
                }
            }
        }
        Callback::Pay => {
            ack(&bot, &q).await?;
            handle_pay(&bot, &q, user_id, &state).await?;
        }
        Callback::Cancel => {
            let removed = state.pending_orders.lock().await.remove(&user_id).is_some();
            ack(&bot, &q).await?;
            let reply = if removed { "Order cancelled." } else { "Nothing to cancel." };
            bot.send_message(ChatId(user_id), reply).await?;
        }
        Callback::Claim(target) => {
            handle_claim(&bot, &q, target, &state).await?;
        }
    }
    Ok(())
}

async fn handle_pay(bot: &Bot, q: &CallbackQuery, user_id: i64, state: &BotState) -> ResponseResult<()> {
    let pending = state.pending_orders.lock().await.get(&user_id).cloned();
    let Some(pending) = pending else {
        bot.send_message(ChatId(user_id), "Nothing to pay for — pick something first.").await?;
        return Ok(());
    };

    let mut reply = format!(
        "Order {} — {} ({} {})",
        pending.order_id, pending.summary, pending.price, state.config.currency
    );
    if let Some(payments) = &state.payments {
        match payments
            .create_invoice(pending.price, &state.config.currency, &pending.order_id, &pending.summary)
            .await
        {
            Ok(invoice) => {
                reply.push_str(&format!("\n💳 Pay here: {}", invoice.invoice_url));
            }
            Err(_) => {
                // Keep the pending order so the user can retry.
                bot.send_message(
                    ChatId(user_id),
                    "Sorry, the payment service is unavailable right now. Please try again in a minute.",
                )
                .await?;
                return Ok(());
            }
        }
    } else {
        reply.push_str("\nAn operator will contact you to arrange payment.");
    }

    // Hand the order off to the operators.
    let snip = snippet(&format!("{}: {}", pending.order_id, pending.summary));
    state.router.open(user_id, ConversationKind::Order, &snip);
    let record = format!(
        "Order {} — {} ({} {})",
        pending.order_id, pending.summary, pending.price, state.config.currency
    );
    if let Err(e) = state.store.record_contact(&profile_of(&q.from), ConversationKind::Order, &record) {
        warn!("Failed to record order from {user_id}: {e}");
    }
    broadcast_claimable(bot, state, user_id, ConversationKind::Order, &snip).await;

    state.pending_orders.lock().await.remove(&user_id);
    bot.send_message(ChatId(user_id), reply).await?;
    Ok(())
}

async fn handle_claim(bot: &Bot, q: &CallbackQuery, target: i64, state: &BotState) -> ResponseResult<()> {
    // Re-check identity: claim buttons only go to operators, but the token
    // itself proves nothing.
    if !state.config.is_owner(q.from.id) {
        bot.answer_callback_query(q.id.clone()).text(NO_ACCESS).await?;
        return Ok(());
    }
    let operator_id = q.from.id.0 as i64;

    match state.router.claim(operator_id, target) {
        Ok(claimed) => {
            bot.answer_callback_query(q.id.clone()).text("The conversation is yours.").await?;
            if let Err(e) = state.store.update_conversation_operator(target, Some(operator_id)) {
                warn!("Failed to store operator assignment: {e}");
            }
            if bot
                .send_message(ChatId(target), "👨‍💻 An operator has joined the conversation.")
                .await
                .is_err()
            {
                // The claim stands even if the notification fails.
                warn!("Could not notify user {target} about the claim");
            }
            bot.send_message(
                ChatId(operator_id),
                format!(
                    "You are now talking to user {} [{}].\nLast message: {}\nSend /end to finish.",
                    claimed.user_id,
                    claimed.kind.label(),
                    if claimed.snippet.is_empty() { "—" } else { &claimed.snippet },
                ),
            )
            .await?;
        }
        Err(RouterError::AlreadyClaimed { .. }) => {
            bot.answer_callback_query(q.id.clone())
                .text("Already taken by another operator.")
                .await?;
        }
        Err(RouterError::OperatorBusy { user }) => {
            bot.answer_callback_query(q.id.clone())
                .text(format!("Finish your dialog with user {user} first (/end)."))
                .await?;
        }
        Err(e) => {
            bot.answer_callback_query(q.id.clone())
                .text("This conversation no longer exists.")
                .await?;
            info!("Claim of {target} by {operator_id} failed: {e}");
        }
    }
    Ok(())
}

async fn ack(bot: &Bot, q: &CallbackQuery) -> ResponseResult<()> {
    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}

/// Edit the menu message in place when possible.
async fn show(
    bot: &Bot,
    q: &CallbackQuery,
    text: &str,
    markup: InlineKeyboardMarkup,
) -> ResponseResult<()> {
    match &q.message {
        Some(msg) => {
            // Re-pressing the same button makes this a no-op edit; Telegram
            // rejects those, which is harmless.
            if let Err(e) = bot.edit_message_text(msg.chat().id, msg.id(), text).reply_markup(markup).await {
                warn!("Failed to update menu: {e}");
            }
        }
        None => {
            bot.send_message(ChatId(q.from.id.0 as i64), text).reply_markup(markup).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::store::Store;
    use crate::config::Config;
    use teloxide::types::UserId;

    fn test_state() -> BotState {
        let config = Config {
            owner_ids: vec![UserId(1001)],
            telegram_bot_token: String::new(),
            channel_link: None,
            payment_api_url: None,
            payment_api_key: String::new(),
            currency: "USD".to_string(),
            data_dir: std::path::PathBuf::from("."),
            history_limit: 20,
        };
        BotState::new(config, "lavka_bot".to_string(), Store::in_memory())
    }

    #[test]
    fn test_record_relayed_logs_both_directions() {
        // The log write is independent of Telegram delivery: it must land
        // even when the recipient is unreachable.
        let state = test_state();
        state.router.open(42, ConversationKind::Question, "q");

        record_relayed(&state, 42, "are you there?", true);
        record_relayed(&state, 42, "yes", false);

        let history = state.store.query_history(42, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].from_operator);
        assert!(!history[1].from_operator);
        assert_eq!(state.router.active()[0].snippet, "yes");
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        assert_eq!(snippet("short"), "short");
        let long = "й".repeat(100);
        let snip = snippet(&long);
        assert_eq!(snip.chars().count(), SNIPPET_CHARS + 1);
        assert!(snip.ends_with('…'));
    }

    #[test]
    fn test_chunk_lines_respects_limit() {
        let text = (0..100).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let chunks = chunk_lines(&text, 50);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 50);
        }
        assert_eq!(chunks.join("\n"), text);
    }

    #[test]
    fn test_chunk_lines_keeps_oversized_line_whole() {
        let long_line = "x".repeat(100);
        let chunks = chunk_lines(&long_line, 50);
        assert_eq!(chunks, vec![long_line]);
    }
}
