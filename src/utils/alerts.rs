//! Alert service for Telegram and WebSocket notifications

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::SinkError;
use crate::models::CabalAlert;
use crate::providers::okx::known_symbol;
use crate::providers::{with_retry, RetryPolicy};
use crate::utils::shorten_address;

const HISTORY_CAPACITY: usize = 500;
const MAX_LISTED_TOKENS: usize = 10;
const TELEGRAM_API: &str = "https://api.telegram.org";

/// Receives every alert the monitor produces
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, alert: &CabalAlert) -> Result<(), SinkError>;
}

/// Alert as kept in history and pushed to dashboard subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub telegram_api_url: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_topic_id: Option<i64>,
    /// Zero disables the per-token cooldown
    pub cooldown: Duration,
    /// Zero means unlimited
    pub max_per_minute: u32,
    pub retry: RetryPolicy,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            telegram_api_url: TELEGRAM_API.to_string(),
            telegram_bot_token: None,
            telegram_chat_id: None,
            telegram_topic_id: None,
            cooldown: Duration::ZERO,
            max_per_minute: 0,
            retry: RetryPolicy::default(),
        }
    }
}

impl AlertSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            telegram_api_url: TELEGRAM_API.to_string(),
            telegram_bot_token: config.telegram_bot_token.clone(),
            telegram_chat_id: config.telegram_chat_id.clone(),
            telegram_topic_id: config.telegram_topic_id,
            cooldown: Duration::from_secs(config.alert_cooldown_secs),
            max_per_minute: config.max_alerts_per_minute,
            retry: RetryPolicy::from_config(config),
        }
    }

    fn telegram(&self) -> Option<(&str, &str)> {
        match (&self.telegram_bot_token, &self.telegram_chat_id) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                Some((token.as_str(), chat.as_str()))
            }
            _ => None,
        }
    }
}

/// Sliding one-minute window over sent alerts
struct AlertRateLimiter {
    timestamps: VecDeque<i64>,
    max_per_minute: u32,
}

impl AlertRateLimiter {
    fn new(max_per_minute: u32) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_per_minute as usize),
            max_per_minute,
        }
    }

    fn can_send(&mut self) -> bool {
        if self.max_per_minute == 0 {
            return true;
        }

        let now = Utc::now().timestamp();
        let one_minute_ago = now - 60;

        while let Some(&ts) = self.timestamps.front() {
            if ts < one_minute_ago {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }

        if self.timestamps.len() < self.max_per_minute as usize {
            self.timestamps.push_back(now);
            true
        } else {
            false
        }
    }
}

/// Notification sink: history, dashboard broadcast and Telegram delivery
pub struct AlertService {
    settings: AlertSettings,
    telegram_client: Option<reqwest::Client>,
    alert_history: RwLock<VecDeque<AlertRecord>>,
    alert_sender: broadcast::Sender<AlertRecord>,
    next_id: AtomicI64,
    rate_limiter: Mutex<AlertRateLimiter>,
    last_sent: DashMap<String, Instant>,
}

impl AlertService {
    /// `client` is the shared HTTP client; its request timeout bounds every Telegram call
    pub fn new(settings: AlertSettings, client: reqwest::Client) -> Self {
        let telegram_client = settings.telegram().map(|_| client);

        if telegram_client.is_some() {
            info!(target: "ALERTS", "Telegram bot initialized");
        } else {
            info!(target: "ALERTS", "Telegram not configured, alerts go to dashboard only");
        }

        let (alert_sender, _) = broadcast::channel(256);

        Self {
            rate_limiter: Mutex::new(AlertRateLimiter::new(settings.max_per_minute)),
            settings,
            telegram_client,
            alert_history: RwLock::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
            alert_sender,
            next_id: AtomicI64::new(1),
            last_sent: DashMap::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertRecord> {
        self.alert_sender.subscribe()
    }

    /// Most recent first
    pub fn get_recent_alerts(&self, limit: usize) -> Vec<AlertRecord> {
        self.alert_history.read().iter().take(limit).cloned().collect()
    }

    fn check_cooldown(&self, token: &str) -> Result<(), SinkError> {
        if self.settings.cooldown.is_zero() {
            return Ok(());
        }
        match self.last_sent.get(token) {
            Some(sent) if sent.elapsed() < self.settings.cooldown => Err(SinkError::Cooldown {
                token: token.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn mark_sent(&self, token: &str) {
        if self.settings.cooldown.is_zero() {
            return;
        }
        let cooldown = self.settings.cooldown;
        self.last_sent.retain(|_, sent| sent.elapsed() < cooldown);
        self.last_sent.insert(token.to_string(), Instant::now());
    }

    fn record(&self, alert: &CabalAlert, message: String) -> AlertRecord {
        let record = AlertRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            alert_type: "cabal".to_string(),
            title: format!("Cabal activity on {}", alert.token.symbol),
            message,
            data: serde_json::to_value(alert).unwrap_or(serde_json::Value::Null),
            timestamp: alert.generated_at.to_rfc3339(),
        };

        {
            let mut history = self.alert_history.write();
            history.push_front(record.clone());
            history.truncate(HISTORY_CAPACITY);
        }

        // No subscribers is fine
        let _ = self.alert_sender.send(record.clone());
        record
    }

    async fn send_telegram(&self, text: &str) -> Result<(), SinkError> {
        let (Some(client), Some((token, chat_id))) = (&self.telegram_client, self.settings.telegram())
        else {
            return Ok(());
        };

        let url = format!(
            "{}/bot{}/sendMessage",
            self.settings.telegram_api_url.trim_end_matches('/'),
            token
        );
        let mut params = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(topic) = self.settings.telegram_topic_id {
            params["message_thread_id"] = serde_json::json!(topic);
        }

        with_retry(&self.settings.retry, "telegram sendMessage", || {
            let request = client.post(&url).json(&params);
            async move {
                let response = request.send().await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(SinkError::Telegram {
                        status: status.as_u16(),
                        body,
                    });
                }
                Ok::<(), SinkError>(())
            }
        })
        .await
    }
}

#[async_trait]
impl NotificationSink for AlertService {
    async fn deliver(&self, alert: &CabalAlert) -> Result<(), SinkError> {
        let token = alert.token.contract_address.as_str();

        self.check_cooldown(token)?;
        let allowed = self.rate_limiter.lock().can_send();
        if !allowed {
            return Err(SinkError::RateLimited {
                per_minute: self.settings.max_per_minute,
            });
        }

        let message = format_message(alert);
        self.send_telegram(&message).await?;

        self.mark_sent(token);
        let record = self.record(alert, message);
        debug!(target: "ALERTS", "Alert #{} recorded for {}", record.id, alert.token.symbol);
        Ok(())
    }
}

// ============================================
// FORMATTING
// ============================================

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn format_usd(value: f64) -> String {
    if value >= 1_000_000.0 {
        format!("${:.2}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("${:.1}K", value / 1_000.0)
    } else {
        format!("${:.2}", value)
    }
}

fn token_label(token: &str, symbol: Option<&str>) -> String {
    let symbol = symbol
        .or_else(|| known_symbol(token))
        .map(str::to_string)
        .unwrap_or_else(|| shorten_address(token, 4));
    escape_html(&symbol)
}

/// Telegram HTML body for one alert
pub fn format_message(alert: &CabalAlert) -> String {
    let token = &alert.token;
    let stats = &alert.activity;
    let mut msg = String::new();

    let _ = writeln!(
        msg,
        "🚨 <b>Cabal alert</b> <a href=\"https://gmgn.ai/sol/token/{}\">{}</a>",
        token.contract_address,
        escape_html(&token.symbol)
    );
    let _ = writeln!(msg, "<code>{}</code>", token.contract_address);
    let _ = writeln!(msg);
    let _ = writeln!(
        msg,
        "📈 Price: +{:.2}% (${:.8} → ${:.8})",
        alert.price_increase_pct,
        alert.previous_price,
        token.price
    );
    let _ = writeln!(msg, "💰 Market cap: {}", format_usd(token.market_cap));
    let _ = writeln!(
        msg,
        "👥 Suspicious traders: {} of {} profiled",
        alert.suspicious.len(),
        stats.profiled
    );

    if !alert.cluster.entries.is_empty() {
        let _ = writeln!(msg);
        let _ = writeln!(msg, "🔗 <b>Common holdings</b>");
        for entry in alert.cluster.entries.iter().take(MAX_LISTED_TOKENS) {
            let _ = writeln!(
                msg,
                "• {}: {} addresses, {}",
                token_label(&entry.token, entry.symbol.as_deref()),
                entry.address_count(),
                format_usd(entry.total_value_usd)
            );
        }
    }

    if !alert.watched_tokens.is_empty() {
        let watched: Vec<String> = alert.watched_tokens.iter().map(|t| token_label(t, None)).collect();
        let _ = writeln!(msg, "👀 Watch-list tokens: {}", watched.join(", "));
    }

    let _ = writeln!(msg);
    let _ = writeln!(msg, "📊 <b>Low activity</b>");
    let _ = writeln!(
        msg,
        "7d: {}/{} ({:.1}%)",
        stats.low_7d,
        stats.profiled,
        stats.low_7d_pct()
    );
    let _ = write!(
        msg,
        "30d: {}/{} ({:.1}%)",
        stats.low_30d,
        stats.profiled,
        stats.low_30d_pct()
    );

    msg
}
