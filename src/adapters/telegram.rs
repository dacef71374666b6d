use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::adapters::csv_log::CsvChangeLog;
use crate::adapters::vendista::{StatusSource, TerminalInfo};
use crate::domain::status::TerminalStatus;

pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

const SEND_TIMEOUT: Duration = Duration::from_secs(15);
const LONG_POLL_TIMEOUT_SECONDS: u64 = 30;
// getUpdates must outlive the server-side long-poll window.
const LONG_POLL_REQUEST_TIMEOUT: Duration = Duration::from_secs(LONG_POLL_TIMEOUT_SECONDS + 10);
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("failed to build telegram http client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("telegram request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telegram api rejected the call: {0}")]
    Api(String),
    #[error("failed to read change log file: {0}")]
    ReadLogFile(#[source] std::io::Error),
}

/// Broadcast side of the monitor. Delivery failures are the caller's to log;
/// they must never abort the polling loop.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify_transition(
        &self,
        terminal_id: i64,
        previous: TerminalStatus,
        current: TerminalStatus,
        back_online: bool,
    ) -> Result<(), TelegramError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug)]
pub struct TelegramNotifier {
    http: reqwest::Client,
    base_url: String,
    token: String,
    group_id: String,
}

impl TelegramNotifier {
    pub fn new(base_url: &str, token: &str, group_id: &str) -> Result<Self, TelegramError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(TelegramError::ClientBuild)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            group_id: group_id.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.token)
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), TelegramError> {
        let response = self
            .http
            .post(self.method_url("sendMessage"))
            .timeout(SEND_TIMEOUT)
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await?;

        let body: ApiResponse<serde_json::Value> = response.json().await?;
        if !body.ok {
            return Err(TelegramError::Api(
                body.description.unwrap_or_else(|| "sendMessage failed".to_string()),
            ));
        }
        Ok(())
    }

    pub async fn send_document(
        &self,
        chat_id: &str,
        path: &std::path::Path,
        caption: &str,
    ) -> Result<(), TelegramError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(TelegramError::ReadLogFile)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.csv".to_string());

        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part(
                "document",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );

        let response = self
            .http
            .post(self.method_url("sendDocument"))
            .timeout(SEND_TIMEOUT)
            .multipart(form)
            .send()
            .await?;

        let body: ApiResponse<serde_json::Value> = response.json().await?;
        if !body.ok {
            return Err(TelegramError::Api(
                body.description.unwrap_or_else(|| "sendDocument failed".to_string()),
            ));
        }
        Ok(())
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError> {
        let response = self
            .http
            .post(self.method_url("getUpdates"))
            .timeout(LONG_POLL_REQUEST_TIMEOUT)
            .json(&json!({
                "timeout": LONG_POLL_TIMEOUT_SECONDS,
                "offset": offset,
                "allowed_updates": ["message"],
            }))
            .send()
            .await?;

        let body: ApiResponse<Vec<Update>> = response.json().await?;
        if !body.ok {
            return Err(TelegramError::Api(
                body.description.unwrap_or_else(|| "getUpdates failed".to_string()),
            ));
        }
        Ok(body.result.unwrap_or_default())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_transition(
        &self,
        terminal_id: i64,
        previous: TerminalStatus,
        current: TerminalStatus,
        back_online: bool,
    ) -> Result<(), TelegramError> {
        let message = transition_message(terminal_id, previous, current, back_online);
        self.send_message(&self.group_id, &message).await?;
        tracing::info!(terminal_id, %message, "telegram notification sent");
        Ok(())
    }
}

pub fn transition_message(
    terminal_id: i64,
    previous: TerminalStatus,
    current: TerminalStatus,
    back_online: bool,
) -> String {
    if back_online {
        format!(
            "✅ Терминал {terminal_id} вернулся на связь!\nСтатус: {} (было: {})",
            current.name(),
            previous.name()
        )
    } else {
        format!(
            "⚠️ Терминал {terminal_id} ушел со связи!\nСтатус: {} (было: {})",
            current.name(),
            previous.name()
        )
    }
}

fn terminal_status_message(terminal_id: i64, info: &TerminalInfo) -> String {
    format!(
        "Терминал {terminal_id}\nСтатус: {} ({})\nСерийный номер: {}\nПоследний онлайн: {}",
        info.status.name(),
        info.status.code(),
        info.serial_number.as_deref().unwrap_or("N/A"),
        info.last_online_time.as_deref().unwrap_or("N/A"),
    )
}

const HELP_TEXT: &str = "Доступные команды:\n\
/status <terminal_id> - Проверить текущий статус терминала\n\
/csv - Получить CSV файл с логом статусов\n\
/help - Показать эту справку";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Status { argument: Option<String> },
    Csv,
    Help,
}

fn parse_command(text: &str) -> Option<Command> {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("/status") {
        let argument = rest.trim();
        return Some(Command::Status {
            argument: (!argument.is_empty()).then(|| argument.to_string()),
        });
    }
    if trimmed.starts_with("/csv") {
        return Some(Command::Csv);
    }
    if trimmed.starts_with("/help") {
        return Some(Command::Help);
    }
    None
}

/// Long-polls the bot API and serves the interactive commands. Transport
/// errors back off and continue; the loop only ends with the process.
pub async fn run_command_loop<S: StatusSource>(
    bot: Arc<TelegramNotifier>,
    source: Arc<S>,
    change_log: CsvChangeLog,
) {
    let mut offset = 0_i64;

    loop {
        let updates = match bot.get_updates(offset).await {
            Ok(updates) => updates,
            Err(error) => {
                tracing::warn!(error = %error, "telegram update polling failed");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);

            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text.as_deref() else {
                continue;
            };
            let Some(command) = parse_command(text) else {
                continue;
            };

            if let Err(error) =
                handle_command(&bot, source.as_ref(), &change_log, message.chat.id, command).await
            {
                tracing::warn!(error = %error, chat_id = message.chat.id, "command handling failed");
            }
        }
    }
}

async fn handle_command<S: StatusSource>(
    bot: &TelegramNotifier,
    source: &S,
    change_log: &CsvChangeLog,
    chat_id: i64,
    command: Command,
) -> Result<(), TelegramError> {
    let chat = chat_id.to_string();

    match command {
        Command::Status { argument: None } => {
            bot.send_message(&chat, "Использование: /status <terminal_id>")
                .await
        }
        Command::Status {
            argument: Some(raw),
        } => {
            let Ok(terminal_id) = raw.parse::<i64>() else {
                return bot.send_message(&chat, "Неверный ID терминала").await;
            };

            bot.send_message(&chat, &format!("Проверяю статус терминала {terminal_id}..."))
                .await?;

            match source.get_info(terminal_id).await {
                Ok(info) => {
                    bot.send_message(&chat, &terminal_status_message(terminal_id, &info))
                        .await
                }
                Err(error) => bot.send_message(&chat, &format!("Ошибка: {error}")).await,
            }
        }
        Command::Csv => {
            if !change_log.path().exists() {
                return bot.send_message(&chat, "CSV файл не найден").await;
            }
            bot.send_document(&chat, change_log.path(), "Лог статусов терминалов")
                .await
        }
        Command::Help => bot.send_message(&chat, HELP_TEXT).await,
    }
}
