//! Transcription de l'historique d'un ticket

use std::{fmt::Write, sync::Arc};

use chrono::{DateTime, Utc};

use crate::{config::TranscriptFormat, log_debug};
use super::platform::{ChatPlatform, HistoryMessage, PlatformResult};

/// Taille maximale d'une page d'historique
const PAGE_SIZE: u8 = 100;

/// Informations du ticket affichées en tête de transcription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptHeader {
    pub guild_id: u64,
    pub channel_id: u64,
    pub ticket_number: i32,
    pub creator_id: u64,
    pub generated_by: u64,
    pub generated_at: DateTime<Utc>,
}

pub trait TranscriptRenderer: Send + Sync {
    /// `html` ou `txt`
    fn format(&self) -> &'static str;
    fn render(&self, header: &TranscriptHeader, messages: &[HistoryMessage]) -> String;
    fn filename(&self, header: &TranscriptHeader) -> String {
        format!("ticket-{}.{}", header.ticket_number, self.format())
    }
}

pub fn renderer_for(format: TranscriptFormat) -> Arc<dyn TranscriptRenderer> {
    match format {
        TranscriptFormat::Html => Arc::new(HtmlRenderer),
        TranscriptFormat::Txt => Arc::new(TextRenderer),
    }
}

/// Lit tout l'historique d'un salon, du plus ancien au plus récent
pub async fn fetch_history(platform: &dyn ChatPlatform, channel_id: u64) -> PlatformResult<Vec<HistoryMessage>> {
    let mut messages = Vec::new();
    let mut before = None;
    loop {
        let page = platform.fetch_message_history(channel_id, before, PAGE_SIZE).await?;
        let last_page = page.len() < PAGE_SIZE as usize;
        before = page.last().map(|m| m.id);
        messages.extend(page);
        if last_page || before.is_none() {
            break;
        }
    }
    messages.reverse();
    log_debug!("{} messages lus dans le salon {}", messages.len(), channel_id);
    Ok(messages)
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlRenderer;

impl TranscriptRenderer for HtmlRenderer {
    fn format(&self) -> &'static str {
        "html"
    }
    fn render(&self, header: &TranscriptHeader, messages: &[HistoryMessage]) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "<!DOCTYPE html>\n<html lang=\"fr\">\n<head>\n<meta charset=\"utf-8\">\n<title>Ticket #{number}</title>\n\
            <style>body{{font-family:sans-serif;background:#313338;color:#dbdee1}}\
            .message{{margin:8px 0}}.author{{font-weight:bold;color:#f2f3f5}}\
            .time{{color:#949ba4;font-size:12px;margin-left:6px}}.attachment{{display:block;color:#00a8fc}}</style>\n\
            </head>\n<body>\n<h1>Ticket #{number}</h1>\n\
            <p>Serveur {guild} · salon {channel} · créé par {creator} · généré par {by} le {at}</p>\n",
            number = header.ticket_number,
            guild = header.guild_id,
            channel = header.channel_id,
            creator = header.creator_id,
            by = header.generated_by,
            at = header.generated_at.format("%d/%m/%Y %H:%M UTC"),
        );
        for message in messages {
            let _ = write!(
                out,
                "<div class=\"message\" id=\"m{}\"><span class=\"author\">{}</span><span class=\"time\">{}</span>\
                <div class=\"content\">{}</div>",
                message.id,
                escape_html(&message.author_name),
                message.timestamp.format("%d/%m/%Y %H:%M"),
                escape_html(&message.content).replace('\n', "<br>"),
            );
            for url in &message.attachments {
                let url = escape_html(url);
                let _ = write!(out, "<a class=\"attachment\" href=\"{0}\">{0}</a>", url);
            }
            out.push_str("</div>\n");
        }
        out.push_str("</body>\n</html>\n");
        out
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TextRenderer;

impl TranscriptRenderer for TextRenderer {
    fn format(&self) -> &'static str {
        "txt"
    }
    fn render(&self, header: &TranscriptHeader, messages: &[HistoryMessage]) -> String {
        let mut out = format!(
            "Ticket #{} - serveur {} - salon {}\nCréé par {} - généré par {} le {}\n\n",
            header.ticket_number,
            header.guild_id,
            header.channel_id,
            header.creator_id,
            header.generated_by,
            header.generated_at.format("%d/%m/%Y %H:%M UTC"),
        );
        for message in messages {
            let _ = writeln!(
                out,
                "[{}] {}: {}",
                message.timestamp.format("%d/%m/%Y %H:%M"),
                message.author_name,
                message.content
            );
            for url in &message.attachments {
                let _ = writeln!(out, "    pièce jointe: {}", url);
            }
        }
        out
    }
}
