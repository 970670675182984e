//! Accès à la plateforme de discussion.
//!
//! Le moteur de tickets ne manipule que le trait [`ChatPlatform`] et les types de ce module.
//! [`SerenityPlatform`] l'implémente au-dessus de l'API HTTP de Discord.

use std::{borrow::Cow, collections::HashMap, fmt, sync::Arc};

use chrono::{DateTime, TimeZone, Utc};
use serenity::{
    async_trait,
    builder::{CreateComponents, CreateEmbed},
    http::{Http, HttpError},
    model::{
        application::component::ButtonStyle,
        channel::{AttachmentType, Channel, ChannelType, PermissionOverwrite, PermissionOverwriteType, ReactionType},
        guild::{Member, Role},
        id::{ChannelId, EmojiId, GuildId, MessageId, RoleId, UserId},
        permissions::Permissions,
    },
};

use crate::log_debug;

/// Destinataire d'une permission de salon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Principal {
    Role(u64),
    Member(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overwrite {
    pub target: Principal,
    pub allow: Permissions,
    pub deny: Permissions,
}

impl Overwrite {
    pub fn allow(target: Principal, allow: Permissions) -> Self {
        Self { target, allow, deny: Permissions::empty() }
    }
    pub fn deny(target: Principal, deny: Permissions) -> Self {
        Self { target, allow: Permissions::empty(), deny }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<u32>,
    pub fields: Vec<(String, String, bool)>,
    pub footer: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonKind {
    Primary,
    Secondary,
    Success,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
    pub description: Option<String>,
    pub emoji: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    Button { custom_id: String, label: String, kind: ButtonKind },
    Select { custom_id: String, placeholder: Option<String>, options: Vec<SelectOption> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Message à envoyer ou contenu de remplacement d'un message existant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub embed: Option<Embed>,
    /// Lignes de composants, une ligne par élément
    pub rows: Vec<Vec<Component>>,
    pub attachment: Option<Attachment>,
}

impl OutgoingMessage {
    pub fn text<S: Into<String>>(content: S) -> Self {
        Self { content: Some(content.into()), ..Default::default() }
    }
    pub fn embed(embed: Embed) -> Self {
        Self { embed: Some(embed), ..Default::default() }
    }
}

/// Message lu dans l'historique d'un salon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub content: String,
    pub attachments: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryInfo {
    pub id: u64,
    pub name: String,
    /// Nombre de salons rangés dans la catégorie
    pub channel_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub user_id: u64,
    pub display_name: String,
    pub bot: bool,
    pub roles: Vec<u64>,
    pub administrator: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSummary {
    pub id: u64,
    pub name: String,
    pub parent_id: Option<u64>,
    pub is_category: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    NotFound,
    MissingPermissions,
    /// La catégorie a atteint le nombre maximal de salons
    CategoryFull,
    Other(String),
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformError::NotFound => f.write_str("ressource introuvable"),
            PlatformError::MissingPermissions => f.write_str("permissions insuffisantes"),
            PlatformError::CategoryFull => f.write_str("catégorie pleine"),
            PlatformError::Other(e) => f.write_str(e),
        }
    }
}

impl std::error::Error for PlatformError {}

const CATEGORY_FULL_MESSAGE: &str = "Maximum number of channels in category";

impl From<serenity::Error> for PlatformError {
    fn from(err: serenity::Error) -> Self {
        if let serenity::Error::Http(ref http_err) = err {
            if let HttpError::UnsuccessfulRequest(ref resp) = **http_err {
                let full = resp.error.message.contains(CATEGORY_FULL_MESSAGE)
                    || resp.error.errors.iter().any(|e| e.message.contains(CATEGORY_FULL_MESSAGE));
                if full {
                    return PlatformError::CategoryFull;
                }
                match resp.error.code {
                    10003 | 10004 | 10007 | 10008 | 10011 | 10013 => return PlatformError::NotFound,
                    50001 | 50013 => return PlatformError::MissingPermissions,
                    _ => (),
                }
            }
        }
        PlatformError::Other(err.to_string())
    }
}

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Opérations distantes utilisées par les tickets.
///
/// Chaque appel peut être lent ou échouer. Les identifiants sont ceux de Discord.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn create_channel(&self, guild_id: u64, parent_id: u64, name: &str, overwrites: &[Overwrite]) -> PlatformResult<u64>;
    /// Déplace un salon. Avec `resync`, ses permissions sont remplacées par celles de la catégorie.
    async fn set_channel_parent(&self, channel_id: u64, parent_id: u64, resync: bool) -> PlatformResult<()>;
    async fn rename_channel(&self, channel_id: u64, name: &str) -> PlatformResult<()>;
    async fn set_permission_overwrite(&self, channel_id: u64, overwrite: &Overwrite) -> PlatformResult<()>;
    async fn send_message(&self, channel_id: u64, message: &OutgoingMessage) -> PlatformResult<u64>;
    async fn edit_message(&self, channel_id: u64, message_id: u64, message: &OutgoingMessage) -> PlatformResult<()>;
    async fn delete_message(&self, channel_id: u64, message_id: u64) -> PlatformResult<()>;
    async fn delete_channel(&self, channel_id: u64) -> PlatformResult<()>;
    /// Page de l'historique, du plus récent au plus ancien, avant le message `before`
    async fn fetch_message_history(&self, channel_id: u64, before: Option<u64>, limit: u8) -> PlatformResult<Vec<HistoryMessage>>;
    /// `None` si le salon n'existe pas ou n'est pas une catégorie
    async fn category_info(&self, guild_id: u64, category_id: u64) -> PlatformResult<Option<CategoryInfo>>;
    async fn bot_permissions(&self, guild_id: u64) -> PlatformResult<Permissions>;
    async fn member(&self, guild_id: u64, user_id: u64) -> PlatformResult<MemberInfo>;
    async fn add_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> PlatformResult<()>;
    async fn remove_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> PlatformResult<()>;
    async fn create_private_thread(&self, channel_id: u64, name: &str, members: &[u64]) -> PlatformResult<u64>;
    async fn send_direct_message(&self, user_id: u64, message: &OutgoingMessage) -> PlatformResult<u64>;
    async fn list_channels(&self, guild_id: u64) -> PlatformResult<Vec<ChannelSummary>>;
    async fn fetch_channel(&self, channel_id: u64) -> PlatformResult<ChannelSummary>;
    /// Premiers membres du serveur, au plus `limit`
    async fn list_members(&self, guild_id: u64, limit: u64) -> PlatformResult<Vec<MemberInfo>>;
    fn bot_id(&self) -> u64;
}

/// Implémentation Discord au travers du client HTTP de serenity
pub struct SerenityPlatform {
    http: Arc<Http>,
    bot_id: u64,
}

impl SerenityPlatform {
    pub fn new(http: Arc<Http>, bot_id: u64) -> Self {
        Self { http, bot_id }
    }
    fn http(&self) -> &Http {
        &self.http
    }
    /// Permissions effectives d'un membre à l'échelle du serveur
    async fn guild_permissions(&self, guild_id: u64, roles: &[RoleId]) -> PlatformResult<Permissions> {
        let guild_roles = GuildId(guild_id).roles(self.http()).await?;
        Ok(permissions_from_roles(guild_id, &guild_roles, roles))
    }
}

fn permissions_from_roles(guild_id: u64, guild_roles: &HashMap<RoleId, Role>, roles: &[RoleId]) -> Permissions {
    let mut permissions = guild_roles
        .get(&RoleId(guild_id))
        .map(|r| r.permissions)
        .unwrap_or_else(Permissions::empty);
    for role in roles {
        if let Some(role) = guild_roles.get(role) {
            permissions |= role.permissions;
        }
    }
    if permissions.contains(Permissions::ADMINISTRATOR) {
        permissions = Permissions::all();
    }
    permissions
}

fn to_member_info(member: &Member, permissions: Permissions) -> MemberInfo {
    MemberInfo {
        user_id: member.user.id.0,
        display_name: member.display_name().to_string(),
        bot: member.user.bot,
        roles: member.roles.iter().map(|r| r.0).collect(),
        administrator: permissions.contains(Permissions::ADMINISTRATOR),
    }
}

fn to_serenity_overwrite(overwrite: &Overwrite) -> PermissionOverwrite {
    PermissionOverwrite {
        allow: overwrite.allow,
        deny: overwrite.deny,
        kind: match overwrite.target {
            Principal::Role(id) => PermissionOverwriteType::Role(RoleId(id)),
            Principal::Member(id) => PermissionOverwriteType::Member(UserId(id)),
        },
    }
}

fn to_reaction(emoji: &str) -> ReactionType {
    match emoji.parse::<u64>() {
        Ok(id) => ReactionType::Custom { animated: false, id: EmojiId(id), name: None },
        Err(_) => ReactionType::Unicode(emoji.to_string()),
    }
}

fn build_embed<'a>(e: &'a mut CreateEmbed, embed: &Embed) -> &'a mut CreateEmbed {
    if let Some(title) = &embed.title {
        e.title(title);
    }
    if let Some(description) = &embed.description {
        e.description(description);
    }
    if let Some(color) = embed.color {
        e.color(color);
    }
    for (name, value, inline) in &embed.fields {
        e.field(name, value, *inline);
    }
    if let Some(footer) = &embed.footer {
        e.footer(|f| f.text(footer));
    }
    if let Some(image) = &embed.image {
        e.image(image);
    }
    e
}

pub(super) fn build_components<'a>(c: &'a mut CreateComponents, rows: &[Vec<Component>]) -> &'a mut CreateComponents {
    for row in rows {
        c.create_action_row(|action| {
            for component in row {
                match component {
                    Component::Button { custom_id, label, kind } => {
                        action.create_button(|b| {
                            b.custom_id(custom_id).label(label).style(match kind {
                                ButtonKind::Primary => ButtonStyle::Primary,
                                ButtonKind::Secondary => ButtonStyle::Secondary,
                                ButtonKind::Success => ButtonStyle::Success,
                                ButtonKind::Danger => ButtonStyle::Danger,
                            })
                        });
                    }
                    Component::Select { custom_id, placeholder, options } => {
                        action.create_select_menu(|menu| {
                            menu.custom_id(custom_id);
                            if let Some(placeholder) = placeholder {
                                menu.placeholder(placeholder);
                            }
                            menu.options(|opts| {
                                for option in options {
                                    opts.create_option(|o| {
                                        o.label(&option.label).value(&option.value);
                                        if let Some(description) = &option.description {
                                            o.description(description);
                                        }
                                        if let Some(emoji) = &option.emoji {
                                            o.emoji(to_reaction(emoji));
                                        }
                                        o
                                    });
                                }
                                opts
                            })
                        });
                    }
                }
            }
            action
        });
    }
    c
}

fn to_history(message: serenity::model::channel::Message) -> HistoryMessage {
    HistoryMessage {
        id: message.id.0,
        author_id: message.author.id.0,
        author_name: message.author.name.clone(),
        attachments: message.attachments.iter().map(|a| a.url.clone()).collect(),
        timestamp: Utc
            .timestamp_opt(message.timestamp.unix_timestamp(), 0)
            .single()
            .unwrap_or_else(Utc::now),
        content: message.content,
    }
}

#[async_trait]
impl ChatPlatform for SerenityPlatform {
    async fn create_channel(&self, guild_id: u64, parent_id: u64, name: &str, overwrites: &[Overwrite]) -> PlatformResult<u64> {
        let permissions: Vec<_> = overwrites.iter().map(to_serenity_overwrite).collect();
        let channel = GuildId(guild_id).create_channel(self.http(), |c| {
            c.name(name)
                .kind(ChannelType::Text)
                .category(ChannelId(parent_id))
                .permissions(permissions)
        }).await?;
        log_debug!("Salon {} créé dans la catégorie {}", channel.id, parent_id);
        Ok(channel.id.0)
    }
    async fn set_channel_parent(&self, channel_id: u64, parent_id: u64, resync: bool) -> PlatformResult<()> {
        let parent_overwrites = if resync {
            match ChannelId(parent_id).to_channel(self.http()).await? {
                Channel::Category(category) => Some(category.permission_overwrites),
                Channel::Guild(channel) => Some(channel.permission_overwrites),
                _ => return Err(PlatformError::NotFound),
            }
        } else {
            None
        };
        ChannelId(channel_id).edit(self.http(), |c| {
            c.category(Some(ChannelId(parent_id)));
            if let Some(overwrites) = parent_overwrites {
                c.permissions(overwrites);
            }
            c
        }).await?;
        Ok(())
    }
    async fn rename_channel(&self, channel_id: u64, name: &str) -> PlatformResult<()> {
        ChannelId(channel_id).edit(self.http(), |c| c.name(name)).await?;
        Ok(())
    }
    async fn set_permission_overwrite(&self, channel_id: u64, overwrite: &Overwrite) -> PlatformResult<()> {
        ChannelId(channel_id).create_permission(self.http(), &to_serenity_overwrite(overwrite)).await?;
        Ok(())
    }
    async fn send_message(&self, channel_id: u64, message: &OutgoingMessage) -> PlatformResult<u64> {
        let sent = ChannelId(channel_id).send_message(self.http(), |m| {
            if let Some(content) = &message.content {
                m.content(content);
            }
            if let Some(embed) = &message.embed {
                m.embed(|e| build_embed(e, embed));
            }
            if !message.rows.is_empty() {
                m.components(|c| build_components(c, &message.rows));
            }
            if let Some(attachment) = &message.attachment {
                m.add_file(AttachmentType::Bytes {
                    data: Cow::Borrowed(attachment.data.as_slice()),
                    filename: attachment.filename.clone(),
                });
            }
            m
        }).await?;
        Ok(sent.id.0)
    }
    async fn edit_message(&self, channel_id: u64, message_id: u64, message: &OutgoingMessage) -> PlatformResult<()> {
        ChannelId(channel_id).edit_message(self.http(), MessageId(message_id), |m| {
            if let Some(content) = &message.content {
                m.content(content);
            }
            if let Some(embed) = &message.embed {
                m.embed(|e| build_embed(e, embed));
            }
            m.components(|c| build_components(c, &message.rows))
        }).await?;
        Ok(())
    }
    async fn delete_message(&self, channel_id: u64, message_id: u64) -> PlatformResult<()> {
        ChannelId(channel_id).delete_message(self.http(), MessageId(message_id)).await?;
        Ok(())
    }
    async fn delete_channel(&self, channel_id: u64) -> PlatformResult<()> {
        ChannelId(channel_id).delete(self.http()).await?;
        Ok(())
    }
    async fn fetch_message_history(&self, channel_id: u64, before: Option<u64>, limit: u8) -> PlatformResult<Vec<HistoryMessage>> {
        let messages = ChannelId(channel_id).messages(self.http(), |r| match before {
            Some(before) => r.before(MessageId(before)).limit(limit as u64),
            None => r.limit(limit as u64),
        }).await?;
        Ok(messages.into_iter().map(to_history).collect())
    }
    async fn category_info(&self, guild_id: u64, category_id: u64) -> PlatformResult<Option<CategoryInfo>> {
        let channels = GuildId(guild_id).channels(self.http()).await?;
        let category = match channels.get(&ChannelId(category_id)) {
            Some(c) if c.kind == ChannelType::Category => c,
            _ => return Ok(None),
        };
        let channel_count = channels.values()
            .filter(|c| c.parent_id == Some(category.id))
            .count();
        Ok(Some(CategoryInfo { id: category_id, name: category.name.clone(), channel_count }))
    }
    async fn bot_permissions(&self, guild_id: u64) -> PlatformResult<Permissions> {
        let member = GuildId(guild_id).member(self.http(), UserId(self.bot_id)).await?;
        self.guild_permissions(guild_id, &member.roles).await
    }
    async fn member(&self, guild_id: u64, user_id: u64) -> PlatformResult<MemberInfo> {
        let member = GuildId(guild_id).member(self.http(), UserId(user_id)).await?;
        let permissions = self.guild_permissions(guild_id, &member.roles).await?;
        Ok(to_member_info(&member, permissions))
    }
    async fn add_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> PlatformResult<()> {
        let mut member = GuildId(guild_id).member(self.http(), UserId(user_id)).await?;
        member.add_role(self.http(), RoleId(role_id)).await?;
        Ok(())
    }
    async fn remove_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> PlatformResult<()> {
        let mut member = GuildId(guild_id).member(self.http(), UserId(user_id)).await?;
        member.remove_role(self.http(), RoleId(role_id)).await?;
        Ok(())
    }
    async fn create_private_thread(&self, channel_id: u64, name: &str, members: &[u64]) -> PlatformResult<u64> {
        let thread = ChannelId(channel_id)
            .create_private_thread(self.http(), |t| t.name(name).kind(ChannelType::PrivateThread))
            .await?;
        for member in members {
            self.http.add_thread_channel_member(thread.id.0, *member).await?;
        }
        Ok(thread.id.0)
    }
    async fn send_direct_message(&self, user_id: u64, message: &OutgoingMessage) -> PlatformResult<u64> {
        let dm = self.http.create_private_channel(&serde_json::json!({ "recipient_id": user_id.to_string() })).await?;
        self.send_message(dm.id.0, message).await
    }
    async fn list_channels(&self, guild_id: u64) -> PlatformResult<Vec<ChannelSummary>> {
        let channels = GuildId(guild_id).channels(self.http()).await?;
        let mut summaries: Vec<_> = channels.into_values()
            .map(|c| ChannelSummary {
                id: c.id.0,
                is_category: c.kind == ChannelType::Category,
                parent_id: c.parent_id.map(|p| p.0),
                name: c.name,
            })
            .collect();
        summaries.sort_by_key(|c| c.id);
        Ok(summaries)
    }
    async fn fetch_channel(&self, channel_id: u64) -> PlatformResult<ChannelSummary> {
        match ChannelId(channel_id).to_channel(self.http()).await? {
            Channel::Guild(c) => Ok(ChannelSummary {
                id: c.id.0,
                is_category: c.kind == ChannelType::Category,
                parent_id: c.parent_id.map(|p| p.0),
                name: c.name,
            }),
            Channel::Category(c) => Ok(ChannelSummary {
                id: c.id.0,
                name: c.name,
                parent_id: None,
                is_category: true,
            }),
            _ => Err(PlatformError::NotFound),
        }
    }
    async fn list_members(&self, guild_id: u64, limit: u64) -> PlatformResult<Vec<MemberInfo>> {
        let guild_roles = GuildId(guild_id).roles(self.http()).await?;
        let members = GuildId(guild_id).members(self.http(), Some(limit), None).await?;
        Ok(members.iter()
            .map(|m| to_member_info(m, permissions_from_roles(guild_id, &guild_roles, &m.roles)))
            .collect())
    }
    fn bot_id(&self) -> u64 {
        self.bot_id
    }
}

/// Regroupe les salons par catégorie parente
pub fn children_by_parent(channels: &[ChannelSummary]) -> HashMap<u64, Vec<&ChannelSummary>> {
    let mut map: HashMap<u64, Vec<&ChannelSummary>> = HashMap::new();
    for channel in channels {
        if let Some(parent) = channel.parent_id {
            map.entry(parent).or_default().push(channel);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrite_conversion() {
        let o = Overwrite::deny(Principal::Role(5), Permissions::VIEW_CHANNEL);
        let converted = to_serenity_overwrite(&o);
        assert_eq!(converted.deny, Permissions::VIEW_CHANNEL);
        assert!(converted.allow.is_empty());
        assert!(matches!(converted.kind, PermissionOverwriteType::Role(RoleId(5))));
    }

    #[test]
    fn emoji_kinds() {
        assert!(matches!(to_reaction("🎫"), ReactionType::Unicode(_)));
        assert!(matches!(to_reaction("123456"), ReactionType::Custom { .. }));
    }

    #[test]
    fn grouping() {
        let channels = vec![
            ChannelSummary { id: 1, name: "tickets".into(), parent_id: None, is_category: true },
            ChannelSummary { id: 2, name: "support-1".into(), parent_id: Some(1), is_category: false },
            ChannelSummary { id: 3, name: "support-2".into(), parent_id: Some(1), is_category: false },
        ];
        let grouped = children_by_parent(&channels);
        assert_eq!(grouped[&1].len(), 2);
        assert!(!grouped.contains_key(&2));
    }
}
