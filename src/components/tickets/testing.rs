//! Plateforme en mémoire pour les tests

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use sea_orm::DatabaseConnection;
use serenity::{async_trait, model::permissions::Permissions};

use crate::components::utils::LocalRateLimiter;
use crate::config::{TicketOptions, TicketParents};
use crate::db::{
    controller::{panel as panel_ctrl, staff},
    model::ticket::{category, panel},
    tests::memory_db,
    to_db,
};
use super::{
    engine::{CreateRequest, CreatedTicket, TicketEngine},
    platform::*,
    settings::{DbSettings, GuildSettings},
};

pub const BOT_ID: u64 = 999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeChannel {
    pub guild_id: u64,
    pub name: String,
    pub parent_id: Option<u64>,
    pub overwrites: Vec<Overwrite>,
}

/// Appels pouvant être forcés en échec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Failure {
    CreateChannel,
    DeleteChannel,
    Rename,
    Move,
    SendMessage,
    DirectMessage,
    Roles,
    Thread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleEvent {
    Added { user: u64, role: u64 },
    Removed { user: u64, role: u64 },
}

#[derive(Default)]
struct State {
    categories: HashMap<u64, (u64, String)>,
    channels: HashMap<u64, FakeChannel>,
    members: HashMap<(u64, u64), MemberInfo>,
    messages: Vec<(u64, u64, OutgoingMessage)>,
    deleted_messages: Vec<(u64, u64)>,
    dms: Vec<(u64, OutgoingMessage)>,
    roles: Vec<RoleEvent>,
    threads: Vec<(u64, String, Vec<u64>)>,
    history: HashMap<u64, Vec<HistoryMessage>>,
    history_calls: HashMap<u64, usize>,
    failures: HashSet<Failure>,
    deleted_channels: Vec<u64>,
}

pub struct FakePlatform {
    state: Mutex<State>,
    next_id: AtomicU64,
    capacity: usize,
    bot_permissions: Mutex<Permissions>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::with_capacity(50)
    }
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            next_id: AtomicU64::new(10_000),
            capacity,
            bot_permissions: Mutex::new(Permissions::all()),
        }
    }
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
    fn fails(&self, failure: Failure) -> PlatformResult<()> {
        if self.state().failures.contains(&failure) {
            Err(PlatformError::Other(format!("échec simulé: {:?}", failure)))
        } else {
            Ok(())
        }
    }
    fn id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn add_category(&self, guild_id: u64, category_id: u64, name: &str) {
        self.state().categories.insert(category_id, (guild_id, name.to_string()));
    }
    /// Ajoute un salon hors ticket, par exemple pour remplir une catégorie
    pub fn add_channel(&self, guild_id: u64, parent_id: Option<u64>, name: &str) -> u64 {
        let id = self.id();
        self.state().channels.insert(id, FakeChannel {
            guild_id,
            name: name.to_string(),
            parent_id,
            overwrites: vec![],
        });
        id
    }
    pub fn set_member(&self, guild_id: u64, user_id: u64, roles: Vec<u64>, administrator: bool) {
        self.state().members.insert((guild_id, user_id), MemberInfo {
            user_id,
            display_name: format!("membre{}", user_id),
            bot: false,
            roles,
            administrator,
        });
    }
    pub fn set_bot_permissions(&self, permissions: Permissions) {
        *self.bot_permissions.lock().unwrap() = permissions;
    }
    pub fn fail(&self, failure: Failure) {
        self.state().failures.insert(failure);
    }
    pub fn push_history(&self, channel_id: u64, message: HistoryMessage) {
        self.state().history.entry(channel_id).or_default().push(message);
    }

    pub fn channel(&self, channel_id: u64) -> Option<FakeChannel> {
        self.state().channels.get(&channel_id).cloned()
    }
    pub fn channel_count(&self) -> usize {
        self.state().channels.len()
    }
    pub fn messages_in(&self, channel_id: u64) -> Vec<OutgoingMessage> {
        self.state().messages.iter()
            .filter(|(c, _, _)| *c == channel_id)
            .map(|(_, _, m)| m.clone())
            .collect()
    }
    pub fn message(&self, message_id: u64) -> Option<OutgoingMessage> {
        self.state().messages.iter().find(|(_, id, _)| *id == message_id).map(|(_, _, m)| m.clone())
    }
    pub fn deleted_messages(&self) -> Vec<(u64, u64)> {
        self.state().deleted_messages.clone()
    }
    pub fn dms_to(&self, user_id: u64) -> Vec<OutgoingMessage> {
        self.state().dms.iter().filter(|(u, _)| *u == user_id).map(|(_, m)| m.clone()).collect()
    }
    pub fn role_events(&self) -> Vec<RoleEvent> {
        self.state().roles.clone()
    }
    pub fn threads(&self) -> Vec<(u64, String, Vec<u64>)> {
        self.state().threads.clone()
    }
    pub fn deleted_channels(&self) -> Vec<u64> {
        self.state().deleted_channels.clone()
    }
    pub fn history_calls(&self, channel_id: u64) -> usize {
        self.state().history_calls.get(&channel_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn create_channel(&self, guild_id: u64, parent_id: u64, name: &str, overwrites: &[Overwrite]) -> PlatformResult<u64> {
        self.fails(Failure::CreateChannel)?;
        let id = self.id();
        let mut state = self.state();
        match state.categories.get(&parent_id) {
            Some((g, _)) if *g == guild_id => (),
            _ => return Err(PlatformError::NotFound),
        }
        let used = state.channels.values().filter(|c| c.parent_id == Some(parent_id)).count();
        if used >= self.capacity {
            return Err(PlatformError::CategoryFull);
        }
        state.channels.insert(id, FakeChannel {
            guild_id,
            name: name.to_string(),
            parent_id: Some(parent_id),
            overwrites: overwrites.to_vec(),
        });
        Ok(id)
    }
    async fn set_channel_parent(&self, channel_id: u64, parent_id: u64, resync: bool) -> PlatformResult<()> {
        self.fails(Failure::Move)?;
        let mut state = self.state();
        if !state.categories.contains_key(&parent_id) {
            return Err(PlatformError::NotFound);
        }
        let channel = state.channels.get_mut(&channel_id).ok_or(PlatformError::NotFound)?;
        channel.parent_id = Some(parent_id);
        if resync {
            channel.overwrites.clear();
        }
        Ok(())
    }
    async fn rename_channel(&self, channel_id: u64, name: &str) -> PlatformResult<()> {
        self.fails(Failure::Rename)?;
        let mut state = self.state();
        let channel = state.channels.get_mut(&channel_id).ok_or(PlatformError::NotFound)?;
        channel.name = name.to_string();
        Ok(())
    }
    async fn set_permission_overwrite(&self, channel_id: u64, overwrite: &Overwrite) -> PlatformResult<()> {
        let mut state = self.state();
        let channel = state.channels.get_mut(&channel_id).ok_or(PlatformError::NotFound)?;
        channel.overwrites.retain(|o| o.target != overwrite.target);
        channel.overwrites.push(overwrite.clone());
        Ok(())
    }
    async fn send_message(&self, channel_id: u64, message: &OutgoingMessage) -> PlatformResult<u64> {
        self.fails(Failure::SendMessage)?;
        let id = self.id();
        self.state().messages.push((channel_id, id, message.clone()));
        Ok(id)
    }
    async fn edit_message(&self, _channel_id: u64, message_id: u64, message: &OutgoingMessage) -> PlatformResult<()> {
        let mut state = self.state();
        let entry = state.messages.iter_mut().find(|(_, id, _)| *id == message_id).ok_or(PlatformError::NotFound)?;
        entry.2 = message.clone();
        Ok(())
    }
    async fn delete_message(&self, channel_id: u64, message_id: u64) -> PlatformResult<()> {
        let mut state = self.state();
        state.messages.retain(|(_, id, _)| *id != message_id);
        state.deleted_messages.push((channel_id, message_id));
        Ok(())
    }
    async fn delete_channel(&self, channel_id: u64) -> PlatformResult<()> {
        self.fails(Failure::DeleteChannel)?;
        let mut state = self.state();
        state.channels.remove(&channel_id).ok_or(PlatformError::NotFound)?;
        state.deleted_channels.push(channel_id);
        Ok(())
    }
    async fn fetch_message_history(&self, channel_id: u64, before: Option<u64>, limit: u8) -> PlatformResult<Vec<HistoryMessage>> {
        let mut state = self.state();
        *state.history_calls.entry(channel_id).or_default() += 1;
        let history = state.history.get(&channel_id).cloned().unwrap_or_default();
        Ok(history.into_iter()
            .rev()
            .filter(|m| before.map_or(true, |b| m.id < b))
            .take(limit as usize)
            .collect())
    }
    async fn category_info(&self, guild_id: u64, category_id: u64) -> PlatformResult<Option<CategoryInfo>> {
        let state = self.state();
        Ok(match state.categories.get(&category_id) {
            Some((g, name)) if *g == guild_id => Some(CategoryInfo {
                id: category_id,
                name: name.clone(),
                channel_count: state.channels.values().filter(|c| c.parent_id == Some(category_id)).count(),
            }),
            _ => None,
        })
    }
    async fn bot_permissions(&self, _guild_id: u64) -> PlatformResult<Permissions> {
        Ok(*self.bot_permissions.lock().unwrap())
    }
    async fn member(&self, guild_id: u64, user_id: u64) -> PlatformResult<MemberInfo> {
        Ok(self.state().members.get(&(guild_id, user_id)).cloned().unwrap_or(MemberInfo {
            user_id,
            display_name: format!("membre{}", user_id),
            bot: false,
            roles: vec![],
            administrator: false,
        }))
    }
    async fn add_role(&self, _guild_id: u64, user_id: u64, role_id: u64) -> PlatformResult<()> {
        self.fails(Failure::Roles)?;
        self.state().roles.push(RoleEvent::Added { user: user_id, role: role_id });
        Ok(())
    }
    async fn remove_role(&self, _guild_id: u64, user_id: u64, role_id: u64) -> PlatformResult<()> {
        self.fails(Failure::Roles)?;
        self.state().roles.push(RoleEvent::Removed { user: user_id, role: role_id });
        Ok(())
    }
    async fn create_private_thread(&self, channel_id: u64, name: &str, members: &[u64]) -> PlatformResult<u64> {
        self.fails(Failure::Thread)?;
        let id = self.id();
        self.state().threads.push((channel_id, name.to_string(), members.to_vec()));
        Ok(id)
    }
    async fn send_direct_message(&self, user_id: u64, message: &OutgoingMessage) -> PlatformResult<u64> {
        self.fails(Failure::DirectMessage)?;
        let id = self.id();
        self.state().dms.push((user_id, message.clone()));
        Ok(id)
    }
    async fn list_channels(&self, guild_id: u64) -> PlatformResult<Vec<ChannelSummary>> {
        let state = self.state();
        let mut channels: Vec<_> = state.categories.iter()
            .filter(|(_, (g, _))| *g == guild_id)
            .map(|(id, (_, name))| ChannelSummary { id: *id, name: name.clone(), parent_id: None, is_category: true })
            .chain(state.channels.iter()
                .filter(|(_, c)| c.guild_id == guild_id)
                .map(|(id, c)| ChannelSummary { id: *id, name: c.name.clone(), parent_id: c.parent_id, is_category: false }))
            .collect();
        channels.sort_by_key(|c| c.id);
        Ok(channels)
    }
    async fn fetch_channel(&self, channel_id: u64) -> PlatformResult<ChannelSummary> {
        let state = self.state();
        if let Some(c) = state.channels.get(&channel_id) {
            return Ok(ChannelSummary { id: channel_id, name: c.name.clone(), parent_id: c.parent_id, is_category: false });
        }
        match state.categories.get(&channel_id) {
            Some((_, name)) => Ok(ChannelSummary { id: channel_id, name: name.clone(), parent_id: None, is_category: true }),
            None => Err(PlatformError::NotFound),
        }
    }
    async fn list_members(&self, guild_id: u64, limit: u64) -> PlatformResult<Vec<MemberInfo>> {
        let state = self.state();
        let mut members: Vec<_> = state.members.iter()
            .filter(|((g, _), _)| *g == guild_id)
            .map(|(_, m)| m.clone())
            .collect();
        members.sort_by_key(|m| m.user_id);
        members.truncate(limit as usize);
        Ok(members)
    }
    fn bot_id(&self) -> u64 {
        BOT_ID
    }
}

pub const GUILD: u64 = 1;
pub const PARENT: u64 = 500;
pub const ACCEPTED: u64 = 501;
pub const CLOSED: u64 = 502;
pub const PANEL_CHANNEL: u64 = 600;
pub const PANEL_MESSAGE: u64 = 601;
pub const STAFF_ROLE: u64 = 700;
pub const STAFF: u64 = 800;
pub const OTHER_STAFF: u64 = 801;

/// Options sans délai, avec les catégories des tickets acceptés et fermés
pub fn test_options() -> TicketOptions {
    TicketOptions {
        creation_cooldown_secs: 0,
        interaction_debounce_ms: 0,
        delete_delay_secs: 0,
        categories: TicketParents {
            open: None,
            accepted: Some(ACCEPTED),
            closed: Some(CLOSED),
        },
        ..Default::default()
    }
}

/// Serveur prêt à l'emploi: un panel rangeant ses tickets dans [`PARENT`], une catégorie
/// `support` et deux membres de l'équipe.
pub struct Fixture {
    pub db: Arc<DatabaseConnection>,
    pub platform: Arc<FakePlatform>,
    pub settings: Arc<dyn GuildSettings>,
    pub engine: Arc<TicketEngine>,
    pub panel: panel::Model,
    pub category: category::Model,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with(FakePlatform::new(), test_options()).await
    }
    pub async fn with(platform: FakePlatform, options: TicketOptions) -> Self {
        let db = Arc::new(memory_db().await);
        let platform = Arc::new(platform);
        platform.add_category(GUILD, PARENT, "Tickets");
        platform.add_category(GUILD, ACCEPTED, "Acceptés");
        platform.add_category(GUILD, CLOSED, "Fermés");
        platform.set_member(GUILD, STAFF, vec![STAFF_ROLE], false);
        platform.set_member(GUILD, OTHER_STAFF, vec![STAFF_ROLE], false);
        staff::add(&*db, to_db(GUILD), to_db(STAFF_ROLE)).await.unwrap();
        let category = panel_ctrl::create_category(&*db, to_db(GUILD), panel_ctrl::NewCategory {
            name: "support".to_string(),
            label: "Support".to_string(),
            description: None,
            emoji: None,
        }).await.unwrap();
        let panel = panel_ctrl::create_panel(&*db, panel_ctrl::NewPanel {
            guild_id: to_db(GUILD),
            channel_id: to_db(PANEL_CHANNEL),
            message_id: to_db(PANEL_MESSAGE),
            title: "Support".to_string(),
            description: None,
            color: None,
            image_url: None,
            category_id: Some(to_db(PARENT)),
            placeholder: None,
        }).await.unwrap();
        let settings: Arc<dyn GuildSettings> = Arc::new(DbSettings::new(db.clone()));
        let chat: Arc<dyn ChatPlatform> = platform.clone();
        let engine = Arc::new(TicketEngine::new(
            db.clone(),
            settings.clone(),
            chat,
            Arc::new(LocalRateLimiter::new()),
            options,
        ));
        Self { db, platform, settings, engine, panel, category }
    }
    pub fn request(&self, user_id: u64) -> CreateRequest {
        CreateRequest {
            guild_id: GUILD,
            user_id,
            username: format!("client{}", user_id),
            panel_channel_id: PANEL_CHANNEL,
            selection: self.category.option_value(),
        }
    }
    pub async fn open(&self, user_id: u64) -> CreatedTicket {
        self.engine.create(self.request(user_id)).await.unwrap()
    }
}
