//! Typed representations of the Discord API objects the bot touches.
//!
//! Only the fields the bot reads or writes are modelled; everything else in
//! a payload is ignored on deserialisation.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// Discord IDs are snowflakes transmitted as strings in JSON.
pub type Snowflake = String;

/// Numeric value of a snowflake, for ordering. Malformed ids sort first.
pub fn snowflake_value(id: &str) -> u64 {
    id.parse().unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Gateway payload (the envelope that wraps every WS message)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayPayload {
    pub op: u8,
    pub d: Option<serde_json::Value>,
    pub s: Option<u64>,
    pub t: Option<String>,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct User {
    pub id: Snowflake,
    pub username: String,
    pub discriminator: Option<String>,
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
    pub global_name: Option<String>,
}

impl User {
    /// CDN URL of the user's avatar, or `None` if no avatar is set.
    pub fn avatar_url(&self) -> Option<String> {
        self.avatar.as_ref().map(|hash| {
            format!(
                "https://cdn.discordapp.com/avatars/{}/{}.png",
                self.id, hash
            )
        })
    }

    /// `Username#Discriminator`, or just `Username` for migrated accounts.
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some("0") | None => self.username.clone(),
            Some(disc) => format!("{}#{}", self.username, disc),
        }
    }

    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize_repr, Serialize_repr)]
#[repr(u8)]
pub enum ChannelType {
    GuildText = 0,
    Dm = 1,
    GuildVoice = 2,
    GroupDm = 3,
    GuildCategory = 4,
    GuildAnnouncement = 5,
    AnnouncementThread = 10,
    PublicThread = 11,
    PrivateThread = 12,
    GuildStageVoice = 13,
    GuildDirectory = 14,
    GuildForum = 15,
}

impl ChannelType {
    /// Direct-message channels cannot be bulk-deleted from.
    pub fn is_private(self) -> bool {
        matches!(self, ChannelType::Dm | ChannelType::GroupDm)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Channel {
    pub id: Snowflake,
    #[serde(rename = "type")]
    pub kind: ChannelType,
    pub guild_id: Option<Snowflake>,
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Guild
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Guild {
    pub id: Snowflake,
    pub name: String,
    pub icon: Option<String>,
    pub owner_id: Option<Snowflake>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuildMember {
    pub user: Option<User>,
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<Snowflake>,
    pub joined_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UnavailableGuild {
    pub id: Snowflake,
    #[serde(default)]
    pub unavailable: bool,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    pub guild_id: Option<Snowflake>,
    pub author: User,
    /// Present on MESSAGE_CREATE in guilds (without the `user` field).
    pub member: Option<GuildMember>,
    #[serde(default)]
    pub content: String,
    pub timestamp: String,
    pub edited_timestamp: Option<String>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    pub message_reference: Option<MessageReference>,
}

impl Message {
    pub fn id_value(&self) -> u64 {
        snowflake_value(&self.id)
    }

    pub fn is_from(&self, user_id: &str) -> bool {
        self.author.id == user_id
    }
}

/// Partial message carried by MESSAGE_UPDATE; only `id` and `channel_id`
/// are guaranteed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessageUpdate {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    pub guild_id: Option<Snowflake>,
    pub author: Option<User>,
    pub content: Option<String>,
    pub edited_timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessageDelete {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    pub guild_id: Option<Snowflake>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MessageReference {
    pub message_id: Option<Snowflake>,
    pub channel_id: Option<Snowflake>,
    pub guild_id: Option<Snowflake>,
    #[serde(default)]
    pub fail_if_not_exists: bool,
}

// ---------------------------------------------------------------------------
// Embed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Embed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    /// Footer text with an optional icon.
    pub fn footer(mut self, text: impl Into<String>, icon_url: Option<String>) -> Self {
        self.footer = Some(EmbedFooter {
            text: text.into(),
            icon_url,
        });
        self
    }

    pub fn timestamp(mut self, ts: impl Into<String>) -> Self {
        self.timestamp = Some(ts.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Message components (navigator buttons)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Component {
    /// 1 = ActionRow, 2 = Button
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Button style: 1=Primary, 2=Secondary, 3=Success, 4=Danger
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

/// Build an Action Row wrapping other components.
pub fn action_row(components: Vec<Component>) -> Component {
    Component {
        kind: 1,
        custom_id: None,
        label: None,
        style: None,
        components,
        disabled: None,
    }
}

/// Build a button component.
pub fn button(style: u8, label: impl Into<String>, custom_id: impl Into<String>) -> Component {
    Component {
        kind: 2,
        custom_id: Some(custom_id.into()),
        label: Some(label.into()),
        style: Some(style),
        components: Vec::new(),
        disabled: None,
    }
}

// ---------------------------------------------------------------------------
// READY event payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReadyEvent {
    pub v: u8,
    pub user: User,
    pub session_id: String,
    pub resume_gateway_url: String,
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
    pub application: ReadyApplication,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReadyApplication {
    pub id: Snowflake,
    pub flags: Option<u64>,
}

// ---------------------------------------------------------------------------
// Application (owner lookup)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CurrentApplication {
    pub id: Snowflake,
    pub name: String,
    pub owner: Option<User>,
    pub team: Option<Team>,
}

impl CurrentApplication {
    /// Everyone who counts as an owner: the team's members, or the single
    /// owner when the application is not team-owned.
    pub fn owner_ids(&self) -> Vec<Snowflake> {
        match &self.team {
            Some(team) => team.members.iter().map(|m| m.user.id.clone()).collect(),
            None => self.owner.iter().map(|u| u.id.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Team {
    pub id: Snowflake,
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TeamMember {
    pub user: User,
}

// ---------------------------------------------------------------------------
// Interactions (navigator button presses)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize_repr, Serialize_repr)]
#[repr(u8)]
pub enum InteractionType {
    Ping = 1,
    ApplicationCommand = 2,
    MessageComponent = 3,
    ApplicationCommandAutocomplete = 4,
    ModalSubmit = 5,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Interaction {
    pub id: Snowflake,
    pub application_id: Snowflake,
    #[serde(rename = "type")]
    pub kind: InteractionType,
    pub token: String,
    pub channel_id: Option<Snowflake>,
    pub guild_id: Option<Snowflake>,
    pub data: Option<InteractionData>,
    pub member: Option<GuildMember>,
    pub user: Option<User>,
    pub message: Option<Message>,
}

impl Interaction {
    /// The user who triggered the interaction (guild member or DM user).
    pub fn author(&self) -> Option<&User> {
        self.member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .or(self.user.as_ref())
    }

    pub fn custom_id(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.custom_id.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InteractionData {
    pub custom_id: Option<String>,
    pub component_type: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize_repr, Serialize_repr)]
#[repr(u8)]
pub enum InteractionCallbackType {
    ChannelMessageWithSource = 4,
    DeferredUpdateMessage = 6,
    UpdateMessage = 7,
}

#[derive(Debug, Clone, Serialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: InteractionCallbackType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<MessagePayload>,
}

// ---------------------------------------------------------------------------
// Outbound message bodies
// ---------------------------------------------------------------------------

/// Body for creating or editing a message, and for UPDATE_MESSAGE
/// interaction callbacks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeds: Option<Vec<Embed>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_reference: Option<MessageReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<Component>>,
}

impl MessagePayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, text: impl Into<String>) -> Self {
        self.content = Some(text.into());
        self
    }

    pub fn embed(mut self, embed: Embed) -> Self {
        self.embeds.get_or_insert_with(Vec::new).push(embed);
        self
    }

    pub fn reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.message_reference = Some(MessageReference {
            message_id: Some(message_id.into()),
            channel_id: None,
            guild_id: None,
            fail_if_not_exists: false,
        });
        self
    }

    pub fn component_row(mut self, row: Component) -> Self {
        self.components.get_or_insert_with(Vec::new).push(row);
        self
    }

    /// Explicitly remove all components (sends `[]`).
    pub fn clear_components(mut self) -> Self {
        self.components = Some(Vec::new());
        self
    }
}

// ---------------------------------------------------------------------------
// Rate-limit info parsed from response headers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RateLimitInfo {
    pub remaining: Option<u32>,
    pub reset_after: Option<f64>,
    pub bucket: Option<String>,
    pub is_global: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_test::{assert_tokens, Token};

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            username: "yami".to_string(),
            discriminator: Some("0".to_string()),
            avatar: Some("abc".to_string()),
            bot: false,
            global_name: None,
        }
    }

    #[test]
    fn channel_type_is_an_integer() {
        assert_tokens(&ChannelType::Dm, &[Token::U8(1)]);
        assert_tokens(&ChannelType::GuildText, &[Token::U8(0)]);
    }

    #[test]
    fn private_channel_types() {
        assert!(ChannelType::Dm.is_private());
        assert!(ChannelType::GroupDm.is_private());
        assert!(!ChannelType::GuildText.is_private());
    }

    #[test]
    fn user_helpers() {
        let u = user("1");
        assert_eq!(u.tag(), "yami");
        assert_eq!(u.mention(), "<@1>");
        assert_eq!(
            u.avatar_url().as_deref(),
            Some("https://cdn.discordapp.com/avatars/1/abc.png")
        );
    }

    #[test]
    fn snowflakes_order_numerically() {
        assert!(snowflake_value("100") > snowflake_value("99"));
        assert_eq!(snowflake_value("nope"), 0);
    }

    #[test]
    fn team_members_are_owners() {
        let app: CurrentApplication = serde_json::from_value(serde_json::json!({
            "id": "9",
            "name": "yami",
            "owner": { "id": "1", "username": "team", "discriminator": "0", "avatar": null },
            "team": { "id": "5", "members": [
                { "user": { "id": "2", "username": "a", "discriminator": "0", "avatar": null } },
                { "user": { "id": "3", "username": "b", "discriminator": "0", "avatar": null } }
            ]}
        }))
        .expect("valid application JSON");
        assert_eq!(app.owner_ids(), vec!["2".to_string(), "3".to_string()]);
    }

    #[test]
    fn single_owner_without_team() {
        let app: CurrentApplication = serde_json::from_value(serde_json::json!({
            "id": "9",
            "name": "yami",
            "owner": { "id": "1", "username": "me", "discriminator": "0", "avatar": null }
        }))
        .expect("valid application JSON");
        assert_eq!(app.owner_ids(), vec!["1".to_string()]);
    }

    #[test]
    fn replies_compare_by_reference() {
        let reply = MessagePayload::new().content("hi").reply_to("42");
        assert_eq!(reply, MessagePayload::new().content("hi").reply_to("42"));
        assert_ne!(reply, MessagePayload::new().content("hi").reply_to("43"));
        assert_ne!(reply, MessagePayload::new().content("hi"));
    }

    #[test]
    fn payload_omits_unset_fields() {
        let body = serde_json::to_value(MessagePayload::new().content("hi")).unwrap();
        assert_eq!(body, serde_json::json!({ "content": "hi" }));
    }

    #[test]
    fn clear_components_sends_empty_list() {
        let body = serde_json::to_value(MessagePayload::new().clear_components()).unwrap();
        assert_eq!(body, serde_json::json!({ "components": [] }));
    }

    #[test]
    fn interaction_author_prefers_member() {
        let interaction: Interaction = serde_json::from_value(serde_json::json!({
            "id": "1",
            "application_id": "2",
            "type": 3,
            "token": "t",
            "channel_id": "3",
            "data": { "custom_id": "nav:1:next", "component_type": 2 },
            "member": { "user": { "id": "7", "username": "m", "discriminator": "0", "avatar": null }, "roles": [] }
        }))
        .expect("valid interaction JSON");
        assert_eq!(interaction.author().map(|u| u.id.as_str()), Some("7"));
        assert_eq!(interaction.custom_id(), Some("nav:1:next"));
    }
}
