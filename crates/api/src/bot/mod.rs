mod error;

pub use error::Error;

use db::{Polls, Store, Uuid};
use model::{Choice, Poll};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use twilight_model::{
    application::interaction::{
        application_command::{CommandData, CommandDataOption, CommandOptionValue},
        message_component::MessageComponentInteractionData,
        modal::ModalInteractionData,
        Interaction, InteractionData, InteractionDataResolved, InteractionType,
    },
    channel::{
        message::{
            component::{
                ActionRow, Button, ButtonStyle, Component, ComponentType, SelectMenu, SelectMenuType, TextInput,
                TextInputStyle,
            },
            EmojiReactionType, MessageFlags,
        },
        Message,
    },
    http::interaction::{InteractionResponse, InteractionResponseData, InteractionResponseType},
    id::{marker::UserMarker, Id},
};

type UserId = Id<UserMarker>;

const COMMAND_NAME: &str = "poll";
const MODAL_ID: &str = "poll:modal";
const TITLE_ID: &str = "poll:title";
const OPTION_PREFIX: &str = "poll:msg";

const EMOJIS: [&str; 5] = ["1️⃣", "2️⃣", "3️⃣", "4️⃣", "5️⃣"];
const MIN_CHOICES: i64 = 2;
const MAX_CHOICES: i64 = EMOJIS.len() as i64;

/// Labels longer than this get a row of their own.
const LONG_LABEL: usize = 20;

/// Discord rejects button labels longer than this.
const MAX_LABEL: usize = 80;
/// Leaves room on the button for a ` (N)` tally of up to five digits.
const MAX_OPTION: u16 = MAX_LABEL as u16 - 8;
const MAX_TITLE: u16 = 256;

/// Metadata attached to choices of a user poll.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nominee {
    /// Guild nickname of the nominated user, falling back to their username.
    pub name: Box<str>,
}

pub type UserPoll = Poll<Nominee>;

/// Current Unix time in seconds.
pub fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_secs())
}

pub struct Bot<S> {
    polls: Polls<S>,
    /// Lifetime of new polls (in seconds).
    ttl: u64,
}

impl<S: Store> Bot<S> {
    pub fn new(store: S, ttl: u64) -> Self {
        Self { polls: Polls::from(store), ttl }
    }

    pub const fn polls(&self) -> &Polls<S> {
        &self.polls
    }

    pub async fn on_interaction(&self, interaction: Interaction) -> InteractionResponse {
        let result = match interaction.kind {
            InteractionType::Ping => Ok(InteractionResponse { kind: InteractionResponseType::Pong, data: None }),
            InteractionType::ApplicationCommand => self.on_app_command(interaction).await,
            InteractionType::ModalSubmit => self.on_modal_submit(interaction).await,
            InteractionType::MessageComponent => self.on_msg_component(interaction).await,
            _ => Err(Error::UnsupportedInteraction),
        };

        let text = match result {
            Ok(res) => return res,
            Err(err) => err.to_string(),
        };

        InteractionResponse {
            kind: InteractionResponseType::ChannelMessageWithSource,
            data: Some(InteractionResponseData {
                content: Some(text),
                flags: Some(MessageFlags::EPHEMERAL),
                ..Default::default()
            }),
        }
    }

    /// Creates and persists a fresh poll.
    async fn create(&self) -> error::Result<UserPoll> {
        let poll = UserPoll::with_ttl(now(), self.ttl);
        self.polls.save(&poll).await?;
        log::info!("created poll {}", poll.id());
        Ok(poll)
    }

    /// Moves `voter`'s vote onto `choice`. Returns `None` if the poll has
    /// already expired.
    async fn cast(
        &self,
        id: Uuid,
        choice: &str,
        voter: UserId,
        nominee: Option<Nominee>,
    ) -> error::Result<Option<UserPoll>> {
        let Some(mut poll) = self.polls.load::<Nominee>(id, now()).await? else {
            return Ok(None);
        };
        poll.vote(choice, &voter.to_string(), nominee)?;
        self.polls.save(&poll).await?;
        Ok(Some(poll))
    }

    async fn on_app_command(&self, interaction: Interaction) -> error::Result<InteractionResponse> {
        let Some(InteractionData::ApplicationCommand(data)) = interaction.data else {
            return Err(Error::Schema);
        };

        let CommandData { name, options, .. } = *data;
        if name != COMMAND_NAME {
            return Err(Error::UnknownCommandName);
        }

        let Some(CommandDataOption { name, value: CommandOptionValue::SubCommand(options), .. }) =
            options.into_iter().next()
        else {
            return Err(Error::InvalidParams);
        };

        match name.as_str() {
            "simple" => Self::on_simple_command(&options),
            "user" => self.on_user_command().await,
            _ => Err(Error::UnknownCommandName),
        }
    }

    /// Asks the user for a title and the labels of each choice.
    fn on_simple_command(options: &[CommandDataOption]) -> error::Result<InteractionResponse> {
        let count = match options.iter().find(|option| option.name == "num_choices").map(|option| &option.value) {
            Some(CommandOptionValue::Integer(count)) => *count,
            Some(CommandOptionValue::Number(count)) if count.fract() == 0.0 => *count as i64,
            Some(_) => return Err(Error::InvalidParams),
            None => MIN_CHOICES,
        };

        if !(MIN_CHOICES..=MAX_CHOICES).contains(&count) {
            return Err(Error::InvalidParams);
        }

        let mut components = Vec::with_capacity(count as usize + 1);
        components.push(text_input(TITLE_ID.into(), "Title".into(), MAX_TITLE));
        components.extend((1..=count).map(|i| text_input(format!("{OPTION_PREFIX}{i}"), format!("Option {i}"), MAX_OPTION)));

        Ok(InteractionResponse {
            kind: InteractionResponseType::Modal,
            data: Some(InteractionResponseData {
                custom_id: Some(MODAL_ID.into()),
                title: Some("New Poll".into()),
                components: Some(components),
                ..Default::default()
            }),
        })
    }

    /// Starts a poll whose choices are members of the server.
    async fn on_user_command(&self) -> error::Result<InteractionResponse> {
        let poll = self.create().await?;
        let menu = Component::SelectMenu(SelectMenu {
            channel_types: None,
            custom_id: format!("{COMMAND_NAME}:{}", poll.id()),
            default_values: None,
            disabled: false,
            kind: SelectMenuType::User,
            max_values: Some(1),
            min_values: Some(1),
            options: None,
            placeholder: Some("Pick a user".into()),
        });
        Ok(InteractionResponse {
            kind: InteractionResponseType::ChannelMessageWithSource,
            data: Some(InteractionResponseData {
                components: Some(vec![Component::ActionRow(ActionRow { components: vec![menu] })]),
                ..Default::default()
            }),
        })
    }

    /// Starts a poll with one button per choice submitted through the modal.
    async fn on_modal_submit(&self, interaction: Interaction) -> error::Result<InteractionResponse> {
        let Some(InteractionData::ModalSubmit(ModalInteractionData { custom_id, components, .. })) = interaction.data
        else {
            return Err(Error::Schema);
        };

        if custom_id != MODAL_ID {
            return Err(Error::UnknownCommandName);
        }

        let mut title = None;
        let mut labels = Vec::new();
        for input in components.into_iter().flat_map(|row| row.components) {
            let Some(value) = input.value.filter(|value| !value.trim().is_empty()) else {
                continue;
            };
            if input.custom_id == TITLE_ID {
                title = Some(value[..fit(&value, MAX_TITLE.into())].to_owned());
            } else if input.custom_id.starts_with(OPTION_PREFIX) {
                let label = value.trim();
                labels.push(label[..fit(label, MAX_LABEL)].to_owned());
            }
        }

        if labels.is_empty() {
            return Err(Error::InvalidParams);
        }
        labels.truncate(EMOJIS.len());

        let poll = self.create().await?;
        let long = labels.iter().any(|label| label.chars().count() > LONG_LABEL);
        let buttons = labels.into_iter().zip(EMOJIS).enumerate().map(|(index, (label, emoji))| {
            Component::Button(Button {
                custom_id: Some(format!("{COMMAND_NAME}:{}:{index}", poll.id())),
                disabled: false,
                emoji: Some(EmojiReactionType::Unicode { name: emoji.into() }),
                label: Some(label),
                style: ButtonStyle::Secondary,
                url: None,
                sku_id: None,
            })
        });

        let rows: Vec<_> = if long {
            buttons.map(|button| Component::ActionRow(ActionRow { components: vec![button] })).collect()
        } else {
            vec![Component::ActionRow(ActionRow { components: buttons.collect() })]
        };

        Ok(InteractionResponse {
            kind: InteractionResponseType::ChannelMessageWithSource,
            data: Some(InteractionResponseData { content: title, components: Some(rows), ..Default::default() }),
        })
    }

    async fn on_msg_component(&self, interaction: Interaction) -> error::Result<InteractionResponse> {
        let Interaction { data, member, user, message, .. } = interaction;
        let voter = member.and_then(|member| member.user).or(user).map(|user| user.id);
        let Some(InteractionData::MessageComponent(data)) = data else {
            return Err(Error::Schema);
        };

        match data.component_type {
            ComponentType::Button => self.on_button(&data.custom_id, voter, message).await,
            ComponentType::UserSelectMenu => self.on_user_select(*data, voter).await,
            _ => Err(Error::UnsupportedInteraction),
        }
    }

    async fn on_button(
        &self,
        custom_id: &str,
        voter: Option<UserId>,
        message: Option<Message>,
    ) -> error::Result<InteractionResponse> {
        let (id, choice) = parse_button_id(custom_id).ok_or(Error::Schema)?;
        let Message { content, mut components, .. } = message.ok_or(Error::Schema)?;
        let voter = voter.ok_or(Error::UnknownUser)?;

        let Some(poll) = self.cast(id, choice, voter, None).await? else {
            disable(&mut components);
            let header = content.lines().next().unwrap_or_default();
            return Ok(update(Some(format!("{header}\n*Poll has ended. Voting is no longer allowed.*")), Some(components)));
        };

        relabel(&mut components, &poll);
        Ok(update(None, Some(components)))
    }

    async fn on_user_select(
        &self,
        data: MessageComponentInteractionData,
        voter: Option<UserId>,
    ) -> error::Result<InteractionResponse> {
        let id = parse_select_id(&data.custom_id).ok_or(Error::Schema)?;
        let choice = data.values.first().ok_or(Error::InvalidParams)?;
        let voter = voter.ok_or(Error::UnknownUser)?;
        let nominee = data.resolved.as_ref().and_then(|resolved| nominee(resolved, choice));

        let Some(poll) = self.cast(id, choice, voter, nominee).await? else {
            return Ok(update(Some("Poll closed!".into()), None));
        };

        Ok(update(Some(format!("Current leader: {}", leader_name(&poll))), None))
    }
}

fn text_input(custom_id: String, label: String, max_length: u16) -> Component {
    Component::ActionRow(ActionRow {
        components: vec![Component::TextInput(TextInput {
            custom_id,
            label,
            max_length: Some(max_length),
            min_length: None,
            placeholder: None,
            required: Some(false),
            style: TextInputStyle::Short,
            value: None,
        })],
    })
}

fn update(content: Option<String>, components: Option<Vec<Component>>) -> InteractionResponse {
    InteractionResponse {
        kind: InteractionResponseType::UpdateMessage,
        data: Some(InteractionResponseData { content, components, ..Default::default() }),
    }
}

/// Splits `poll:<id>:<choice>` into the poll ID and the choice key.
fn parse_button_id(custom_id: &str) -> Option<(Uuid, &str)> {
    let mut iter = custom_id.splitn(3, ':');
    if iter.next()? != COMMAND_NAME {
        return None;
    }
    let id = iter.next()?.parse().ok()?;
    let choice = iter.next().filter(|choice| !choice.is_empty())?;
    Some((id, choice))
}

/// Extracts the poll ID from `poll:<id>`.
fn parse_select_id(custom_id: &str) -> Option<Uuid> {
    let (prefix, id) = custom_id.split_once(':')?;
    if prefix != COMMAND_NAME {
        return None;
    }
    id.parse().ok()
}

/// Removes a trailing ` (N)` vote count from a button label.
fn strip_tally(label: &str) -> &str {
    let Some((base, count)) = label.strip_suffix(')').and_then(|rest| rest.rsplit_once(" (")) else {
        return label;
    };
    if !count.is_empty() && count.bytes().all(|byte| byte.is_ascii_digit()) {
        base
    } else {
        label
    }
}

/// Byte length of the longest prefix of `text` that is at most `max` characters long.
fn fit(text: &str, max: usize) -> usize {
    text.char_indices().nth(max).map_or(text.len(), |(index, _)| index)
}

/// Rewrites every poll button label to show its current tally. The base
/// label is shortened if needed so that the result still fits on a button.
fn relabel(components: &mut [Component], poll: &UserPoll) {
    for component in components {
        let Component::ActionRow(ActionRow { components }) = component else {
            continue;
        };
        for component in components {
            let Component::Button(Button { custom_id: Some(custom_id), label: Some(label), style, .. }) = component else {
                continue;
            };
            if *style == ButtonStyle::Link {
                continue;
            }
            let Some((_, choice)) = parse_button_id(custom_id) else {
                continue;
            };
            let suffix = match poll.tally(choice) {
                0 => String::new(),
                tally => format!(" ({tally})"),
            };
            let end = fit(strip_tally(label), MAX_LABEL - suffix.len());
            label.truncate(end);
            label.push_str(&suffix);
        }
    }
}

fn disable(components: &mut [Component]) {
    for component in components {
        match component {
            Component::ActionRow(ActionRow { components }) => disable(components),
            Component::Button(Button { disabled, .. }) | Component::SelectMenu(SelectMenu { disabled, .. }) => {
                *disabled = true;
            }
            _ => {}
        }
    }
}

/// Resolves the display name of the selected user.
fn nominee(resolved: &InteractionDataResolved, choice: &str) -> Option<Nominee> {
    let id: UserId = choice.parse().ok()?;
    let name = resolved
        .members
        .get(&id)
        .and_then(|member| member.nick.as_deref())
        .or_else(|| resolved.users.get(&id).map(|user| user.name.as_str()))?;
    Some(Nominee { name: name.into() })
}

fn leader_name(poll: &UserPoll) -> String {
    match poll.leader() {
        Some((_, Choice { metadata: Some(nominee), .. })) => nominee.name.to_string(),
        Some((key, _)) => format!("<@{key}>"),
        None => String::from("nobody"),
    }
}
