use twilight_model::{
    application::command::{CommandOption, CommandOptionType, CommandOptionValue},
    id::{
        marker::{ApplicationMarker, GuildMarker},
        Id,
    },
};

fn option(kind: CommandOptionType, name: &str, description: &str) -> CommandOption {
    CommandOption {
        autocomplete: None,
        channel_types: None,
        choices: None,
        description: description.into(),
        description_localizations: None,
        kind,
        max_length: None,
        max_value: None,
        min_length: None,
        min_value: None,
        name: name.into(),
        name_localizations: None,
        options: None,
        required: None,
    }
}

/// Subcommands of `/poll`.
pub fn options() -> Vec<CommandOption> {
    let num_choices = CommandOption {
        required: Some(true),
        min_value: Some(CommandOptionValue::Number(2.0)),
        max_value: Some(CommandOptionValue::Number(5.0)),
        ..option(CommandOptionType::Number, "num_choices", "Number of options between 2 and 5")
    };
    let simple = CommandOption {
        options: Some(vec![num_choices]),
        ..option(CommandOptionType::SubCommand, "simple", "Poll where you can set the choices")
    };
    let user = CommandOption {
        options: Some(Vec::new()),
        ..option(CommandOptionType::SubCommand, "user", "Poll where the choices are users in the server")
    };
    vec![simple, user]
}

/// Registers `/poll`. With a guild, the command is registered there and the
/// global commands are cleared.
pub async fn register(
    client: &twilight_http::Client,
    app: Id<ApplicationMarker>,
    guild: Option<Id<GuildMarker>>,
) -> Result<(), twilight_http::Error> {
    let options = options();
    let interaction = client.interaction(app);
    match guild {
        Some(guild) => {
            interaction
                .create_guild_command(guild)
                .chat_input("poll", "Create a poll")
                .command_options(&options)
                .await?;
            interaction.set_global_commands(&[]).await?;
            log::info!("registered /poll in guild {guild}");
        }
        None => {
            interaction.create_global_command().chat_input("poll", "Create a poll").command_options(&options).await?;
            log::info!("registered /poll globally");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::options;
    use twilight_model::application::command::CommandOptionType;

    #[test]
    fn subcommands() {
        let options = options();
        let names: Vec<_> = options.iter().map(|option| option.name.as_str()).collect();
        assert_eq!(names, ["simple", "user"]);
        assert!(options.iter().all(|option| option.kind == CommandOptionType::SubCommand));

        let nested = options[0].options.as_deref().unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].name, "num_choices");
        assert_eq!(nested[0].kind, CommandOptionType::Number);
        assert_eq!(nested[0].required, Some(true));
    }
}
