//! Interactive question loop with slash commands for session control.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use genie_relay::browse::BrowseError;
use genie_relay::service::GenieService;
use genie_relay::session::SettingsOverrides;

const HELP_TEXT: &str = "\
Commands:
  /reset                          start a new conversation
  /settings                       show limits and the current space
  /settings defaults              restore default limits
  /settings key=value ...         e.g. rows=100 cols=12 sql=off timeout=90
  /spaces                         list available spaces
  /space <id-or-title>            switch space (starts a new conversation)
  /conversations                  list conversations in the current space
  /messages <conversation> [n]    show the last n messages (default 3)
  /help                           show this help
  /quit                           leave";

#[derive(Debug, PartialEq, Eq)]
enum ChatCommand<'a> {
    Ask(&'a str),
    Reset,
    ShowSettings,
    DefaultSettings,
    UpdateSettings(&'a str),
    Spaces,
    Space(&'a str),
    Conversations,
    Messages {
        conversation_id: &'a str,
        limit: Option<usize>,
    },
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse_command(input: &str) -> ChatCommand<'_> {
    let Some(rest) = input.strip_prefix('/') else {
        return ChatCommand::Ask(input);
    };
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    match name {
        "exit" | "quit" => ChatCommand::Quit,
        "help" => ChatCommand::Help,
        "reset" | "new" => ChatCommand::Reset,
        "settings" if args.is_empty() => ChatCommand::ShowSettings,
        "settings" if args.eq_ignore_ascii_case("defaults") => ChatCommand::DefaultSettings,
        "settings" => ChatCommand::UpdateSettings(args),
        "spaces" => ChatCommand::Spaces,
        "space" if !args.is_empty() => ChatCommand::Space(args),
        "conversations" => ChatCommand::Conversations,
        "messages" if !args.is_empty() => {
            let mut parts = args.split_whitespace();
            let conversation_id = parts.next().unwrap_or_default();
            let limit = parts.next().and_then(|n| n.parse().ok());
            ChatCommand::Messages {
                conversation_id,
                limit,
            }
        }
        _ => ChatCommand::Unknown(name),
    }
}

/// Run the interactive loop until EOF or `/quit`.
pub async fn run(config_path: &str, user_id: &str) -> Result<()> {
    let service = super::build_service(config_path).await?;

    println!("{}", service.settings_summary(user_id).await);
    println!("Type /help for commands.\n");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut async_stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    loop {
        async_stdout.write_all(b"> ").await?;
        async_stdout.flush().await?;

        let Some(input) = lines.next_line().await? else {
            println!();
            break;
        };

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let command = parse_command(input);
        if command == ChatCommand::Quit {
            break;
        }

        let reply = dispatch(&service, user_id, command).await;
        println!("\n{reply}\n");
    }

    Ok(())
}

async fn dispatch(service: &GenieService, user_id: &str, command: ChatCommand<'_>) -> String {
    match command {
        ChatCommand::Ask(question) => service
            .handle_question(user_id, question)
            .await
            .join("\n\n---\n\n"),
        ChatCommand::Reset => {
            service.reset_conversation(user_id);
            "🆕 Started a new conversation.".to_string()
        }
        ChatCommand::ShowSettings => service.settings_summary(user_id).await,
        ChatCommand::DefaultSettings => service.restore_default_settings(user_id).await,
        ChatCommand::UpdateSettings(pairs) => {
            let overrides = SettingsOverrides::parse_pairs(pairs);
            if overrides.is_empty() {
                return "⚠️ No recognized settings. Try `/settings rows=100 cols=12`.".to_string();
            }
            service.update_settings(user_id, &overrides).await
        }
        ChatCommand::Spaces => service.list_spaces_markdown().await,
        ChatCommand::Space(wanted) => match service.switch_space(user_id, wanted).await {
            Ok(space) => format!(
                "✅ Switched to **{}** (`{}`). Started a new conversation.",
                space.title, space.space_id
            ),
            Err(BrowseError::SpaceNotFound(name)) => {
                format!("⚠️ No space matches '{name}'. Use /spaces to see the list.")
            }
            Err(BrowseError::Backend(e)) => format!("⚠️ Couldn't list spaces: {}", e.kind()),
        },
        ChatCommand::Conversations => service.list_conversations_markdown(user_id).await,
        ChatCommand::Messages {
            conversation_id,
            limit,
        } => {
            service
                .list_messages_markdown(user_id, conversation_id, limit)
                .await
        }
        ChatCommand::Help => HELP_TEXT.to_string(),
        ChatCommand::Quit => String::new(),
        ChatCommand::Unknown(name) => format!("Unknown command `/{name}`. Type /help."),
    }
}
