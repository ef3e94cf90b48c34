use crate::registry::{ChatIdentity, Registry};

const HELP: &str = "I watch HTTP APIs and tell you when they change.\n\n\
                    Commands:\n\
                    /add <url> - Watch an API\n\
                    /remove <number> - Stop watching an API\n\
                    /list - Show watched APIs";

/// Where a command came from, as far as the greeting cares
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatPlace {
    Private { username: Option<String> },
    Group { title: Option<String> },
    Channel { title: Option<String> },
}

/// Opening line of the `/start` reply, worded for the kind of chat
pub fn greeting(place: &ChatPlace) -> String {
    match place {
        ChatPlace::Private { username } => {
            format!("Hello, {}!", username.as_deref().unwrap_or("there"))
        }
        ChatPlace::Group { title } => {
            format!("Hello everyone in {}!", title.as_deref().unwrap_or("this group"))
        }
        ChatPlace::Channel { title } => {
            format!("Welcome to {}!", title.as_deref().unwrap_or("this channel"))
        }
    }
}

/// A parsed chat command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Greeting for the chat, followed by the help text
    Start,
    Help,
    Add(String),
    /// Raw argument; validated when executed so the user gets a reply
    Remove(String),
    List,
}

impl Command {
    /// Parse a message; `None` if it is not one of our commands
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (head, rest) = match text.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (text, ""),
        };
        // "/add@relay_bot" in groups
        let name = head.split('@').next().unwrap_or(head);

        match name {
            "/start" => Some(Command::Start),
            "/help" => Some(Command::Help),
            "/add" => Some(Command::Add(rest.to_string())),
            "/remove" => Some(Command::Remove(rest.to_string())),
            "/list" => Some(Command::List),
            _ => None,
        }
    }

    /// Commands that change the registry and may require admin rights
    pub fn mutates(&self) -> bool {
        matches!(self, Command::Add(_) | Command::Remove(_))
    }
}

/// Run a command against the registry and produce the reply text
pub async fn execute(registry: &Registry, chat: ChatIdentity, command: Command) -> String {
    match command {
        Command::Start | Command::Help => HELP.to_string(),
        Command::Add(url) => match registry.add(chat, &url).await {
            Ok(index) => format!("Watching #{}: {}", index, url.trim()),
            Err(e) => format!("Could not add API: {}\nUsage: /add <url>", e),
        },
        Command::Remove(arg) => {
            let index = match arg.parse::<usize>() {
                Ok(index) => index,
                Err(_) => return "Usage: /remove <number> (see /list)".to_string(),
            };
            match registry.remove(chat, index).await {
                Ok(endpoint) => format!("Stopped watching #{}: {}", index, endpoint.url),
                Err(e) => format!("Could not remove API: {}", e),
            }
        }
        Command::List => {
            let endpoints = registry.list(chat).await;
            if endpoints.is_empty() {
                return "No APIs watched in this chat. Use /add <url>.".to_string();
            }
            let mut reply = String::from("Watched APIs:\n\n");
            for (i, endpoint) in endpoints.iter().enumerate() {
                reply.push_str(&format!(
                    "{}. {} (added {})\n",
                    i + 1,
                    endpoint.url,
                    endpoint.added_at.format("%Y-%m-%d %H:%M UTC")
                ));
            }
            reply
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAT: ChatIdentity = ChatIdentity(7);

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/help@relay_bot"), Some(Command::Help));
        assert_eq!(
            Command::parse("  /add   https://x.example/api  "),
            Some(Command::Add("https://x.example/api".into()))
        );
        assert_eq!(
            Command::parse("/remove@relay_bot 2"),
            Some(Command::Remove("2".into()))
        );
        assert_eq!(Command::parse("/add"), Some(Command::Add(String::new())));
        assert_eq!(Command::parse("/list"), Some(Command::List));
        assert_eq!(Command::parse("hello"), None);
        assert_eq!(Command::parse("/unknown"), None);
    }

    #[test]
    fn test_mutating_commands() {
        assert!(Command::Add("u".into()).mutates());
        assert!(Command::Remove("1".into()).mutates());
        assert!(!Command::List.mutates());
        assert!(!Command::Help.mutates());
        assert!(!Command::Start.mutates());
    }

    #[test]
    fn test_greeting_depends_on_chat_kind() {
        let private = ChatPlace::Private {
            username: Some("ada".into()),
        };
        assert_eq!(greeting(&private), "Hello, ada!");
        assert_eq!(greeting(&ChatPlace::Private { username: None }), "Hello, there!");

        let group = ChatPlace::Group {
            title: Some("Ops".into()),
        };
        assert_eq!(greeting(&group), "Hello everyone in Ops!");

        let channel = ChatPlace::Channel {
            title: Some("Status Feed".into()),
        };
        assert_eq!(greeting(&channel), "Welcome to Status Feed!");
        assert_eq!(greeting(&ChatPlace::Channel { title: None }), "Welcome to this channel!");
    }

    #[tokio::test]
    async fn test_add_list_remove_flow() {
        let registry = Registry::in_memory();

        let reply = execute(&registry, CHAT, Command::Add("http://a.example".into())).await;
        assert_eq!(reply, "Watching #1: http://a.example");
        execute(&registry, CHAT, Command::Add("http://b.example".into())).await;

        let list = execute(&registry, CHAT, Command::List).await;
        assert!(list.contains("1. http://a.example"));
        assert!(list.contains("2. http://b.example"));

        let reply = execute(&registry, CHAT, Command::Remove("1".into())).await;
        assert_eq!(reply, "Stopped watching #1: http://a.example");
        let list = execute(&registry, CHAT, Command::List).await;
        assert!(list.contains("1. http://b.example"));
    }

    #[tokio::test]
    async fn test_user_errors_are_replied() {
        let registry = Registry::in_memory();

        let reply = execute(&registry, CHAT, Command::Add(String::new())).await;
        assert!(reply.starts_with("Could not add API"));

        let reply = execute(&registry, CHAT, Command::Remove("99".into())).await;
        assert!(reply.starts_with("Could not remove API"));

        let reply = execute(&registry, CHAT, Command::Remove("two".into())).await;
        assert!(reply.starts_with("Usage"));

        let reply = execute(&registry, CHAT, Command::List).await;
        assert!(reply.starts_with("No APIs"));
    }
}
