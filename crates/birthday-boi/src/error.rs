use thiserror::Error;

/// Failures of a slash-command invocation.
///
/// `Display` is the short message shown to the invoking user; internal
/// detail stays in the source chain and only reaches the log.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("This command can only be used in a server.")]
    GuildOnly,

    #[error("Missing required option '{0}'.")]
    MissingOption(&'static str),

    #[error("Invalid date: {0}.")]
    InvalidDate(#[from] crate::dates::DateError),

    #[error(
        "The birthday bot has not been set up for this server yet. \
         Please ask an admin to run the /setup_birthday_boi command first."
    )]
    NotConfigured,

    #[error("You have not set your birthday yet. Please use the /set_birthday command first.")]
    NoBirthday,

    #[error("There was an error talking to the database. Please try again later.")]
    Store(#[source] anyhow::Error),

    #[error("There was an error talking to Discord. Please try again later.")]
    Discord(#[source] serenity::Error),
}
