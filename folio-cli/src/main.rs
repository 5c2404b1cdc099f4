mod commands;
mod models;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::NewArticle;
use folio_store::Store;
use models::Blog;
use std::path::PathBuf;
use std::process;

/// folio: manage the authors, categories and articles of a blog stored as
/// YAML files
#[derive(Parser)]
#[command(name = "folio", version, about)]
struct Cli {
    /// Path to the blog's data directory
    #[arg(short = 'P', long, env = "FOLIO_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Log store activity (loads, commits, locking)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage authors
    #[command(subcommand)]
    Author(AuthorCommand),

    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommand),

    /// Manage articles
    #[command(subcommand)]
    Article(ArticleCommand),
}

#[derive(Subcommand)]
enum AuthorCommand {
    /// List authors by handle
    List,
    /// Create an author
    Create { handle: String },
    /// Delete an author and their emails
    Delete { uid: String },
    /// Show an author and their emails
    Info { uid: String },
    /// Set an author's display name
    SetName { uid: String, name: String },
    /// Register an email address
    EmailAdd { uid: String, email: String },
    /// Remove an email address
    EmailDelete { uid: String, email: String },
    /// Make an email address the primary one
    EmailPrimary { uid: String, email: String },
    /// Label an email address
    EmailLabel {
        uid: String,
        email: String,
        label: EmailLabel,
    },
}

#[derive(Clone, ValueEnum)]
enum EmailLabel {
    Personal,
    Business,
}

impl EmailLabel {
    fn as_str(&self) -> &'static str {
        match self {
            EmailLabel::Personal => models::EMAIL_LABELS[0],
            EmailLabel::Business => models::EMAIL_LABELS[1],
        }
    }
}

#[derive(Subcommand)]
enum CategoryCommand {
    /// List categories by name
    List,
    /// Create a category
    Create {
        name: String,
        /// Parent category (uuid or name)
        #[arg(short, long)]
        parent: Option<String>,
    },
    /// Delete an unused category
    Delete { uid: String },
}

#[derive(Subcommand)]
enum ArticleCommand {
    /// List articles by slug
    List,
    /// Create an article from a Markdown file
    Create {
        /// Author (uuid or handle); repeat for several authors
        #[arg(long = "author", required = true)]
        authors: Vec<String>,
        /// Markdown contents; the slug comes from its first heading
        #[arg(long)]
        contents: PathBuf,
        /// Category (uuid or name)
        #[arg(long)]
        category: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Show an article and its contents
    Show { uid: String },
    /// Delete an article and its files
    Delete { uid: String },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn run(cli: Cli) -> Result<()> {
    let blog = Blog::declare()?;
    let store = Store::open(&cli.data_dir, blog.registry()?)?;

    match cli.command {
        Command::Author(command) => match command {
            AuthorCommand::List => commands::author_list(&store, &blog),
            AuthorCommand::Create { handle } => commands::author_create(&store, &blog, &handle),
            AuthorCommand::Delete { uid } => commands::author_delete(&store, &blog, &uid),
            AuthorCommand::Info { uid } => commands::author_info(&store, &blog, &uid),
            AuthorCommand::SetName { uid, name } => {
                commands::author_set_name(&store, &blog, &uid, &name)
            }
            AuthorCommand::EmailAdd { uid, email } => {
                commands::email_add(&store, &blog, &uid, &email)
            }
            AuthorCommand::EmailDelete { uid, email } => {
                commands::email_delete(&store, &blog, &uid, &email)
            }
            AuthorCommand::EmailPrimary { uid, email } => {
                commands::email_primary(&store, &blog, &uid, &email)
            }
            AuthorCommand::EmailLabel { uid, email, label } => {
                commands::email_label(&store, &blog, &uid, &email, label.as_str())
            }
        },

        Command::Category(command) => match command {
            CategoryCommand::List => commands::category_list(&store, &blog),
            CategoryCommand::Create { name, parent } => {
                commands::category_create(&store, &blog, &name, parent.as_deref())
            }
            CategoryCommand::Delete { uid } => commands::category_delete(&store, &blog, &uid),
        },

        Command::Article(command) => match command {
            ArticleCommand::List => commands::article_list(&store, &blog),
            ArticleCommand::Create {
                authors,
                contents,
                category,
                tags,
            } => commands::article_create(
                &store,
                &blog,
                NewArticle {
                    authors: &authors,
                    contents: &contents,
                    category: category.as_deref(),
                    tags,
                },
            ),
            ArticleCommand::Show { uid } => commands::article_show(&store, &blog, &uid),
            ArticleCommand::Delete { uid } => commands::article_delete(&store, &blog, &uid),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_nested_commands() {
        let cli = Cli::try_parse_from([
            "folio", "-P", "/tmp/blog", "article", "create", "--author", "alice", "--author",
            "bob", "--contents", "post.md", "--tag", "rust",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/blog"));
        match cli.command {
            Command::Article(ArticleCommand::Create { authors, tags, .. }) => {
                assert_eq!(authors, vec!["alice", "bob"]);
                assert_eq!(tags, vec!["rust"]);
            }
            _ => panic!("expected article create"),
        }

        let cli = Cli::try_parse_from(["folio", "author", "email-label", "x", "a@b.co", "business"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Command::Author(AuthorCommand::EmailLabel {
                label: EmailLabel::Business,
                ..
            })
        ));
    }
}
