use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use zenjournal::client::{ClientError, JournalClient};
use zenjournal::config::ClientConfig;
use zenjournal::journal::mood_average;
use zenjournal::models::{
    JournalEntry, JournalEntryDraft, JournalEntryPatch, StrategicPlan, TraitVector, UserCreate,
};
use zenjournal::session::SessionState;
use zenjournal::store::Page;

/// ZenJournal client - journal, traits and strategic plans from the terminal
#[derive(Parser, Debug)]
#[command(name = "zenjournal", version, about)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and remember the session
    Login {
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// Create an account, then log in
    Register(RegisterArgs),
    /// Forget the saved session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Show personality trait scores
    Traits {
        /// Show recent trait changes instead
        #[arg(long)]
        history: bool,
    },
    /// Journal entries
    #[command(subcommand)]
    Journal(JournalCommand),
    /// Strategic plans
    #[command(subcommand)]
    Plan(PlanCommand),
}

#[derive(Args, Debug)]
struct RegisterArgs {
    username: String,
    #[arg(short, long)]
    email: String,
    #[arg(short, long)]
    password: String,
    /// Initial trait scores as openness,conscientiousness,extraversion,agreeableness,neuroticism
    #[arg(long, value_delimiter = ',', num_args = 5)]
    traits: Option<Vec<f64>>,
}

#[derive(Subcommand, Debug)]
enum JournalCommand {
    List {
        #[arg(long, default_value_t = 0)]
        skip: u32,
        #[arg(long)]
        limit: Option<u32>,
    },
    Show {
        id: String,
    },
    Add {
        title: String,
        content: String,
        #[arg(short, long)]
        mood: Option<u8>,
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(short, long)]
        mood: Option<u8>,
        /// Replaces all tags
        #[arg(short, long = "tag")]
        tags: Option<Vec<String>>,
    },
    Delete {
        id: String,
    },
    /// Search the most recent page of entries by title, content or tag
    Search {
        text: String,
    },
}

#[derive(Subcommand, Debug)]
enum PlanCommand {
    Generate,
    History {
        #[arg(long, default_value_t = 0)]
        skip: u32,
        #[arg(long)]
        limit: Option<u32>,
    },
    Show {
        id: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };
    config.apply_env()?;

    let mut client = JournalClient::from_config(config)?;
    if client.session().is_loading() {
        let state = client.restore().await;
        info!(state = ?state, "session restored");
    }

    if let Err(e) = run(&mut client, cli.command).await {
        eprintln!("error: {}", e.display_message());
        std::process::exit(1);
    }
    Ok(())
}

async fn run(client: &mut JournalClient, command: Command) -> Result<(), ClientError> {
    match command {
        Command::Login { username, password } => {
            let identity = client.login(&username, &password).await?;
            println!("Logged in as {}", identity.username);
        }
        Command::Register(args) => {
            let traits = args.traits.map(|t| TraitVector {
                openness: t[0],
                conscientiousness: t[1],
                extraversion: t[2],
                agreeableness: t[3],
                neuroticism: t[4],
            });
            let user = UserCreate {
                username: args.username,
                email: args.email,
                password: args.password,
                traits,
            };
            let identity = client.register(&user).await?;
            println!("Welcome, {}", identity.username);
        }
        Command::Logout => {
            client.logout();
            println!("Logged out");
        }
        Command::Whoami => match (client.session().state(), client.identity()) {
            (SessionState::Authenticated, Some(identity)) => {
                println!("{} <{}> ({})", identity.username, identity.email, identity.id);
                print_traits(&identity.traits);
            }
            _ => println!("Not logged in"),
        },
        Command::Traits { history } => {
            if history {
                for snapshot in client.trait_history().await? {
                    println!("{}", snapshot.updated_at.format("%Y-%m-%d %H:%M"));
                    print_traits(&snapshot.traits);
                }
            } else {
                let traits = client.traits().await?;
                print_traits(&traits);
            }
        }
        Command::Journal(cmd) => run_journal(client, cmd).await?,
        Command::Plan(cmd) => run_plan(client, cmd).await?,
    }
    Ok(())
}

async fn run_journal(client: &mut JournalClient, command: JournalCommand) -> Result<(), ClientError> {
    match command {
        JournalCommand::List { skip, limit } => {
            let limit = limit.unwrap_or(client.config().paging.journal_page_size);
            let entries = client.list_entries(Some(Page { skip, limit })).await?;
            for entry in entries {
                print_entry_line(entry);
            }
            if let Some(avg) = mood_average(entries) {
                println!("average mood: {:.1}", avg);
            }
        }
        JournalCommand::Show { id } => {
            let entry = client.fetch_entry(&id).await?;
            print_entry_line(&entry);
            println!("\n{}", entry.content);
        }
        JournalCommand::Add {
            title,
            content,
            mood,
            tags,
        } => {
            let mut draft = JournalEntryDraft::new(title, content);
            draft.mood_rating = mood;
            for tag in &tags {
                draft.add_tag(tag);
            }
            let entry = client.create_entry(&draft).await?;
            println!("Created {}", entry.id);
        }
        JournalCommand::Edit {
            id,
            title,
            content,
            mood,
            tags,
        } => {
            let tags = tags.map(|tags| {
                let mut draft = JournalEntryDraft::default();
                for tag in &tags {
                    draft.add_tag(tag);
                }
                draft.tags
            });
            let patch = JournalEntryPatch {
                title,
                content,
                mood_rating: mood,
                tags,
            };
            let entry = client.update_entry(&id, &patch).await?;
            println!("Updated {}", entry.id);
        }
        JournalCommand::Delete { id } => {
            client.delete_entry(&id).await?;
            println!("Deleted {}", id);
        }
        JournalCommand::Search { text } => {
            client.list_entries(None).await?;
            for entry in client.search_entries(&text) {
                print_entry_line(entry);
            }
        }
    }
    Ok(())
}

async fn run_plan(client: &mut JournalClient, command: PlanCommand) -> Result<(), ClientError> {
    match command {
        PlanCommand::Generate => {
            println!("Generating strategic plan...");
            let plan = client.generate_plan().await?;
            print_plan(&plan);
        }
        PlanCommand::History { skip, limit } => {
            let limit = limit.unwrap_or(client.config().paging.plan_page_size);
            for plan in client.plan_history(Some(Page { skip, limit })).await? {
                println!("{}  {}  {}", plan.id, plan.generated_at.format("%Y-%m-%d"), plan.title);
            }
        }
        PlanCommand::Show { id } => {
            client.plan_history(None).await?;
            match client.select_plan(&id) {
                Some(plan) => print_plan(&plan),
                None => println!("No plan {} in recent history", id),
            }
        }
    }
    Ok(())
}

fn print_traits(traits: &TraitVector) {
    for (kind, score, band) in traits.summary() {
        println!("  {:<24} {:>4.1}  {:?}", kind.label(), score, band);
    }
}

fn print_entry_line(entry: &JournalEntry) {
    let mood = entry
        .mood_rating
        .map(|m| format!("mood {}", m))
        .unwrap_or_default();
    println!(
        "{}  {}  {}  {}  [{}]",
        entry.id,
        entry.created_at.format("%Y-%m-%d"),
        entry.title,
        mood,
        entry.tags.join(", ")
    );
}

fn print_plan(plan: &StrategicPlan) {
    println!("{}\n", plan.title);
    println!("{}\n", plan.analysis);
    for (i, rec) in plan.recommendations.iter().enumerate() {
        println!("  {}. {}", i + 1, rec);
    }
    if let Some(insight) = plan.zen_insight.as_deref().filter(|s| !s.is_empty()) {
        println!("\n  ~ {}", insight);
    }
}
