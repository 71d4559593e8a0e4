use biogate::{
    AccessLevel, AuthenticationService, Config, FileAuditSink, FileStore, Modality, UserAccount,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "biogate")]
#[command(about = "Biometric authentication and tiered data access")]
struct Cli {
    /// Enable verbose logging
    #[arg(long, global = true)]
    dev: bool,

    /// Optional TOML config file (built-in defaults otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for users, templates and the audit log
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a user account
    AddUser {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        #[arg(long)]
        national_id: String,
        /// Clearance tier 1-3
        #[arg(short, long, default_value = "1")]
        level: u8,
        #[arg(short, long, default_value = "general")]
        department: String,
    },
    /// Enroll a biometric template from an image file
    Enroll {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        image: PathBuf,
        #[arg(short, long, default_value = "fingerprint")]
        modality: Modality,
    },
    /// Verify a claimed identity against an image file
    Verify {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Identify whose biometric an image file carries
    Identify {
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Re-extract an existing template from a fresh image
    Update {
        #[arg(short, long)]
        template: String,
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Deactivate a template (soft delete)
    Remove {
        #[arg(short, long)]
        template: String,
    },
    /// Log in and walk the tiered data reports
    Demo {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Print matcher error-rate diagnostics
    Diagnostics,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.dev);

    let config = Config::load(cli.config.as_deref())?;
    let data_dir = cli.data_dir.clone().unwrap_or_else(|| config.storage.data_dir.clone());

    let store = Arc::new(FileStore::new(&data_dir)?);
    let audit = Arc::new(FileAuditSink::new(&data_dir)?);
    let service = AuthenticationService::new(store.clone(), store.clone(), audit, &config);

    let origin = "cli";

    match cli.command {
        Commands::AddUser { name, email, national_id, level, department } => {
            let level = AccessLevel::from_level(level)
                .ok_or_else(|| anyhow::anyhow!("clearance tier must be 1, 2 or 3"))?;
            let user = UserAccount::new(name, email, national_id, level, department);
            biogate::UserRepository::create(store.as_ref(), &user)?;
            println!("User created: {} ({})", user.name, user.id);
        }
        Commands::Enroll { user, image, modality } => {
            let capture = service.authenticator().capture().capture_from_file(&image)?;
            let template = service.enroll(&user, &capture, modality, origin)?;
            println!(
                "Enrolled template {} | quality {:.2}% ({})",
                template.id,
                template.quality_score,
                template.quality_level()
            );
        }
        Commands::Verify { user, image } => {
            match service.login_from_file(&user, &image, origin) {
                Ok(session) => {
                    println!("Authentication: SUCCESS");
                    println!("  User: {}", session.user.name);
                    println!("  Score: {:.2}%", session.auth_score * 100.0);
                    println!("  Session: {}", session.id);
                    service.logout(&session.id);
                }
                Err(err) => {
                    println!("Authentication: FAILED ({})", err);
                }
            }
        }
        Commands::Identify { image } => {
            let capture = service.authenticator().capture().capture_from_file(&image)?;
            match service.login_by_identification(&capture, origin) {
                Ok(session) => {
                    println!("Identified: {} ({})", session.user.name, session.user.id);
                    println!("  Score: {:.2}%", session.auth_score * 100.0);
                    service.logout(&session.id);
                }
                Err(err) => {
                    println!("Identification failed: {}", err);
                }
            }
        }
        Commands::Update { template, image } => {
            let capture = service.authenticator().capture().capture_from_file(&image)?;
            let updated = service.update_template(&template, &capture, origin)?;
            println!("Template {} updated | quality {:.2}%", updated.id, updated.quality_score);
        }
        Commands::Remove { template } => {
            if service.authenticator().remove_template(&template)? {
                println!("Template {} deactivated", template);
            } else {
                println!("No such template: {}", template);
            }
        }
        Commands::Demo { user, image } => {
            let session = service.login_from_file(&user, &image, origin)?;
            println!("Logged in as {} | session {}\n", session.user.name, session.id);

            for level in [AccessLevel::Public, AccessLevel::Director, AccessLevel::Minister] {
                match service.fetch_report(&session.id, level) {
                    Ok(report) => println!("{}", report),
                    Err(decision) => println!("{}\n", decision),
                }
            }

            println!("{}", service.session_report());
            service.logout(&session.id);
        }
        Commands::Diagnostics => {
            let matcher = service.authenticator().matcher();
            println!("threshold   FAR        FRR");
            for step in (0..=10).map(|s| s as f64 * 0.1) {
                println!(
                    "{:>9.2}   {:.6}   {:.6}",
                    step,
                    matcher.estimate_far(step),
                    matcher.estimate_frr(step)
                );
            }
            println!("\nEqual-error-rate threshold: {:.2}", matcher.find_eer());
        }
    }

    service.shutdown();
    Ok(())
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
