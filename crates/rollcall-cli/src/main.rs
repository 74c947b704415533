use std::path::PathBuf;

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use rollcall_core::{EnrollOutcome, ImageSource};
use rollcall_store::EventKind;
use rollcalld::service::{IdentityFields, SignalOutcome};
use rollcalld::{AttendanceService, Config};

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new identity with a first reference image
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "operator")]
        role: String,
        /// Path to the reference image
        #[arg(long)]
        image: PathBuf,
    },
    /// Replace an identity's fields, optionally enrolling a new image
    Update {
        /// Identity id
        id: Uuid,
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        role: String,
        /// Path to a new reference image
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Add a reference image to an existing identity
    Enroll {
        /// Identity id
        id: Uuid,
        /// Path to the reference image
        image: PathBuf,
    },
    /// Record an arrival from a probe image
    Arrive { image: PathBuf },
    /// Record a departure from a probe image
    Depart { image: PathBuf },
    /// Show the full event history for one identity
    History { id: Uuid },
    /// List all identities with their most recent gallery path
    List,
    /// Show events within the trailing N-day window
    Window {
        id: Uuid,
        #[arg(long, default_value = "arrival")]
        kind: String,
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let service = AttendanceService::from_config(&config).await?;

    match cli.command {
        Commands::Register {
            name,
            phone,
            email,
            password,
            role,
            image,
        } => {
            let registration = service
                .register(
                    IdentityFields {
                        name,
                        phone,
                        email,
                        password,
                        role,
                    },
                    ImageSource::Path(image),
                )
                .await?;
            println!(
                "registered {} ({}) — first image at {}",
                registration.identity.name,
                registration.identity.id,
                registration.gallery_path.display()
            );
        }
        Commands::Update {
            id,
            name,
            phone,
            email,
            password,
            role,
            image,
        } => {
            let (identity, enrollment) = service
                .update_identity(
                    id,
                    IdentityFields {
                        name,
                        phone,
                        email,
                        password,
                        role,
                    },
                    image.map(ImageSource::Path),
                )
                .await?;
            println!("updated {} ({})", identity.name, identity.id);
            match enrollment {
                Some(EnrollOutcome::Accepted { path }) => {
                    println!("new image stored at {}", path.display());
                }
                Some(EnrollOutcome::DuplicateFace { matched, .. }) => {
                    println!("image rejected — duplicate of {}", matched.display());
                }
                None => {}
            }
        }
        Commands::Enroll { id, image } => {
            match service.enroll_image(id, ImageSource::Path(image)).await? {
                EnrollOutcome::Accepted { path } => {
                    println!("accepted — stored at {}", path.display());
                }
                EnrollOutcome::DuplicateFace { matched, .. } => {
                    println!("rejected — duplicate of {}", matched.display());
                }
            }
        }
        Commands::Arrive { image } => {
            signal(&service, image, EventKind::Arrival).await?;
        }
        Commands::Depart { image } => {
            signal(&service, image, EventKind::Departure).await?;
        }
        Commands::History { id } => {
            let history = service.history(id).await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        Commands::List => {
            for (identity, gallery) in service.list_all().await? {
                let path = gallery
                    .map(|g| g.path)
                    .unwrap_or_else(|| "(no gallery image)".to_string());
                println!("{}  {}  <{}>  {}", identity.id, identity.name, identity.email, path);
            }
        }
        Commands::Window { id, kind, days } => {
            let kind: EventKind = kind.parse().map_err(anyhow::Error::msg)?;
            let events = service.windowed(id, kind, days).await?;
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
    }

    Ok(())
}

async fn signal(service: &AttendanceService, image: PathBuf, kind: EventKind) -> Result<()> {
    match service
        .match_and_record(ImageSource::Path(image), kind, Local::now())
        .await?
    {
        SignalOutcome::Recorded { identity_id, event } => {
            println!("{kind} recorded for {identity_id} at {}", event.recorded_at);
        }
        SignalOutcome::AlreadyRecorded { identity_id, event } => {
            println!(
                "{kind} already recorded today for {identity_id} (at {})",
                event.recorded_at
            );
        }
        SignalOutcome::NotRecognized => {
            println!("face not recognized");
        }
    }
    Ok(())
}
