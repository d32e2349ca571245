use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use clinic_core::config::token_ttl_from_env_value;
use clinic_core::repositories::icd10::parse_catalogue_line;
use clinic_core::repositories::{
    AdminService, ClinicService, DoctorService, Icd10Service, NewDoctor, PatientService,
};
use clinic_core::{
    ClinicCode, EmailAddress, Icd10Code, NonEmptyText, Principal, Role, TokenService,
    MAX_NAME_CHARS, MIN_JWT_SECRET_BYTES,
};
use clinic_push::VapidKeys;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "clinic")]
#[command(about = "Clinic backend operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply embedded database migrations
    Migrate,
    /// Create a clinic (tenant)
    CreateClinic {
        /// Login code, lowercase letters, digits and '-'
        code: String,
        /// Display name
        name: String,
    },
    /// Create an administrator for a clinic
    CreateAdmin {
        /// Clinic login code
        clinic_code: String,
        email: String,
        display_name: String,
        #[arg(long)]
        password: String,
        /// Super admins may delete any note
        #[arg(long = "super")]
        is_super: bool,
    },
    /// Create a doctor for a clinic
    CreateDoctor {
        /// Clinic login code
        clinic_code: String,
        email: String,
        display_name: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        specialty: Option<String>,
    },
    /// Import ICD-10 catalogue lines (`CODE<TAB or ;>Description`)
    ImportIcd10 {
        /// Catalogue file
        path: PathBuf,
    },
    /// Generate a VAPID key pair for web push
    VapidKeygen,
    /// Issue a bearer token for an existing account
    IssueToken {
        /// Clinic login code
        clinic_code: String,
        /// admin, doctor or patient
        role: Role,
        /// Account id
        id: Uuid,
    },
}

/// Connects using `DATABASE_URL`.
async fn connect() -> anyhow::Result<PgPool> {
    let url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    Ok(PgPoolOptions::new().max_connections(2).connect(&url).await?)
}

/// Parses a catalogue, failing on the first malformed line.
fn parse_catalogue(text: &str) -> anyhow::Result<Vec<(Icd10Code, String)>> {
    let mut entries = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if let Some(parsed) = parse_catalogue_line(line) {
            entries.push(parsed.with_context(|| format!("line {}", index + 1))?);
        }
    }
    Ok(entries)
}

fn token_service() -> anyhow::Result<TokenService> {
    let secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
    if secret.len() < MIN_JWT_SECRET_BYTES {
        anyhow::bail!("JWT_SECRET must be at least {MIN_JWT_SECRET_BYTES} bytes");
    }
    let ttl = token_ttl_from_env_value(std::env::var("TOKEN_TTL_HOURS").ok())?;
    Ok(TokenService::new(secret.as_bytes(), ttl))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinic_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Migrate) => {
            let pool = connect().await?;
            clinic_core::MIGRATOR.run(&pool).await?;
            println!("Migrations applied.");
        }
        Some(Commands::CreateClinic { code, name }) => {
            let code = ClinicCode::parse(&code)?;
            let name = NonEmptyText::bounded(&name, MAX_NAME_CHARS)?;
            let clinic = ClinicService::new(connect().await?)
                .create(&code, &name)
                .await?;
            println!("Created clinic {} with ID: {}", clinic.code, clinic.id);
        }
        Some(Commands::CreateAdmin {
            clinic_code,
            email,
            display_name,
            password,
            is_super,
        }) => {
            let pool = connect().await?;
            let clinic = ClinicService::new(pool.clone())
                .require_by_code(&ClinicCode::parse(&clinic_code)?)
                .await?;
            let admin = AdminService::new(pool)
                .create(
                    clinic.id,
                    &EmailAddress::parse(&email)?,
                    &NonEmptyText::bounded(&display_name, MAX_NAME_CHARS)?,
                    &password,
                    is_super,
                )
                .await?;
            println!("Created admin {} with ID: {}", admin.email, admin.id);
        }
        Some(Commands::CreateDoctor {
            clinic_code,
            email,
            display_name,
            password,
            specialty,
        }) => {
            let pool = connect().await?;
            let clinic = ClinicService::new(pool.clone())
                .require_by_code(&ClinicCode::parse(&clinic_code)?)
                .await?;
            let new = NewDoctor {
                email: EmailAddress::parse(&email)?,
                display_name: NonEmptyText::bounded(&display_name, MAX_NAME_CHARS)?,
                password,
                specialty: specialty
                    .map(|s| NonEmptyText::bounded(&s, MAX_NAME_CHARS))
                    .transpose()?,
            };
            let doctor = DoctorService::new(pool).create(clinic.id, new).await?;
            println!("Created doctor {} with ID: {}", doctor.email, doctor.id);
        }
        Some(Commands::ImportIcd10 { path }) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let entries = parse_catalogue(&text)?;
            let written = Icd10Service::new(connect().await?)
                .import(&entries)
                .await?;
            println!("Imported {written} of {} ICD-10 entries.", entries.len());
        }
        Some(Commands::VapidKeygen) => {
            let keys = VapidKeys::generate();
            println!("VAPID_PRIVATE_KEY={}", keys.private_key_base64());
            println!("Public key: {}", keys.public_key_base64());
        }
        Some(Commands::IssueToken {
            clinic_code,
            role,
            id,
        }) => {
            let tokens = token_service()?;
            let pool = connect().await?;
            let clinic = ClinicService::new(pool.clone())
                .require_by_code(&ClinicCode::parse(&clinic_code)?)
                .await?;
            match role {
                Role::Admin => {
                    AdminService::new(pool).get(clinic.id, id).await?;
                }
                Role::Doctor => {
                    DoctorService::new(pool).require_active(clinic.id, id).await?;
                }
                Role::Patient => {
                    PatientService::new(pool).get(clinic.id, id).await?;
                }
            }
            let principal = Principal {
                id,
                role,
                clinic_id: clinic.id,
                clinic_code: clinic.code,
            };
            println!("{}", tokens.issue(&principal, Utc::now())?);
        }
        None => {
            println!("Use 'clinic --help' for commands");
        }
    }

    Ok(())
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
    fn test_parse_create_admin() {
        let cli = Cli::try_parse_from([
            "clinic",
            "create-admin",
            "smile-dental",
            "owner@smile.example",
            "Clinic Owner",
            "--password",
            "password123",
            "--super",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::CreateAdmin {
                clinic_code,
                is_super,
                ..
            }) => {
                assert_eq!(clinic_code, "smile-dental");
                assert!(is_super);
            }
            _ => panic!("expected create-admin"),
        }
    }

    #[test]
    fn test_parse_issue_token_role() {
        let id = Uuid::new_v4();
        let id_arg = id.to_string();
        let cli = Cli::try_parse_from(["clinic", "issue-token", "smile-dental", "doctor", &id_arg])
            .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::IssueToken { role: Role::Doctor, id: parsed, .. }) if parsed == id
        ));
        assert!(
            Cli::try_parse_from(["clinic", "issue-token", "smile-dental", "nurse", &id_arg])
                .is_err()
        );
    }

    #[test]
    fn test_parse_catalogue_reports_line() {
        let entries = parse_catalogue("# dental\nK02.1\tCaries of dentine\n\nK08.1;Loss of teeth\n")
            .unwrap();
        assert_eq!(entries.len(), 2);

        let err = parse_catalogue("K02.1\tCaries\nnot a line\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
