use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use containeranalysis::{
    rest::{RestGrafeas, DEFAULT_ENDPOINT},
    AttestationAuthority, ContainerAnalysis, GpgSigner, PgpSigningKey,
};

/// cactl
#[derive(Debug, Parser)]
#[clap(name = "cactl", version)]
pub struct App {
    /// Base URL of the Container Analysis API
    #[clap(long, env = "CONTAINERANALYSIS_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,
    /// OAuth2 bearer token
    #[clap(long, env = "CONTAINERANALYSIS_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Per-request timeout, in seconds
    #[clap(long, default_value_t = 30)]
    timeout: u64,

    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Debug, Args)]
struct AuthorityArgs {
    /// Authority name, also used as the note id
    #[clap(long)]
    name: String,
    /// Namespace the authority is deployed in
    #[clap(long, default_value = "default")]
    namespace: String,
    /// Where the note lives: <api>/projects/<project>
    #[clap(long)]
    note_reference: String,
}

impl From<AuthorityArgs> for AttestationAuthority {
    fn from(args: AuthorityArgs) -> Self {
        AttestationAuthority {
            name: args.name,
            namespace: args.namespace,
            note_reference: args.note_reference,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Lists the vulnerabilities found in an image
    Vulnerabilities { image: String },
    /// Lists the PGP attestations recorded for an image
    Attestations { image: String },
    /// Creates the note for an attestation authority
    CreateNote {
        #[clap(flatten)]
        authority: AuthorityArgs,
    },
    /// Shows the note for an attestation authority
    GetNote {
        #[clap(flatten)]
        authority: AuthorityArgs,
    },
    /// Deletes the note for an attestation authority (its occurrences are kept)
    DeleteNote {
        #[clap(flatten)]
        authority: AuthorityArgs,
    },
    /// Signs an image and records the attestation, creating the authority's note if needed
    Attest {
        /// the image, pinned by digest
        image: String,
        #[clap(flatten)]
        authority: AuthorityArgs,
        /// ASCII-armored PGP secret key
        #[clap(long)]
        key_file: PathBuf,
        /// Key id recorded with the attestation
        #[clap(long)]
        secret_name: String,
    },
    /// Deletes an occurrence by its full name
    DeleteOccurrence { name: String },
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    serde_json::to_writer_pretty(std::io::stdout(), value)?;
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = App::parse();

    let client = RestGrafeas::new(
        &args.endpoint,
        args.token.as_deref(),
        Duration::from_secs(args.timeout),
    )
    .with_context(|| format!("Failed to set up client for {}", args.endpoint))?;
    let ca = ContainerAnalysis::new(client, GpgSigner::default());

    match args.cmd {
        Command::Vulnerabilities { ref image } => {
            print_json(&ca.get_vulnerabilities(image).await?)?;
        }
        Command::Attestations { ref image } => {
            print_json(&ca.get_attestations(image).await?)?;
        }
        Command::CreateNote { authority } => {
            let note = ca.create_attestation_note(&authority.into()).await?;
            println!("{}", note.name);
        }
        Command::GetNote { authority } => {
            let note = ca.get_attestation_note(&authority.into()).await?;
            print_json(&serde_json::json!({
                "name": note.name,
                "shortDescription": note.short_description,
                "longDescription": note.long_description,
            }))?;
        }
        Command::DeleteNote { authority } => {
            ca.delete_attestation_note(&authority.into()).await?;
        }
        Command::Attest {
            ref image,
            authority,
            ref key_file,
            ref secret_name,
        } => {
            let private_key = std::fs::read_to_string(key_file)
                .with_context(|| format!("Reading key from {key_file:?}"))?;
            let key = PgpSigningKey::new(secret_name, private_key);

            let authority: AttestationAuthority = authority.into();
            let note = match ca.get_attestation_note(&authority).await {
                Ok(note) => note,
                Err(err) if err.is_not_found() => {
                    log::info!("Creating note for attestation authority {}", authority.name);
                    ca.create_attestation_note(&authority).await?
                }
                Err(err) => return Err(err.into()),
            };

            let occurrence = ca
                .create_attestation_occurrence(&note, image, &key)
                .await
                .with_context(|| format!("Unable to attest {image}"))?;
            println!("{}", occurrence.name);
        }
        Command::DeleteOccurrence { ref name } => {
            ca.delete_occurrence(name).await?;
        }
    }
    Ok(())
}
