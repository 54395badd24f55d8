use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use chain::{
    ConfirmPolicy, CrowdfundProgram, FallbackRpc, Keypair, Pubkey, RpcClient, Signer,
};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{CampaignDraft, CatalogQuery, ClientError, CrowdfundClient, ImageUpload};
use metadata_store::SupabaseStore;
use shared::{
    domain::{Lamports, SortDirection, SortKey},
    protocol::{Social, Tier},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::{load_settings, parse_commitment, Settings, CONFIG_FILE};

#[derive(Parser, Debug)]
#[command(name = "solfund", about = "Browse and back crowdfunding campaigns on Solana")]
struct Cli {
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,
    #[arg(long)]
    rpc_url: Option<String>,
    #[arg(long)]
    fallback_rpc_url: Option<String>,
    #[arg(long)]
    program_id: Option<String>,
    #[arg(long)]
    metadata_url: Option<String>,
    #[arg(long)]
    keypair: Option<PathBuf>,
    #[arg(long)]
    commitment: Option<String>,
    /// Print views as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    Newest,
    EndingSoon,
    MostFunded,
    Goal,
}

impl From<SortArg> for SortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Newest => SortKey::Newest,
            SortArg::EndingSoon => SortKey::EndingSoon,
            SortArg::MostFunded => SortKey::MostFunded,
            SortArg::Goal => SortKey::Goal,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Live campaigns.
    Explore {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        min_goal: Option<f64>,
        #[arg(long)]
        max_goal: Option<f64>,
        #[arg(long, value_enum, default_value = "newest")]
        sort: SortArg,
        #[arg(long)]
        ascending: bool,
    },
    /// Campaigns past their expiration.
    Archived,
    Campaign {
        address: String,
    },
    /// Created and backed campaigns of a wallet (the configured keypair by default).
    Profile {
        wallet: Option<String>,
    },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        short_description: String,
        /// Markdown file with the long description.
        #[arg(long)]
        description_file: Option<PathBuf>,
        #[arg(long)]
        goal: f64,
        #[arg(long)]
        days: u64,
        /// `AMOUNT:TITLE[:NFTS[:DESCRIPTION]]`, repeatable.
        #[arg(long = "tier")]
        tiers: Vec<String>,
        /// `PLATFORM=URL`, repeatable.
        #[arg(long = "social")]
        socials: Vec<String>,
        #[arg(long = "image")]
        images: Vec<PathBuf>,
    },
    Contribute {
        campaign: String,
        #[arg(long)]
        tier: usize,
        /// Amount in SOL; must match the tier price.
        #[arg(long)]
        amount: f64,
    },
    Finalize {
        campaign: String,
    },
    Refund {
        campaign: String,
    },
    FounderVault,
    Withdraw,
}

fn apply_overrides(cli: &Cli, settings: &mut Settings) -> Result<()> {
    let overrides = [
        ("rpc_url", cli.rpc_url.as_deref()),
        ("fallback_rpc_url", cli.fallback_rpc_url.as_deref()),
        ("program_id", cli.program_id.as_deref()),
        ("metadata_url", cli.metadata_url.as_deref()),
    ];
    for (key, value) in overrides {
        if let Some(value) = value {
            settings.set(key, value)?;
        }
    }
    if let Some(path) = &cli.keypair {
        settings.keypair_path = Some(path.clone());
    }
    if let Some(level) = &cli.commitment {
        settings.commitment = parse_commitment(level)?;
    }
    Ok(())
}

fn build_client(settings: &Settings) -> Result<CrowdfundClient> {
    let program_id: Pubkey = settings
        .program_id
        .as_deref()
        .context("program_id is not configured")?
        .parse()
        .context("invalid program_id")?;
    let founder: Pubkey = settings
        .founder_pubkey
        .parse()
        .context("invalid founder_pubkey")?;
    let metadata_url = settings
        .metadata_url
        .as_deref()
        .context("metadata_url is not configured")?;

    let primary = RpcClient::new(settings.rpc_url.clone(), settings.commitment);
    let fallback = settings
        .fallback_rpc_url
        .as_ref()
        .map(|url| RpcClient::new(url.clone(), settings.commitment));
    let store = SupabaseStore::new(metadata_url, settings.metadata_api_key.clone())?;

    Ok(CrowdfundClient::new(
        Arc::new(FallbackRpc::new(primary, fallback)),
        Arc::new(store),
        CrowdfundProgram::new(program_id),
        founder,
    )
    .with_confirm_policy(ConfirmPolicy {
        commitment: settings.commitment,
        ..ConfirmPolicy::default()
    }))
}

fn load_keypair(settings: &Settings) -> Result<Keypair> {
    let path = settings
        .keypair_path
        .as_ref()
        .context("keypair_path is not configured")?;
    Ok(chain::read_keypair(path)?)
}

fn parse_tier(raw: &str) -> Result<Tier> {
    let mut parts = raw.splitn(4, ':');
    let amount = parts
        .next()
        .unwrap_or_default()
        .trim()
        .parse::<f64>()
        .with_context(|| format!("invalid tier amount in '{raw}'"))?;
    let Some(title) = parts.next().map(str::trim).filter(|t| !t.is_empty()) else {
        bail!("tier '{raw}' needs a title");
    };
    let nft_reward_count = match parts.next() {
        Some(count) => count
            .trim()
            .parse()
            .with_context(|| format!("invalid NFT count in '{raw}'"))?,
        None => 1,
    };
    Ok(Tier {
        amount,
        title: title.to_string(),
        description: parts.next().unwrap_or_default().trim().to_string(),
        nft_reward_count,
    })
}

fn parse_social(raw: &str) -> Result<Social> {
    let Some((platform, url)) = raw.split_once('=') else {
        bail!("social '{raw}' must look like PLATFORM=URL");
    };
    Ok(Social {
        platform: platform.trim().to_string(),
        url: url.trim().to_string(),
    })
}

fn content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

fn read_image(path: &Path) -> Result<ImageUpload> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("'{}' has no usable file name", path.display()))?
        .to_string();
    let bytes = fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    Ok(ImageUpload {
        file_name,
        content_type: content_type(path),
        bytes,
    })
}

fn parse_address(raw: &str) -> Result<Pubkey> {
    chain::parse_address(raw).with_context(|| format!("'{raw}' is not a valid address"))
}

fn print_output<T: serde::Serialize>(json: bool, value: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text(value));
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = load_settings(&cli.config)?;
    apply_overrides(&cli, &mut settings)?;
    let client = build_client(&settings)?;
    let now = Utc::now();

    match cli.command {
        Command::Explore {
            search,
            min_goal,
            max_goal,
            sort,
            ascending,
        } => {
            let query = CatalogQuery {
                search,
                min_goal_sol: min_goal,
                max_goal_sol: max_goal,
                sort: sort.into(),
                direction: if ascending {
                    SortDirection::Ascending
                } else {
                    SortDirection::Descending
                },
            };
            let views = client.explore(&query, now).await?;
            print_output(cli.json, &views, |v| render::campaign_list(v))?;
        }
        Command::Archived => {
            let views = client.archived(now).await?;
            print_output(cli.json, &views, |v| render::campaign_list(v))?;
        }
        Command::Campaign { address } => {
            let detail = client.campaign_detail(&parse_address(&address)?, now).await?;
            print_output(cli.json, &detail, render::detail)?;
        }
        Command::Profile { wallet } => {
            let wallet = match wallet {
                Some(raw) => parse_address(&raw)?,
                None => load_keypair(&settings)?.pubkey(),
            };
            let profile = client.profile(&wallet, now).await?;
            print_output(cli.json, &profile, render::profile)?;
        }
        Command::Create {
            title,
            short_description,
            description_file,
            goal,
            days,
            tiers,
            socials,
            images,
        } => {
            let long_description = match description_file {
                Some(path) => fs::read_to_string(&path)
                    .with_context(|| format!("failed to read '{}'", path.display()))?,
                None => String::new(),
            };
            let draft = CampaignDraft {
                title,
                short_description,
                long_description,
                goal_sol: goal,
                duration_days: days,
                tiers: tiers.iter().map(|t| parse_tier(t)).collect::<Result<_>>()?,
                socials: socials.iter().map(|s| parse_social(s)).collect::<Result<_>>()?,
                images: images.iter().map(|p| read_image(p)).collect::<Result<_>>()?,
            };
            let signer = load_keypair(&settings)?;
            let created = client.create_campaign(&signer, draft, now).await?;
            info!(address = %created.address, signature = %created.signature, "campaign launched");
            print_output(cli.json, &created.metadata, |meta| {
                format!(
                    "Created campaign {} ({} images)\nsignature: {}",
                    meta.id,
                    meta.image_urls.len(),
                    created.signature
                )
            })?;
        }
        Command::Contribute {
            campaign,
            tier,
            amount,
        } => {
            let signer = load_keypair(&settings)?;
            let signature = client
                .contribute(
                    &signer,
                    &parse_address(&campaign)?,
                    tier,
                    Lamports::from_sol(amount),
                    now,
                )
                .await?;
            println!("Contribution submitted: {signature}");
        }
        Command::Finalize { campaign } => {
            let signer = load_keypair(&settings)?;
            let signature = client.finalize(&signer, &parse_address(&campaign)?).await?;
            println!("Campaign finalized: {signature}");
        }
        Command::Refund { campaign } => {
            let signer = load_keypair(&settings)?;
            let signature = client
                .claim_refund(&signer, &parse_address(&campaign)?, now)
                .await?;
            println!("Refund claimed: {signature}");
        }
        Command::FounderVault => {
            let balance = client.founder_vault_balance().await?;
            print_output(cli.json, &balance, |b| format!("Founder vault: {b}"))?;
        }
        Command::Withdraw => {
            let signer = load_keypair(&settings)?;
            let signature = client.founder_withdraw(&signer).await?;
            println!("Founder vault withdrawn: {signature}");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<ClientError>() {
                Some(client_err) => eprintln!("{}", client_err.notice()),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
